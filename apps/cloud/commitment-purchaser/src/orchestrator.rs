//! Purchase Orchestrator
//!
//! Wires configured providers into commitment services and runs the
//! purchaser's commands across them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use domain_commitments::{
    BatchDriver, CloudProvider, Commitment, CommitmentError, CommitmentResult, CommitmentService,
    Context, Offering, OfferingDetails, PurchaseResult, Purchaser, Recommendation,
    RecommendationParams, RecommendationSource, RetryingPurchaseApi, ServiceType,
};
use eyre::{Result, WrapErr};
use futures::future::join_all;
use observability::PurchaseMetrics;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::providers::{
    AwsCommitmentProvider, AzureCommitmentProvider, GcpCommitmentProvider, ProviderAdapter,
    ProviderRegistry,
};
use crate::source::{JsonFileSource, NoRecommendations};

/// Status of one registered provider
#[derive(Debug, Clone, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub provider: CloudProvider,
    pub configured: bool,
    pub services: Vec<ServiceType>,
}

/// Resolution and pricing of a recommendation that was not submitted
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPurchase {
    pub recommendation: Recommendation,
    pub details: Option<OfferingDetails>,
    pub error: Option<String>,
}

/// Main commitment purchase orchestrator
pub struct Orchestrator {
    config: Config,
    registry: ProviderRegistry,
}

impl Orchestrator {
    pub fn new(config: Config, registry: ProviderRegistry) -> Self {
        Self { config, registry }
    }

    /// Orchestrator with every built-in provider registered
    pub async fn from_config(config: Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http.timeout())
            .user_agent(config.http.user_agent.clone())
            .build()
            .wrap_err("Failed to build HTTP client")?;

        let mut registry = ProviderRegistry::new();
        registry.register(Box::new(
            AwsCommitmentProvider::from_env(config.aws.clone()).await,
        ));
        registry.register(Box::new(AzureCommitmentProvider::new(
            config.azure.clone(),
            client.clone(),
        )));
        registry.register(Box::new(GcpCommitmentProvider::new(config.gcp.clone(), client)));

        Ok(Self::new(config, registry))
    }

    pub fn dry_run(&self) -> bool {
        self.config.purchase.dry_run
    }

    pub fn provider_status(&self) -> Vec<ProviderStatus> {
        [CloudProvider::Aws, CloudProvider::Azure, CloudProvider::Gcp]
            .into_iter()
            .filter_map(|p| self.registry.get_provider(p))
            .map(|adapter| ProviderStatus {
                name: adapter.name().to_string(),
                provider: adapter.provider(),
                configured: adapter.is_configured(),
                services: adapter.supported_services().to_vec(),
            })
            .collect()
    }

    fn adapter(&self, provider: CloudProvider) -> CommitmentResult<&dyn ProviderAdapter> {
        let adapter = self.registry.get_provider(provider).ok_or_else(|| {
            CommitmentError::NotConfigured(format!("no adapter registered for {}", provider))
        })?;
        if !adapter.is_configured() {
            return Err(CommitmentError::NotConfigured(format!(
                "{} credentials are not configured",
                adapter.name()
            )));
        }
        Ok(adapter)
    }

    /// Commitment service for one provider and service type.
    ///
    /// Purchase submissions are re-sent only when throttled or when the
    /// connection was never established, and stop backing off once `ctx` is
    /// cancelled.
    pub fn service(
        &self,
        ctx: &Context,
        provider: CloudProvider,
        service: ServiceType,
        recommendations: Arc<dyn RecommendationSource>,
    ) -> CommitmentResult<CommitmentService> {
        let mut bindings = self.adapter(provider)?.bindings(service, recommendations)?;
        bindings.purchase_api = Arc::new(
            RetryingPurchaseApi::new(bindings.purchase_api, self.config.purchase.retry())
                .with_context(ctx.clone()),
        );

        Ok(CommitmentService::new(bindings)
            .with_pagination_policy(self.config.purchase.pagination))
    }

    fn service_for(
        &self,
        ctx: &Context,
        rec: &Recommendation,
    ) -> CommitmentResult<CommitmentService> {
        self.service(ctx, rec.provider, rec.service, Arc::new(NoRecommendations))
    }

    /// Recommendations from `input` that pass `params`
    pub async fn recommendations(
        &self,
        ctx: &Context,
        provider: CloudProvider,
        service: ServiceType,
        input: PathBuf,
        legacy: bool,
        params: &RecommendationParams,
    ) -> Result<Vec<Recommendation>> {
        let source = Arc::new(JsonFileSource::new(input, legacy, provider));
        let recs = self
            .service(ctx, provider, service, source)?
            .get_recommendations(ctx, params)
            .await
            .inspect_err(|_| {
                PurchaseMetrics::record_provider_error(&provider.to_string(), "recommendations")
            })?;

        PurchaseMetrics::set_recommendations(&provider.to_string(), recs.len());
        Ok(recs)
    }

    /// Purchase every recommendation in order, pausing between attempts.
    ///
    /// Recommendations may span providers and service types; each is routed
    /// to its own service. One result is returned per input.
    pub async fn purchase_all(
        &self,
        ctx: &Context,
        recs: &[Recommendation],
    ) -> Vec<PurchaseResult> {
        let purchaser = MeteredPurchaser::build(self, ctx, recs);
        let results = BatchDriver::new(&purchaser)
            .purchase_all(ctx, recs, self.config.purchase.delay())
            .await;

        let mut per_provider: HashMap<CloudProvider, (usize, usize)> = HashMap::new();
        for result in &results {
            let entry = per_provider.entry(result.recommendation.provider).or_default();
            entry.0 += 1;
            if result.success {
                entry.1 += 1;
            }
        }
        for (provider, (total, succeeded)) in per_provider {
            PurchaseMetrics::record_batch(&provider.to_string(), total, succeeded);
        }

        results
    }

    /// Resolve and price each recommendation without submitting anything
    pub async fn plan(&self, ctx: &Context, recs: &[Recommendation]) -> Vec<PlannedPurchase> {
        let mut planned = Vec::with_capacity(recs.len());
        for rec in recs {
            let outcome = match self.service_for(ctx, rec) {
                Ok(service) => service.get_offering_details(ctx, rec).await,
                Err(e) => Err(e),
            };
            planned.push(match outcome {
                Ok(details) => PlannedPurchase {
                    recommendation: rec.clone(),
                    details: Some(details),
                    error: None,
                },
                Err(e) => PlannedPurchase {
                    recommendation: rec.clone(),
                    details: None,
                    error: Some(e.to_string()),
                },
            });
        }
        planned
    }

    pub async fn validate(&self, ctx: &Context, rec: &Recommendation) -> Result<Offering> {
        let offering = self.service_for(ctx, rec)?.validate_offering(ctx, rec).await?;
        Ok(offering)
    }

    pub async fn details(&self, ctx: &Context, rec: &Recommendation) -> Result<OfferingDetails> {
        let details = self
            .service_for(ctx, rec)?
            .get_offering_details(ctx, rec)
            .await?;
        Ok(details)
    }

    pub async fn resource_types(
        &self,
        ctx: &Context,
        provider: CloudProvider,
        service: ServiceType,
        region: Option<&str>,
    ) -> Result<Vec<String>> {
        let types = self
            .service(ctx, provider, service, Arc::new(NoRecommendations))?
            .list_valid_resource_types(ctx, region)
            .await
            .inspect_err(|_| {
                PurchaseMetrics::record_provider_error(&provider.to_string(), "resource_types")
            })?;
        Ok(types)
    }

    /// Active commitments across `providers`, or every configured provider.
    ///
    /// A provider whose listing fails is logged and left out.
    pub async fn list_commitments(
        &self,
        ctx: &Context,
        providers: Option<&[CloudProvider]>,
    ) -> Result<Vec<Commitment>> {
        let targets: Vec<&dyn ProviderAdapter> = self
            .registry
            .get_configured_providers()
            .into_iter()
            .filter(|a| providers.is_none_or(|p| p.contains(&a.provider())))
            .collect();

        if targets.is_empty() {
            eyre::bail!("No configured providers to list commitments from");
        }

        let listings = targets.iter().map(|adapter| async move {
            let provider = adapter.provider();
            let service = adapter
                .supported_services()
                .first()
                .copied()
                .unwrap_or_default();
            let listed = match self.service(ctx, provider, service, Arc::new(NoRecommendations)) {
                Ok(svc) => svc.list_commitments(ctx).await,
                Err(e) => Err(e),
            };
            (provider, listed)
        });

        let mut commitments = Vec::new();
        for (provider, listed) in join_all(listings).await {
            match listed {
                Ok(found) => {
                    info!(provider = %provider, count = found.len(), "Listed commitments");
                    PurchaseMetrics::set_active_commitments(&provider.to_string(), found.len());
                    commitments.extend(found);
                }
                Err(CommitmentError::Cancelled) => return Err(CommitmentError::Cancelled.into()),
                Err(e) => {
                    error!(provider = %provider, error = %e, "Failed to list commitments");
                    PurchaseMetrics::record_provider_error(
                        &provider.to_string(),
                        "list_commitments",
                    );
                }
            }
        }

        Ok(commitments)
    }
}

/// Routes each recommendation to its provider's service and records metrics
struct MeteredPurchaser {
    services: HashMap<(CloudProvider, ServiceType), Result<CommitmentService, String>>,
}

impl MeteredPurchaser {
    fn build(orchestrator: &Orchestrator, ctx: &Context, recs: &[Recommendation]) -> Self {
        let mut services = HashMap::new();
        for rec in recs {
            services
                .entry((rec.provider, rec.service))
                .or_insert_with(|| {
                    orchestrator.service_for(ctx, rec).map_err(|e| {
                        warn!(
                            provider = %rec.provider,
                            service = %rec.service,
                            error = %e,
                            "Provider unavailable"
                        );
                        format!("Failed to purchase: {}", e)
                    })
                });
        }
        Self { services }
    }
}

#[async_trait]
impl Purchaser for MeteredPurchaser {
    async fn purchase(&self, ctx: &Context, rec: &Recommendation) -> PurchaseResult {
        let provider = rec.provider.to_string();
        let service_name = rec.service.to_string();
        let start = Instant::now();

        let result = match self.services.get(&(rec.provider, rec.service)) {
            Some(Ok(service)) => service.purchase(ctx, rec).await,
            Some(Err(message)) => PurchaseResult::failed(rec.clone(), message.clone()),
            None => PurchaseResult::failed(rec.clone(), "Invalid service type"),
        };

        PurchaseMetrics::record_purchase(
            &provider,
            &service_name,
            result.success,
            start.elapsed().as_millis() as u64,
        );
        if result.success {
            PurchaseMetrics::record_purchase_cost(&provider, &service_name, result.cost);
        }
        result
    }
}
