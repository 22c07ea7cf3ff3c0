use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::batch::BatchDriver;
use crate::context::Context;
use crate::error::{CommitmentError, CommitmentResult};
use crate::executor::{PurchaseExecutor, Purchaser};
use crate::inventory::{InventoryReader, PaginationPolicy};
use crate::models::{
    CloudProvider, Commitment, Offering, OfferingDetails, PriceQuote, PurchaseResult,
    Recommendation, RecommendationParams, ServiceType,
};
use crate::pricing::{offering_details, offering_hourly_rate};
use crate::provider::{
    CommitmentLister, OfferingCatalog, PricingLookup, PurchaseApi, RecommendationSource,
};
use crate::resolver::OfferingResolver;

/// Collaborators binding the engine to one provider and service type
#[derive(Clone)]
pub struct ProviderBindings {
    pub provider: CloudProvider,
    pub service: ServiceType,
    pub catalog: Arc<dyn OfferingCatalog>,
    pub purchase_api: Arc<dyn PurchaseApi>,
    pub lister: Arc<dyn CommitmentLister>,
    pub pricing: Arc<dyn PricingLookup>,
    pub recommendations: Arc<dyn RecommendationSource>,
}

/// Entry point for matching, pricing and purchasing commitments
pub struct CommitmentService {
    provider: CloudProvider,
    service: ServiceType,
    resolver: OfferingResolver,
    executor: PurchaseExecutor,
    inventory: InventoryReader,
    pricing: Arc<dyn PricingLookup>,
    recommendations: Arc<dyn RecommendationSource>,
}

impl CommitmentService {
    pub fn new(bindings: ProviderBindings) -> Self {
        let resolver = OfferingResolver::new(bindings.catalog);
        let executor =
            PurchaseExecutor::new(bindings.service, resolver.clone(), bindings.purchase_api);

        Self {
            provider: bindings.provider,
            service: bindings.service,
            resolver,
            executor,
            inventory: InventoryReader::new(bindings.lister),
            pricing: bindings.pricing,
            recommendations: bindings.recommendations,
        }
    }

    pub fn with_pagination_policy(mut self, policy: PaginationPolicy) -> Self {
        self.inventory = self.inventory.with_policy(policy);
        self
    }

    /// Catalog page size for every operation that resolves offerings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.resolver = self.resolver.with_page_size(page_size);
        self.executor = self.executor.with_resolver(self.resolver.clone());
        self
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    /// Recommendations from the configured source that pass `params` and
    /// carry a details payload matching their service type
    pub async fn get_recommendations(
        &self,
        ctx: &Context,
        params: &RecommendationParams,
    ) -> CommitmentResult<Vec<Recommendation>> {
        let fetched = ctx
            .run(self.recommendations.fetch_recommendations(params))
            .await?;
        let total = fetched.len();

        let accepted: Vec<Recommendation> = fetched
            .into_iter()
            .filter(|rec| params.accepts(rec))
            .filter(|rec| match rec.check() {
                Ok(()) => true,
                Err(e) => {
                    warn!(
                        resource_type = %rec.resource_type,
                        service = %rec.service,
                        error = %e,
                        "Dropping invalid recommendation"
                    );
                    false
                }
            })
            .collect();

        info!(
            provider = %self.provider,
            fetched = total,
            accepted = accepted.len(),
            "Fetched recommendations"
        );
        Ok(accepted)
    }

    /// Purchase one recommendation; failures are reported in the result
    pub async fn purchase(&self, ctx: &Context, rec: &Recommendation) -> PurchaseResult {
        self.executor.purchase(ctx, rec).await
    }

    /// Purchase every recommendation in order with `delay` between attempts
    pub async fn batch_purchase(
        &self,
        ctx: &Context,
        recs: &[Recommendation],
        delay: Duration,
    ) -> Vec<PurchaseResult> {
        BatchDriver::new(&self.executor)
            .purchase_all(ctx, recs, delay)
            .await
    }

    /// Active and payment-pending commitments held by the account
    pub async fn list_commitments(&self, ctx: &Context) -> CommitmentResult<Vec<Commitment>> {
        self.inventory.list_active(ctx).await
    }

    /// Check that `rec` targets this service and resolves to an offering
    pub async fn validate_offering(
        &self,
        ctx: &Context,
        rec: &Recommendation,
    ) -> CommitmentResult<Offering> {
        if rec.service != self.service {
            return Err(CommitmentError::Validation(format!(
                "recommendation is for {}, service handles {}",
                rec.service, self.service
            )));
        }
        rec.check()?;

        self.resolver.resolve(ctx, rec).await
    }

    /// Price breakdown of the offering `rec` resolves to.
    ///
    /// Falls back to the offering's own pricing when no pricing lookup is
    /// configured for the provider.
    pub async fn get_offering_details(
        &self,
        ctx: &Context,
        rec: &Recommendation,
    ) -> CommitmentResult<OfferingDetails> {
        let offering = self.validate_offering(ctx, rec).await?;

        let quote = match ctx
            .run(self.pricing.get_price(&rec.resource_type, &rec.region, rec.term))
            .await
        {
            Ok(quote) => quote,
            Err(CommitmentError::NotConfigured(reason)) => {
                debug!(reason = %reason, "No pricing lookup, using offering rates");
                PriceQuote {
                    on_demand_rate: 0.0,
                    reserved_rate: offering_hourly_rate(&offering, rec.term.months()),
                    currency: offering.currency.clone(),
                }
            }
            Err(e) => return Err(e),
        };

        Ok(offering_details(&offering, rec, &quote))
    }

    /// Resource types purchasable in `region`, sorted and de-duplicated
    pub async fn list_valid_resource_types(
        &self,
        ctx: &Context,
        region: Option<&str>,
    ) -> CommitmentResult<Vec<String>> {
        self.resolver.resource_types(ctx, region).await
    }
}
