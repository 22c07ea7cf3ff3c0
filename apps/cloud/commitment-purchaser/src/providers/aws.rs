//! AWS Reserved Nodes Provider
//!
//! Redshift reserved node offerings, purchases and inventory through the
//! AWS SDK.
//!
//! ## Configuration
//!
//! The provider uses standard AWS SDK credential resolution:
//! - Environment variables: `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, `AWS_REGION`
//! - IAM roles (EKS IRSA, EC2 instance profile)
//! - Shared credentials file
//!
//! Catalog and purchase calls go to the region named by the request; the
//! inventory is read from the configured region.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_redshift::config::Region;
use aws_sdk_redshift::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_redshift::types::{RecurringCharge as NodeCharge, ReservedNode, ReservedNodeOffering};
use aws_sdk_redshift::Client;
use chrono::{DateTime, Utc};
use domain_commitments::models::{ChargeFrequency, RecurringCharge};
use domain_commitments::{
    CloudProvider, CommitmentError, CommitmentLister, CommitmentPage, CommitmentRecord,
    CommitmentResult, CommitmentType, Offering, OfferingCatalog, OfferingClass, OfferingFilter,
    OfferingPage, ProviderBindings, ProviderCommitment, PurchaseApi, PurchaseRequest,
    RecommendationSource, ServiceType,
};
use tracing::{debug, info, warn};

use super::{ProviderAdapter, Unpriced};
use crate::config::AwsConfig;

/// Page size bounds of the Redshift describe calls
const MIN_PAGE_SIZE: usize = 20;
const MAX_PAGE_SIZE: usize = 100;

const THROTTLING_CODES: &[&str] = &["Throttling", "ThrottlingException", "RequestLimitExceeded"];
const AUTH_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "InvalidClientTokenId",
    "ExpiredToken",
    "SignatureDoesNotMatch",
];

const SUPPORTED_SERVICES: &[ServiceType] = &[ServiceType::DataWarehouse];

/// AWS Reserved Nodes Provider
pub struct AwsCommitmentProvider {
    config: AwsConfig,
    /// Shared SDK configuration; absent while the provider is disabled
    sdk_config: Option<SdkConfig>,
}

impl AwsCommitmentProvider {
    pub fn new(config: AwsConfig, sdk_config: Option<SdkConfig>) -> Self {
        Self { config, sdk_config }
    }

    /// Load the default AWS SDK config when the provider is enabled
    ///
    /// Uses AWS SDK's default credential chain:
    /// - Environment variables (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`)
    /// - Web identity token (EKS IRSA)
    /// - IAM instance profile (EC2)
    /// - Shared credentials file
    pub async fn from_env(config: AwsConfig) -> Self {
        if !config.enabled {
            return Self::new(config, None);
        }

        let mut config_loader = aws_config::from_env();
        if let Some(region) = &config.region {
            config_loader = config_loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = config_loader.load().await;

        Self::new(config, Some(sdk_config))
    }
}

impl ProviderAdapter for AwsCommitmentProvider {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    fn name(&self) -> &'static str {
        "AWS"
    }

    fn is_configured(&self) -> bool {
        self.config.enabled
            && self
                .sdk_config
                .as_ref()
                .is_some_and(|sdk| sdk.region().is_some())
    }

    fn supported_services(&self) -> &'static [ServiceType] {
        SUPPORTED_SERVICES
    }

    fn bindings(
        &self,
        service: ServiceType,
        recommendations: Arc<dyn RecommendationSource>,
    ) -> CommitmentResult<ProviderBindings> {
        if !SUPPORTED_SERVICES.contains(&service) {
            return Err(CommitmentError::NotConfigured(format!(
                "AWS reservations for {} are not supported",
                service
            )));
        }
        let sdk_config = self.sdk_config.clone().ok_or_else(|| {
            CommitmentError::NotConfigured("AWS provider is disabled".to_string())
        })?;

        let nodes = Arc::new(RedshiftReservedNodes {
            sdk_config,
            account_id: self.config.account_id.clone().unwrap_or_default(),
        });

        Ok(ProviderBindings {
            provider: CloudProvider::Aws,
            service,
            catalog: nodes.clone(),
            purchase_api: nodes.clone(),
            lister: nodes,
            pricing: Arc::new(Unpriced("AWS")),
            recommendations,
        })
    }
}

// ============================================================================
// Mappings
// ============================================================================

/// Classify an SDK failure.
///
/// A timeout stays distinguishable so purchases that may have reached AWS
/// are never re-sent.
fn sdk_error<E, R>(err: SdkError<E, R>) -> CommitmentError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::TimeoutError(_) => {
            CommitmentError::Transport(format!("request timed out: {}", detail))
        }
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            CommitmentError::Transport(format!("request timed out: {}", detail))
        }
        SdkError::DispatchFailure(_) => {
            CommitmentError::Transport(format!("dispatch failed: {}", detail))
        }
        SdkError::ResponseError(_) => CommitmentError::Parse(detail),
        SdkError::ServiceError(_) => match err.code() {
            Some(code) if THROTTLING_CODES.contains(&code) => {
                CommitmentError::RateLimited(format!("{}: {}", code, detail))
            }
            Some(code) if AUTH_CODES.contains(&code) => {
                CommitmentError::Auth(format!("{}: {}", code, detail))
            }
            _ => CommitmentError::Transport(detail),
        },
        _ => CommitmentError::Transport(detail),
    }
}

fn node_charges(charges: &[NodeCharge]) -> Vec<RecurringCharge> {
    charges
        .iter()
        .filter_map(|c| {
            let amount = c.recurring_charge_amount()?;
            let frequency = c.recurring_charge_frequency()?.parse::<ChargeFrequency>().ok()?;
            Some(RecurringCharge { amount, frequency })
        })
        .collect()
}

/// Catalog entry for a reserved node offering; entries without an id or
/// node type are dropped
fn node_offering(offering: &ReservedNodeOffering) -> Option<Offering> {
    let offering_id = offering.reserved_node_offering_id()?;
    let node_type = offering.node_type()?;

    Some(Offering {
        offering_id: offering_id.to_string(),
        resource_type: node_type.to_string(),
        duration_seconds: offering.duration().map(i64::from),
        offering_class: offering
            .reserved_node_offering_type()
            .map(|t| OfferingClass::from_provider(t.as_str()))
            .unwrap_or_default(),
        fixed_price: offering.fixed_price(),
        usage_price: offering.usage_price().unwrap_or_default(),
        currency: offering.currency_code().unwrap_or("USD").to_string(),
        recurring_charges: node_charges(offering.recurring_charges()),
    })
}

/// Purchase record for the node returned by a purchase call. A node
/// without an id yields a blank record, which the executor reports as an
/// empty response.
fn node_record(node: &ReservedNode) -> CommitmentRecord {
    CommitmentRecord {
        commitment_id: node.reserved_node_id().unwrap_or_default().to_string(),
        fixed_price: node.fixed_price(),
        recurring_charges: node_charges(node.recurring_charges()),
    }
}

fn node_commitment(
    node: &ReservedNode,
    account_id: &str,
    region: &str,
) -> Option<ProviderCommitment> {
    let commitment_id = node.reserved_node_id()?;
    let Some(start_date) = node
        .start_time()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
    else {
        warn!(reserved_node = %commitment_id, "Reserved node has no start time, skipping");
        return None;
    };

    Some(ProviderCommitment {
        commitment_id: commitment_id.to_string(),
        commitment_type: CommitmentType::ReservedCapacity,
        service: ServiceType::DataWarehouse,
        account_id: account_id.to_string(),
        region: region.to_string(),
        resource_type: node.node_type().unwrap_or_default().to_string(),
        count: node
            .node_count()
            .and_then(|c| u32::try_from(c).ok())
            .unwrap_or_default(),
        start_date,
        duration_seconds: node.duration().map(i64::from).unwrap_or_default(),
        state: node.state().unwrap_or_default().to_string(),
    })
}

// ============================================================================
// Client
// ============================================================================

/// Redshift reserved nodes for the credentials' account
pub struct RedshiftReservedNodes {
    sdk_config: SdkConfig,
    account_id: String,
}

impl RedshiftReservedNodes {
    /// Client for `region`, or for the configured region when none is named
    fn client(&self, region: Option<&str>) -> Client {
        match region.filter(|r| !r.is_empty()) {
            Some(region) => {
                let config = aws_sdk_redshift::config::Builder::from(&self.sdk_config)
                    .region(Region::new(region.to_string()))
                    .build();
                Client::from_conf(config)
            }
            None => Client::new(&self.sdk_config),
        }
    }

    fn default_region(&self) -> String {
        self.sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_default()
    }
}

#[async_trait]
impl OfferingCatalog for RedshiftReservedNodes {
    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
        page_token: Option<String>,
    ) -> CommitmentResult<OfferingPage> {
        let page_size = filter.page_size.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE);
        let output = self
            .client(filter.region.as_deref())
            .describe_reserved_node_offerings()
            .max_records(page_size as i32)
            .set_marker(page_token)
            .send()
            .await
            .map_err(sdk_error)?;

        let offerings: Vec<Offering> = output
            .reserved_node_offerings()
            .iter()
            .filter_map(node_offering)
            .collect();

        debug!(
            region = filter.region.as_deref().unwrap_or_default(),
            count = offerings.len(),
            "Fetched Redshift reserved node offerings page"
        );
        Ok(OfferingPage {
            offerings,
            next_page_token: output
                .marker()
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        })
    }
}

#[async_trait]
impl PurchaseApi for RedshiftReservedNodes {
    async fn submit(
        &self,
        request: &PurchaseRequest,
    ) -> CommitmentResult<Option<CommitmentRecord>> {
        let node_count = i32::try_from(request.quantity).map_err(|_| {
            CommitmentError::Validation(format!("node count {} is too large", request.quantity))
        })?;

        let output = self
            .client(Some(&request.region))
            .purchase_reserved_node_offering()
            .reserved_node_offering_id(&request.offering_id)
            .node_count(node_count)
            .send()
            .await
            .map_err(sdk_error)?;

        let record = output.reserved_node().map(node_record);
        if let Some(record) = &record {
            info!(
                reserved_node = %record.commitment_id,
                offering_id = %request.offering_id,
                node_type = %request.resource_type,
                node_count,
                "Redshift reserved node purchased"
            );
        }
        Ok(record)
    }
}

#[async_trait]
impl CommitmentLister for RedshiftReservedNodes {
    fn provider(&self) -> CloudProvider {
        CloudProvider::Aws
    }

    async fn list_commitments(
        &self,
        page_token: Option<String>,
    ) -> CommitmentResult<CommitmentPage> {
        let output = self
            .client(None)
            .describe_reserved_nodes()
            .max_records(MAX_PAGE_SIZE as i32)
            .set_marker(page_token)
            .send()
            .await
            .map_err(sdk_error)?;

        let region = self.default_region();
        let commitments = output
            .reserved_nodes()
            .iter()
            .filter_map(|node| node_commitment(node, &self.account_id, &region))
            .collect();

        Ok(CommitmentPage {
            commitments,
            next_page_token: output
                .marker()
                .filter(|m| !m.is_empty())
                .map(str::to_string),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_redshift::config::http::HttpResponse;
    use aws_sdk_redshift::operation::describe_reserved_nodes::DescribeReservedNodesError;
    use aws_sdk_redshift::primitives::DateTime as AwsDateTime;
    use aws_sdk_redshift::types::ReservedNodeOfferingType;
    use domain_commitments::models::ONE_YEAR_SECONDS;
    use domain_commitments::CommitmentState;

    fn dc2_offering() -> ReservedNodeOffering {
        ReservedNodeOffering::builder()
            .reserved_node_offering_id("off-dc2-1yr")
            .node_type("dc2.large")
            .duration(31_536_000)
            .fixed_price(1000.0)
            .usage_price(0.0)
            .currency_code("USD")
            .offering_type("All Upfront")
            .reserved_node_offering_type(ReservedNodeOfferingType::Regular)
            .recurring_charges(
                NodeCharge::builder()
                    .recurring_charge_amount(0.05)
                    .recurring_charge_frequency("Hourly")
                    .build(),
            )
            .build()
    }

    #[test]
    fn test_offering_mapping() {
        let offering = node_offering(&dc2_offering()).unwrap();

        assert_eq!(offering.offering_id, "off-dc2-1yr");
        assert_eq!(offering.resource_type, "dc2.large");
        assert_eq!(offering.duration_seconds, Some(ONE_YEAR_SECONDS));
        assert_eq!(offering.offering_class, OfferingClass::Regular);
        assert_eq!(offering.fixed_price, Some(1000.0));
        assert_eq!(offering.currency, "USD");
        assert_eq!(offering.recurring_charges.len(), 1);
        assert_eq!(offering.recurring_charges[0].frequency, ChargeFrequency::Hourly);
    }

    #[test]
    fn test_offering_without_node_type_is_dropped() {
        let offering = ReservedNodeOffering::builder()
            .reserved_node_offering_id("off-1")
            .build();
        assert!(node_offering(&offering).is_none());
    }

    #[test]
    fn test_purchase_record_mapping() {
        let node = ReservedNode::builder()
            .reserved_node_id("rn-42")
            .fixed_price(950.0)
            .build();
        let record = node_record(&node);
        assert_eq!(record.commitment_id, "rn-42");
        assert_eq!(record.fixed_price, Some(950.0));

        // no id: the executor reports this as an empty response
        let blank = node_record(&ReservedNode::builder().build());
        assert!(blank.commitment_id.is_empty());
    }

    #[test]
    fn test_reserved_node_to_commitment() {
        let node = ReservedNode::builder()
            .reserved_node_id("rn-1")
            .node_type("ra3.4xlarge")
            .node_count(2)
            .start_time(AwsDateTime::from_secs(1_709_251_200))
            .duration(31_536_000)
            .state("payment-pending")
            .build();

        let c = node_commitment(&node, "123456789012", "us-east-1").unwrap();
        assert_eq!(c.commitment_id, "rn-1");
        assert_eq!(c.resource_type, "ra3.4xlarge");
        assert_eq!(c.count, 2);
        assert_eq!(c.start_date.timestamp(), 1_709_251_200);
        assert_eq!(c.duration_seconds, ONE_YEAR_SECONDS);
        assert_eq!(c.account_id, "123456789012");
        assert_eq!(
            CommitmentState::from_provider_state(&c.state),
            CommitmentState::PaymentPending
        );
    }

    #[test]
    fn test_reserved_node_without_start_is_skipped() {
        let node = ReservedNode::builder().reserved_node_id("rn-1").build();
        assert!(node_commitment(&node, "", "us-east-1").is_none());
    }

    #[test]
    fn test_timeout_is_not_resendable() {
        let err: SdkError<DescribeReservedNodesError, HttpResponse> =
            SdkError::timeout_error("deadline elapsed");
        let mapped = sdk_error(err);

        assert!(
            matches!(&mapped, CommitmentError::Transport(m) if m.starts_with("request timed out"))
        );
        assert!(!mapped.is_safe_to_resend());
    }

    #[test]
    fn test_disabled_provider_is_not_configured() {
        let provider = AwsCommitmentProvider::new(AwsConfig::default(), None);
        assert!(!provider.is_configured());
        assert!(matches!(
            provider.bindings(
                ServiceType::DataWarehouse,
                Arc::new(crate::source::NoRecommendations)
            ),
            Err(CommitmentError::NotConfigured(_))
        ));
        assert!(matches!(
            provider.bindings(ServiceType::Compute, Arc::new(crate::source::NoRecommendations)),
            Err(CommitmentError::NotConfigured(_))
        ));
    }
}
