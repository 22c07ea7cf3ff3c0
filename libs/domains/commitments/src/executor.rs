//! Purchase execution.
//!
//! ```text
//! validate service ─▶ resolve offering ─▶ validate details ─▶ submit ─▶ interpret ─▶ success
//!        │                  │                    │               │          │
//!        └──────────────────┴────────────────────┴───────────────┴──────────┴─▶ failure
//! ```
//!
//! Every arrow into "failure" is terminal and produces a `PurchaseResult`
//! with `success = false`. Nothing is retried here.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::context::Context;
use crate::error::CommitmentError;
use crate::models::{
    ChargeFrequency, Offering, PurchaseResult, Recommendation, RecurringCharge, ServiceType, Term,
};
use crate::pricing::HOURS_PER_MONTH;
use crate::provider::{CommitmentRecord, PurchaseApi, PurchaseRequest};
use crate::resolver::OfferingResolver;

/// Anything that turns one recommendation into one purchase result
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Purchaser: Send + Sync {
    async fn purchase(&self, ctx: &Context, rec: &Recommendation) -> PurchaseResult;
}

/// Cost realized by a purchase: the fixed price when one is charged,
/// otherwise the hourly recurring charges over the whole term.
///
/// Returns `None` when neither is available. A zero fixed price counts as
/// unavailable.
pub fn realized_cost(
    fixed_price: Option<f64>,
    recurring_charges: &[RecurringCharge],
    term: Term,
) -> Option<f64> {
    if let Some(price) = fixed_price.filter(|p| *p > 0.0) {
        return Some(price);
    }

    let hourly: Vec<f64> = recurring_charges
        .iter()
        .filter(|c| c.frequency == ChargeFrequency::Hourly)
        .map(|c| c.amount)
        .collect();

    if hourly.is_empty() {
        return None;
    }

    let hours = HOURS_PER_MONTH * f64::from(term.months());
    Some(hourly.iter().sum::<f64>() * hours)
}

pub struct PurchaseExecutor {
    service: ServiceType,
    resolver: OfferingResolver,
    purchase_api: Arc<dyn PurchaseApi>,
}

impl PurchaseExecutor {
    pub fn new(
        service: ServiceType,
        resolver: OfferingResolver,
        purchase_api: Arc<dyn PurchaseApi>,
    ) -> Self {
        Self {
            service,
            resolver,
            purchase_api,
        }
    }

    /// Resolve offerings through `resolver` from now on
    pub fn with_resolver(mut self, resolver: OfferingResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    async fn execute(&self, ctx: &Context, rec: &Recommendation) -> Result<PurchaseResult, String> {
        if ctx.is_cancelled() {
            return Err(format!("Failed to purchase: {}", CommitmentError::Cancelled));
        }

        if rec.service != self.service {
            return Err("Invalid service type".to_string());
        }

        let offering = self
            .resolver
            .resolve(ctx, rec)
            .await
            .map_err(|e| format!("Failed to find offering: {}", e))?;

        if !rec.details.agrees_with(self.service) {
            return Err("Invalid service details".to_string());
        }

        let request = PurchaseRequest {
            offering_id: offering.offering_id.clone(),
            resource_type: rec.resource_type.clone(),
            quantity: rec.count,
            service: rec.service,
            account_id: rec.account_id.clone(),
            region: rec.region.clone(),
            term: rec.term,
            payment_option: rec.payment_option,
        };

        let record = ctx
            .run(self.purchase_api.submit(&request))
            .await
            .map_err(|e| format!("Failed to purchase: {}", e))?;

        let record = match record {
            Some(r) if !r.commitment_id.is_empty() => r,
            _ => return Err(CommitmentError::EmptyResponse.to_string()),
        };

        Ok(self.success(rec, &offering, record))
    }

    fn success(
        &self,
        rec: &Recommendation,
        offering: &Offering,
        record: CommitmentRecord,
    ) -> PurchaseResult {
        let cost = realized_cost(record.fixed_price, &record.recurring_charges, rec.term)
            .or_else(|| realized_cost(offering.fixed_price, &offering.recurring_charges, rec.term))
            .unwrap_or(0.0);

        let message = format!(
            "Successfully purchased {} {} of {}",
            rec.count,
            self.service.unit_noun(),
            rec.resource_type
        );

        PurchaseResult::succeeded(
            rec.clone(),
            record.commitment_id,
            offering.offering_id.clone(),
            cost,
            message,
        )
    }
}

#[async_trait]
impl Purchaser for PurchaseExecutor {
    #[instrument(
        skip(self, ctx, rec),
        fields(service = %self.service, resource_type = %rec.resource_type, count = rec.count)
    )]
    async fn purchase(&self, ctx: &Context, rec: &Recommendation) -> PurchaseResult {
        match self.execute(ctx, rec).await {
            Ok(result) => {
                info!(
                    commitment_id = result.commitment_id.as_deref().unwrap_or_default(),
                    cost = result.cost,
                    "Purchase succeeded"
                );
                result
            }
            Err(message) => {
                warn!(reason = %message, "Purchase failed");
                PurchaseResult::failed(rec.clone(), message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        CacheDetails, CloudProvider, DataWarehouseDetails, OfferingClass, PaymentOption,
        ServiceDetails, ONE_YEAR_SECONDS,
    };
    use crate::provider::{MockOfferingCatalog, MockPurchaseApi, OfferingPage};

    fn dc2_offering(fixed_price: Option<f64>) -> Offering {
        Offering {
            offering_id: "off-dc2-1yr".to_string(),
            resource_type: "dc2.large".to_string(),
            duration_seconds: Some(ONE_YEAR_SECONDS),
            offering_class: OfferingClass::Regular,
            fixed_price,
            usage_price: 0.0,
            currency: "USD".to_string(),
            recurring_charges: vec![],
        }
    }

    fn recommendation(resource_type: &str, count: u32) -> Recommendation {
        Recommendation {
            provider: CloudProvider::Aws,
            service: ServiceType::DataWarehouse,
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            resource_type: resource_type.to_string(),
            count,
            term: Term::OneYear,
            payment_option: PaymentOption::AllUpfront,
            details: ServiceDetails::DataWarehouse(DataWarehouseDetails {
                family: "dc2".to_string(),
                current_generation: true,
            }),
            upfront_cost: 0.0,
            recurring_monthly_cost: 0.0,
            estimated_monthly_savings: 0.0,
            estimated_savings_percent: 0.0,
        }
    }

    fn catalog_with(offerings: Vec<Offering>) -> MockOfferingCatalog {
        let mut catalog = MockOfferingCatalog::new();
        catalog.expect_list_offerings().returning(move |_, _| {
            Ok(OfferingPage {
                offerings: offerings.clone(),
                next_page_token: None,
            })
        });
        catalog
    }

    fn executor(catalog: MockOfferingCatalog, api: MockPurchaseApi) -> PurchaseExecutor {
        PurchaseExecutor::new(
            ServiceType::DataWarehouse,
            OfferingResolver::new(Arc::new(catalog)),
            Arc::new(api),
        )
    }

    #[test]
    fn test_realized_cost_prefers_fixed_price() {
        let charges = vec![RecurringCharge {
            amount: 0.1,
            frequency: ChargeFrequency::Hourly,
        }];
        assert_eq!(realized_cost(Some(1000.0), &charges, Term::OneYear), Some(1000.0));
    }

    #[test]
    fn test_realized_cost_from_hourly_charges() {
        let charges = vec![
            RecurringCharge {
                amount: 0.1,
                frequency: ChargeFrequency::Hourly,
            },
            RecurringCharge {
                amount: 50.0,
                frequency: ChargeFrequency::Monthly,
            },
        ];
        let cost = realized_cost(Some(0.0), &charges, Term::OneYear).unwrap();
        assert!((cost - 0.1 * 730.0 * 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_realized_cost_without_pricing() {
        assert_eq!(realized_cost(None, &[], Term::OneYear), None);
        assert_eq!(realized_cost(Some(0.0), &[], Term::OneYear), None);
    }

    #[tokio::test]
    async fn test_zero_response_price_falls_back_to_offering() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().returning(|_| {
            Ok(Some(CommitmentRecord {
                commitment_id: "cmt-1".to_string(),
                fixed_price: Some(0.0),
                recurring_charges: vec![],
            }))
        });

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &recommendation("dc2.large", 1))
            .await;
        assert!(result.success);
        assert_eq!(result.cost, 1000.0);
    }

    #[tokio::test]
    async fn test_successful_purchase() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit()
            .withf(|req| req.offering_id == "off-dc2-1yr" && req.quantity == 2)
            .times(1)
            .returning(|_| {
                Ok(Some(CommitmentRecord {
                    commitment_id: "rn-42".to_string(),
                    fixed_price: None,
                    recurring_charges: vec![],
                }))
            });

        let exec = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api);
        let result = exec
            .purchase(&Context::background(), &recommendation("dc2.large", 2))
            .await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.cost, 1000.0);
        assert_eq!(result.commitment_id.as_deref(), Some("rn-42"));
        assert_eq!(result.offering_id.as_deref(), Some("off-dc2-1yr"));
        assert!(result.message.starts_with("Successfully purchased 2 nodes"));
        assert!(result.message.contains("dc2.large"));
    }

    #[tokio::test]
    async fn test_wrong_service_type_fails_before_resolution() {
        let mut catalog = MockOfferingCatalog::new();
        catalog.expect_list_offerings().never();
        let mut api = MockPurchaseApi::new();
        api.expect_submit().never();

        let mut rec = recommendation("dc2.large", 1);
        rec.service = ServiceType::Cache;

        let result = executor(catalog, api)
            .purchase(&Context::background(), &rec)
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Invalid service type");
    }

    #[tokio::test]
    async fn test_unresolved_offering_names_resource_type() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().never();

        let exec = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api);
        let result = exec
            .purchase(&Context::background(), &recommendation("ra3.4xlarge", 3))
            .await;

        assert!(!result.success);
        assert_eq!(
            result.message,
            "Failed to find offering: no offerings found for ra3.4xlarge"
        );
        assert_eq!(result.cost, 0.0);
    }

    #[tokio::test]
    async fn test_mismatched_details_fail_after_resolution() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().never();

        let mut rec = recommendation("dc2.large", 1);
        rec.details = ServiceDetails::Cache(CacheDetails::default());

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &rec)
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Invalid service details");
    }

    #[tokio::test]
    async fn test_transport_error_is_wrapped() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit()
            .returning(|_| Err(CommitmentError::Transport("connection refused".to_string())));

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &recommendation("dc2.large", 1))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Failed to purchase: connection refused");
    }

    #[tokio::test]
    async fn test_empty_response_is_not_success() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().returning(|_| Ok(None));

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &recommendation("dc2.large", 1))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "purchase response was empty");
        assert!(result.commitment_id.is_none());
    }

    #[tokio::test]
    async fn test_blank_commitment_id_counts_as_empty() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit()
            .returning(|_| Ok(Some(CommitmentRecord::default())));

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &recommendation("dc2.large", 1))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "purchase response was empty");
    }

    #[tokio::test]
    async fn test_response_pricing_takes_precedence() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().returning(|_| {
            Ok(Some(CommitmentRecord {
                commitment_id: "rn-1".to_string(),
                fixed_price: Some(950.0),
                recurring_charges: vec![],
            }))
        });

        let result = executor(catalog_with(vec![dc2_offering(Some(1000.0))]), api)
            .purchase(&Context::background(), &recommendation("dc2.large", 1))
            .await;
        assert!(result.success);
        assert_eq!(result.cost, 950.0);
    }

    #[tokio::test]
    async fn test_cancelled_context_never_succeeds() {
        let mut catalog = MockOfferingCatalog::new();
        catalog.expect_list_offerings().never();
        let mut api = MockPurchaseApi::new();
        api.expect_submit().never();

        let (ctx, handle) = Context::with_cancel();
        handle.cancel();

        let result = executor(catalog, api)
            .purchase(&ctx, &recommendation("dc2.large", 1))
            .await;
        assert!(!result.success);
        assert_eq!(result.message, "Failed to purchase: operation cancelled");
    }
}
