//! Legacy (v1) ⇄ current (v2) conversions.
//!
//! Pure functions only. Every service/details combination maps both ways
//! without loss; the one lossy edge is the term, which only exists as
//! 12 or 36 months on the legacy side and is rejected otherwise.

use std::str::FromStr;

use crate::error::CommitmentResult;
use crate::models::{
    CacheDetails, Commitment, CommitmentState, CommitmentType, ComputeDetails,
    DataWarehouseDetails, DatabaseDetails, OfferingDetails, PaymentOption, PurchaseResult,
    Recommendation, SavingsPlanDetails, SearchDetails, ServiceDetails, ServiceType, Term,
};

use super::legacy::{
    self, Ec2Details, ElastiCacheDetails, LegacyCommitment, LegacyOfferingDetails,
    LegacyPaymentOption, LegacyPurchaseResult, LegacyRecommendation, LegacyServiceDetails,
    OpenSearchDetails, RdsDetails, RedshiftDetails,
};

/// Service type assumed for unrecognized legacy service codes
pub const DEFAULT_SERVICE_TYPE: ServiceType = ServiceType::Compute;

// ============================================================================
// Service type
// ============================================================================

pub fn service_code(service: ServiceType) -> &'static str {
    match service {
        ServiceType::Compute => legacy::SERVICE_CODE_COMPUTE,
        ServiceType::RelationalDb => legacy::SERVICE_CODE_RELATIONAL_DB,
        ServiceType::Cache => legacy::SERVICE_CODE_CACHE,
        ServiceType::Search => legacy::SERVICE_CODE_SEARCH,
        ServiceType::DataWarehouse => legacy::SERVICE_CODE_DATA_WAREHOUSE,
        ServiceType::SavingsPlans => legacy::SERVICE_CODE_SAVINGS_PLANS,
    }
}

pub fn service_from_code(code: &str) -> ServiceType {
    match code.trim().to_ascii_lowercase().as_str() {
        legacy::SERVICE_CODE_COMPUTE => ServiceType::Compute,
        legacy::SERVICE_CODE_RELATIONAL_DB => ServiceType::RelationalDb,
        legacy::SERVICE_CODE_CACHE => ServiceType::Cache,
        legacy::SERVICE_CODE_SEARCH | "elasticsearch" => ServiceType::Search,
        legacy::SERVICE_CODE_DATA_WAREHOUSE => ServiceType::DataWarehouse,
        legacy::SERVICE_CODE_SAVINGS_PLANS => ServiceType::SavingsPlans,
        _ => DEFAULT_SERVICE_TYPE,
    }
}

// ============================================================================
// Payment option
// ============================================================================

impl From<PaymentOption> for LegacyPaymentOption {
    fn from(option: PaymentOption) -> Self {
        match option {
            PaymentOption::AllUpfront => LegacyPaymentOption::AllUpfront,
            PaymentOption::PartialUpfront => LegacyPaymentOption::PartialUpfront,
            PaymentOption::NoUpfront => LegacyPaymentOption::NoUpfront,
        }
    }
}

impl From<LegacyPaymentOption> for PaymentOption {
    fn from(option: LegacyPaymentOption) -> Self {
        match option {
            LegacyPaymentOption::AllUpfront => PaymentOption::AllUpfront,
            LegacyPaymentOption::PartialUpfront => PaymentOption::PartialUpfront,
            LegacyPaymentOption::NoUpfront => PaymentOption::NoUpfront,
        }
    }
}

// ============================================================================
// Service details
// ============================================================================

pub fn details_to_internal(details: &ServiceDetails) -> LegacyServiceDetails {
    match details {
        ServiceDetails::Compute(d) => LegacyServiceDetails::Ec2(Ec2Details {
            instance_family: d.family.clone(),
            platform: d.platform.clone(),
            tenancy: d.tenancy.clone(),
            size_flexible: d.size_flex_eligible,
        }),
        ServiceDetails::RelationalDb(d) => LegacyServiceDetails::Rds(RdsDetails {
            instance_family: d.family.clone(),
            engine: d.engine.clone(),
            engine_edition: d.edition.clone(),
            az_config: d.deployment_option.clone(),
            license_model: d.license_model.clone(),
        }),
        ServiceDetails::Cache(d) => LegacyServiceDetails::ElastiCache(ElastiCacheDetails {
            node_family: d.family.clone(),
            engine: d.engine.clone(),
        }),
        ServiceDetails::Search(d) => LegacyServiceDetails::OpenSearch(OpenSearchDetails {
            instance_class: d.instance_class.clone(),
            instance_size: d.instance_size.clone(),
        }),
        ServiceDetails::DataWarehouse(d) => LegacyServiceDetails::Redshift(RedshiftDetails {
            node_family: d.family.clone(),
            current_generation: d.current_generation,
        }),
        ServiceDetails::SavingsPlans(d) => {
            LegacyServiceDetails::SavingsPlan(legacy::SavingsPlanDetails {
                plan_type: d.plan_type.clone(),
                instance_family: d.instance_family.clone(),
                hourly_commitment: d.hourly_commitment,
            })
        }
        ServiceDetails::None => LegacyServiceDetails::Unknown,
    }
}

pub fn details_from_internal(details: &LegacyServiceDetails) -> ServiceDetails {
    match details {
        LegacyServiceDetails::Ec2(d) => ServiceDetails::Compute(ComputeDetails {
            family: d.instance_family.clone(),
            platform: d.platform.clone(),
            tenancy: d.tenancy.clone(),
            size_flex_eligible: d.size_flexible,
        }),
        LegacyServiceDetails::Rds(d) => ServiceDetails::RelationalDb(DatabaseDetails {
            family: d.instance_family.clone(),
            engine: d.engine.clone(),
            edition: d.engine_edition.clone(),
            deployment_option: d.az_config.clone(),
            license_model: d.license_model.clone(),
        }),
        LegacyServiceDetails::ElastiCache(d) => ServiceDetails::Cache(CacheDetails {
            family: d.node_family.clone(),
            engine: d.engine.clone(),
        }),
        LegacyServiceDetails::OpenSearch(d) => ServiceDetails::Search(SearchDetails {
            instance_class: d.instance_class.clone(),
            instance_size: d.instance_size.clone(),
        }),
        LegacyServiceDetails::Redshift(d) => ServiceDetails::DataWarehouse(DataWarehouseDetails {
            family: d.node_family.clone(),
            current_generation: d.current_generation,
        }),
        LegacyServiceDetails::SavingsPlan(d) => ServiceDetails::SavingsPlans(SavingsPlanDetails {
            plan_type: d.plan_type.clone(),
            instance_family: d.instance_family.clone(),
            hourly_commitment: d.hourly_commitment,
        }),
        LegacyServiceDetails::Unknown => ServiceDetails::None,
    }
}

// ============================================================================
// Recommendation
// ============================================================================

pub fn to_internal(rec: &Recommendation) -> LegacyRecommendation {
    LegacyRecommendation {
        provider: rec.provider,
        service: service_code(rec.service).to_string(),
        account: rec.account_id.clone(),
        region: rec.region.clone(),
        instance_type: rec.resource_type.clone(),
        count: rec.count,
        term_months: rec.term.months(),
        payment_option: rec.payment_option.into(),
        service_details: details_to_internal(&rec.details),
        upfront_cost: rec.upfront_cost,
        monthly_cost: rec.recurring_monthly_cost,
        estimated_savings: rec.estimated_monthly_savings,
        savings_percentage: rec.estimated_savings_percent,
    }
}

pub fn from_internal(legacy: &LegacyRecommendation) -> CommitmentResult<Recommendation> {
    Ok(Recommendation {
        provider: legacy.provider,
        service: service_from_code(&legacy.service),
        account_id: legacy.account.clone(),
        region: legacy.region.clone(),
        resource_type: legacy.instance_type.clone(),
        count: legacy.count,
        term: Term::from_months(legacy.term_months)?,
        payment_option: legacy.payment_option.into(),
        details: details_from_internal(&legacy.service_details),
        upfront_cost: legacy.upfront_cost,
        recurring_monthly_cost: legacy.monthly_cost,
        estimated_monthly_savings: legacy.estimated_savings,
        estimated_savings_percent: legacy.savings_percentage,
    })
}

impl From<&Recommendation> for LegacyRecommendation {
    fn from(rec: &Recommendation) -> Self {
        to_internal(rec)
    }
}

impl TryFrom<&LegacyRecommendation> for Recommendation {
    type Error = crate::error::CommitmentError;

    fn try_from(legacy: &LegacyRecommendation) -> Result<Self, Self::Error> {
        from_internal(legacy)
    }
}

// ============================================================================
// Purchase result
// ============================================================================

pub fn result_to_internal(result: &PurchaseResult) -> LegacyPurchaseResult {
    LegacyPurchaseResult {
        recommendation: to_internal(&result.recommendation),
        success: result.success,
        message: result.message.clone(),
        reservation_id: result.commitment_id.clone().unwrap_or_default(),
        offering_id: result.offering_id.clone().unwrap_or_default(),
        actual_cost: result.cost,
        timestamp: result.timestamp,
    }
}

pub fn result_from_internal(legacy: &LegacyPurchaseResult) -> CommitmentResult<PurchaseResult> {
    Ok(PurchaseResult {
        recommendation: from_internal(&legacy.recommendation)?,
        success: legacy.success,
        message: legacy.message.clone(),
        commitment_id: non_empty(&legacy.reservation_id),
        offering_id: non_empty(&legacy.offering_id),
        cost: legacy.actual_cost,
        timestamp: legacy.timestamp,
    })
}

// ============================================================================
// Commitment
// ============================================================================

pub fn commitment_to_internal(commitment: &Commitment) -> LegacyCommitment {
    LegacyCommitment {
        provider: commitment.provider,
        account: commitment.account_id.clone(),
        reservation_id: commitment.commitment_id.clone(),
        reservation_type: commitment.commitment_type.to_string(),
        service: service_code(commitment.service).to_string(),
        region: commitment.region.clone(),
        instance_type: commitment.resource_type.clone(),
        count: commitment.count,
        start_time: commitment.start_date,
        end_time: commitment.end_date,
        state: commitment.state.to_string(),
    }
}

pub fn commitment_from_internal(legacy: &LegacyCommitment) -> Commitment {
    Commitment {
        provider: legacy.provider,
        account_id: legacy.account.clone(),
        commitment_id: legacy.reservation_id.clone(),
        commitment_type: CommitmentType::from_str(&legacy.reservation_type).unwrap_or_default(),
        service: service_from_code(&legacy.service),
        region: legacy.region.clone(),
        resource_type: legacy.instance_type.clone(),
        count: legacy.count,
        start_date: legacy.start_time,
        end_date: legacy.end_time,
        state: CommitmentState::from_provider_state(&legacy.state),
    }
}

// ============================================================================
// Offering details
// ============================================================================

pub fn offering_details_to_internal(details: &OfferingDetails) -> LegacyOfferingDetails {
    LegacyOfferingDetails {
        offering_id: details.offering_id.clone(),
        instance_type: details.resource_type.clone(),
        term_months: details.term.months(),
        payment_option: details.payment_option.into(),
        currency: details.currency.clone(),
        upfront_cost: details.upfront_cost,
        monthly_cost: details.recurring_monthly_cost,
        total_cost: details.total_cost,
        effective_hourly_rate: details.effective_hourly_rate,
        on_demand_hourly_rate: details.on_demand_hourly_rate,
        savings_percentage: details.savings_percent,
    }
}

pub fn offering_details_from_internal(
    legacy: &LegacyOfferingDetails,
) -> CommitmentResult<OfferingDetails> {
    Ok(OfferingDetails {
        offering_id: legacy.offering_id.clone(),
        resource_type: legacy.instance_type.clone(),
        term: Term::from_months(legacy.term_months)?,
        payment_option: legacy.payment_option.into(),
        currency: legacy.currency.clone(),
        upfront_cost: legacy.upfront_cost,
        recurring_monthly_cost: legacy.monthly_cost,
        total_cost: legacy.total_cost,
        effective_hourly_rate: legacy.effective_hourly_rate,
        on_demand_hourly_rate: legacy.on_demand_hourly_rate,
        savings_percent: legacy.savings_percentage,
    })
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CommitmentError;
    use crate::models::CloudProvider;
    use chrono::{TimeZone, Utc};

    fn base_recommendation(service: ServiceType, details: ServiceDetails) -> Recommendation {
        Recommendation {
            provider: CloudProvider::Aws,
            service,
            account_id: "123456789012".to_string(),
            region: "eu-west-1".to_string(),
            resource_type: "m5.large".to_string(),
            count: 4,
            term: Term::ThreeYear,
            payment_option: PaymentOption::PartialUpfront,
            details,
            upfront_cost: 812.5,
            recurring_monthly_cost: 22.6,
            estimated_monthly_savings: 41.0,
            estimated_savings_percent: 38.5,
        }
    }

    fn all_combinations() -> Vec<Recommendation> {
        vec![
            base_recommendation(
                ServiceType::Compute,
                ServiceDetails::Compute(ComputeDetails {
                    family: "m5".into(),
                    platform: "Linux/UNIX".into(),
                    tenancy: "default".into(),
                    size_flex_eligible: true,
                }),
            ),
            base_recommendation(
                ServiceType::RelationalDb,
                ServiceDetails::RelationalDb(DatabaseDetails {
                    family: "db.r6g".into(),
                    engine: "postgresql".into(),
                    edition: None,
                    deployment_option: "multi-az".into(),
                    license_model: "no-license".into(),
                }),
            ),
            base_recommendation(
                ServiceType::Cache,
                ServiceDetails::Cache(CacheDetails {
                    family: "cache.r6g".into(),
                    engine: "redis".into(),
                }),
            ),
            base_recommendation(
                ServiceType::Search,
                ServiceDetails::Search(SearchDetails {
                    instance_class: "r6g".into(),
                    instance_size: "large".into(),
                }),
            ),
            base_recommendation(
                ServiceType::DataWarehouse,
                ServiceDetails::DataWarehouse(DataWarehouseDetails {
                    family: "ra3".into(),
                    current_generation: true,
                }),
            ),
            base_recommendation(
                ServiceType::SavingsPlans,
                ServiceDetails::SavingsPlans(SavingsPlanDetails {
                    plan_type: "Compute".into(),
                    instance_family: None,
                    hourly_commitment: 2.75,
                }),
            ),
        ]
    }

    #[test]
    fn test_recommendation_roundtrip_for_every_service() {
        for rec in all_combinations() {
            for term in [Term::OneYear, Term::ThreeYear] {
                let rec = Recommendation { term, ..rec.clone() };
                let back = from_internal(&to_internal(&rec)).unwrap();
                assert_eq!(back, rec, "roundtrip changed {:?}", rec.service);
            }
        }
    }

    #[test]
    fn test_term_maps_to_months() {
        let mut rec = all_combinations().remove(0);
        rec.term = Term::OneYear;
        assert_eq!(to_internal(&rec).term_months, 12);
        rec.term = Term::ThreeYear;
        assert_eq!(to_internal(&rec).term_months, 36);
    }

    #[test]
    fn test_unsupported_month_count_is_rejected() {
        let mut legacy = to_internal(&all_combinations().remove(0));
        legacy.term_months = 24;
        assert!(matches!(
            from_internal(&legacy),
            Err(CommitmentError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_service_code_maps_to_default() {
        let mut legacy = to_internal(&all_combinations().remove(2));
        legacy.service = "dynamodb".to_string();
        let rec = from_internal(&legacy).unwrap();
        assert_eq!(rec.service, DEFAULT_SERVICE_TYPE);
        // the payload keeps its own identity
        assert!(matches!(rec.details, ServiceDetails::Cache(_)));
    }

    #[test]
    fn test_service_codes_are_case_insensitive() {
        assert_eq!(service_from_code("Redshift"), ServiceType::DataWarehouse);
        assert_eq!(service_from_code(" RDS "), ServiceType::RelationalDb);
        assert_eq!(service_from_code("elasticsearch"), ServiceType::Search);
    }

    #[test]
    fn test_unknown_legacy_details_become_sentinel() {
        let json = serde_json::json!({
            "provider": "aws",
            "service": "ec2",
            "account": "1",
            "region": "us-east-1",
            "instance_type": "t3.micro",
            "count": 1,
            "term_months": 12,
            "payment_option": "No Upfront",
            "service_details": { "kind": "dynamodb", "capacity_units": 100 },
            "upfront_cost": 0.0,
            "monthly_cost": 5.0,
            "estimated_savings": 1.0,
            "savings_percentage": 10.0
        });
        let legacy: LegacyRecommendation = serde_json::from_value(json).unwrap();
        assert_eq!(legacy.service_details, LegacyServiceDetails::Unknown);

        let rec = from_internal(&legacy).unwrap();
        assert_eq!(rec.details, ServiceDetails::None);
        assert_eq!(rec.payment_option, PaymentOption::NoUpfront);
    }

    #[test]
    fn test_sentinel_survives_roundtrip() {
        let rec = base_recommendation(ServiceType::Compute, ServiceDetails::None);
        let back = from_internal(&to_internal(&rec)).unwrap();
        assert_eq!(back.details, ServiceDetails::None);
    }

    #[test]
    fn test_purchase_result_roundtrip() {
        let rec = all_combinations().remove(4);
        let ok = PurchaseResult::succeeded(
            rec.clone(),
            "rn-123".into(),
            "off-9".into(),
            1000.0,
            "Successfully purchased 4 nodes of m5.large".into(),
        );
        assert_eq!(result_from_internal(&result_to_internal(&ok)).unwrap(), ok);

        let failed = PurchaseResult::failed(rec, "Invalid service type");
        let legacy = result_to_internal(&failed);
        assert!(legacy.reservation_id.is_empty());
        assert_eq!(result_from_internal(&legacy).unwrap(), failed);
    }

    #[test]
    fn test_commitment_roundtrip() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        for state in [
            CommitmentState::Active,
            CommitmentState::PaymentPending,
            CommitmentState::Expired,
            CommitmentState::Other,
        ] {
            let commitment = Commitment {
                provider: CloudProvider::Azure,
                account_id: "sub-1".into(),
                commitment_id: "res-1".into(),
                commitment_type: CommitmentType::ReservedCapacity,
                service: ServiceType::RelationalDb,
                region: "westeurope".into(),
                resource_type: "SQL_GP_Gen5_8".into(),
                count: 2,
                start_date: start,
                end_date: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
                state,
            };
            let back = commitment_from_internal(&commitment_to_internal(&commitment));
            assert_eq!(back, commitment);
        }
    }

    #[test]
    fn test_offering_details_roundtrip() {
        let details = OfferingDetails {
            offering_id: "off-1".into(),
            resource_type: "dc2.large".into(),
            term: Term::OneYear,
            payment_option: PaymentOption::AllUpfront,
            currency: "USD".into(),
            upfront_cost: 1752.0,
            recurring_monthly_cost: 0.0,
            total_cost: 1752.0,
            effective_hourly_rate: 0.2,
            on_demand_hourly_rate: 0.25,
            savings_percent: 20.0,
        };
        let back = offering_details_from_internal(&offering_details_to_internal(&details)).unwrap();
        assert_eq!(back, details);
    }
}
