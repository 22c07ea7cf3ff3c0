//! Legacy (v1) schema.
//!
//! Service identity is a free-form service code, terms are month counts and
//! service details are keyed by a `kind` tag named after the AWS service that
//! introduced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::CloudProvider;

pub const SERVICE_CODE_COMPUTE: &str = "ec2";
pub const SERVICE_CODE_RELATIONAL_DB: &str = "rds";
pub const SERVICE_CODE_CACHE: &str = "elasticache";
pub const SERVICE_CODE_SEARCH: &str = "opensearch";
pub const SERVICE_CODE_DATA_WAREHOUSE: &str = "redshift";
pub const SERVICE_CODE_SAVINGS_PLANS: &str = "savingsplans";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyPaymentOption {
    #[serde(rename = "All Upfront")]
    AllUpfront,
    #[serde(rename = "Partial Upfront")]
    PartialUpfront,
    #[serde(rename = "No Upfront")]
    NoUpfront,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ec2Details {
    pub instance_family: String,
    pub platform: String,
    pub tenancy: String,
    pub size_flexible: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RdsDetails {
    pub instance_family: String,
    pub engine: String,
    pub engine_edition: Option<String>,
    pub az_config: String,
    pub license_model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElastiCacheDetails {
    pub node_family: String,
    pub engine: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpenSearchDetails {
    pub instance_class: String,
    pub instance_size: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedshiftDetails {
    pub node_family: String,
    pub current_generation: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsPlanDetails {
    pub plan_type: String,
    pub instance_family: Option<String>,
    pub hourly_commitment: f64,
}

/// Legacy detail payload. Unrecognized `kind` tags decode as `Unknown`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LegacyServiceDetails {
    Ec2(Ec2Details),
    Rds(RdsDetails),
    ElastiCache(ElastiCacheDetails),
    OpenSearch(OpenSearchDetails),
    Redshift(RedshiftDetails),
    SavingsPlan(SavingsPlanDetails),
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyRecommendation {
    pub provider: CloudProvider,
    pub service: String,
    pub account: String,
    pub region: String,
    pub instance_type: String,
    pub count: u32,
    pub term_months: u32,
    pub payment_option: LegacyPaymentOption,
    #[serde(default)]
    pub service_details: LegacyServiceDetails,
    pub upfront_cost: f64,
    pub monthly_cost: f64,
    pub estimated_savings: f64,
    pub savings_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyPurchaseResult {
    pub recommendation: LegacyRecommendation,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub reservation_id: String,
    #[serde(default)]
    pub offering_id: String,
    pub actual_cost: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCommitment {
    pub provider: CloudProvider,
    pub account: String,
    pub reservation_id: String,
    pub reservation_type: String,
    pub service: String,
    pub region: String,
    pub instance_type: String,
    pub count: u32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyOfferingDetails {
    pub offering_id: String,
    pub instance_type: String,
    pub term_months: u32,
    pub payment_option: LegacyPaymentOption,
    pub currency: String,
    pub upfront_cost: f64,
    pub monthly_cost: f64,
    pub total_cost: f64,
    pub effective_hourly_rate: f64,
    pub on_demand_hourly_rate: f64,
    pub savings_percentage: f64,
}
