use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use validator::Validate;

use crate::error::{CommitmentError, CommitmentResult};

/// Seconds in a 365-day commitment year
pub const ONE_YEAR_SECONDS: i64 = 31_536_000;

/// Seconds in a three-year commitment (3 x 365 days)
pub const THREE_YEAR_SECONDS: i64 = 94_608_000;

/// Cloud provider enumeration
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CloudProvider {
    #[default]
    Aws,
    Azure,
    Gcp,
}

/// Service category a commitment applies to
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ServiceType {
    #[default]
    Compute,
    RelationalDb,
    Cache,
    Search,
    DataWarehouse,
    SavingsPlans,
}

impl ServiceType {
    /// Noun used when reporting purchased quantities
    pub fn unit_noun(&self) -> &'static str {
        match self {
            ServiceType::Compute | ServiceType::RelationalDb | ServiceType::Search => "instances",
            ServiceType::Cache | ServiceType::DataWarehouse => "nodes",
            ServiceType::SavingsPlans => "plans",
        }
    }
}

/// Commitment term category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum Term {
    #[serde(rename = "1yr")]
    #[strum(serialize = "1yr")]
    OneYear,
    #[serde(rename = "3yr")]
    #[strum(serialize = "3yr")]
    ThreeYear,
}

impl Term {
    pub const fn months(self) -> u32 {
        match self {
            Term::OneYear => 12,
            Term::ThreeYear => 36,
        }
    }

    pub const fn seconds(self) -> i64 {
        match self {
            Term::OneYear => ONE_YEAR_SECONDS,
            Term::ThreeYear => THREE_YEAR_SECONDS,
        }
    }

    /// Only 12 and 36 months are representable; everything else is rejected.
    pub fn from_months(months: u32) -> CommitmentResult<Self> {
        match months {
            12 => Ok(Term::OneYear),
            36 => Ok(Term::ThreeYear),
            other => Err(CommitmentError::Validation(format!(
                "unsupported term of {} months (expected 12 or 36)",
                other
            ))),
        }
    }
}

/// Upfront payment structure of a commitment
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    Default,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PaymentOption {
    #[default]
    AllUpfront,
    PartialUpfront,
    NoUpfront,
}

/// Compute reservation details (EC2, Azure VMs, GCE)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputeDetails {
    pub family: String,
    pub platform: String,
    pub tenancy: String,
    #[serde(default)]
    pub size_flex_eligible: bool,
}

/// Managed relational database reservation details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseDetails {
    pub family: String,
    pub engine: String,
    pub edition: Option<String>,
    pub deployment_option: String,
    pub license_model: String,
}

/// In-memory cache reservation details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDetails {
    pub family: String,
    pub engine: String,
}

/// Search cluster reservation details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchDetails {
    pub instance_class: String,
    pub instance_size: String,
}

/// Data warehouse node reservation details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataWarehouseDetails {
    pub family: String,
    #[serde(default)]
    pub current_generation: bool,
}

/// Savings plan commitment details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavingsPlanDetails {
    pub plan_type: String,
    pub instance_family: Option<String>,
    pub hourly_commitment: f64,
}

/// Service-specific recommendation payload, tagged by service type.
///
/// `None` is the explicit "no details" sentinel and never agrees with any
/// service type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "service", rename_all = "snake_case")]
pub enum ServiceDetails {
    Compute(ComputeDetails),
    RelationalDb(DatabaseDetails),
    Cache(CacheDetails),
    Search(SearchDetails),
    DataWarehouse(DataWarehouseDetails),
    SavingsPlans(SavingsPlanDetails),
    #[default]
    None,
}

impl ServiceDetails {
    pub fn service_type(&self) -> Option<ServiceType> {
        match self {
            ServiceDetails::Compute(_) => Some(ServiceType::Compute),
            ServiceDetails::RelationalDb(_) => Some(ServiceType::RelationalDb),
            ServiceDetails::Cache(_) => Some(ServiceType::Cache),
            ServiceDetails::Search(_) => Some(ServiceType::Search),
            ServiceDetails::DataWarehouse(_) => Some(ServiceType::DataWarehouse),
            ServiceDetails::SavingsPlans(_) => Some(ServiceType::SavingsPlans),
            ServiceDetails::None => None,
        }
    }

    pub fn agrees_with(&self, service: ServiceType) -> bool {
        self.service_type() == Some(service)
    }
}

/// A purchase recommendation in the current provider-neutral schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Recommendation {
    pub provider: CloudProvider,
    pub service: ServiceType,
    #[serde(default)]
    pub account_id: String,
    #[validate(length(min = 1))]
    pub region: String,
    #[validate(length(min = 1))]
    pub resource_type: String,
    #[validate(range(min = 1))]
    pub count: u32,
    pub term: Term,
    pub payment_option: PaymentOption,
    #[serde(default)]
    pub details: ServiceDetails,
    #[serde(default)]
    pub upfront_cost: f64,
    #[serde(default)]
    pub recurring_monthly_cost: f64,
    #[serde(default)]
    pub estimated_monthly_savings: f64,
    #[serde(default)]
    pub estimated_savings_percent: f64,
}

impl Recommendation {
    /// Check field constraints and service/details agreement
    pub fn check(&self) -> CommitmentResult<()> {
        self.validate()
            .map_err(|e| CommitmentError::Validation(e.to_string()))?;

        if !self.details.agrees_with(self.service) {
            return Err(CommitmentError::Validation(format!(
                "details payload {:?} does not match service type {}",
                self.details.service_type(),
                self.service
            )));
        }

        Ok(())
    }
}

/// Commercial structure of a catalog offering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OfferingClass {
    #[default]
    Regular,
    Upgradable,
    #[serde(other)]
    Other,
}

impl OfferingClass {
    pub fn from_provider(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "regular" | "standard" => OfferingClass::Regular,
            "upgradable" => OfferingClass::Upgradable,
            _ => OfferingClass::Other,
        }
    }

    /// Classes the resolver may pick
    pub fn is_resolvable(&self) -> bool {
        matches!(self, OfferingClass::Regular | OfferingClass::Upgradable)
    }
}

/// Billing frequency of a recurring charge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ChargeFrequency {
    Hourly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringCharge {
    pub amount: f64,
    pub frequency: ChargeFrequency,
}

/// A purchasable catalog entry as returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub offering_id: String,
    pub resource_type: String,
    /// Duration in seconds; offerings without one never match
    pub duration_seconds: Option<i64>,
    pub offering_class: OfferingClass,
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub usage_price: f64,
    pub currency: String,
    #[serde(default)]
    pub recurring_charges: Vec<RecurringCharge>,
}

/// Outcome of a single purchase attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseResult {
    pub recommendation: Recommendation,
    pub success: bool,
    pub message: String,
    pub commitment_id: Option<String>,
    pub offering_id: Option<String>,
    pub cost: f64,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseResult {
    pub fn succeeded(
        recommendation: Recommendation,
        commitment_id: String,
        offering_id: String,
        cost: f64,
        message: String,
    ) -> Self {
        Self {
            recommendation,
            success: true,
            message,
            commitment_id: Some(commitment_id),
            offering_id: Some(offering_id),
            cost,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(recommendation: Recommendation, message: impl Into<String>) -> Self {
        Self {
            recommendation,
            success: false,
            message: message.into(),
            commitment_id: None,
            offering_id: None,
            cost: 0.0,
            timestamp: Utc::now(),
        }
    }
}

/// Kind of an existing commitment
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommitmentType {
    #[default]
    ReservedInstance,
    ReservedCapacity,
    SavingsPlan,
}

/// Normalized lifecycle state of an existing commitment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum CommitmentState {
    Active,
    PaymentPending,
    Expired,
    Other,
}

impl CommitmentState {
    /// Map provider state strings onto the shared lifecycle.
    ///
    /// Covers AWS (`active`, `payment-pending`, `retired`), Azure
    /// (`Succeeded`, `PendingBilling`, `Expired`) and GCP (`ACTIVE`,
    /// `NOT_YET_ACTIVE`, `EXPIRED`) spellings.
    pub fn from_provider_state(state: &str) -> Self {
        let normalized = state.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "active" | "succeeded" => CommitmentState::Active,
            "payment-pending" | "pending-payment" | "pendingbilling" | "pending-billing"
            | "not-yet-active" => CommitmentState::PaymentPending,
            "expired" | "retired" => CommitmentState::Expired,
            _ => CommitmentState::Other,
        }
    }

    /// Only active and payment-pending commitments are listed by default
    pub fn is_surfaced(&self) -> bool {
        matches!(self, CommitmentState::Active | CommitmentState::PaymentPending)
    }
}

/// An existing reservation held by an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commitment {
    pub provider: CloudProvider,
    pub account_id: String,
    pub commitment_id: String,
    pub commitment_type: CommitmentType,
    pub service: ServiceType,
    pub region: String,
    pub resource_type: String,
    pub count: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub state: CommitmentState,
}

/// Resolved pricing view of an offering for a given recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferingDetails {
    pub offering_id: String,
    pub resource_type: String,
    pub term: Term,
    pub payment_option: PaymentOption,
    pub currency: String,
    pub upfront_cost: f64,
    pub recurring_monthly_cost: f64,
    pub total_cost: f64,
    pub effective_hourly_rate: f64,
    pub on_demand_hourly_rate: f64,
    pub savings_percent: f64,
}

/// Rates returned by a pricing lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// On-demand hourly rate for one unit
    pub on_demand_rate: f64,
    /// Effective reserved hourly rate for one unit
    pub reserved_rate: f64,
    pub currency: String,
}

/// Filters applied when asking a source for recommendations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationParams {
    pub service: Option<ServiceType>,
    pub region: Option<String>,
    pub term: Option<Term>,
    pub payment_option: Option<PaymentOption>,
    #[serde(default)]
    pub account_ids: Vec<String>,
    pub min_monthly_savings: Option<f64>,
}

impl RecommendationParams {
    pub fn accepts(&self, rec: &Recommendation) -> bool {
        self.service.is_none_or(|s| s == rec.service)
            && self.region.as_deref().is_none_or(|r| r == rec.region)
            && self.term.is_none_or(|t| t == rec.term)
            && self.payment_option.is_none_or(|p| p == rec.payment_option)
            && (self.account_ids.is_empty() || self.account_ids.contains(&rec.account_id))
            && self
                .min_monthly_savings
                .is_none_or(|min| rec.estimated_monthly_savings >= min)
    }
}
