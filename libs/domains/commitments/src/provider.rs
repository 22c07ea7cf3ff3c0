use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CommitmentResult;
use crate::models::{
    CloudProvider, CommitmentType, Offering, PaymentOption, PriceQuote, Recommendation,
    RecommendationParams, RecurringCharge, ServiceType, Term,
};

/// Narrowing hints passed to an offering catalog.
///
/// Adapters may apply them server-side; the resolver re-checks every
/// candidate regardless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OfferingFilter {
    pub resource_type: Option<String>,
    pub region: Option<String>,
    pub term: Option<Term>,
    pub payment_option: Option<PaymentOption>,
    /// Requested page size; adapters cap it to their provider maximum
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferingPage {
    pub offerings: Vec<Offering>,
    pub next_page_token: Option<String>,
}

/// Provider offering catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OfferingCatalog: Send + Sync {
    async fn list_offerings(
        &self,
        filter: &OfferingFilter,
        page_token: Option<String>,
    ) -> CommitmentResult<OfferingPage>;
}

/// Everything a provider needs to place one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub offering_id: String,
    pub resource_type: String,
    pub quantity: u32,
    pub service: ServiceType,
    pub account_id: String,
    pub region: String,
    pub term: Term,
    pub payment_option: PaymentOption,
}

/// Commitment returned by a successful provider purchase call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub commitment_id: String,
    pub fixed_price: Option<f64>,
    #[serde(default)]
    pub recurring_charges: Vec<RecurringCharge>,
}

/// Provider purchase capability.
///
/// `Ok(None)` means the provider accepted the call but returned no
/// commitment object.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PurchaseApi: Send + Sync {
    async fn submit(&self, request: &PurchaseRequest) -> CommitmentResult<Option<CommitmentRecord>>;
}

/// Commitment as listed by a provider, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCommitment {
    pub commitment_id: String,
    pub commitment_type: CommitmentType,
    pub service: ServiceType,
    pub account_id: String,
    pub region: String,
    pub resource_type: String,
    pub count: u32,
    pub start_date: DateTime<Utc>,
    pub duration_seconds: i64,
    pub state: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitmentPage {
    pub commitments: Vec<ProviderCommitment>,
    pub next_page_token: Option<String>,
}

/// Provider commitment listing
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommitmentLister: Send + Sync {
    fn provider(&self) -> CloudProvider;

    async fn list_commitments(
        &self,
        page_token: Option<String>,
    ) -> CommitmentResult<CommitmentPage>;
}

/// Opaque pricing lookup
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricingLookup: Send + Sync {
    async fn get_price(
        &self,
        resource_type: &str,
        region: &str,
        term: Term,
    ) -> CommitmentResult<PriceQuote>;
}

/// Upstream recommendation producer
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn fetch_recommendations(
        &self,
        params: &RecommendationParams,
    ) -> CommitmentResult<Vec<Recommendation>>;
}

/// Single-use bearer token fetch for REST purchase calls
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> CommitmentResult<String>;
}
