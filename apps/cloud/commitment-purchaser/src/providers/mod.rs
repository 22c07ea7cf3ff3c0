//! Cloud commitment providers
//!
//! Each adapter binds the commitments engine to one vendor's reservation
//! API: offering catalog, purchase, commitment listing and price lookup.

pub mod aws;
pub mod azure;
pub mod gcp;

use std::sync::Arc;

use async_trait::async_trait;
use domain_commitments::{
    CloudProvider, CommitmentError, CommitmentResult, PriceQuote, PricingLookup, ProviderBindings,
    RecommendationSource, ServiceType, Term,
};
use reqwest::{Response, StatusCode};

pub use aws::AwsCommitmentProvider;
pub use azure::AzureCommitmentProvider;
pub use gcp::GcpCommitmentProvider;

/// Binds one cloud vendor onto the commitments engine
pub trait ProviderAdapter: Send + Sync {
    /// Get the cloud provider type
    fn provider(&self) -> CloudProvider;

    /// Get the provider name
    fn name(&self) -> &'static str;

    /// Check if the provider is configured and ready
    fn is_configured(&self) -> bool;

    /// Service types this adapter can purchase commitments for
    fn supported_services(&self) -> &'static [ServiceType];

    /// Collaborators for `service`, reading recommendations from `recommendations`
    fn bindings(
        &self,
        service: ServiceType,
        recommendations: Arc<dyn RecommendationSource>,
    ) -> CommitmentResult<ProviderBindings>;
}

/// Registry of all commitment providers
pub struct ProviderRegistry {
    providers: Vec<Box<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
        }
    }

    pub fn register(&mut self, provider: Box<dyn ProviderAdapter>) {
        self.providers.push(provider);
    }

    pub fn get_provider(&self, cloud_provider: CloudProvider) -> Option<&dyn ProviderAdapter> {
        self.providers
            .iter()
            .find(|p| p.provider() == cloud_provider)
            .map(|p| p.as_ref())
    }

    pub fn get_configured_providers(&self) -> Vec<&dyn ProviderAdapter> {
        self.providers
            .iter()
            .filter(|p| p.is_configured())
            .map(|p| p.as_ref())
            .collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Pricing lookup for providers with no reservation price API wired in
pub(crate) struct Unpriced(pub(crate) &'static str);

#[async_trait]
impl PricingLookup for Unpriced {
    async fn get_price(&self, _: &str, _: &str, _: Term) -> CommitmentResult<PriceQuote> {
        Err(CommitmentError::NotConfigured(format!(
            "{} commitment pricing lookup",
            self.0
        )))
    }
}

/// Map a transport-level reqwest failure
pub(crate) fn transport_error(err: reqwest::Error) -> CommitmentError {
    if err.is_timeout() {
        CommitmentError::Transport(format!("request timed out: {}", err))
    } else if err.is_connect() {
        CommitmentError::Transport(format!("connection failed: {}", err))
    } else if err.is_decode() {
        CommitmentError::Parse(err.to_string())
    } else {
        CommitmentError::Transport(err.to_string())
    }
}

/// Classify an HTTP status and error body from a provider API
pub(crate) fn status_error(status: StatusCode, body: &str) -> CommitmentError {
    let detail = body.chars().take(512).collect::<String>();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CommitmentError::Auth(format!("status {}: {}", status.as_u16(), detail))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            CommitmentError::RateLimited(format!("status {}: {}", status.as_u16(), detail))
        }
        _ => CommitmentError::Transport(format!("status {}: {}", status.as_u16(), detail)),
    }
}

/// Pass successful responses through, turn everything else into an error
pub(crate) async fn check_status(response: Response) -> CommitmentResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

/// Decode a JSON body, reporting failures as parse errors
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: Response,
) -> CommitmentResult<T> {
    let response = check_status(response).await?;
    response
        .json()
        .await
        .map_err(|e| CommitmentError::Parse(e.to_string()))
}
