//! Configuration for the commitment purchaser

use core_config::http::HttpConfig;
use core_config::{
    env_bool, env_list, env_optional, env_or_default, env_parse, ConfigError, FromEnv,
};
use domain_commitments::{PaginationPolicy, RetryConfig};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub purchase: PurchaseConfig,
    pub http: HttpConfig,
    pub aws: AwsConfig,
    pub azure: AzureConfig,
    pub gcp: GcpConfig,
}

#[derive(Debug, Clone)]
pub struct PurchaseConfig {
    /// Pause between purchases in a batch
    pub delay_ms: u64,
    /// Re-sends of a throttled or unconnected submit
    pub max_retries: u32,
    pub retry_initial_ms: u64,
    pub pagination: PaginationPolicy,
    /// Resolve and price, never submit
    pub dry_run: bool,
    /// Accounts recommendations are filtered to when no `--accounts` is given
    pub account_ids: Vec<String>,
}

impl PurchaseConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.max_retries)
            .with_initial_delay(self.retry_initial_ms)
    }
}

impl FromEnv for PurchaseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let pagination_raw = env_or_default("INVENTORY_PAGINATION", "best_effort");
        let pagination =
            PaginationPolicy::parse(&pagination_raw).map_err(|e| ConfigError::ParseError {
                key: "INVENTORY_PAGINATION".to_string(),
                details: e.to_string(),
            })?;

        Ok(Self {
            delay_ms: env_parse("PURCHASE_DELAY_MS", 1000)?,
            max_retries: env_parse("PURCHASE_MAX_RETRIES", 3)?,
            retry_initial_ms: env_parse("PURCHASE_RETRY_INITIAL_MS", 500)?,
            pagination,
            dry_run: env_bool("DRY_RUN", false),
            account_ids: env_list("PURCHASE_ACCOUNT_IDS"),
        })
    }
}

/// AWS settings; credentials come from the SDK's default chain
#[derive(Debug, Clone, Default)]
pub struct AwsConfig {
    /// Region override; the SDK chain decides when unset
    pub region: Option<String>,
    /// Account stamped on listed reserved nodes
    pub account_id: Option<String>,

    pub enabled: bool,
}

impl FromEnv for AwsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            region: env_optional("AWS_REGION"),
            account_id: env_optional("AWS_ACCOUNT_ID"),
            enabled: env_bool("AWS_ENABLED", true),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct AzureConfig {
    /// Azure tenant ID
    pub tenant_id: Option<String>,
    /// Azure client ID
    pub client_id: Option<String>,
    /// Azure client secret
    pub client_secret: Option<String>,
    /// Subscription reservations are billed to
    pub subscription_id: Option<String>,
    /// Region used when a request does not name one
    pub region: String,

    pub enabled: bool,
}

impl AzureConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled
            && self.tenant_id.is_some()
            && self.client_id.is_some()
            && self.client_secret.is_some()
            && self.subscription_id.is_some()
    }
}

impl FromEnv for AzureConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            tenant_id: env_optional("AZURE_TENANT_ID"),
            client_id: env_optional("AZURE_CLIENT_ID"),
            client_secret: env_optional("AZURE_CLIENT_SECRET"),
            subscription_id: env_optional("AZURE_SUBSCRIPTION_ID"),
            region: env_or_default("AZURE_REGION", "eastus"),
            enabled: env_bool("AZURE_ENABLED", true),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct GcpConfig {
    /// GCP project ID
    pub project_id: Option<String>,
    pub region: String,
    /// Zone whose machine types form the catalog; defaults to `<region>-a`
    pub zone: Option<String>,
    /// Static bearer token; the metadata server is used when unset
    pub access_token: Option<String>,

    pub enabled: bool,
}

impl GcpConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && self.project_id.is_some()
    }

    pub fn catalog_zone(&self) -> String {
        self.zone
            .clone()
            .unwrap_or_else(|| format!("{}-a", self.region))
    }
}

impl FromEnv for GcpConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: env_optional("GCP_PROJECT_ID"),
            region: env_or_default("GCP_REGION", "us-central1"),
            zone: env_optional("GCP_ZONE"),
            access_token: env_optional("GCP_ACCESS_TOKEN"),
            enabled: env_bool("GCP_ENABLED", true),
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            purchase: PurchaseConfig::from_env()?,
            http: HttpConfig::from_env()?,
            aws: AwsConfig::from_env()?,
            azure: AzureConfig::from_env()?,
            gcp: GcpConfig::from_env()?,
        })
    }
}
