use crate::{env_parse, ConfigError, FromEnv};
use std::time::Duration;

/// Outbound HTTP client settings shared by provider adapters
#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl FromEnv for HttpConfig {
    /// Reads from environment variables with sensible defaults:
    /// - HTTP_TIMEOUT_SECS: defaults to 30
    fn from_env() -> Result<Self, ConfigError> {
        let timeout_secs = env_parse("HTTP_TIMEOUT_SECS", 30u64)?;
        if timeout_secs == 0 {
            return Err(ConfigError::ParseError {
                key: "HTTP_TIMEOUT_SECS".to_string(),
                details: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            timeout_secs,
            ..Self::default()
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: concat!("commitment-purchaser/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}
