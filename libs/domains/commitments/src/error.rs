use thiserror::Error;

/// Result type for commitment operations
pub type CommitmentResult<T> = Result<T, CommitmentError>;

/// Errors that can occur while matching and purchasing commitments
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommitmentError {
    /// Caller input is inconsistent (service/details mismatch, unsupported term, ...)
    #[error("{0}")]
    Validation(String),

    /// No catalog entry matched the requested resource type
    #[error("no offerings found for {resource_type}")]
    NotFound { resource_type: String },

    /// Network or API failure talking to a provider
    #[error("{0}")]
    Transport(String),

    /// Provider accepted the request but returned no usable commitment
    #[error("purchase response was empty")]
    EmptyResponse,

    /// Provider asked us to slow down
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// Credentials were rejected or a token could not be obtained
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Provider response could not be decoded
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// A collaborator is not available for this provider
    #[error("not configured: {0}")]
    NotConfigured(String),

    /// The call context was cancelled before the operation finished
    #[error("operation cancelled")]
    Cancelled,
}

impl CommitmentError {
    pub fn not_found(resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
        }
    }

    /// Whether a retry decorator may re-issue the failed call.
    ///
    /// Only transient transport conditions qualify. Validation, lookup and
    /// empty-response failures are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            CommitmentError::RateLimited(_) => true,
            CommitmentError::Transport(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timed out")
                    || lower.contains("timeout")
                    || lower.contains("connection")
                    || lower.contains("status 5")
                    || lower.contains("status 429")
            }
            _ => false,
        }
    }

    /// Whether a purchase call may be sent again after failing this way.
    ///
    /// Narrower than [`is_retryable`](Self::is_retryable): only throttling
    /// and connections that were never established qualify, since any other
    /// transport failure may hide an order the provider already accepted.
    pub fn is_safe_to_resend(&self) -> bool {
        match self {
            CommitmentError::RateLimited(_) => true,
            CommitmentError::Transport(msg) => msg.starts_with("connection failed"),
            _ => false,
        }
    }
}
