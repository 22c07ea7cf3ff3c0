use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::context::Context;
use crate::error::{CommitmentError, CommitmentResult};
use crate::provider::{CommitmentRecord, PurchaseApi, PurchaseRequest};

/// Backoff settings for provider calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter so concurrent callers spread out
    pub use_jitter: bool,
}

impl RetryConfig {
    /// Defaults: 3 retries, 500ms initial delay, 10s cap, x2 backoff, jitter on
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_delay(mut self, delay_ms: u64) -> Self {
        self.initial_delay_ms = delay_ms;
        self
    }

    pub fn with_max_delay(mut self, delay_ms: u64) -> Self {
        self.max_delay_ms = delay_ms;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

/// Retry `operation` with exponential backoff while its error is retryable.
///
/// Non-retryable errors return immediately. Cancelling `ctx` during a
/// backoff sleep returns [`CommitmentError::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T>(
    ctx: &Context,
    operation: F,
    config: &RetryConfig,
) -> CommitmentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CommitmentResult<T>>,
{
    retry_when(ctx, operation, config, CommitmentError::is_retryable).await
}

/// Same backoff loop as [`retry_with_backoff`], retrying only errors for
/// which `should_retry` holds.
pub async fn retry_when<F, Fut, T>(
    ctx: &Context,
    mut operation: F,
    config: &RetryConfig,
    should_retry: fn(&CommitmentError) -> bool,
) -> CommitmentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CommitmentResult<T>>,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay_ms;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(retries = attempt, "Operation succeeded after retries");
                }
                return Ok(result);
            }
            Err(e) if !should_retry(&e) => return Err(e),
            Err(e) => {
                attempt += 1;

                if attempt > config.max_retries {
                    warn!(attempts = attempt, error = %e, "Operation failed, retries exhausted");
                    return Err(e);
                }

                let current_delay = if config.use_jitter {
                    apply_jitter(delay)
                } else {
                    delay
                };

                debug!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    delay_ms = current_delay,
                    error = %e,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(CommitmentError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(current_delay)) => {}
                }

                delay =
                    ((delay as f64 * config.backoff_multiplier) as u64).min(config.max_delay_ms);
            }
        }
    }
}

/// Between 50% and 100% of `delay`
fn apply_jitter(delay: u64) -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let random_factor =
        (RandomState::new().hash_one(std::time::SystemTime::now()) % 50) as f64 / 100.0 + 0.5;

    (delay as f64 * random_factor) as u64
}

/// [`PurchaseApi`] decorator that re-sends throttled purchase calls.
///
/// Only errors classified by [`CommitmentError::is_safe_to_resend`] are
/// re-issued. A timeout or dropped reply may follow an order the provider
/// already placed, so those surface to the caller instead.
pub struct RetryingPurchaseApi {
    inner: Arc<dyn PurchaseApi>,
    config: RetryConfig,
    ctx: Context,
}

impl RetryingPurchaseApi {
    pub fn new(inner: Arc<dyn PurchaseApi>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            ctx: Context::background(),
        }
    }

    /// Abort backoff sleeps when `ctx` is cancelled
    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }
}

#[async_trait]
impl PurchaseApi for RetryingPurchaseApi {
    async fn submit(
        &self,
        request: &PurchaseRequest,
    ) -> CommitmentResult<Option<CommitmentRecord>> {
        retry_when(
            &self.ctx,
            || self.inner.submit(request),
            &self.config,
            CommitmentError::is_safe_to_resend,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaymentOption, ServiceType, Term};
    use crate::provider::MockPurchaseApi;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> PurchaseRequest {
        PurchaseRequest {
            offering_id: "off-1".to_string(),
            resource_type: "dc2.large".to_string(),
            quantity: 1,
            service: ServiceType::DataWarehouse,
            account_id: String::new(),
            region: "us-east-1".to_string(),
            term: Term::OneYear,
            payment_option: PaymentOption::AllUpfront,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_transient_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = RetryConfig::new().with_initial_delay(10).without_jitter();
        let result = retry_with_backoff(
            &Context::background(),
            || {
                let counter = counter_clone.clone();
                async move {
                    let count = counter.fetch_add(1, Ordering::SeqCst);
                    if count < 2 {
                        Err(CommitmentError::RateLimited("slow down".into()))
                    } else {
                        Ok("done")
                    }
                }
            },
            &config,
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result: CommitmentResult<()> = retry_with_backoff(
            &Context::background(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CommitmentError::Validation("bad quantity".into()))
                }
            },
            &RetryConfig::new(),
        )
        .await;

        assert!(matches!(result, Err(CommitmentError::Validation(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_exhausted() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let config = RetryConfig::new()
            .with_max_retries(2)
            .with_initial_delay(10)
            .without_jitter();
        let result: CommitmentResult<()> = retry_with_backoff(
            &Context::background(),
            || {
                let counter = counter_clone.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CommitmentError::Transport("request timed out".into()))
                }
            },
            &config,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 3); // 1 initial + 2 retries
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (ctx, handle) = Context::with_cancel();
        let handle = Arc::new(handle);
        let trigger = handle.clone();

        let result: CommitmentResult<()> = retry_with_backoff(
            &ctx,
            || {
                trigger.cancel();
                async { Err(CommitmentError::RateLimited("throttled".into())) }
            },
            &RetryConfig::new().without_jitter(),
        )
        .await;

        assert_eq!(result, Err(CommitmentError::Cancelled));
    }

    #[test]
    fn test_retry_config_builder() {
        let config = RetryConfig::new()
            .with_max_retries(5)
            .with_initial_delay(200)
            .with_max_delay(10000)
            .without_jitter();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.initial_delay_ms, 200);
        assert_eq!(config.max_delay_ms, 10000);
        assert!(!config.use_jitter);
    }

    #[test]
    fn test_apply_jitter() {
        for _ in 0..10 {
            let jittered = apply_jitter(1000);
            assert!((500..=1000).contains(&jittered));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_purchase_api_retries_rate_limits() {
        let mut api = MockPurchaseApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CommitmentError::RateLimited("429".into())));
        api.expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(Some(CommitmentRecord {
                    commitment_id: "rn-1".to_string(),
                    ..Default::default()
                }))
            });

        let retrying = RetryingPurchaseApi::new(Arc::new(api), RetryConfig::new().without_jitter());
        let record = retrying.submit(&request()).await.unwrap().unwrap();
        assert_eq!(record.commitment_id, "rn-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_purchase_api_does_not_resend_after_lost_reply() {
        // The provider places the order, then the reply is lost on the way back.
        let placed = Arc::new(AtomicU32::new(0));
        let placed_clone = placed.clone();
        let mut api = MockPurchaseApi::new();
        api.expect_submit().returning(move |_| {
            let n = placed_clone.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 1 {
                Err(CommitmentError::Transport(
                    "request timed out: operation timed out".into(),
                ))
            } else {
                Ok(Some(CommitmentRecord {
                    commitment_id: format!("order-{n}"),
                    ..Default::default()
                }))
            }
        });

        let retrying = RetryingPurchaseApi::new(Arc::new(api), RetryConfig::default());
        let result = retrying.submit(&request()).await;

        assert!(matches!(result, Err(CommitmentError::Transport(_))));
        assert_eq!(placed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_purchase_api_does_not_resend_server_errors() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit()
            .times(1)
            .returning(|_| Err(CommitmentError::Transport("status 503: unavailable".into())));

        let retrying = RetryingPurchaseApi::new(Arc::new(api), RetryConfig::new().without_jitter());
        assert!(retrying.submit(&request()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_purchase_api_resends_refused_connections() {
        let mut api = MockPurchaseApi::new();
        let mut seq = mockall::Sequence::new();
        api.expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(CommitmentError::Transport("connection failed: refused".into())));
        api.expect_submit()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(None));

        let retrying = RetryingPurchaseApi::new(Arc::new(api), RetryConfig::new().without_jitter());
        assert_eq!(retrying.submit(&request()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retrying_purchase_api_passes_through_empty_response() {
        let mut api = MockPurchaseApi::new();
        api.expect_submit().times(1).returning(|_| Ok(None));

        let retrying = RetryingPurchaseApi::new(Arc::new(api), RetryConfig::new());
        assert_eq!(retrying.submit(&request()).await.unwrap(), None);
    }
}
