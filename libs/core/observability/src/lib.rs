//! Observability utilities for commitment purchasing.
//!
//! This crate provides:
//! - Prometheus metrics recording and text export
//! - Purchase, inventory and provider call metrics
//!
//! # Example
//!
//! ```rust,ignore
//! use observability::{init_metrics, render_metrics, PurchaseMetrics};
//!
//! init_metrics()?;
//!
//! PurchaseMetrics::record_purchase("aws", "data_warehouse", true, 420);
//! PurchaseMetrics::set_active_commitments("aws", 12);
//!
//! println!("{}", render_metrics());
//! ```

pub mod purchases;

pub use purchases::PurchaseMetrics;

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::info;

static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize the Prometheus metrics recorder.
///
/// Call once at startup. Later calls return the already-installed handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    METRICS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;

        info!("Prometheus metrics recorder initialized");
        register_metric_descriptions();

        Ok(handle)
    })
}

/// Get the metrics handle (must call init_metrics first)
pub fn get_metrics_handle() -> Option<&'static PrometheusHandle> {
    METRICS_HANDLE.get()
}

/// Prometheus text exposition of everything recorded so far
pub fn render_metrics() -> String {
    match get_metrics_handle() {
        Some(handle) => handle.render(),
        None => "# Metrics not initialized\n".to_string(),
    }
}

/// Register metric descriptions for documentation
fn register_metric_descriptions() {
    use metrics::describe_counter;
    use metrics::describe_gauge;
    use metrics::describe_histogram;

    describe_counter!(
        "commitment_purchases_total",
        "Purchase attempts by provider, service and outcome"
    );
    describe_histogram!(
        "commitment_purchase_duration_seconds",
        "Duration of a single purchase attempt in seconds"
    );
    describe_counter!(
        "commitment_purchase_cost_total",
        "Realized cost of successful purchases"
    );
    describe_counter!(
        "commitment_batches_total",
        "Batch purchase runs by provider"
    );
    describe_gauge!(
        "commitment_active_total",
        "Active and payment-pending commitments listed by provider"
    );
    describe_counter!(
        "commitment_provider_errors_total",
        "Provider call failures by provider and operation"
    );
    describe_gauge!(
        "commitment_recommendations_total",
        "Recommendations accepted for purchase by provider"
    );
}
