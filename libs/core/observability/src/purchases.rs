//! Purchase and inventory metrics.

use metrics::{counter, gauge, histogram};

/// Commitment purchase metrics recorder
pub struct PurchaseMetrics;

impl PurchaseMetrics {
    // =========================================================================
    // Purchase Metrics
    // =========================================================================

    /// Record one purchase attempt
    pub fn record_purchase(provider: &str, service: &str, success: bool, duration_ms: u64) {
        let outcome = if success { "success" } else { "failure" };
        counter!(
            "commitment_purchases_total",
            "provider" => provider.to_string(),
            "service" => service.to_string(),
            "outcome" => outcome
        )
        .increment(1);
        histogram!("commitment_purchase_duration_seconds", "provider" => provider.to_string())
            .record(duration_ms as f64 / 1000.0);

        tracing::debug!(
            provider = provider,
            service = service,
            outcome = outcome,
            duration_ms = duration_ms,
            "Recorded purchase attempt"
        );
    }

    /// Add the realized cost of a successful purchase, in whole billing currency units
    pub fn record_purchase_cost(provider: &str, service: &str, cost: f64) {
        if cost <= 0.0 {
            return;
        }
        counter!(
            "commitment_purchase_cost_total",
            "provider" => provider.to_string(),
            "service" => service.to_string()
        )
        .increment(cost.round() as u64);
    }

    /// Record a completed batch run
    pub fn record_batch(provider: &str, total: usize, succeeded: usize) {
        counter!("commitment_batches_total", "provider" => provider.to_string()).increment(1);

        tracing::debug!(
            provider = provider,
            total = total,
            succeeded = succeeded,
            "Recorded batch run"
        );
    }

    // =========================================================================
    // Gauge Metrics (Current State)
    // =========================================================================

    /// Set the number of commitments surfaced by the last listing
    pub fn set_active_commitments(provider: &str, count: usize) {
        gauge!("commitment_active_total", "provider" => provider.to_string()).set(count as f64);
    }

    /// Set the number of recommendations accepted for purchase
    pub fn set_recommendations(provider: &str, count: usize) {
        gauge!("commitment_recommendations_total", "provider" => provider.to_string())
            .set(count as f64);
    }

    // =========================================================================
    // Error Metrics
    // =========================================================================

    /// Record a failed provider call
    pub fn record_provider_error(provider: &str, operation: &str) {
        counter!(
            "commitment_provider_errors_total",
            "provider" => provider.to_string(),
            "operation" => operation.to_string()
        )
        .increment(1);
    }
}
