use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::context::Context;
use crate::error::CommitmentError;
use crate::executor::Purchaser;
use crate::models::{PurchaseResult, Recommendation};

/// Runs purchases one at a time with a fixed pause between attempts.
///
/// Always yields one result per input, in input order. A failing item never
/// stops the batch; cancellation does, and every item not yet attempted is
/// reported as a cancelled failure.
pub struct BatchDriver<'a> {
    purchaser: &'a dyn Purchaser,
}

impl<'a> BatchDriver<'a> {
    pub fn new(purchaser: &'a dyn Purchaser) -> Self {
        Self { purchaser }
    }

    #[instrument(skip_all, fields(batch_size = recs.len(), delay_ms = delay.as_millis() as u64))]
    pub async fn purchase_all(
        &self,
        ctx: &Context,
        recs: &[Recommendation],
        delay: Duration,
    ) -> Vec<PurchaseResult> {
        let mut results = Vec::with_capacity(recs.len());

        for (index, rec) in recs.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if ctx.is_cancelled() {
                warn!(
                    attempted = index,
                    remaining = recs.len() - index,
                    "Batch cancelled, skipping remaining purchases"
                );
                results.extend(recs[index..].iter().map(cancelled_result));
                break;
            }

            results.push(self.purchaser.purchase(ctx, rec).await);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(
            total = results.len(),
            succeeded = succeeded,
            failed = results.len() - succeeded,
            "Batch purchase finished"
        );

        results
    }
}

fn cancelled_result(rec: &Recommendation) -> PurchaseResult {
    PurchaseResult::failed(
        rec.clone(),
        format!("Failed to purchase: {}", CommitmentError::Cancelled),
    )
}
