//! Commitment inventory.
//!
//! Lists what an account already holds and normalizes it into [`Commitment`].
//! Only active and payment-pending commitments are surfaced.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Months, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{CommitmentError, CommitmentResult};
use crate::models::{
    CloudProvider, Commitment, CommitmentState, ONE_YEAR_SECONDS, THREE_YEAR_SECONDS, Term,
};
use crate::provider::{CommitmentLister, ProviderCommitment};

/// How to treat a listing failure after the first page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PaginationPolicy {
    /// Fail the whole listing
    Strict,
    /// Keep what was collected so far and log the failure
    #[default]
    BestEffort,
}

impl PaginationPolicy {
    pub fn parse(value: &str) -> CommitmentResult<Self> {
        Self::from_str(value.trim()).map_err(|_| {
            CommitmentError::Validation(format!(
                "invalid pagination policy '{}' (expected strict or best_effort)",
                value
            ))
        })
    }
}

/// Term implied by a commitment duration.
///
/// Anything other than exactly one or three 365-day years counts as one year.
pub fn term_from_duration(duration_seconds: i64) -> Term {
    match duration_seconds {
        ONE_YEAR_SECONDS => Term::OneYear,
        THREE_YEAR_SECONDS => Term::ThreeYear,
        _ => Term::OneYear,
    }
}

/// `start` plus `term` in calendar months
pub fn end_date(start: DateTime<Utc>, term: Term) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(term.months()))
        .unwrap_or_else(|| start + TimeDelta::seconds(term.seconds()))
}

/// Normalize a provider commitment, or `None` when its state is not surfaced
pub fn normalize(provider: CloudProvider, raw: ProviderCommitment) -> Option<Commitment> {
    let state = CommitmentState::from_provider_state(&raw.state);
    if !state.is_surfaced() {
        debug!(
            commitment_id = %raw.commitment_id,
            state = %raw.state,
            "Skipping commitment in non-active state"
        );
        return None;
    }

    let term = term_from_duration(raw.duration_seconds);
    Some(Commitment {
        provider,
        account_id: raw.account_id,
        commitment_id: raw.commitment_id,
        commitment_type: raw.commitment_type,
        service: raw.service,
        region: raw.region,
        resource_type: raw.resource_type,
        count: raw.count,
        start_date: raw.start_date,
        end_date: end_date(raw.start_date, term),
        state,
    })
}

pub struct InventoryReader {
    lister: Arc<dyn CommitmentLister>,
    policy: PaginationPolicy,
}

impl InventoryReader {
    pub fn new(lister: Arc<dyn CommitmentLister>) -> Self {
        Self {
            lister,
            policy: PaginationPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PaginationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PaginationPolicy {
        self.policy
    }

    /// Active and payment-pending commitments across every page
    pub async fn list_active(&self, ctx: &Context) -> CommitmentResult<Vec<Commitment>> {
        let provider = self.lister.provider();
        let mut commitments = Vec::new();
        let mut page_token: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let fetched = ctx
                .run(self.lister.list_commitments(page_token.take()))
                .await;

            let page = match fetched {
                Ok(page) => page,
                Err(CommitmentError::Cancelled) => return Err(CommitmentError::Cancelled),
                Err(e) if pages == 0 || self.policy == PaginationPolicy::Strict => return Err(e),
                Err(e) => {
                    warn!(
                        provider = %provider,
                        pages = pages,
                        collected = commitments.len(),
                        error = %e,
                        "Commitment listing failed mid-pagination, returning partial results"
                    );
                    break;
                }
            };
            pages += 1;

            commitments.extend(
                page.commitments
                    .into_iter()
                    .filter_map(|raw| normalize(provider, raw)),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        info!(
            provider = %provider,
            pages = pages,
            count = commitments.len(),
            "Listed commitments"
        );
        Ok(commitments)
    }
}
