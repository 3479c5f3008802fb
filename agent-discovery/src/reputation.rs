//! Reputation enrichment
//!
//! Two revisions of the reputation registry are deployed. The revision is
//! chosen per network from configuration; [`normalize`] maps both onto the
//! same 0-100 integer score.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::chain::{ChainHandle, RawReputation};
use crate::error::ChainError;
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;
use crate::types::{Outcome, ReputationSummary, TokenId};

/// Highest displayable score
pub const MAX_SCORE: u8 = 100;

/// Normalize an on-chain aggregate to the common 0-100 scale
///
/// No feedback (`count == 0`) is always a zero score. Decimal values are
/// scaled by `10^decimals`, rounded half away from zero and clamped.
pub fn normalize(raw: RawReputation) -> ReputationSummary {
    match raw {
        RawReputation::Legacy { count: 0, .. } | RawReputation::Decimal { count: 0, .. } => {
            ReputationSummary::NONE
        }
        RawReputation::Legacy { count, average_score } => ReputationSummary {
            count,
            score: average_score.min(MAX_SCORE),
        },
        RawReputation::Decimal { count, value, decimals } => {
            let scaled = value as f64 / 10f64.powi(i32::from(decimals));
            ReputationSummary {
                count,
                score: scaled.round().clamp(0.0, f64::from(MAX_SCORE)) as u8,
            }
        }
    }
}

/// Reads reputation aggregates for resolved agents
#[derive(Debug, Clone)]
pub struct ReputationEnricher {
    retry: RetryPolicy,
    stats: Arc<PipelineStats>,
}

impl ReputationEnricher {
    pub fn new(retry: RetryPolicy, stats: Arc<PipelineStats>) -> Self {
        Self { retry, stats }
    }

    /// Global aggregate for `agent_id`, keeping the reason for a miss
    ///
    /// A reverted call (agent unknown to the reputation registry) is
    /// `Absent`; anything else that survives retries is `Failed`.
    pub async fn get_reputation_outcome(&self, chain: &ChainHandle, agent_id: TokenId) -> Outcome<ReputationSummary> {
        let registry = chain.config.reputation_registry;
        let schema = chain.config.reputation_schema();
        let reader = &chain.reader;

        PipelineStats::incr(&self.stats.reputation_reads);

        let result = self
            .retry
            .run_when(
                move || reader.reputation_summary(registry, agent_id, schema),
                ChainError::is_transient,
            )
            .await;

        match result {
            Ok(raw) => {
                let summary = normalize(raw);
                debug!(network = %chain.network(), agent_id, count = summary.count, score = summary.score, "Reputation read");
                Outcome::Found(summary)
            }
            Err(ChainError::Reverted(reason)) => {
                debug!(network = %chain.network(), agent_id, %reason, "No reputation summary");
                Outcome::Absent
            }
            Err(e) => {
                PipelineStats::incr(&self.stats.reputation_failures);
                warn!(network = %chain.network(), agent_id, error = %e, "Reputation read failed");
                Outcome::Failed(e.to_string())
            }
        }
    }

    /// Global aggregate for `agent_id`; any failure reads as no feedback
    pub async fn get_reputation(&self, chain: &ChainHandle, agent_id: TokenId) -> ReputationSummary {
        self.get_reputation_outcome(chain, agent_id)
            .await
            .into_option()
            .unwrap_or(ReputationSummary::NONE)
    }
}
