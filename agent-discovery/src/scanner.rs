//! Backward mint scanner
//!
//! Walks `[from_block, to_block]` from the newest block down in chunks no
//! larger than the provider's log range limit. Chunks are queried strictly
//! one at a time, newest first, so that once the oldest token of interest
//! has been seen every newer mint has been seen as well and the scan can
//! stop without reaching `from_block`.

use alloy::primitives::{Address, B256, U256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::{transfer_event_signature, ChainHandle, LogQuery, RawLog};
use crate::retry::RetryPolicy;
use crate::stats::PipelineStats;
use crate::types::{MintEvent, TokenId};

/// Decode a Transfer log as a mint
///
/// `None` for any other event, transfers from a non-zero sender, and token
/// ids that do not fit a [`TokenId`].
pub fn decode_mint(log: &RawLog) -> Option<MintEvent> {
    let [signature, from, to, token_id] = log.topics.get(..4)? else {
        return None;
    };
    if *signature != transfer_event_signature() || *from != B256::ZERO {
        return None;
    }

    let token_id = U256::from_be_slice(token_id.as_slice());
    let token_id = match TokenId::try_from(token_id) {
        Ok(id) => id,
        Err(_) => {
            warn!(token_id = %token_id, "Skipping mint with oversized token id");
            return None;
        }
    };

    Some(MintEvent {
        token_id,
        to: Address::from_word(*to),
    })
}

/// Scans an identity registry for mint events
#[derive(Debug, Clone)]
pub struct MintScanner {
    retry: RetryPolicy,
    stats: Arc<PipelineStats>,
}

impl MintScanner {
    pub fn new(retry: RetryPolicy, stats: Arc<PipelineStats>) -> Self {
        Self { retry, stats }
    }

    /// Collect mints in `[from_block, to_block]`, newest chunk first
    ///
    /// With `stop_at` set, no older chunk is queried once that token has
    /// been seen. A chunk whose query still fails after retries contributes
    /// nothing and the scan moves on. Token ids are unique in the output.
    pub async fn scan_mints(
        &self,
        chain: &ChainHandle,
        from_block: u64,
        to_block: u64,
        stop_at: Option<TokenId>,
    ) -> Vec<MintEvent> {
        let mut events = Vec::new();
        if from_block > to_block {
            return events;
        }

        let network = chain.network();
        let registry = chain.config.identity_registry;
        let chunk_size = chain.config.chunk_size();
        let reader = &chain.reader;

        let mut seen: HashSet<TokenId> = HashSet::new();
        let mut chunks = 0u64;
        let mut failed = 0u64;
        let mut hi = to_block;

        loop {
            let lo = hi.saturating_sub(chunk_size - 1).max(from_block);
            let query = &LogQuery::mints(registry, lo, hi);
            chunks += 1;

            match self.retry.run(move || reader.get_logs(query)).await {
                Ok(logs) => {
                    let before = events.len();
                    for mint in logs.iter().filter_map(decode_mint) {
                        if seen.insert(mint.token_id) {
                            events.push(mint);
                        }
                    }
                    debug!(%network, from = lo, to = hi, mints = events.len() - before, "Scanned chunk");
                }
                Err(e) => {
                    failed += 1;
                    PipelineStats::incr(&self.stats.chunk_failures);
                    warn!(%network, from = lo, to = hi, error = %e, "Chunk query failed, skipping");
                }
            }
            PipelineStats::incr(&self.stats.chunks_scanned);

            if let Some(stop) = stop_at {
                if seen.contains(&stop) {
                    debug!(%network, token_id = stop, at_block = lo, "Reached first known token, stopping scan");
                    break;
                }
            }
            if lo <= from_block {
                break;
            }
            hi = lo - 1;
        }

        PipelineStats::add(&self.stats.mints_found, events.len() as u64);
        info!(
            %network,
            from_block,
            to_block,
            chunks,
            failed_chunks = failed,
            mints = events.len(),
            "Mint scan complete"
        );

        events
    }
}
