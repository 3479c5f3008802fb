//! In-memory chain for testing.

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use super::{transfer_event_signature, ChainReader, LogQuery, RawLog, RawReputation};
use crate::config::ReputationSchema;
use crate::error::ChainError;
use crate::types::TokenId;

/// Mock chain for testing.
///
/// Holds a fixed head, a set of logs at block heights, token state for the
/// identity registry and reputation aggregates. Failures can be injected per
/// block range or for the next N calls. Log queries are recorded so tests can
/// assert on scan order and count.
pub struct MockChain {
    head: u64,
    head_available: bool,
    head_failures: AtomicU32,
    logs: Vec<(u64, RawLog)>,
    tokens: HashMap<TokenId, (String, Address)>,
    reputation: HashMap<TokenId, RawReputation>,
    failing_reputation: HashSet<TokenId>,
    broken_ranges: Vec<RangeInclusive<u64>>,
    log_failures: AtomicU32,
    queries: Mutex<Vec<LogQuery>>,
    token_calls: AtomicU32,
    reputation_calls: AtomicU32,
}

impl MockChain {
    /// Empty chain at height `head`.
    pub fn new(head: u64) -> Self {
        Self {
            head,
            head_available: true,
            head_failures: AtomicU32::new(0),
            logs: Vec::new(),
            tokens: HashMap::new(),
            reputation: HashMap::new(),
            failing_reputation: HashSet::new(),
            broken_ranges: Vec::new(),
            log_failures: AtomicU32::new(0),
            queries: Mutex::new(Vec::new()),
            token_calls: AtomicU32::new(0),
            reputation_calls: AtomicU32::new(0),
        }
    }

    /// Add a Transfer log.
    pub fn with_transfer(mut self, block: u64, from: Address, to: Address, token_id: TokenId) -> Self {
        let log = RawLog {
            topics: vec![
                transfer_event_signature(),
                from.into_word(),
                to.into_word(),
                B256::from(U256::from(token_id).to_be_bytes::<32>()),
            ],
            block_number: Some(block),
        };
        self.logs.push((block, log));
        self
    }

    /// Add a mint log without token state.
    pub fn with_mint_log(self, block: u64, token_id: TokenId, to: Address) -> Self {
        self.with_transfer(block, Address::ZERO, to, token_id)
    }

    /// Add a mint log plus the token's URI and owner.
    pub fn with_mint(self, block: u64, token_id: TokenId, owner: Address, uri: impl Into<String>) -> Self {
        self.with_mint_log(block, token_id, owner).with_token(token_id, uri, owner)
    }

    /// Set token state without a log.
    pub fn with_token(mut self, token_id: TokenId, uri: impl Into<String>, owner: Address) -> Self {
        self.tokens.insert(token_id, (uri.into(), owner));
        self
    }

    /// Set the reputation aggregate for an agent.
    pub fn with_reputation(mut self, token_id: TokenId, raw: RawReputation) -> Self {
        self.reputation.insert(token_id, raw);
        self
    }

    /// Make reputation reads for an agent fail with a transport error.
    pub fn with_failing_reputation(mut self, token_id: TokenId) -> Self {
        self.failing_reputation.insert(token_id);
        self
    }

    /// Every log query overlapping `from..=to` fails.
    pub fn with_broken_range(mut self, from: u64, to: u64) -> Self {
        self.broken_ranges.push(from..=to);
        self
    }

    /// The next `n` log queries fail, whatever their range.
    pub fn with_log_failures(self, n: u32) -> Self {
        self.log_failures.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` head reads fail.
    pub fn with_head_failures(self, n: u32) -> Self {
        self.head_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Every head read fails.
    pub fn with_head_unavailable(mut self) -> Self {
        self.head_available = false;
        self
    }

    /// Block ranges of every log query so far, in call order.
    pub fn log_queries(&self) -> Vec<(u64, u64)> {
        self.lock_queries()
            .iter()
            .map(|q| (q.from_block, q.to_block))
            .collect()
    }

    pub fn log_query_count(&self) -> usize {
        self.lock_queries().len()
    }

    /// Number of `tokenURI`/`ownerOf` calls.
    pub fn token_calls(&self) -> u32 {
        self.token_calls.load(Ordering::SeqCst)
    }

    /// Number of `getSummary` calls.
    pub fn reputation_calls(&self) -> u32 {
        self.reputation_calls.load(Ordering::SeqCst)
    }

    /// Forget recorded queries and call counts.
    pub fn reset_calls(&self) {
        self.lock_queries().clear();
        self.token_calls.store(0, Ordering::SeqCst);
        self.reputation_calls.store(0, Ordering::SeqCst);
    }

    fn lock_queries(&self) -> std::sync::MutexGuard<'_, Vec<LogQuery>> {
        self.queries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn token(&self, token_id: TokenId) -> Result<&(String, Address), ChainError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .get(&token_id)
            .ok_or_else(|| ChainError::Reverted(format!("ERC721NonexistentToken({})", token_id)))
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(0)
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn block_number(&self) -> Result<u64, ChainError> {
        if !self.head_available || Self::take_failure(&self.head_failures) {
            return Err(ChainError::Transport("mock head unavailable".to_string()));
        }
        Ok(self.head)
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, ChainError> {
        self.lock_queries().push(query.clone());

        if Self::take_failure(&self.log_failures) {
            return Err(ChainError::Transport("429 Too Many Requests".to_string()));
        }
        let range = query.from_block..=query.to_block;
        if self
            .broken_ranges
            .iter()
            .any(|broken| broken.start() <= range.end() && range.start() <= broken.end())
        {
            return Err(ChainError::Transport(format!(
                "query returned more than 10000 results for {}..={}",
                query.from_block, query.to_block
            )));
        }

        let mut matching: Vec<&(u64, RawLog)> = self
            .logs
            .iter()
            .filter(|(block, log)| {
                range.contains(block)
                    && log.topics.first() == Some(&query.event_signature)
                    && query.topic1.map_or(true, |t| log.topics.get(1) == Some(&t))
            })
            .collect();
        matching.sort_by_key(|(block, _)| *block);

        Ok(matching.into_iter().map(|(_, log)| log.clone()).collect())
    }

    async fn token_uri(&self, _registry: Address, token_id: TokenId) -> Result<String, ChainError> {
        self.token(token_id).map(|(uri, _)| uri.clone())
    }

    async fn owner_of(&self, _registry: Address, token_id: TokenId) -> Result<Address, ChainError> {
        self.token(token_id).map(|(_, owner)| *owner)
    }

    async fn reputation_summary(
        &self,
        _registry: Address,
        agent_id: TokenId,
        schema: ReputationSchema,
    ) -> Result<RawReputation, ChainError> {
        self.reputation_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_reputation.contains(&agent_id) {
            return Err(ChainError::Transport("mock reputation failure".to_string()));
        }
        match (self.reputation.get(&agent_id), schema) {
            (Some(raw @ RawReputation::Legacy { .. }), ReputationSchema::Legacy)
            | (Some(raw @ RawReputation::Decimal { .. }), ReputationSchema::Decimal) => Ok(*raw),
            // Calling the wrong ABI revision fails to decode
            (Some(_), _) => Err(ChainError::Decode("return data does not match getSummary".to_string())),
            (None, ReputationSchema::Legacy) => Ok(RawReputation::Legacy { count: 0, average_score: 0 }),
            (None, ReputationSchema::Decimal) => Ok(RawReputation::Decimal { count: 0, value: 0, decimals: 0 }),
        }
    }
}
