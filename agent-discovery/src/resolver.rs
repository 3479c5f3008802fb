//! Agent resolution
//!
//! Turns token ids into [`RegisteredAgent`]s: owner and token URI from the
//! identity registry, the metadata document behind the URI, and whether the
//! token belongs to this application at all. The identity registry is
//! shared, so most tokens on it are someone else's; a token that does not
//! resolve is an ordinary outcome, not an error.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::{batch_process, BatchSettings};
use crate::chain::ChainHandle;
use crate::error::{ChainError, DiscoveryError, Result};
use crate::metadata::MetadataFetcher;
use crate::retry::RetryPolicy;
use crate::scanner::MintScanner;
use crate::stats::PipelineStats;
use crate::types::{AgentMetadata, Outcome, RegisteredAgent, TokenId};

// ============================================================================
// Relevance
// ============================================================================

/// Decides whether a token was registered through this application
///
/// A token is relevant when its metadata carries an agent number in
/// `[min_agent_number, max_agent_number]`, or, failing that, when its image
/// URL contains `image_marker`. Tokens without metadata never are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceRule {
    #[serde(default = "default_min_agent_number")]
    pub min_agent_number: u64,
    #[serde(default)]
    pub max_agent_number: Option<u64>,
    #[serde(default)]
    pub image_marker: Option<String>,
}

fn default_min_agent_number() -> u64 { 1 }

impl Default for RelevanceRule {
    fn default() -> Self {
        Self {
            min_agent_number: default_min_agent_number(),
            max_agent_number: None,
            image_marker: None,
        }
    }
}

impl RelevanceRule {
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_agent_number {
            if max < self.min_agent_number {
                return Err(DiscoveryError::Config(format!(
                    "relevance.max_agent_number {} is below min_agent_number {}",
                    max, self.min_agent_number
                )));
            }
        }
        if matches!(&self.image_marker, Some(marker) if marker.trim().is_empty()) {
            return Err(DiscoveryError::Config("relevance.image_marker must not be empty".into()));
        }
        Ok(())
    }

    pub fn is_relevant(&self, metadata: Option<&AgentMetadata>) -> bool {
        let Some(metadata) = metadata else {
            return false;
        };

        if let Some(number) = metadata.agent_number {
            let in_range = number >= self.min_agent_number
                && self.max_agent_number.map_or(true, |max| number <= max);
            if in_range {
                return true;
            }
        }

        match &self.image_marker {
            Some(marker) => metadata
                .image
                .to_ascii_lowercase()
                .contains(&marker.to_ascii_lowercase()),
            None => false,
        }
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// Resolves discovered tokens into agents
pub struct AgentResolver {
    fetcher: Arc<dyn MetadataFetcher>,
    relevance: RelevanceRule,
    retry: RetryPolicy,
    batch: BatchSettings,
    scanner: MintScanner,
    stats: Arc<PipelineStats>,
}

impl AgentResolver {
    pub fn new(
        fetcher: Arc<dyn MetadataFetcher>,
        relevance: RelevanceRule,
        retry: RetryPolicy,
        batch: BatchSettings,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            fetcher,
            relevance,
            scanner: MintScanner::new(retry, stats.clone()),
            retry,
            batch,
            stats,
        }
    }

    /// Resolve one token, keeping the reason for a miss
    ///
    /// `Absent` when the registry reverts (no such token); `Failed` when
    /// the registry cannot be read even after retries. Missing metadata
    /// still yields `Found`, with `metadata: None` and `is_relevant: false`.
    pub async fn resolve_agent_outcome(&self, chain: &ChainHandle, token_id: TokenId) -> Outcome<RegisteredAgent> {
        let network = chain.network();
        let registry = chain.config.identity_registry;
        let reader = &chain.reader;

        let (uri, owner) = futures::join!(
            self.retry.run_when(move || reader.token_uri(registry, token_id), ChainError::is_transient),
            self.retry.run_when(move || reader.owner_of(registry, token_id), ChainError::is_transient),
        );

        let (metadata_uri, owner) = match (uri, owner) {
            (Ok(uri), Ok(owner)) => (uri, owner),
            (Err(ChainError::Reverted(reason)), _) | (_, Err(ChainError::Reverted(reason))) => {
                PipelineStats::incr(&self.stats.agents_absent);
                debug!(%network, token_id, %reason, "Token does not resolve");
                return Outcome::Absent;
            }
            (Err(e), _) | (_, Err(e)) => {
                PipelineStats::incr(&self.stats.agent_failures);
                warn!(%network, token_id, error = %e, "Token read failed");
                return Outcome::Failed(e.to_string());
            }
        };

        let metadata = match self.fetcher.fetch(&metadata_uri).await {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                PipelineStats::incr(&self.stats.metadata_misses);
                debug!(%network, token_id, uri = %metadata_uri, error = %e, "No metadata");
                None
            }
        };

        let is_relevant = self.relevance.is_relevant(metadata.as_ref());
        PipelineStats::incr(&self.stats.agents_resolved);

        Outcome::Found(RegisteredAgent {
            agent_id: token_id,
            owner,
            metadata_uri,
            metadata,
            is_relevant,
            network,
        })
    }

    /// Resolve one token; `None` when it does not exist or cannot be read
    pub async fn resolve_agent(&self, chain: &ChainHandle, token_id: TokenId) -> Option<RegisteredAgent> {
        self.resolve_agent_outcome(chain, token_id).await.into_option()
    }

    /// Discover and resolve every relevant agent minted on `chain`
    ///
    /// Scans from the registry's deploy block to the current head, stopping
    /// at `first_known_token_id`. Tokens below `minimum_token_id` or in
    /// `blacklist` are dropped before resolution, irrelevant ones after.
    /// The output is sorted by agent id.
    ///
    /// Fails only when the chain head cannot be read.
    pub async fn resolve_all_mints(
        &self,
        chain: &ChainHandle,
        first_known_token_id: Option<TokenId>,
        minimum_token_id: TokenId,
        blacklist: &[TokenId],
    ) -> Result<Vec<RegisteredAgent>> {
        let network = chain.network();
        let reader = &chain.reader;

        let head = self
            .retry
            .run_when(move || reader.block_number(), ChainError::is_transient)
            .await?;

        let mints = self
            .scanner
            .scan_mints(chain, chain.config.deploy_block, head, first_known_token_id)
            .await;

        let blacklist: HashSet<TokenId> = blacklist.iter().copied().collect();
        let mut token_ids: Vec<TokenId> = mints
            .iter()
            .map(|mint| mint.token_id)
            .filter(|id| *id >= minimum_token_id && !blacklist.contains(id))
            .collect();
        token_ids.sort_unstable();

        debug!(%network, head, mints = mints.len(), candidates = token_ids.len(), "Resolving candidates");

        let resolved = batch_process(
            &token_ids,
            |token_id: &TokenId| {
                let token_id = *token_id;
                async move {
                    match self.resolve_agent_outcome(chain, token_id).await {
                        Outcome::Found(agent) => Ok(Some(agent)),
                        Outcome::Absent => Ok(None),
                        Outcome::Failed(reason) => Err(reason),
                    }
                }
            },
            self.batch.size,
            self.batch.delay(),
        )
        .await;

        let agents: Vec<RegisteredAgent> = resolved
            .into_iter()
            .flatten()
            .flatten()
            .filter(|agent| agent.is_relevant)
            .collect();

        info!(
            %network,
            head,
            mints = mints.len(),
            candidates = token_ids.len(),
            agents = agents.len(),
            "Resolved agents"
        );

        Ok(agents)
    }

    /// [`resolve_all_mints`](Self::resolve_all_mints) with the bounds and
    /// blacklist configured for `chain`
    pub async fn discover(&self, chain: &ChainHandle) -> Result<Vec<RegisteredAgent>> {
        let config = &chain.config;
        self.resolve_all_mints(chain, config.first_known_token_id, config.min_token_id, &config.blacklist)
            .await
    }
}
