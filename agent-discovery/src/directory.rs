//! Cached agent directory
//!
//! The entry point used by callers. Sits a [`TtlCache`] in front of the
//! scan → resolve → enrich pipeline, so repeated requests inside the TTL
//! window never touch the chain.
//!
//! Cache keys, relative to the cache namespace:
//!
//! | Key                          | Value                 | TTL              |
//! |------------------------------|-----------------------|------------------|
//! | `agents:<chain_id>`          | `Vec<AgentListing>`   | `list_ttl_secs`  |
//! | `agent:<chain_id>:<id>`      | `AgentListing`        | `agent_ttl_secs` |
//! | `reputation:<chain_id>:<id>` | `ReputationSummary`   | `agent_ttl_secs` |
//!
//! Concurrent callers missing the same key both run the pipeline; the last
//! write wins. Entries are whole recomputations, so that is harmless.

use agent_cache_core::{KeyValueStore, TtlCache};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::batch::{batch_process, BatchSettings};
use crate::chain::ChainHandle;
use crate::config::{CacheSettings, DiscoveryConfig, Network, NetworkConfig};
use crate::error::{DiscoveryError, Result};
use crate::metadata::{HttpMetadataFetcher, MetadataFetcher};
use crate::reputation::ReputationEnricher;
use crate::resolver::AgentResolver;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::types::{AgentListing, Outcome, RegisteredAgent, ReputationSummary, TokenId};

fn list_key(network: Network) -> String {
    format!("agents:{}", network.chain_id())
}

fn agent_key(network: Network, agent_id: TokenId) -> String {
    format!("agent:{}:{}", network.chain_id(), agent_id)
}

fn reputation_key(network: Network, agent_id: TokenId) -> String {
    format!("reputation:{}:{}", network.chain_id(), agent_id)
}

/// Discovered agents across every configured network
pub struct AgentDirectory<S> {
    chains: BTreeMap<Network, ChainHandle>,
    resolver: AgentResolver,
    enricher: ReputationEnricher,
    cache: TtlCache<S>,
    cache_settings: CacheSettings,
    batch: BatchSettings,
    stats: Arc<PipelineStats>,
}

impl<S: KeyValueStore> AgentDirectory<S> {
    /// Assemble a directory from already-connected chains
    ///
    /// Chains whose network has no entry in `config` are rejected.
    pub fn new(
        config: &DiscoveryConfig,
        chains: Vec<ChainHandle>,
        fetcher: Arc<dyn MetadataFetcher>,
        cache: TtlCache<S>,
    ) -> Result<Self> {
        let mut by_network = BTreeMap::new();
        for chain in chains {
            config.network(chain.network())?;
            by_network.insert(chain.network(), chain);
        }

        let stats = Arc::new(PipelineStats::new());
        Ok(Self {
            chains: by_network,
            resolver: AgentResolver::new(
                fetcher,
                config.relevance.clone(),
                config.retry,
                config.batch,
                stats.clone(),
            ),
            enricher: ReputationEnricher::new(config.retry, stats.clone()),
            cache,
            cache_settings: config.cache.clone(),
            batch: config.batch,
            stats,
        })
    }

    /// Connect every configured network over JSON-RPC and fetch metadata
    /// over HTTP, caching into `store`
    pub fn connect(config: &DiscoveryConfig, store: S) -> Result<Self> {
        let chains = config
            .networks
            .iter()
            .cloned()
            .map(ChainHandle::connect)
            .collect::<Result<Vec<_>>>()?;
        let fetcher = Arc::new(HttpMetadataFetcher::new(&config.metadata)?);
        let cache = TtlCache::new(store).with_namespace(config.cache.namespace.clone());

        info!(networks = chains.len(), namespace = %cache.namespace(), "Agent directory ready");
        Self::new(config, chains, fetcher, cache)
    }

    fn chain(&self, network: Network) -> Result<&ChainHandle> {
        self.chains
            .get(&network)
            .ok_or_else(|| DiscoveryError::Config(format!("Network {} is not configured", network)))
    }

    /// Configured networks, in a stable order
    pub fn networks(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.chains.values().map(|chain| &chain.config)
    }

    pub fn cache(&self) -> &TtlCache<S> {
        &self.cache
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let hit = self.cache.get(key);
        let counter = if hit.is_some() { &self.stats.cache_hits } else { &self.stats.cache_misses };
        PipelineStats::incr(counter);
        hit
    }

    // ========================================================================
    // Listing
    // ========================================================================

    /// Relevant agents on `network` with their reputation, from cache when
    /// a live entry exists
    pub async fn list_agents(&self, network: Network) -> Result<Vec<AgentListing>> {
        self.chain(network)?;
        if let Some(listings) = self.cached::<Vec<AgentListing>>(&list_key(network)) {
            debug!(%network, agents = listings.len(), "Serving agent list from cache");
            return Ok(listings);
        }
        self.list_agents_fresh(network).await
    }

    /// Run the full pipeline for `network`, ignoring and then replacing any
    /// cached list
    ///
    /// Nothing is cached when the chain head cannot be read.
    pub async fn list_agents_fresh(&self, network: Network) -> Result<Vec<AgentListing>> {
        let chain = self.chain(network)?;

        let agents = self.resolver.discover(chain).await?;
        let listings = self.enrich(chain, agents).await;

        self.cache.set(&list_key(network), &listings, self.cache_settings.list_ttl());
        info!(%network, agents = listings.len(), "Agent list refreshed");

        Ok(listings)
    }

    /// Agents from every configured network
    ///
    /// A network whose head cannot be read is logged and left out.
    pub async fn list_all_agents(&self) -> Vec<AgentListing> {
        let mut all = Vec::new();
        for network in self.chains.keys().copied() {
            match self.list_agents(network).await {
                Ok(listings) => all.extend(listings),
                Err(e) => warn!(%network, error = %e, "Skipping network"),
            }
        }
        all
    }

    async fn enrich(&self, chain: &ChainHandle, agents: Vec<RegisteredAgent>) -> Vec<AgentListing> {
        let reputations = batch_process(
            &agents,
            |agent: &RegisteredAgent| {
                let agent_id = agent.agent_id;
                async move { Ok::<_, Infallible>(self.enricher.get_reputation(chain, agent_id).await) }
            },
            self.batch.size,
            self.batch.delay(),
        )
        .await;

        agents
            .into_iter()
            .zip(reputations)
            .map(|(agent, reputation)| AgentListing {
                agent,
                reputation: reputation.unwrap_or(ReputationSummary::NONE),
            })
            .collect()
    }

    // ========================================================================
    // Single lookups
    // ========================================================================

    /// One agent with its reputation
    ///
    /// `None` when the token does not exist, cannot be read, is below the
    /// network's minimum id, is blacklisted, or is not relevant.
    pub async fn get_agent(&self, network: Network, agent_id: TokenId) -> Result<Option<AgentListing>> {
        let chain = self.chain(network)?;
        let config = &chain.config;
        if agent_id < config.min_token_id || config.is_blacklisted(agent_id) {
            return Ok(None);
        }

        let key = agent_key(network, agent_id);
        if let Some(listing) = self.cached::<AgentListing>(&key) {
            return Ok(Some(listing));
        }

        let agent = match self.resolver.resolve_agent(chain, agent_id).await {
            Some(agent) if agent.is_relevant => agent,
            _ => return Ok(None),
        };
        let reputation = self.get_reputation(network, agent_id).await?;

        let listing = AgentListing { agent, reputation };
        self.cache.set(&key, &listing, self.cache_settings.agent_ttl());
        Ok(Some(listing))
    }

    /// Reputation of one agent; a failed read is no feedback and is not
    /// cached
    pub async fn get_reputation(&self, network: Network, agent_id: TokenId) -> Result<ReputationSummary> {
        let chain = self.chain(network)?;

        let key = reputation_key(network, agent_id);
        if let Some(summary) = self.cached::<ReputationSummary>(&key) {
            return Ok(summary);
        }

        let summary = match self.enricher.get_reputation_outcome(chain, agent_id).await {
            Outcome::Found(summary) => summary,
            Outcome::Absent => ReputationSummary::NONE,
            Outcome::Failed(_) => return Ok(ReputationSummary::NONE),
        };
        self.cache.set(&key, &summary, self.cache_settings.agent_ttl());
        Ok(summary)
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Drop cached entries for one network, or every cached entry
    pub fn invalidate(&self, network: Option<Network>) {
        match network {
            Some(network) => {
                let chain_id = network.chain_id();
                self.cache.clear(Some(&list_key(network)));
                self.cache.clear_prefix(&format!("agent:{}:", chain_id));
                self.cache.clear_prefix(&format!("reputation:{}:", chain_id));
                info!(%network, "Cache invalidated");
            }
            None => {
                self.cache.clear(None);
                info!("Cache cleared");
            }
        }
    }
}
