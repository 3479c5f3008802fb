//! Command-line interface
//!
//! Arguments fall back to environment variables (a `.env` file is loaded
//! first), so the binary can run unattended from a scheduler.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::config::{DiscoveryConfig, Network, NetworkConfig};
use crate::error::{DiscoveryError, Result};
use crate::stats::StatsSnapshot;
use crate::types::{AgentListing, ReputationSummary, TokenId};

#[derive(Parser, Debug, Clone)]
#[command(name = "agent-discovery")]
#[command(about = "Discover AI agents registered on-chain, with cached results", version)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "DISCOVERY_CONFIG", default_value = "discovery.toml")]
    pub config: PathBuf,

    /// Override the cache directory from the configuration file
    #[arg(long, env = "CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Log level for this crate (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Print pipeline counters after the command
    #[arg(long, global = true)]
    pub stats: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// List relevant agents with their reputation
    List {
        /// Only this network (slug or chain id); all networks when omitted
        #[arg(short, long)]
        network: Option<Network>,

        /// Ignore the cached list and rescan
        #[arg(long)]
        refresh: bool,
    },

    /// Show one agent
    Agent {
        /// Agent token id
        id: TokenId,

        /// Network (slug or chain id); optional with a single network
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// Show the reputation summary of one agent
    Reputation {
        /// Agent token id
        id: TokenId,

        /// Network (slug or chain id); optional with a single network
        #[arg(short, long)]
        network: Option<Network>,
    },

    /// Show configured networks
    Networks,

    /// Manage the local cache
    #[command(subcommand)]
    Cache(CacheCommands),
}

#[derive(Debug, Clone, Subcommand)]
pub enum CacheCommands {
    /// Remove cached entries
    Clear {
        /// Only this network's entries
        #[arg(short, long)]
        network: Option<Network>,
    },
}

/// Network to use when the command allows omitting it
pub fn pick_network(config: &DiscoveryConfig, requested: Option<Network>) -> Result<Network> {
    match (requested, config.networks.as_slice()) {
        (Some(network), _) => config.network(network).map(|n| n.network),
        (None, [only]) => Ok(only.network),
        (None, _) => Err(DiscoveryError::Config(
            "Several networks are configured, pass --network".into(),
        )),
    }
}

// ============================================================================
// Output
// ============================================================================

pub fn to_json<T: Serialize>(value: &T) -> serde_json::Result<String> {
    serde_json::to_string_pretty(value)
}

fn format_reputation(reputation: &ReputationSummary) -> String {
    if reputation.has_feedback() {
        format!("{:>3}/100 ({} reviews)", reputation.score, reputation.count)
    } else {
        "no feedback".to_string()
    }
}

/// One line per agent
pub fn render_listings(listings: &[AgentListing]) -> String {
    if listings.is_empty() {
        return "No agents found\n".to_string();
    }

    let mut out = String::new();
    for listing in listings {
        let agent = &listing.agent;
        let _ = writeln!(
            out,
            "{:<16} #{:<6} {:<32} {:<22} {}",
            agent.network,
            agent.agent_id,
            agent.display_name(),
            format_reputation(&listing.reputation),
            agent.owner
        );
    }
    out
}

/// Multi-line detail view of one agent
pub fn render_listing(listing: &AgentListing) -> String {
    let agent = &listing.agent;
    let mut out = String::new();
    let _ = writeln!(out, "{} (#{} on {})", agent.display_name(), agent.agent_id, agent.network);
    let _ = writeln!(out, "  owner:       {}", agent.owner);
    let _ = writeln!(out, "  metadata:    {}", agent.metadata_uri);
    if let Some(metadata) = &agent.metadata {
        if !metadata.description.is_empty() {
            let _ = writeln!(out, "  description: {}", metadata.description);
        }
        if !metadata.image.is_empty() {
            let _ = writeln!(out, "  image:       {}", metadata.image);
        }
        if let Some(price) = &metadata.price {
            let _ = writeln!(out, "  price:       {}", price);
        }
    }
    let _ = writeln!(out, "  reputation:  {}", format_reputation(&listing.reputation));
    out
}

pub fn render_reputation(network: Network, id: TokenId, reputation: &ReputationSummary) -> String {
    format!("#{} on {}: {}\n", id, network, format_reputation(reputation))
}

pub fn render_networks<'a>(networks: impl IntoIterator<Item = &'a NetworkConfig>) -> String {
    let mut out = String::new();
    for net in networks {
        let _ = writeln!(
            out,
            "{:<16} chain {:<9} registry {} chunk {:<6} schema {:?} first known {}",
            net.network,
            net.network.chain_id(),
            net.identity_registry,
            net.chunk_size(),
            net.reputation_schema(),
            net.first_known_token_id
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
        );
    }
    out
}

pub fn render_stats(stats: &StatsSnapshot) -> String {
    format!(
        "chunks {} ({} failed), mints {}, agents {} resolved / {} absent / {} failed, \
         metadata misses {}, reputation {} reads / {} failed, cache {} hits / {} misses\n",
        stats.chunks_scanned,
        stats.chunk_failures,
        stats.mints_found,
        stats.agents_resolved,
        stats.agents_absent,
        stats.agent_failures,
        stats.metadata_misses,
        stats.reputation_reads,
        stats.reputation_failures,
        stats.cache_hits,
        stats.cache_misses,
    )
}
