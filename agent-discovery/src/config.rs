//! Discovery configuration
//!
//! Supported networks are a closed set: every per-network constant that is
//! a property of the chain itself (chain id, provider log-range limit,
//! reputation schema) is built in. Deployment specifics (RPC endpoint,
//! registry addresses, token id bounds, blacklist) come from a TOML file:
//!
//! ```toml
//! [[networks]]
//! network = "base-sepolia"
//! rpc_url = "https://sepolia.base.org"
//! identity_registry = "0x1111111111111111111111111111111111111111"
//! reputation_registry = "0x2222222222222222222222222222222222222222"
//! deploy_block = 31000000
//! min_token_id = 1
//! first_known_token_id = 1
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 1000
//! ```

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::batch::BatchSettings;
use crate::error::{DiscoveryError, Result};
use crate::resolver::RelevanceRule;
use crate::retry::RetryPolicy;
use crate::types::TokenId;

// ============================================================================
// Networks
// ============================================================================

/// Networks the application is deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    EthereumSepolia,
    BaseSepolia,
    PolygonAmoy,
}

impl Network {
    pub const ALL: [Network; 3] = [
        Network::EthereumSepolia,
        Network::BaseSepolia,
        Network::PolygonAmoy,
    ];

    /// EIP-155 chain id
    pub fn chain_id(self) -> u64 {
        match self {
            Network::EthereumSepolia => 11_155_111,
            Network::BaseSepolia => 84_532,
            Network::PolygonAmoy => 80_002,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Network> {
        Network::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }

    pub fn slug(self) -> &'static str {
        match self {
            Network::EthereumSepolia => "ethereum-sepolia",
            Network::BaseSepolia => "base-sepolia",
            Network::PolygonAmoy => "polygon-amoy",
        }
    }

    /// Largest block range the usual public providers accept per `eth_getLogs`
    pub fn default_chunk_size(self) -> u64 {
        match self {
            Network::EthereumSepolia => 50_000,
            Network::BaseSepolia => 10_000,
            Network::PolygonAmoy => 2_000,
        }
    }

    /// Reputation registry revision deployed on this network
    pub fn default_reputation_schema(self) -> ReputationSchema {
        match self {
            Network::EthereumSepolia => ReputationSchema::Decimal,
            Network::BaseSepolia => ReputationSchema::Decimal,
            Network::PolygonAmoy => ReputationSchema::Legacy,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.slug())
    }
}

impl FromStr for Network {
    type Err = DiscoveryError;

    /// Accepts a slug (`base-sepolia`) or a decimal chain id (`84532`)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(chain_id) = s.parse::<u64>() {
            return Network::from_chain_id(chain_id)
                .ok_or_else(|| DiscoveryError::Config(format!("Unsupported chain id: {}", chain_id)));
        }
        Network::ALL
            .into_iter()
            .find(|n| n.slug().eq_ignore_ascii_case(s))
            .ok_or_else(|| DiscoveryError::Config(format!("Unknown network: {}", s)))
    }
}

/// On-chain encoding of the reputation aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationSchema {
    /// `getSummary(...) -> (uint64 count, uint8 averageScore)`, score already 0-100
    #[serde(alias = "a")]
    Legacy,
    /// `getSummary(...) -> (uint64 count, int128 value, uint8 decimals)`
    #[serde(alias = "b")]
    Decimal,
}

// ============================================================================
// Per-network deployment
// ============================================================================

/// Deployment of the registries on one network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,

    /// HTTP JSON-RPC endpoint
    pub rpc_url: String,

    /// ERC-721 identity registry (agents are its tokens)
    pub identity_registry: Address,

    /// Reputation registry holding feedback aggregates
    pub reputation_registry: Address,

    /// Oldest block worth scanning (registry deployment)
    #[serde(default)]
    pub deploy_block: u64,

    /// Override for the provider's log range limit
    #[serde(default)]
    pub chunk_size: Option<u64>,

    /// Tokens below this id predate the application and are ignored
    #[serde(default)]
    pub min_token_id: TokenId,

    /// Oldest token known to belong to the application; scanning stops once
    /// it has been seen. Mints older than this token are never discovered.
    #[serde(default)]
    pub first_known_token_id: Option<TokenId>,

    /// Override for the reputation schema
    #[serde(default)]
    pub reputation_schema: Option<ReputationSchema>,

    /// Tokens never surfaced, even when relevant
    #[serde(default)]
    pub blacklist: Vec<TokenId>,
}

impl NetworkConfig {
    /// Deployment with every optional field at its default
    pub fn new(
        network: Network,
        rpc_url: impl Into<String>,
        identity_registry: Address,
        reputation_registry: Address,
    ) -> Self {
        Self {
            network,
            rpc_url: rpc_url.into(),
            identity_registry,
            reputation_registry,
            deploy_block: 0,
            chunk_size: None,
            min_token_id: 0,
            first_known_token_id: None,
            reputation_schema: None,
            blacklist: Vec::new(),
        }
    }

    /// Effective `eth_getLogs` chunk size
    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
            .unwrap_or_else(|| self.network.default_chunk_size())
            .max(1)
    }

    /// Effective reputation schema
    pub fn reputation_schema(&self) -> ReputationSchema {
        self.reputation_schema
            .unwrap_or_else(|| self.network.default_reputation_schema())
    }

    pub fn is_blacklisted(&self, token_id: TokenId) -> bool {
        self.blacklist.contains(&token_id)
    }
}

// ============================================================================
// Ambient settings
// ============================================================================

/// Longest cache namespace accepted, leaving room for the longest key
/// (`reputation:<chain id>:<token id>`) within a file store's key limit
pub const MAX_NAMESPACE_BYTES: usize = 64;

/// Cache placement and lifetimes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory for the persistent store
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Key prefix shared by every cache entry
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Lifetime of a network's agent list
    #[serde(default = "default_list_ttl")]
    pub list_ttl_secs: u64,

    /// Lifetime of a single agent lookup
    #[serde(default = "default_agent_ttl")]
    pub agent_ttl_secs: u64,
}

fn default_cache_dir() -> PathBuf { PathBuf::from(".agent-discovery/cache") }
fn default_namespace() -> String { agent_cache_core::DEFAULT_NAMESPACE.to_string() }
fn default_list_ttl() -> u64 { 5 * 60 }
fn default_agent_ttl() -> u64 { 2 * 60 }

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            namespace: default_namespace(),
            list_ttl_secs: default_list_ttl(),
            agent_ttl_secs: default_agent_ttl(),
        }
    }
}

impl CacheSettings {
    pub fn list_ttl(&self) -> Duration {
        Duration::from_secs(self.list_ttl_secs)
    }

    pub fn agent_ttl(&self) -> Duration {
        Duration::from_secs(self.agent_ttl_secs)
    }
}

/// Off-chain metadata gateways
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Gateway serving `/ipfs/<cid>` paths
    #[serde(default = "default_ipfs_gateway")]
    pub ipfs_gateway: String,

    /// Gateway serving Arweave transaction ids
    #[serde(default = "default_arweave_gateway")]
    pub arweave_gateway: String,

    /// Per-request timeout
    #[serde(default = "default_metadata_timeout")]
    pub timeout_secs: u64,
}

fn default_ipfs_gateway() -> String { "https://gateway.pinata.cloud".to_string() }
fn default_arweave_gateway() -> String { "https://arweave.net".to_string() }
fn default_metadata_timeout() -> u64 { 5 }

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            ipfs_gateway: default_ipfs_gateway(),
            arweave_gateway: default_arweave_gateway(),
            timeout_secs: default_metadata_timeout(),
        }
    }
}

impl MetadataSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ============================================================================
// Top level
// ============================================================================

/// Complete discovery configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub batch: BatchSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub metadata: MetadataSettings,
    #[serde(default)]
    pub relevance: RelevanceRule,
}

impl DiscoveryConfig {
    /// Load and validate a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DiscoveryError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: DiscoveryConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make discovery meaningless
    pub fn validate(&self) -> Result<()> {
        if self.networks.is_empty() {
            return Err(DiscoveryError::Config("At least one network is required".into()));
        }

        let mut seen = HashSet::new();
        for net in &self.networks {
            if !seen.insert(net.network) {
                return Err(DiscoveryError::Config(format!(
                    "Network {} is configured more than once",
                    net.network
                )));
            }
            if net.chunk_size == Some(0) {
                return Err(DiscoveryError::Config(format!(
                    "{}: chunk_size must be greater than zero",
                    net.network
                )));
            }
            if !(net.rpc_url.starts_with("http://") || net.rpc_url.starts_with("https://")) {
                return Err(DiscoveryError::Config(format!(
                    "{}: rpc_url must be an http(s) URL, got '{}'",
                    net.network, net.rpc_url
                )));
            }
            if let Some(first) = net.first_known_token_id {
                if first < net.min_token_id {
                    return Err(DiscoveryError::Config(format!(
                        "{}: first_known_token_id {} is below min_token_id {}",
                        net.network, first, net.min_token_id
                    )));
                }
            }
        }

        let namespace = self.cache.namespace.trim();
        if namespace.is_empty() {
            return Err(DiscoveryError::Config("cache.namespace must not be empty".into()));
        }
        if namespace.len() > MAX_NAMESPACE_BYTES {
            return Err(DiscoveryError::Config(format!(
                "cache.namespace is {} bytes, at most {} allowed",
                namespace.len(),
                MAX_NAMESPACE_BYTES
            )));
        }

        if self.batch.size == 0 {
            return Err(DiscoveryError::Config("batch.size must be greater than zero".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(DiscoveryError::Config("retry.max_attempts must be at least 1".into()));
        }
        self.relevance.validate()?;

        Ok(())
    }

    /// Deployment for `network`, a configuration error when absent
    pub fn network(&self, network: Network) -> Result<&NetworkConfig> {
        self.networks
            .iter()
            .find(|n| n.network == network)
            .ok_or_else(|| DiscoveryError::Config(format!("Network {} is not configured", network)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[[networks]]
network = "base-sepolia"
rpc_url = "https://sepolia.base.org"
identity_registry = "0x1111111111111111111111111111111111111111"
reputation_registry = "0x2222222222222222222222222222222222222222"
"#;

    #[test]
    fn test_minimal_config_uses_network_defaults() {
        let config = DiscoveryConfig::from_toml_str(MINIMAL).unwrap();
        let net = config.network(Network::BaseSepolia).unwrap();

        assert_eq!(net.chunk_size(), 10_000);
        assert_eq!(net.reputation_schema(), ReputationSchema::Decimal);
        assert_eq!(net.deploy_block, 0);
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.batch.size, 5);
        assert_eq!(config.cache.list_ttl(), Duration::from_secs(300));
        assert_eq!(config.metadata.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let raw = format!(
            "{}chunk_size = 500\nreputation_schema = \"a\"\nblacklist = [3, 9]\nfirst_known_token_id = 12\nmin_token_id = 10\n",
            MINIMAL
        );
        let config = DiscoveryConfig::from_toml_str(&raw).unwrap();
        let net = config.network(Network::BaseSepolia).unwrap();

        assert_eq!(net.chunk_size(), 500);
        assert_eq!(net.reputation_schema(), ReputationSchema::Legacy);
        assert!(net.is_blacklisted(9));
        assert!(!net.is_blacklisted(10));
        assert_eq!(net.first_known_token_id, Some(12));
    }

    #[test]
    fn test_unconfigured_network_is_an_error() {
        let config = DiscoveryConfig::from_toml_str(MINIMAL).unwrap();
        assert!(matches!(
            config.network(Network::PolygonAmoy),
            Err(DiscoveryError::Config(_))
        ));
    }

    #[test]
    fn test_validation_failures() {
        assert!(DiscoveryConfig::from_toml_str("networks = []").is_err());

        let duplicate = format!("{}{}", MINIMAL, MINIMAL);
        assert!(DiscoveryConfig::from_toml_str(&duplicate).is_err());

        let zero_chunk = format!("{}chunk_size = 0\n", MINIMAL);
        assert!(DiscoveryConfig::from_toml_str(&zero_chunk).is_err());

        let bad_url = MINIMAL.replace("https://sepolia.base.org", "sepolia.base.org");
        assert!(DiscoveryConfig::from_toml_str(&bad_url).is_err());

        let blank_namespace = format!("{}[cache]\nnamespace = \" \"\n", MINIMAL);
        assert!(DiscoveryConfig::from_toml_str(&blank_namespace).is_err());

        let long_namespace = format!("{}[cache]\nnamespace = \"{}\"\n", MINIMAL, "n".repeat(65));
        assert!(DiscoveryConfig::from_toml_str(&long_namespace).is_err());

        let bad_address = MINIMAL.replace("0x1111111111111111111111111111111111111111", "0x1234");
        assert!(DiscoveryConfig::from_toml_str(&bad_address).is_err());
    }

    #[test]
    fn test_network_parsing() {
        assert_eq!("base-sepolia".parse::<Network>().unwrap(), Network::BaseSepolia);
        assert_eq!("11155111".parse::<Network>().unwrap(), Network::EthereumSepolia);
        assert_eq!(Network::from_chain_id(80_002), Some(Network::PolygonAmoy));
        assert!("1".parse::<Network>().is_err());
        assert!("mainnet".parse::<Network>().is_err());
    }
}
