//! Chain access
//!
//! The pipeline talks to a chain only through [`ChainReader`]: block height,
//! raw logs, and a handful of typed read-only contract calls. The
//! production implementation is [`AlloyChainReader`]; [`MockChain`] is an
//! in-memory chain for tests.

pub mod abi;
mod alloy_reader;
pub mod mock;

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{Network, NetworkConfig, ReputationSchema};
use crate::error::{ChainError, Result};
use crate::types::TokenId;

pub use alloy_reader::AlloyChainReader;
pub use mock::MockChain;

/// `keccak256("Transfer(address,address,uint256)")`
pub fn transfer_event_signature() -> B256 {
    abi::IIdentityRegistry::Transfer::SIGNATURE_HASH
}

/// Log filter for one `eth_getLogs` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub address: Address,
    /// topic0
    pub event_signature: B256,
    /// topic1, when constrained
    pub topic1: Option<B256>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    /// Transfers out of the zero address, i.e. mints
    pub fn mints(registry: Address, from_block: u64, to_block: u64) -> Self {
        Self {
            address: registry,
            event_signature: transfer_event_signature(),
            topic1: Some(B256::ZERO),
            from_block,
            to_block,
        }
    }
}

/// A log entry as returned by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub block_number: Option<u64>,
}

/// Reputation aggregate exactly as encoded on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawReputation {
    Legacy { count: u64, average_score: u8 },
    Decimal { count: u64, value: i128, decimals: u8 },
}

/// Read-only access to one chain
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current block height
    async fn block_number(&self) -> std::result::Result<u64, ChainError>;

    /// Logs matching `query`, in provider order
    async fn get_logs(&self, query: &LogQuery) -> std::result::Result<Vec<RawLog>, ChainError>;

    /// `tokenURI(tokenId)` on an ERC-721 registry
    async fn token_uri(&self, registry: Address, token_id: TokenId) -> std::result::Result<String, ChainError>;

    /// `ownerOf(tokenId)` on an ERC-721 registry
    async fn owner_of(&self, registry: Address, token_id: TokenId) -> std::result::Result<Address, ChainError>;

    /// Global `getSummary` for an agent (no client or tag filter)
    async fn reputation_summary(
        &self,
        registry: Address,
        agent_id: TokenId,
        schema: ReputationSchema,
    ) -> std::result::Result<RawReputation, ChainError>;
}

/// A configured network together with its reader
#[derive(Clone)]
pub struct ChainHandle {
    pub config: NetworkConfig,
    pub reader: Arc<dyn ChainReader>,
}

impl ChainHandle {
    pub fn new(config: NetworkConfig, reader: Arc<dyn ChainReader>) -> Self {
        Self { config, reader }
    }

    /// Connect to the network's RPC endpoint over HTTP
    pub fn connect(config: NetworkConfig) -> Result<Self> {
        let reader = AlloyChainReader::connect(&config.rpc_url)?;
        Ok(Self::new(config, Arc::new(reader)))
    }

    pub fn network(&self) -> Network {
        self.config.network
    }
}

impl std::fmt::Debug for ChainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainHandle")
            .field("network", &self.config.network)
            .field("rpc_url", &self.config.rpc_url)
            .finish()
    }
}
