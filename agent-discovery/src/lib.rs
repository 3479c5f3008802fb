//! Agent Discovery - On-chain agent discovery and caching
//!
//! Finds the AI agents registered through this application on a shared
//! ERC-8004 style identity registry, resolves their off-chain metadata and
//! enriches them with reputation scores:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            AgentDirectory               │
//! │     (TTL cache in front of pipeline)    │
//! └────────────────┬────────────────────────┘
//!                  │ cache miss
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────────┐ ┌──────────────────┐
//! │ Mint     │→│ Agent        │→│ Reputation       │
//! │ Scanner  │ │ Resolver     │ │ Enricher         │
//! └────┬─────┘ └──────┬───────┘ └────────┬─────────┘
//!      │              │  batched         │ batched
//!      ▼              ▼                  ▼
//!   ChainReader   MetadataFetcher    ChainReader
//! ```
//!
//! The chain and metadata sources are traits; [`chain::MockChain`] and
//! [`metadata::MockMetadata`] stand in for them in tests. Every component
//! degrades instead of failing: a failed log chunk, an unresolvable token,
//! missing metadata or an unreadable reputation shrink the result, and only
//! misconfiguration or an unreadable chain head surface as errors.

pub mod batch;
pub mod chain;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod metadata;
pub mod reputation;
pub mod resolver;
pub mod retry;
pub mod scanner;
pub mod stats;
pub mod types;

pub use batch::{batch_process, BatchSettings};
pub use chain::{AlloyChainReader, ChainHandle, ChainReader, MockChain, RawReputation};
pub use config::{DiscoveryConfig, Network, NetworkConfig, ReputationSchema};
pub use directory::AgentDirectory;
pub use error::{ChainError, DiscoveryError, FetchError, Result};
pub use metadata::{HttpMetadataFetcher, MetadataFetcher, MockMetadata};
pub use reputation::{normalize, ReputationEnricher};
pub use resolver::{AgentResolver, RelevanceRule};
pub use retry::{delay, retry, RetryPolicy};
pub use scanner::MintScanner;
pub use stats::{PipelineStats, StatsSnapshot};
pub use types::*;
