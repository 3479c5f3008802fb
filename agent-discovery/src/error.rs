//! Error types for agent discovery

use thiserror::Error;

/// Result type for discovery operations
pub type Result<T> = std::result::Result<T, DiscoveryError>;

/// Top-level discovery error
///
/// Only conditions the pipeline cannot degrade around reach this type:
/// bad configuration, or a chain that cannot even report its height.
/// Missing tokens, metadata and reputation never do.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chain RPC failure that left nothing to work with
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Metadata client could not be constructed
    #[error("Metadata error: {0}")]
    Metadata(#[from] FetchError),

    /// Failed to read a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a configuration file
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Cache backend could not be opened
    #[error("Cache error: {0}")]
    Cache(#[from] agent_cache_core::StoreError),
}

/// Errors from a [`ChainReader`](crate::chain::ChainReader)
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// RPC transport failure, rate limiting, malformed response
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The contract call reverted (e.g. token does not exist)
    #[error("Call reverted: {0}")]
    Reverted(String),

    /// Returned data could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Errors from a [`MetadataFetcher`](crate::metadata::MetadataFetcher)
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// URI scheme the fetcher cannot resolve
    #[error("Unsupported metadata URI: {0}")]
    UnsupportedUri(String),

    /// Request exceeded the configured timeout
    #[error("Metadata request timed out")]
    Timeout,

    /// Gateway answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Connection or protocol failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Body was not a metadata JSON document
    #[error("Decode error: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
