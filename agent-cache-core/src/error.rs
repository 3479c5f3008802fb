//! Error types for cache storage

use thiserror::Error;

/// Errors raised by a [`KeyValueStore`](crate::KeyValueStore) backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing the value would exceed the store's capacity
    #[error("Quota exceeded: need {needed} bytes, {available} available")]
    QuotaExceeded { needed: usize, available: usize },

    /// Filesystem error from a persistent backend
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key cannot be represented by the backend
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

/// Errors raised while encoding or decoding cache entries
#[derive(Debug, Error)]
pub enum CacheError {
    /// Underlying store failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Entry could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
