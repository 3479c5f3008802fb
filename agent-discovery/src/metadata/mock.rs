//! In-memory metadata source for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use super::MetadataFetcher;
use crate::error::FetchError;
use crate::types::AgentMetadata;

/// Mock metadata fetcher for testing.
///
/// Serves documents keyed by the exact token URI. Unknown URIs answer
/// `FetchError::Status(404)`, like a gateway with nothing pinned.
#[derive(Default)]
pub struct MockMetadata {
    documents: HashMap<String, Result<AgentMetadata, FetchError>>,
    fetch_count: AtomicU32,
}

impl MockMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `metadata` for `uri`.
    pub fn with_document(mut self, uri: impl Into<String>, metadata: AgentMetadata) -> Self {
        self.documents.insert(uri.into(), Ok(metadata));
        self
    }

    /// Fail every fetch of `uri` with `error`.
    pub fn with_error(mut self, uri: impl Into<String>, error: FetchError) -> Self {
        self.documents.insert(uri.into(), Err(error));
        self
    }

    /// Get the number of times fetch was called.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataFetcher for MockMetadata {
    async fn fetch(&self, uri: &str) -> Result<AgentMetadata, FetchError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.documents
            .get(uri)
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}
