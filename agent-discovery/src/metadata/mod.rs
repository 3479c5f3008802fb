//! Off-chain agent metadata
//!
//! A [`MetadataFetcher`] turns a token URI into an [`AgentMetadata`]
//! document. Every failure is reported as a [`FetchError`]; callers in the
//! pipeline treat any error as "no metadata".

pub mod mock;
mod uri;

use async_trait::async_trait;
use tracing::debug;

use crate::config::MetadataSettings;
use crate::error::FetchError;
use crate::types::AgentMetadata;

pub use mock::MockMetadata;
pub use uri::{resolve_uri, ResolvedUri};

/// Source of agent metadata documents
#[async_trait]
pub trait MetadataFetcher: Send + Sync {
    /// Fetch and decode the document addressed by `uri`
    async fn fetch(&self, uri: &str) -> Result<AgentMetadata, FetchError>;
}

/// Fetches metadata over HTTP, rewriting content-addressed URIs through
/// the configured gateways
#[derive(Clone)]
pub struct HttpMetadataFetcher {
    client: reqwest::Client,
    settings: MetadataSettings,
}

impl HttpMetadataFetcher {
    /// Client with the configured per-request timeout
    pub fn new(settings: &MetadataSettings) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .user_agent(concat!("agent-discovery/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, settings))
    }

    /// Use a preconfigured client
    pub fn with_client(client: reqwest::Client, settings: &MetadataSettings) -> Self {
        Self {
            client,
            settings: settings.clone(),
        }
    }
}

#[async_trait]
impl MetadataFetcher for HttpMetadataFetcher {
    async fn fetch(&self, uri: &str) -> Result<AgentMetadata, FetchError> {
        let url = match resolve_uri(uri, &self.settings)? {
            ResolvedUri::Inline(bytes) => return Ok(serde_json::from_slice(&bytes)?),
            ResolvedUri::Http(url) => url,
        };

        debug!(uri = %uri, url = %url, "Fetching agent metadata");

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
