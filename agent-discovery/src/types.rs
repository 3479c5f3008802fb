//! Core discovery types

use alloy::primitives::Address;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::Network;

/// Identifier of a minted agent NFT on one chain
pub type TokenId = u64;

/// A Transfer log from the zero address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MintEvent {
    pub token_id: TokenId,
    /// Recipient of the mint
    pub to: Address,
}

/// Off-chain agent registration document
///
/// Only `name`, `description` and `image` are expected; everything else is
/// optional and unknown fields are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: String,
    /// Application-scoped agent number, used for relevance classification
    #[serde(
        default,
        alias = "agentNumber",
        deserialize_with = "lenient_u64",
        skip_serializing_if = "Option::is_none"
    )]
    pub agent_number: Option<u64>,
    /// Free-text price, as entered by the agent's creator
    #[serde(
        default,
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

// Creators write numbers as either JSON numbers or strings
fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// An agent token resolved from the identity registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredAgent {
    pub agent_id: TokenId,
    pub owner: Address,
    pub metadata_uri: String,
    pub metadata: Option<AgentMetadata>,
    pub is_relevant: bool,
    pub network: Network,
}

impl RegisteredAgent {
    /// Metadata name, or a placeholder built from the token id
    pub fn display_name(&self) -> String {
        match &self.metadata {
            Some(m) if !m.name.trim().is_empty() => m.name.clone(),
            _ => format!("Agent #{}", self.agent_id),
        }
    }
}

/// Aggregate feedback for one agent, normalized to a 0-100 score
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationSummary {
    pub count: u64,
    pub score: u8,
}

impl ReputationSummary {
    /// No feedback yet
    pub const NONE: ReputationSummary = ReputationSummary { count: 0, score: 0 };

    pub fn has_feedback(&self) -> bool {
        self.count > 0
    }
}

/// A surfaced agent with its reputation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentListing {
    pub agent: RegisteredAgent,
    pub reputation: ReputationSummary,
}

/// Result of a lookup that is allowed to come back empty
///
/// `Absent` is the expected "not ours / does not exist" case; `Failed`
/// marks an infrastructure problem. Both surface as `None` to callers,
/// but are counted separately.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Found(T),
    Absent,
    Failed(String),
}

impl<T> Outcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Outcome::Found(value) => Some(value),
            Outcome::Absent | Outcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_accepts_string_numbers() {
        let json = r#"{
            "name": "Scout",
            "description": "Finds things",
            "image": "ipfs://bafy/scout.png",
            "agentNumber": "42",
            "price": 0.05,
            "services": [{"name": "A2A"}]
        }"#;

        let metadata: AgentMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.agent_number, Some(42));
        assert_eq!(metadata.price.as_deref(), Some("0.05"));
        assert!(metadata.extra.contains_key("services"));
    }

    #[test]
    fn test_metadata_tolerates_missing_fields() {
        let metadata: AgentMetadata = serde_json::from_str(r#"{"agent_number": null}"#).unwrap();
        assert_eq!(metadata.name, "");
        assert_eq!(metadata.agent_number, None);
    }

    #[test]
    fn test_display_name_fallback() {
        let agent = RegisteredAgent {
            agent_id: 17,
            owner: Address::ZERO,
            metadata_uri: String::new(),
            metadata: None,
            is_relevant: false,
            network: Network::BaseSepolia,
        };
        assert_eq!(agent.display_name(), "Agent #17");
    }
}
