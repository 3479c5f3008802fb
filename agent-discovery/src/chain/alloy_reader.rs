//! JSON-RPC chain reader backed by alloy

use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter};
use async_trait::async_trait;
use tracing::debug;

use super::abi::{IIdentityRegistry, ILegacyReputationRegistry, IReputationRegistry};
use super::{ChainReader, LogQuery, RawLog, RawReputation};
use crate::config::ReputationSchema;
use crate::error::{ChainError, DiscoveryError, Result};
use crate::types::TokenId;

/// [`ChainReader`] over an HTTP JSON-RPC endpoint
#[derive(Clone)]
pub struct AlloyChainReader {
    provider: DynProvider,
}

impl AlloyChainReader {
    /// Build a reader for `rpc_url`; no request is made until first use
    pub fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse()
            .map_err(|e| DiscoveryError::Config(format!("Invalid RPC URL '{}': {}", rpc_url, e)))?;
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Ok(Self { provider })
    }
}

/// JSON-RPC error code geth and compatible nodes use for a reverted call
const EXECUTION_REVERTED: i64 = 3;

// A revert is the only outcome that means "no such token"; it must come from
// the node, never from the transport or from decoding.
fn classify_call_error(err: alloy::contract::Error) -> ChainError {
    use alloy::contract::Error;

    match &err {
        Error::ZeroData(..) | Error::AbiError(_) | Error::UnknownFunction(_) | Error::UnknownSelector(_) => {
            ChainError::Decode(err.to_string())
        }
        Error::TransportError(transport) => match transport.as_error_resp() {
            Some(payload)
                if payload.code == EXECUTION_REVERTED
                    || payload.as_revert_data().is_some()
                    || payload.message.starts_with("execution reverted") =>
            {
                ChainError::Reverted(payload.message.to_string())
            }
            _ => ChainError::Transport(err.to_string()),
        },
        _ => ChainError::Transport(err.to_string()),
    }
}

#[async_trait]
impl ChainReader for AlloyChainReader {
    async fn block_number(&self) -> std::result::Result<u64, ChainError> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    async fn get_logs(&self, query: &LogQuery) -> std::result::Result<Vec<RawLog>, ChainError> {
        let mut filter = Filter::new()
            .address(query.address)
            .event_signature(query.event_signature)
            .from_block(BlockNumberOrTag::Number(query.from_block))
            .to_block(BlockNumberOrTag::Number(query.to_block));
        if let Some(topic1) = query.topic1 {
            filter = filter.topic1(topic1);
        }

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        debug!(
            from = query.from_block,
            to = query.to_block,
            count = logs.len(),
            "eth_getLogs"
        );

        Ok(logs
            .into_iter()
            .map(|log| RawLog {
                topics: log.topics().to_vec(),
                block_number: log.block_number,
            })
            .collect())
    }

    async fn token_uri(&self, registry: Address, token_id: TokenId) -> std::result::Result<String, ChainError> {
        IIdentityRegistry::new(registry, self.provider.clone())
            .tokenURI(U256::from(token_id))
            .call()
            .await
            .map_err(classify_call_error)
    }

    async fn owner_of(&self, registry: Address, token_id: TokenId) -> std::result::Result<Address, ChainError> {
        IIdentityRegistry::new(registry, self.provider.clone())
            .ownerOf(U256::from(token_id))
            .call()
            .await
            .map_err(classify_call_error)
    }

    async fn reputation_summary(
        &self,
        registry: Address,
        agent_id: TokenId,
        schema: ReputationSchema,
    ) -> std::result::Result<RawReputation, ChainError> {
        let agent_id = U256::from(agent_id);

        match schema {
            ReputationSchema::Legacy => {
                let summary = ILegacyReputationRegistry::new(registry, self.provider.clone())
                    .getSummary(agent_id, Vec::new(), B256::ZERO, B256::ZERO)
                    .call()
                    .await
                    .map_err(classify_call_error)?;
                Ok(RawReputation::Legacy {
                    count: summary.count,
                    average_score: summary.averageScore,
                })
            }
            ReputationSchema::Decimal => {
                let summary = IReputationRegistry::new(registry, self.provider.clone())
                    .getSummary(agent_id, Vec::new(), String::new(), String::new())
                    .call()
                    .await
                    .map_err(classify_call_error)?;
                Ok(RawReputation::Decimal {
                    count: summary.count,
                    value: summary.summaryValue,
                    decimals: summary.summaryValueDecimals,
                })
            }
        }
    }
}
