//! JSON-RPC implementation of [`ChainReader`] on top of alloy providers.

use std::collections::HashMap;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use async_trait::async_trait;
use tracing::{debug, instrument};
use url::Url;

use super::reader::ChainReader;
use crate::config::Config;
use crate::error::{ChainError, FundingError};

/// Reader that talks to one HTTP endpoint per chain.
#[derive(Debug, Clone)]
pub struct RpcChainReader {
    endpoints: HashMap<u64, Url>,
}

impl RpcChainReader {
    /// Build from the configured RPC URLs.
    pub fn new(config: &Config) -> Result<Self, FundingError> {
        let mut endpoints = HashMap::new();
        for (chain_id, raw) in config.rpc_urls() {
            let url = Url::parse(raw).map_err(|e| {
                FundingError::InvalidConfig(format!("RPC URL for chain {}: {}", chain_id, e))
            })?;
            endpoints.insert(chain_id, url);
        }
        Ok(Self { endpoints })
    }

    /// Build from explicit endpoints.
    pub fn from_endpoints(endpoints: HashMap<u64, Url>) -> Self {
        Self { endpoints }
    }

    /// Endpoint for a chain.
    pub fn endpoint(&self, chain_id: u64) -> Result<Url, ChainError> {
        self.endpoints
            .get(&chain_id)
            .cloned()
            .ok_or(ChainError::UnsupportedChain { chain_id })
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    #[instrument(skip(self), fields(chain_id = chain_id, owner = %owner))]
    async fn get_native_balance(&self, chain_id: u64, owner: Address) -> Result<U256, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.endpoint(chain_id)?);

        let balance = provider
            .get_balance(owner)
            .await
            .map_err(|e| ChainError::Rpc {
                chain_id,
                reason: e.to_string(),
            })?;

        debug!(balance = %balance, "Native balance");
        Ok(balance)
    }

    #[instrument(skip(self, calldata), fields(chain_id = chain_id, to = %to))]
    async fn read_contract(
        &self,
        chain_id: u64,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, ChainError> {
        let provider = ProviderBuilder::new().connect_http(self.endpoint(chain_id)?);
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(calldata);

        provider.call(request).await.map_err(|e| ChainError::Rpc {
            chain_id,
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_knows_configured_chains() {
        let reader = RpcChainReader::new(&Config::default()).unwrap();
        assert!(reader.endpoint(8453).is_ok());
        assert!(reader.endpoint(137).is_ok());
    }

    #[tokio::test]
    async fn unknown_chain_is_rejected_without_network() {
        let reader = RpcChainReader::from_endpoints(HashMap::new());
        let err = reader
            .get_native_balance(8453, Address::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::UnsupportedChain { chain_id: 8453 }));
    }
}
