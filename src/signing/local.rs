//! Private-key wallet used by the CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use tracing::{debug, info, instrument};
use url::Url;

use super::{create_signer, TxRequest, WalletSigner};
use crate::chain::RpcChainReader;
use crate::error::WalletError;

/// Wallet that signs locally and submits over the configured RPC endpoints.
#[derive(Debug)]
pub struct LocalWallet {
    signer: PrivateKeySigner,
    rpc: RpcChainReader,
    active_chain: AtomicU64,
}

impl LocalWallet {
    /// Create a wallet from a hex private key.
    pub fn new(private_key: &str, rpc: RpcChainReader, initial_chain: u64) -> Result<Self, WalletError> {
        Ok(Self {
            signer: create_signer(private_key)?,
            rpc,
            active_chain: AtomicU64::new(initial_chain),
        })
    }

    /// Build from explicit endpoints.
    pub fn with_endpoints(
        private_key: &str,
        endpoints: HashMap<u64, Url>,
        initial_chain: u64,
    ) -> Result<Self, WalletError> {
        Self::new(private_key, RpcChainReader::from_endpoints(endpoints), initial_chain)
    }

    /// Chain the wallet is currently pointed at.
    pub fn active_chain(&self) -> u64 {
        self.active_chain.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.rpc
            .endpoint(chain_id)
            .map_err(|e| WalletError::SwitchChain {
                chain_id,
                reason: e.to_string(),
            })?;

        let previous = self.active_chain.swap(chain_id, Ordering::SeqCst);
        if previous != chain_id {
            debug!(from = previous, to = chain_id, "Switched chain");
        }
        Ok(())
    }

    #[instrument(skip(self, tx), fields(chain_id = tx.chain_id, to = %tx.to))]
    async fn sign_and_send(&self, tx: TxRequest) -> Result<String, WalletError> {
        if tx.chain_id != self.active_chain() {
            return Err(WalletError::Submission(format!(
                "wallet is on chain {}, transaction targets chain {}",
                self.active_chain(),
                tx.chain_id
            )));
        }

        let url = self
            .rpc
            .endpoint(tx.chain_id)
            .map_err(|e| WalletError::Submission(e.to_string()))?;

        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new().wallet(wallet).connect_http(url);

        let mut request = TransactionRequest::default()
            .with_from(self.signer.address())
            .with_to(tx.to)
            .with_input(tx.data)
            .with_value(tx.value)
            .with_chain_id(tx.chain_id);
        if let Some(gas) = tx.gas_limit {
            request = request.with_gas_limit(gas);
        }

        let pending = provider
            .send_transaction(request)
            .await
            .map_err(|e| WalletError::Submission(e.to_string()))?;

        let receipt = pending
            .get_receipt()
            .await
            .map_err(|e| WalletError::Submission(format!("Failed to get receipt: {}", e)))?;

        let tx_hash = format!("{:?}", receipt.transaction_hash);

        if !receipt.status() {
            return Err(WalletError::Reverted { tx_hash });
        }

        info!(tx_hash = %tx_hash, "Transaction confirmed");
        Ok(tx_hash)
    }
}
