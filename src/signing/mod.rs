//! Wallet signing capability.
//!
//! The orchestrator never holds key material itself: every transaction goes
//! through a [`WalletSigner`] injected at flow start. This module provides:
//! - The signer port and its transaction request type
//! - Private-key parsing helpers
//! - A local private-key wallet for the CLI

pub mod local;

use alloy::primitives::{Address, Bytes, U256};
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;

use crate::error::WalletError;

pub use local::LocalWallet;

/// Transaction handed to the wallet for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRequest {
    /// Chain to submit on.
    pub chain_id: u64,
    /// Target contract.
    pub to: Address,
    /// Calldata.
    pub data: Bytes,
    /// Native value attached.
    pub value: U256,
    /// Optional explicit gas limit.
    pub gas_limit: Option<u64>,
}

impl TxRequest {
    /// Contract call without native value.
    pub fn call(chain_id: u64, to: Address, data: Bytes) -> Self {
        Self {
            chain_id,
            to,
            data,
            value: U256::ZERO,
            gas_limit: None,
        }
    }
}

/// Connected wallet able to switch chains and submit transactions.
///
/// `sign_and_send` resolves once the node has acknowledged the transaction
/// with a successful receipt; a reverted receipt is [`WalletError::Reverted`].
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address that owns funds and resulting positions.
    fn address(&self) -> Address;

    /// Move the wallet to `chain_id`; may wait on user approval.
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Sign, submit and wait for the transaction; returns its hash.
    async fn sign_and_send(&self, tx: TxRequest) -> Result<String, WalletError>;
}

/// Create a LocalSigner from a hex-encoded private key.
///
/// The private key can be with or without the "0x" prefix.
pub fn create_signer(private_key: &str) -> Result<PrivateKeySigner, WalletError> {
    let key = private_key.strip_prefix("0x").unwrap_or(private_key);
    let bytes = hex::decode(key)
        .map_err(|e| WalletError::Signing(format!("Invalid private key hex: {}", e)))?;

    if bytes.len() != 32 {
        return Err(WalletError::Signing(format!(
            "Private key must be 32 bytes, got {}",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&bytes);

    PrivateKeySigner::from_bytes(&key_bytes.into())
        .map_err(|e| WalletError::Signing(format!("Failed to create signer: {}", e)))
}

/// Get the wallet address from a private key.
pub fn address_from_private_key(private_key: &str) -> Result<Address, WalletError> {
    Ok(create_signer(private_key)?.address())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn create_signer_valid_key() {
        assert!(create_signer(TEST_KEY).is_ok());
    }

    #[test]
    fn create_signer_without_prefix() {
        assert!(create_signer(&TEST_KEY[2..]).is_ok());
    }

    #[test]
    fn create_signer_invalid_hex() {
        assert!(create_signer("0xnot_valid_hex").is_err());
    }

    #[test]
    fn create_signer_wrong_length() {
        assert!(create_signer("0x1234").is_err());
    }

    #[test]
    fn address_is_stable() {
        let first = address_from_private_key(TEST_KEY).unwrap();
        let second = address_from_private_key(&TEST_KEY[2..]).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, Address::ZERO);
    }

    #[test]
    fn call_request_has_no_value() {
        let tx = TxRequest::call(8453, Address::ZERO, Bytes::new());
        assert_eq!(tx.value, U256::ZERO);
        assert_eq!(tx.gas_limit, None);
    }
}
