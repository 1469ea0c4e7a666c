//! Read-only chain access used by scanning and verification.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use super::catalog::SourceOption;
use crate::error::ChainError;
use crate::market::contract;
use crate::market::Side;

/// Read-only RPC access across every supported chain.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Gas-token balance of `owner` on `chain_id`.
    async fn get_native_balance(&self, chain_id: u64, owner: Address) -> Result<U256, ChainError>;

    /// Execute a view call and return the raw return data.
    async fn read_contract(
        &self,
        chain_id: u64,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, ChainError>;
}

/// ERC20 `balanceOf` on `token`.
pub async fn erc20_balance(
    reader: &dyn ChainReader,
    chain_id: u64,
    token: Address,
    owner: Address,
) -> Result<U256, ChainError> {
    let data = reader
        .read_contract(chain_id, token, contract::balance_of_calldata(owner))
        .await?;
    contract::decode_balance(&data)
}

/// Balance of a catalog entry, native or ERC20.
pub async fn source_balance(
    reader: &dyn ChainReader,
    source: &SourceOption,
    owner: Address,
) -> Result<U256, ChainError> {
    if source.is_native() {
        reader.get_native_balance(source.chain_id, owner).await
    } else {
        erc20_balance(reader, source.chain_id, source.token_address, owner).await
    }
}

/// Address of the YES or NO position token of a market.
pub async fn position_token(
    reader: &dyn ChainReader,
    chain_id: u64,
    market: Address,
    side: Side,
) -> Result<Address, ChainError> {
    let data = reader
        .read_contract(chain_id, market, contract::position_token_calldata(side))
        .await?;
    contract::decode_position_token(&data)
}

/// Position-token balance of `owner` for one side of a market.
pub async fn position_balance(
    reader: &dyn ChainReader,
    chain_id: u64,
    market: Address,
    side: Side,
    owner: Address,
) -> Result<U256, ChainError> {
    let token = position_token(reader, chain_id, market, side).await?;
    erc20_balance(reader, chain_id, token, owner).await
}
