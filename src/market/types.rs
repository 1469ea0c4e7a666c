//! Market-related types for YES/NO prediction markets.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Market address used before a real market contract is deployed.
pub const PLACEHOLDER_MARKET: Address = address!("0000000000000000000000000000000000000001");

/// Position side for binary markets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// YES outcome.
    #[strum(to_string = "YES", serialize = "yes", serialize = "Yes")]
    #[default]
    Yes,
    /// NO outcome.
    #[strum(to_string = "NO", serialize = "no", serialize = "No")]
    No,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Yes => Side::No,
            Side::No => Side::Yes,
        }
    }

    /// Boolean flag expected by the market contract.
    pub fn is_yes(&self) -> bool {
        matches!(self, Side::Yes)
    }
}

/// Market a position is opened against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketTarget {
    /// Market identifier used by the UI and the trade log.
    pub id: String,
    /// Market contract on the destination chain.
    pub address: Address,
    /// Market question text.
    pub question: Option<String>,
}

impl MarketTarget {
    /// Market backed by a deployed contract; its ID is the contract address.
    pub fn deployed(address: Address) -> Self {
        Self {
            id: address.to_string(),
            address,
            question: None,
        }
    }

    /// Market without a deployed contract (mock listing).
    pub fn placeholder(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: PLACEHOLDER_MARKET,
            question: None,
        }
    }

    /// Attach the question text.
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    /// Whether the market has no real contract yet.
    pub fn is_placeholder(&self) -> bool {
        self.address == PLACEHOLDER_MARKET
    }
}

/// Settlement asset on the destination chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    /// Chain where markets settle.
    pub chain_id: u64,
    /// Token the market contract accepts.
    pub settlement_token: Address,
    /// Symbol of the settlement token.
    pub settlement_symbol: String,
    /// Decimals of the settlement token (position tokens use the same).
    pub settlement_decimals: u8,
}

impl Destination {
    /// Whether `chain_id`/`token` is exactly the settlement asset.
    pub fn is_settlement_asset(&self, chain_id: u64, token: Address) -> bool {
        chain_id == self.chain_id && token == self.settlement_token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn side_opposite_works() {
        assert_eq!(Side::Yes.opposite(), Side::No);
        assert_eq!(Side::No.opposite(), Side::Yes);
    }

    #[test]
    fn side_from_string_works() {
        assert_eq!(Side::from_str("yes").unwrap(), Side::Yes);
        assert_eq!(Side::from_str("NO").unwrap(), Side::No);
        assert!(Side::from_str("maybe").is_err());
        assert_eq!(Side::No.to_string(), "NO");
    }

    #[test]
    fn placeholder_detection() {
        assert!(MarketTarget::placeholder("mock-1").is_placeholder());
        assert!(!MarketTarget::deployed(Address::repeat_byte(0xab)).is_placeholder());
    }

    #[test]
    fn settlement_asset_requires_chain_and_token() {
        let destination = Destination {
            chain_id: 8453,
            settlement_token: Address::repeat_byte(1),
            settlement_symbol: "USDC".to_string(),
            settlement_decimals: 6,
        };

        assert!(destination.is_settlement_asset(8453, Address::repeat_byte(1)));
        assert!(!destination.is_settlement_asset(137, Address::repeat_byte(1)));
        assert!(!destination.is_settlement_asset(8453, Address::repeat_byte(2)));
    }
}
