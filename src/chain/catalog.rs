//! Static catalog of funding sources and supported chains.

use alloy::primitives::{address, Address};
use once_cell::sync::Lazy;
use serde::Serialize;

/// Marker address for a chain's gas token.
pub const NATIVE_TOKEN: Address = Address::ZERO;

/// Chain IDs supported by the catalog.
pub mod chain_ids {
    /// Ethereum mainnet.
    pub const ETHEREUM: u64 = 1;
    /// Optimism.
    pub const OPTIMISM: u64 = 10;
    /// BNB Smart Chain.
    pub const BSC: u64 = 56;
    /// Polygon PoS.
    pub const POLYGON: u64 = 137;
    /// Base.
    pub const BASE: u64 = 8453;
    /// Arbitrum One.
    pub const ARBITRUM: u64 = 42161;
    /// Avalanche C-Chain.
    pub const AVALANCHE: u64 = 43114;
}

/// One chain + token funding choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceOption {
    /// Display label (e.g. "USDC on Base").
    pub label: &'static str,
    /// Chain the token lives on.
    pub chain_id: u64,
    /// Chain display name.
    pub chain_name: &'static str,
    /// Token contract, or [`NATIVE_TOKEN`] for the gas token.
    pub token_address: Address,
    /// Token symbol.
    pub token_symbol: &'static str,
    /// Token decimals.
    pub decimals: u8,
}

impl SourceOption {
    /// Whether this entry is the chain's gas token.
    pub fn is_native(&self) -> bool {
        self.token_address == NATIVE_TOKEN
    }
}

const fn source(
    label: &'static str,
    chain_id: u64,
    chain_name: &'static str,
    token_address: Address,
    token_symbol: &'static str,
    decimals: u8,
) -> SourceOption {
    SourceOption {
        label,
        chain_id,
        chain_name,
        token_address,
        token_symbol,
        decimals,
    }
}

/// Every funding option offered to the user, fixed at process start.
pub static SOURCE_CATALOG: Lazy<Vec<SourceOption>> = Lazy::new(|| {
    use chain_ids::*;

    vec![
        // Base
        source("USDC on Base", BASE, "Base", address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), "USDC", 6),
        source("ETH on Base", BASE, "Base", NATIVE_TOKEN, "ETH", 18),
        source("WETH on Base", BASE, "Base", address!("4200000000000000000000000000000000000006"), "WETH", 18),
        source("DAI on Base", BASE, "Base", address!("50c5725949A6F0c72E6C4a641F24049A917DB0Cb"), "DAI", 18),
        // Polygon
        source("USDC on Polygon", POLYGON, "Polygon", address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359"), "USDC", 6),
        source("USDT on Polygon", POLYGON, "Polygon", address!("c2132D05D31c914a87C6611C10748AEb04B58e8F"), "USDT", 6),
        source("POL on Polygon", POLYGON, "Polygon", NATIVE_TOKEN, "POL", 18),
        source("WETH on Polygon", POLYGON, "Polygon", address!("7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"), "WETH", 18),
        // Arbitrum
        source("USDC on Arbitrum", ARBITRUM, "Arbitrum", address!("af88d065e77c8cC2239327C5EDb3A432268e5831"), "USDC", 6),
        source("USDT on Arbitrum", ARBITRUM, "Arbitrum", address!("Fd086bC7CD5C481DCC9C85ebE478A1C0b69FCbb9"), "USDT", 6),
        source("ETH on Arbitrum", ARBITRUM, "Arbitrum", NATIVE_TOKEN, "ETH", 18),
        source("DAI on Arbitrum", ARBITRUM, "Arbitrum", address!("DA10009cBd5D07dd0CeCc66161FC93D7c9000da1"), "DAI", 18),
        // Ethereum
        source("ETH on Ethereum", ETHEREUM, "Ethereum", NATIVE_TOKEN, "ETH", 18),
        source("USDC on Ethereum", ETHEREUM, "Ethereum", address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), "USDC", 6),
        source("USDT on Ethereum", ETHEREUM, "Ethereum", address!("dAC17F958D2ee523a2206206994597C13D831ec7"), "USDT", 6),
        source("DAI on Ethereum", ETHEREUM, "Ethereum", address!("6B175474E89094C44Da98b954EedeAC495271d0F"), "DAI", 18),
        source("WETH on Ethereum", ETHEREUM, "Ethereum", address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), "WETH", 18),
        // Optimism
        source("ETH on Optimism", OPTIMISM, "Optimism", NATIVE_TOKEN, "ETH", 18),
        source("USDC on Optimism", OPTIMISM, "Optimism", address!("0b2C639c533813f4Aa9D7837CAf62653d097Ff85"), "USDC", 6),
        source("USDT on Optimism", OPTIMISM, "Optimism", address!("94b008aA00579c1307B0EF2c499aD98a8ce58e58"), "USDT", 6),
        // Avalanche
        source("AVAX on Avalanche", AVALANCHE, "Avalanche", NATIVE_TOKEN, "AVAX", 18),
        source("USDC on Avalanche", AVALANCHE, "Avalanche", address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E"), "USDC", 6),
        // BSC
        source("BNB on BSC", BSC, "BSC", NATIVE_TOKEN, "BNB", 18),
        source("USDT on BSC", BSC, "BSC", address!("55d398326f99059fF775485246999027B3197955"), "USDT", 18),
        source("USDC on BSC", BSC, "BSC", address!("8AC76a51cc950d9822D68b83fE1Ad97B32Cd580d"), "USDC", 18),
    ]
});

/// Display name for a supported chain.
pub fn chain_name(chain_id: u64) -> &'static str {
    match chain_id {
        chain_ids::ETHEREUM => "Ethereum",
        chain_ids::OPTIMISM => "Optimism",
        chain_ids::BSC => "BSC",
        chain_ids::POLYGON => "Polygon",
        chain_ids::BASE => "Base",
        chain_ids::ARBITRUM => "Arbitrum",
        chain_ids::AVALANCHE => "Avalanche",
        _ => "Unknown",
    }
}

/// Block explorer link for a transaction, if the chain is known.
pub fn explorer_tx_url(chain_id: u64, tx_hash: &str) -> Option<String> {
    let base = match chain_id {
        chain_ids::ETHEREUM => "https://etherscan.io",
        chain_ids::OPTIMISM => "https://optimistic.etherscan.io",
        chain_ids::BSC => "https://bscscan.com",
        chain_ids::POLYGON => "https://polygonscan.com",
        chain_ids::BASE => "https://basescan.org",
        chain_ids::ARBITRUM => "https://arbiscan.io",
        chain_ids::AVALANCHE => "https://snowtrace.io",
        _ => return None,
    };
    Some(format!("{}/tx/{}", base, tx_hash))
}

/// Look up a catalog entry by index.
pub fn source_at(index: usize) -> Option<&'static SourceOption> {
    SOURCE_CATALOG.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_covers_seven_chains() {
        let chains: HashSet<u64> = SOURCE_CATALOG.iter().map(|s| s.chain_id).collect();
        assert_eq!(chains.len(), 7);
        for chain in chains {
            assert_ne!(chain_name(chain), "Unknown");
            assert!(explorer_tx_url(chain, "0xabc").is_some());
        }
    }

    #[test]
    fn every_chain_lists_its_gas_token_once() {
        let natives: Vec<_> = SOURCE_CATALOG.iter().filter(|s| s.is_native()).collect();
        let chains: HashSet<u64> = natives.iter().map(|s| s.chain_id).collect();
        assert_eq!(natives.len(), chains.len());
        assert!(natives.iter().all(|s| s.decimals == 18));
    }

    #[test]
    fn labels_are_unique() {
        let labels: HashSet<&str> = SOURCE_CATALOG.iter().map(|s| s.label).collect();
        assert_eq!(labels.len(), SOURCE_CATALOG.len());
    }

    #[test]
    fn explorer_link_format() {
        assert_eq!(
            explorer_tx_url(chain_ids::BASE, "0x01").as_deref(),
            Some("https://basescan.org/tx/0x01")
        );
        assert_eq!(explorer_tx_url(999, "0x01"), None);
    }
}
