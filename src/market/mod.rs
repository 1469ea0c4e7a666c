//! Market module for YES/NO prediction markets.
//!
//! This module handles:
//! - Side and market identity types
//! - The destination settlement asset
//! - ABI encoding for the market contract and ERC20 tokens

pub mod contract;
pub mod types;

pub use types::{Destination, MarketTarget, Side, PLACEHOLDER_MARKET};
