//! Trading module for position records and closes.
//!
//! This module handles:
//! - The local trade log
//! - Selling position tokens back to the market

pub mod log;
pub mod withdraw;

pub use log::{JsonFileTradeLog, MemoryTradeLog, TradeKind, TradeLog, TradeRecord};
pub use withdraw::{SellOutcome, SellRequest, Withdrawer};
