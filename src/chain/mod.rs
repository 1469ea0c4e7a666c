//! Chain access for the funding orchestrator.
//!
//! This module handles:
//! - The static source catalog and chain metadata
//! - Decimal and base-unit conversions
//! - The read-only [`ChainReader`] port and its RPC implementation
//! - Scriptable doubles for every external port

pub mod catalog;
pub mod mock;
pub mod reader;
pub mod rpc;
pub mod units;

pub use catalog::{chain_name, explorer_tx_url, SourceOption, NATIVE_TOKEN, SOURCE_CATALOG};
pub use mock::{MockChainReader, MockFailure, MockRouter, MockWallet, TxMatch};
pub use reader::ChainReader;
pub use rpc::RpcChainReader;
