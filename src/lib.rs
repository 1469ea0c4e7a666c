//! Cross-chain position funding for the Pulse prediction market.
//!
//! A YES/NO position settles in one token on one chain. This library lets a
//! wallet pay for it with whatever it holds elsewhere: it scans every
//! supported chain/token pair, picks the cheapest source that covers the
//! amount, quotes a plan, executes it while reporting progress step by step,
//! and finally confirms on-chain that the position arrived.
//!
//! ```text
//! USDC on Base      ──────────────────────────────▶ approve + buyFor   (direct)
//! ETH on Ethereum   ── swap & bridge (LI.FI) ─────▶ approve + buyFor   (routed)
//! USDT on Arbitrum  ── swap & bridge + buyFor ────▶                    (routed, embedded)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`chain`]: Source catalog, RPC reader and in-memory test doubles
//! - [`market`]: Side, market identity and contract ABI
//! - [`signing`]: Wallet port and the local private-key wallet
//! - [`routing`]: Routing engine port and the LI.FI client
//! - [`funding`]: Scanner, selector, quoting, execution, verification
//! - [`trading`]: Trade log and position closes
//! - [`api`]: HTTP API for health, metrics and read-only scans
//! - [`metrics`]: Prometheus metric names and helpers

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod funding;
pub mod market;
pub mod metrics;
pub mod routing;
pub mod signing;
pub mod trading;

pub use config::Config;
pub use error::{FundingError, Result};
