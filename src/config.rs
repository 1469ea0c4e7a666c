//! Application configuration loaded from environment variables.

use std::time::Duration;

use alloy::primitives::Address;
use serde::Deserialize;

use crate::chain::catalog::chain_ids;
use crate::error::FundingError;
use crate::funding::verify::VerifyConfig;
use crate::market::Destination;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Wallet ===
    /// Wallet private key (hex, starts with 0x). Only needed for signing commands.
    #[serde(default)]
    pub wallet_private_key: Option<String>,

    // === Destination ===
    /// Chain where markets settle.
    #[serde(default = "default_destination_chain")]
    pub destination_chain_id: u64,

    /// Settlement token address on the destination chain.
    #[serde(default = "default_settlement_token")]
    pub settlement_token: String,

    /// Settlement token symbol.
    #[serde(default = "default_settlement_symbol")]
    pub settlement_symbol: String,

    /// Settlement token decimals.
    #[serde(default = "default_settlement_decimals")]
    pub settlement_decimals: u8,

    // === RPC Endpoints ===
    /// Base RPC URL.
    #[serde(default = "default_rpc_base")]
    pub rpc_url_base: String,

    /// Polygon RPC URL.
    #[serde(default = "default_rpc_polygon")]
    pub rpc_url_polygon: String,

    /// Arbitrum RPC URL.
    #[serde(default = "default_rpc_arbitrum")]
    pub rpc_url_arbitrum: String,

    /// Ethereum RPC URL.
    #[serde(default = "default_rpc_ethereum")]
    pub rpc_url_ethereum: String,

    /// Optimism RPC URL.
    #[serde(default = "default_rpc_optimism")]
    pub rpc_url_optimism: String,

    /// Avalanche RPC URL.
    #[serde(default = "default_rpc_avalanche")]
    pub rpc_url_avalanche: String,

    /// BSC RPC URL.
    #[serde(default = "default_rpc_bsc")]
    pub rpc_url_bsc: String,

    // === Routing Engine ===
    /// LI.FI API base URL.
    #[serde(default = "default_lifi_url")]
    pub lifi_api_url: String,

    /// Integrator string sent with every LI.FI request.
    #[serde(default = "default_integrator")]
    pub lifi_integrator: String,

    /// Optional LI.FI API key.
    #[serde(default)]
    pub lifi_api_key: Option<String>,

    /// Interval between LI.FI status polls.
    #[serde(default = "default_route_poll_ms")]
    pub route_status_poll_ms: u64,

    /// Maximum LI.FI status polls per leg.
    #[serde(default = "default_route_max_polls")]
    pub route_status_max_polls: u32,

    // === Scanning ===
    /// Per-entry balance query timeout.
    #[serde(default = "default_balance_timeout")]
    pub balance_query_timeout_ms: u64,

    /// Debounce applied before each scan refresh.
    #[serde(default = "default_scan_debounce")]
    pub scan_debounce_ms: u64,

    // === Verification ===
    /// Number of position balance reads after settlement.
    #[serde(default = "default_verify_attempts")]
    pub verify_max_attempts: u32,

    /// Delay between verification reads.
    #[serde(default = "default_verify_interval")]
    pub verify_interval_ms: u64,

    // === Execution ===
    /// Gas limit attached to the embedded settlement call.
    #[serde(default = "default_gas_limit")]
    pub settlement_gas_limit: u64,

    /// HTTP timeout for routing engine requests.
    #[serde(default = "default_http_timeout")]
    pub http_timeout_ms: u64,

    /// Directory holding per-owner trade logs.
    #[serde(default = "default_trade_log_dir")]
    pub trade_log_dir: String,

    // === Server Configuration ===
    /// HTTP server port for the read-only API.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_destination_chain() -> u64 {
    chain_ids::BASE
}

fn default_settlement_token() -> String {
    "0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913".to_string() // USDC on Base
}

fn default_settlement_symbol() -> String {
    "USDC".to_string()
}

fn default_settlement_decimals() -> u8 {
    6
}

fn default_rpc_base() -> String {
    "https://base.publicnode.com".to_string()
}

fn default_rpc_polygon() -> String {
    "https://polygon-bor-rpc.publicnode.com".to_string()
}

fn default_rpc_arbitrum() -> String {
    "https://arbitrum-one-rpc.publicnode.com".to_string()
}

fn default_rpc_ethereum() -> String {
    "https://ethereum-rpc.publicnode.com".to_string()
}

fn default_rpc_optimism() -> String {
    "https://optimism-rpc.publicnode.com".to_string()
}

fn default_rpc_avalanche() -> String {
    "https://avalanche-c-chain-rpc.publicnode.com".to_string()
}

fn default_rpc_bsc() -> String {
    "https://bsc-rpc.publicnode.com".to_string()
}

fn default_lifi_url() -> String {
    "https://li.quest/v1".to_string()
}

fn default_integrator() -> String {
    "pulse-prediction-market".to_string()
}

fn default_route_poll_ms() -> u64 {
    5_000
}

fn default_route_max_polls() -> u32 {
    120
}

fn default_balance_timeout() -> u64 {
    8_000
}

fn default_scan_debounce() -> u64 {
    400
}

fn default_verify_attempts() -> u32 {
    10
}

fn default_verify_interval() -> u64 {
    3_000
}

fn default_gas_limit() -> u64 {
    300_000
}

fn default_http_timeout() -> u64 {
    15_000
}

fn default_trade_log_dir() -> String {
    "./trades".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wallet_private_key: None,
            destination_chain_id: default_destination_chain(),
            settlement_token: default_settlement_token(),
            settlement_symbol: default_settlement_symbol(),
            settlement_decimals: default_settlement_decimals(),
            rpc_url_base: default_rpc_base(),
            rpc_url_polygon: default_rpc_polygon(),
            rpc_url_arbitrum: default_rpc_arbitrum(),
            rpc_url_ethereum: default_rpc_ethereum(),
            rpc_url_optimism: default_rpc_optimism(),
            rpc_url_avalanche: default_rpc_avalanche(),
            rpc_url_bsc: default_rpc_bsc(),
            lifi_api_url: default_lifi_url(),
            lifi_integrator: default_integrator(),
            lifi_api_key: None,
            route_status_poll_ms: default_route_poll_ms(),
            route_status_max_polls: default_route_max_polls(),
            balance_query_timeout_ms: default_balance_timeout(),
            scan_debounce_ms: default_scan_debounce(),
            verify_max_attempts: default_verify_attempts(),
            verify_interval_ms: default_verify_interval(),
            settlement_gas_limit: default_gas_limit(),
            http_timeout_ms: default_http_timeout(),
            trade_log_dir: default_trade_log_dir(),
            port: default_port(),
            rust_log: default_log_level(),
            verbose: false,
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(key) = &self.wallet_private_key {
            if !key.starts_with("0x") {
                return Err("WALLET_PRIVATE_KEY must start with 0x".to_string());
            }
            if key.len() != 66 {
                return Err("WALLET_PRIVATE_KEY must be 32 bytes of hex".to_string());
            }
        }

        if self.settlement_token.parse::<Address>().is_err() {
            return Err(format!(
                "SETTLEMENT_TOKEN is not a valid address: {}",
                self.settlement_token
            ));
        }

        if self.verify_max_attempts == 0 {
            return Err("VERIFY_MAX_ATTEMPTS must be at least 1".to_string());
        }

        if self.route_status_max_polls == 0 {
            return Err("ROUTE_STATUS_MAX_POLLS must be at least 1".to_string());
        }

        for (chain_id, url) in self.rpc_urls() {
            if url::Url::parse(url).is_err() {
                return Err(format!("RPC URL for chain {} is invalid: {}", chain_id, url));
            }
        }

        if self.rpc_url(self.destination_chain_id).is_none() {
            return Err(format!(
                "no RPC URL configured for destination chain {}",
                self.destination_chain_id
            ));
        }

        Ok(())
    }

    /// All configured RPC endpoints keyed by chain ID.
    pub fn rpc_urls(&self) -> Vec<(u64, &str)> {
        vec![
            (chain_ids::BASE, self.rpc_url_base.as_str()),
            (chain_ids::POLYGON, self.rpc_url_polygon.as_str()),
            (chain_ids::ARBITRUM, self.rpc_url_arbitrum.as_str()),
            (chain_ids::ETHEREUM, self.rpc_url_ethereum.as_str()),
            (chain_ids::OPTIMISM, self.rpc_url_optimism.as_str()),
            (chain_ids::AVALANCHE, self.rpc_url_avalanche.as_str()),
            (chain_ids::BSC, self.rpc_url_bsc.as_str()),
        ]
    }

    /// RPC endpoint for a chain, if configured.
    pub fn rpc_url(&self, chain_id: u64) -> Option<&str> {
        self.rpc_urls()
            .into_iter()
            .find(|(id, _)| *id == chain_id)
            .map(|(_, url)| url)
    }

    /// Destination settlement asset described by this configuration.
    pub fn destination(&self) -> Result<Destination, FundingError> {
        let token = self.settlement_token.parse::<Address>().map_err(|e| {
            FundingError::InvalidConfig(format!("SETTLEMENT_TOKEN: {}", e))
        })?;

        Ok(Destination {
            chain_id: self.destination_chain_id,
            settlement_token: token,
            settlement_symbol: self.settlement_symbol.clone(),
            settlement_decimals: self.settlement_decimals,
        })
    }

    /// Verification poller settings.
    pub fn verify_config(&self) -> VerifyConfig {
        VerifyConfig {
            max_attempts: self.verify_max_attempts,
            interval: Duration::from_millis(self.verify_interval_ms),
        }
    }

    /// Per-entry balance query timeout.
    pub fn balance_query_timeout(&self) -> Duration {
        Duration::from_millis(self.balance_query_timeout_ms)
    }

    /// Debounce window for scan refreshes.
    pub fn scan_debounce(&self) -> Duration {
        Duration::from_millis(self.scan_debounce_ms)
    }
}
