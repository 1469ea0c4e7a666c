//! Unified error types for the funding orchestrator.

use thiserror::Error;

/// Unified error type for the funding orchestrator.
#[derive(Error, Debug)]
pub enum FundingError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration is present but invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Chain RPC error.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Wallet signing/submission error.
    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    /// Routing engine error.
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),

    /// Quote building error.
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),

    /// Plan execution error.
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Trade log failure.
    #[error("trade log error: {0}")]
    TradeLog(String),
}

/// Chain RPC reader errors.
#[derive(Error, Debug, Clone)]
pub enum ChainError {
    /// No RPC endpoint is configured for the chain.
    #[error("unsupported chain {chain_id}")]
    UnsupportedChain {
        /// Requested chain ID.
        chain_id: u64,
    },

    /// RPC call failed.
    #[error("rpc call on chain {chain_id} failed: {reason}")]
    Rpc {
        /// Chain the call was issued against.
        chain_id: u64,
        /// Reason for failure.
        reason: String,
    },

    /// RPC call did not answer in time.
    #[error("rpc call on chain {chain_id} timed out")]
    Timeout {
        /// Chain the call was issued against.
        chain_id: u64,
    },

    /// Returned data could not be ABI-decoded.
    #[error("failed to decode contract response: {0}")]
    Decode(String),
}

/// Wallet signer errors.
#[derive(Error, Debug, Clone)]
pub enum WalletError {
    /// The user rejected the request in their wallet.
    #[error("user rejected the request: {0}")]
    Rejected(String),

    /// Switching the wallet to another chain failed.
    #[error("failed to switch to chain {chain_id}: {reason}")]
    SwitchChain {
        /// Target chain ID.
        chain_id: u64,
        /// Reason for failure.
        reason: String,
    },

    /// The transaction could not be submitted or confirmed.
    #[error("transaction submission failed: {0}")]
    Submission(String),

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: String,
    },

    /// Signer could not be built from key material.
    #[error("signing error: {0}")]
    Signing(String),
}

/// Routing engine errors.
#[derive(Error, Debug, Clone)]
pub enum RoutingError {
    /// HTTP request to the routing engine failed.
    #[error("routing request failed: {0}")]
    RequestFailed(String),

    /// Route request carries neither an input nor an output amount.
    #[error("invalid route request: {0}")]
    InvalidRequest(String),

    /// Routing engine answered with something we cannot use.
    #[error("invalid routing response: {0}")]
    InvalidResponse(String),

    /// An itinerary leg failed during execution.
    #[error("leg {leg} failed: {message}")]
    LegFailed {
        /// Index of the failed leg.
        leg: usize,
        /// Failure message reported by the engine.
        message: String,
    },

    /// Wallet failed while executing a leg.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Chain read failed while executing a leg.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Quote builder errors.
#[derive(Error, Debug, Clone)]
pub enum QuoteError {
    /// The routing engine has no itinerary for this pair.
    #[error("no route found from {from_token} on chain {from_chain_id} to chain {to_chain_id}")]
    NoRouteFound {
        /// Source chain.
        from_chain_id: u64,
        /// Source token symbol.
        from_token: String,
        /// Destination chain.
        to_chain_id: u64,
    },

    /// Requested amount is zero, negative or not representable.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Routing engine failed while quoting.
    #[error(transparent)]
    Routing(#[from] RoutingError),
}

/// Execution engine errors.
#[derive(Error, Debug, Clone)]
pub enum ExecutionError {
    /// Wallet failure during a direct transaction.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Routing engine failure during itinerary execution.
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Chain read failure during execution.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The plan's recipient is not the connected wallet.
    #[error("plan recipient {expected} does not match wallet {actual}")]
    RecipientMismatch {
        /// Recipient declared by the plan.
        expected: String,
        /// Address of the connected wallet.
        actual: String,
    },

    /// Another execution is already running for this owner and market.
    #[error("an execution is already in flight for market {market}")]
    AlreadyRunning {
        /// Market address.
        market: String,
    },

    /// Sell amount exceeds the position balance.
    #[error("insufficient position balance: requested {requested}, available {available}")]
    InsufficientShares {
        /// Requested amount in token units.
        requested: String,
        /// Current balance in token units.
        available: String,
    },

    /// The flow is not in a state that allows this action.
    #[error("cannot {action} while flow is {state}")]
    InvalidState {
        /// Attempted action.
        action: &'static str,
        /// Current flow state.
        state: String,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, FundingError>;
