//! Error Classifier: decides which retry a failure allows.
//!
//! Classification is advisory. It drives which retry action is offered and
//! never triggers a retry by itself.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

use crate::error::{ChainError, ExecutionError, QuoteError, RoutingError, WalletError};

/// Recoverability of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// Retrying the same plan is safe.
    Recoverable,
    /// The plan is stale; a new quote is needed.
    RequiresRequote,
    /// No retry will help.
    Fatal,
}

/// Retry action offered for a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RetryAction {
    /// Execute the same plan again.
    RetrySamePlan,
    /// Build a new plan.
    Requote,
}

/// Kind of failure, by message pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// User rejected the request in the wallet.
    Cancelled,
    /// Quote or itinerary expired.
    QuoteExpired,
    /// Not enough gas token.
    InsufficientGas,
    /// Not enough balance.
    InsufficientBalance,
    /// Transaction reverted.
    Reverted,
    /// No itinerary for the pair.
    NoRoute,
    /// Plan would deliver the position to another address.
    RecipientMismatch,
    /// Chain has no configured endpoint.
    UnsupportedChain,
    /// Another execution is in flight.
    Busy,
    /// Anything else.
    Unknown,
}

/// Failure annotated for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ClassifiedError {
    /// What went wrong.
    pub kind: FailureKind,
    /// How it can be recovered.
    pub class: ErrorClass,
    /// Short message for the user.
    pub message: String,
    /// Raw failure text.
    pub detail: String,
}

impl ClassifiedError {
    /// Whether retrying the same plan is allowed.
    pub fn recoverable(&self) -> bool {
        self.class == ErrorClass::Recoverable
    }

    /// Retry actions to offer.
    pub fn actions(&self) -> Vec<RetryAction> {
        match self.class {
            ErrorClass::Recoverable => vec![RetryAction::RetrySamePlan, RetryAction::Requote],
            ErrorClass::RequiresRequote => vec![RetryAction::Requote],
            ErrorClass::Fatal => Vec::new(),
        }
    }
}

struct Rule {
    pattern: Regex,
    kind: FailureKind,
    class: ErrorClass,
    message: &'static str,
}

fn rule(pattern: &str, kind: FailureKind, class: ErrorClass, message: &'static str) -> Option<Rule> {
    Regex::new(pattern).ok().map(|pattern| Rule {
        pattern,
        kind,
        class,
        message,
    })
}

/// Ordered rules; the first match wins.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    [
        rule(
            r"(?i)reject|denied|cancel",
            FailureKind::Cancelled,
            ErrorClass::Recoverable,
            "Transaction cancelled",
        ),
        rule(
            r"(?i)expired|quote",
            FailureKind::QuoteExpired,
            ErrorClass::RequiresRequote,
            "Quote expired, please re-quote",
        ),
        rule(
            r"(?i)insufficient.*gas|gas.*insufficient",
            FailureKind::InsufficientGas,
            ErrorClass::Recoverable,
            "Insufficient gas, check your wallet balance",
        ),
        rule(
            r"(?i)insufficient",
            FailureKind::InsufficientBalance,
            ErrorClass::Recoverable,
            "Insufficient balance",
        ),
        rule(
            r"(?i)revert",
            FailureKind::Reverted,
            ErrorClass::Recoverable,
            "Position couldn't open. Funds are still in your wallet.",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// Classify a raw failure message.
pub fn classify_message(detail: &str) -> ClassifiedError {
    RULES
        .iter()
        .find(|rule| rule.pattern.is_match(detail))
        .map(|rule| ClassifiedError {
            kind: rule.kind,
            class: rule.class,
            message: rule.message.to_string(),
            detail: detail.to_string(),
        })
        .unwrap_or_else(|| ClassifiedError {
            kind: FailureKind::Unknown,
            class: ErrorClass::Recoverable,
            message: detail.to_string(),
            detail: detail.to_string(),
        })
}

fn fixed(kind: FailureKind, class: ErrorClass, message: &str, detail: String) -> ClassifiedError {
    ClassifiedError {
        kind,
        class,
        message: message.to_string(),
        detail,
    }
}

fn classify_chain(error: &ChainError) -> ClassifiedError {
    match error {
        ChainError::UnsupportedChain { .. } => fixed(
            FailureKind::UnsupportedChain,
            ErrorClass::Fatal,
            "This chain is not supported",
            error.to_string(),
        ),
        other => classify_message(&other.to_string()),
    }
}

fn classify_wallet(error: &WalletError) -> ClassifiedError {
    match error {
        WalletError::Rejected(_) => fixed(
            FailureKind::Cancelled,
            ErrorClass::Recoverable,
            "Transaction cancelled",
            error.to_string(),
        ),
        WalletError::Reverted { .. } => fixed(
            FailureKind::Reverted,
            ErrorClass::Recoverable,
            "Position couldn't open. Funds are still in your wallet.",
            error.to_string(),
        ),
        other => classify_message(&other.to_string()),
    }
}

fn classify_routing(error: &RoutingError) -> ClassifiedError {
    match error {
        RoutingError::Wallet(e) => classify_wallet(e),
        RoutingError::Chain(e) => classify_chain(e),
        other => classify_message(&other.to_string()),
    }
}

/// Classify an execution failure.
pub fn classify_execution(error: &ExecutionError) -> ClassifiedError {
    match error {
        ExecutionError::Wallet(e) => classify_wallet(e),
        ExecutionError::Routing(e) => classify_routing(e),
        ExecutionError::Chain(e) => classify_chain(e),
        ExecutionError::RecipientMismatch { .. } => fixed(
            FailureKind::RecipientMismatch,
            ErrorClass::Fatal,
            "Plan recipient does not match the connected wallet",
            error.to_string(),
        ),
        ExecutionError::InsufficientShares { .. } => fixed(
            FailureKind::InsufficientBalance,
            ErrorClass::Recoverable,
            "Insufficient balance",
            error.to_string(),
        ),
        ExecutionError::AlreadyRunning { .. } | ExecutionError::InvalidState { .. } => fixed(
            FailureKind::Busy,
            ErrorClass::RequiresRequote,
            "A position is already being placed",
            error.to_string(),
        ),
    }
}

/// Classify a quoting failure.
pub fn classify_quote(error: &QuoteError) -> ClassifiedError {
    match error {
        QuoteError::NoRouteFound { .. } => fixed(
            FailureKind::NoRoute,
            ErrorClass::RequiresRequote,
            "No route found for this token and chain",
            error.to_string(),
        ),
        QuoteError::InvalidAmount(_) => fixed(
            FailureKind::Unknown,
            ErrorClass::RequiresRequote,
            "Enter a valid amount",
            error.to_string(),
        ),
        QuoteError::Routing(e) => {
            let mut classified = classify_routing(e);
            if classified.class == ErrorClass::Recoverable {
                classified.class = ErrorClass::RequiresRequote;
            }
            classified
        }
    }
}
