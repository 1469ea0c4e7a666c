//! Funding module: pays for a position from any supported source.
//!
//! This module handles:
//! - Parallel balance scanning across the source catalog
//! - Source selection by cost score and balance
//! - Quoting a funding plan (noop, direct, or routed)
//! - Step tracking and plan execution
//! - Post-settlement verification and error classification

pub mod classify;
pub mod executor;
pub mod flow;
pub mod plan;
pub mod scanner;
pub mod selector;
pub mod steps;
pub mod verify;

pub use classify::{classify_execution, classify_quote, ClassifiedError, ErrorClass, RetryAction};
pub use executor::{execute_plan, ExecutionContext, ExecutionReceipt};
pub use flow::{FlightGuard, FlowOutcome, FlowState, FundingSession, PositionFlow};
pub use plan::{FundingPlan, PlanKind, QuoteBuilder, QuoteRequest, RoutedPlan, Settlement};
pub use scanner::{scan_balances, BalanceEntry, ScanCoordinator, ScanOutcome};
pub use selector::{select_source, SelectionResult};
pub use steps::{steps_for_plan, PositionStep, ProgressSink, StepStatus, StepTracker};
pub use verify::{verify_position, NoSleep, Sleeper, TokioSleeper, VerifiedPosition, VerifyConfig};
