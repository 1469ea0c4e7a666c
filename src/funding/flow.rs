//! Position flow: quote, execute, verify, and the retry paths between them.
//!
//! A [`FundingSession`] is built once per connected wallet and shared by every
//! flow started from it. A [`PositionFlow`] is scoped to one position attempt
//! and walks the [`FlowState`] machine.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, IntoStaticStr};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::classify::{classify_execution, classify_quote, ClassifiedError};
use super::executor::{execute_plan, ExecutionContext};
use super::plan::{FundingPlan, QuoteBuilder, QuoteRequest};
use super::scanner::scan_balances;
use super::selector::{select_source, SelectionResult};
use super::steps::{PositionStep, ProgressSink, StepTracker};
use super::verify::{verify_position, Sleeper, TokioSleeper, VerifiedPosition, VerifyConfig, VerifyTarget};
use crate::chain::catalog::SOURCE_CATALOG;
use crate::chain::reader::ChainReader;
use crate::config::Config;
use crate::error::{ExecutionError, FundingError};
use crate::market::Destination;
use crate::metrics;
use crate::routing::RoutingEngine;
use crate::signing::WalletSigner;
use crate::trading::log::{MemoryTradeLog, TradeLog, TradeRecord};

/// Label of the verification step when no increase was observed.
pub const LABEL_VERIFICATION_PENDING: &str = "Position placed (verification pending)";

/// Flow lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, IntoStaticStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlowState {
    Input,
    Quoting,
    Confirming,
    Executing,
    Verifying,
    Success,
    Error,
}

impl FlowState {
    /// Whether `next` is a legal successor.
    pub fn can_transition_to(self, next: FlowState) -> bool {
        use FlowState::*;
        matches!(
            (self, next),
            (Input | Confirming | Error, Quoting)
                | (Quoting, Confirming | Error)
                | (Confirming | Error, Executing)
                | (Executing, Verifying | Success | Error)
                | (Verifying, Success)
                | (Confirming | Success | Error, Input)
        )
    }

    /// Whether an execution is in progress.
    pub fn is_busy(self) -> bool {
        matches!(self, FlowState::Executing | FlowState::Verifying)
    }
}

/// Registry of in-flight executions keyed by owner and market.
#[derive(Debug, Clone, Default)]
pub struct FlightGuard {
    inflight: Arc<DashMap<(Address, Address), ()>>,
}

/// Held while an execution runs; releases the slot on drop.
#[derive(Debug)]
pub struct FlightPermit {
    inflight: Arc<DashMap<(Address, Address), ()>>,
    key: (Address, Address),
}

impl FlightGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the slot for `owner` and `market`, or `None` if it is taken.
    pub fn try_acquire(&self, owner: Address, market: Address) -> Option<FlightPermit> {
        let key = (owner, market);
        match self.inflight.entry(key) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(FlightPermit {
                    inflight: Arc::clone(&self.inflight),
                    key,
                })
            }
        }
    }

    /// Whether an execution is running for `owner` and `market`.
    pub fn is_inflight(&self, owner: Address, market: Address) -> bool {
        self.inflight.contains_key(&(owner, market))
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
    }
}

/// Ports and settings shared by every flow for one wallet.
#[derive(Clone)]
pub struct FundingSession {
    wallet: Arc<dyn WalletSigner>,
    reader: Arc<dyn ChainReader>,
    router: Arc<dyn RoutingEngine>,
    quotes: QuoteBuilder,
    trade_log: Arc<dyn TradeLog>,
    sleeper: Arc<dyn Sleeper>,
    verify: VerifyConfig,
    balance_timeout: Duration,
    flights: FlightGuard,
}

impl FundingSession {
    /// Session with default settings and an in-memory trade log.
    pub fn new(
        wallet: Arc<dyn WalletSigner>,
        reader: Arc<dyn ChainReader>,
        router: Arc<dyn RoutingEngine>,
        destination: Destination,
    ) -> Self {
        let defaults = Config::default();
        Self {
            quotes: QuoteBuilder::new(Arc::clone(&router), destination, defaults.settlement_gas_limit),
            wallet,
            reader,
            router,
            trade_log: Arc::new(MemoryTradeLog::new()),
            sleeper: Arc::new(TokioSleeper),
            verify: VerifyConfig::default(),
            balance_timeout: defaults.balance_query_timeout(),
            flights: FlightGuard::new(),
        }
    }

    /// Session configured from `config`.
    pub fn from_config(
        config: &Config,
        wallet: Arc<dyn WalletSigner>,
        reader: Arc<dyn ChainReader>,
        router: Arc<dyn RoutingEngine>,
        trade_log: Arc<dyn TradeLog>,
    ) -> Result<Self, FundingError> {
        let destination = config.destination()?;
        let mut session = Self::new(wallet, reader, Arc::clone(&router), destination.clone());
        session.quotes = QuoteBuilder::new(router, destination, config.settlement_gas_limit);
        session.verify = config.verify_config();
        session.balance_timeout = config.balance_query_timeout();
        session.trade_log = trade_log;
        Ok(session)
    }

    pub fn with_trade_log(mut self, trade_log: Arc<dyn TradeLog>) -> Self {
        self.trade_log = trade_log;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_verify_config(mut self, verify: VerifyConfig) -> Self {
        self.verify = verify;
        self
    }

    /// Share an in-flight registry with other sessions.
    pub fn with_flight_guard(mut self, flights: FlightGuard) -> Self {
        self.flights = flights;
        self
    }

    /// Connected wallet address.
    pub fn owner(&self) -> Address {
        self.wallet.address()
    }

    /// Destination settlement asset.
    pub fn destination(&self) -> &Destination {
        self.quotes.destination()
    }

    pub fn flights(&self) -> &FlightGuard {
        &self.flights
    }

    /// Scan the catalog for the wallet and pick a source for `required`.
    pub async fn find_source(&self, required: Decimal) -> SelectionResult {
        let entries = scan_balances(
            self.reader.as_ref(),
            &SOURCE_CATALOG,
            self.owner(),
            self.balance_timeout,
        )
        .await;
        select_source(&entries, required, &SOURCE_CATALOG, self.destination())
    }

    /// Start a new flow in `Input`.
    pub fn flow(&self) -> PositionFlow {
        PositionFlow {
            session: self.clone(),
            state: FlowState::Input,
            request: None,
            plan: None,
            last_error: None,
        }
    }
}

/// Result of an execution attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOutcome {
    /// Flow state after the attempt.
    pub state: FlowState,
    /// Terminal transaction hash.
    pub tx_hash: Option<String>,
    /// Final step list.
    pub steps: Vec<PositionStep>,
    /// Confirmed position, when verification observed one.
    pub verified: Option<VerifiedPosition>,
    /// Classified failure.
    pub error: Option<ClassifiedError>,
}

impl FlowOutcome {
    /// Whether the attempt ended in `Success`.
    pub fn succeeded(&self) -> bool {
        self.state == FlowState::Success
    }
}

/// One position attempt.
pub struct PositionFlow {
    session: FundingSession,
    state: FlowState,
    request: Option<QuoteRequest>,
    plan: Option<FundingPlan>,
    last_error: Option<ClassifiedError>,
}

impl PositionFlow {
    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Plan awaiting confirmation or being executed.
    pub fn plan(&self) -> Option<&FundingPlan> {
        self.plan.as_ref()
    }

    pub fn last_error(&self) -> Option<&ClassifiedError> {
        self.last_error.as_ref()
    }

    /// Whether starting another execution must be refused.
    pub fn is_busy(&self) -> bool {
        self.state.is_busy()
    }

    fn enter(&mut self, next: FlowState, action: &'static str) -> Result<(), ExecutionError> {
        if !self.state.can_transition_to(next) {
            return Err(ExecutionError::InvalidState {
                action,
                state: self.state.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    /// Build a plan for `request`; on success the flow waits in `Confirming`.
    pub async fn quote(&mut self, request: QuoteRequest) -> Result<&FundingPlan, ClassifiedError> {
        self.enter(FlowState::Quoting, "quote")
            .map_err(|e| classify_execution(&e))?;
        self.plan = None;
        self.last_error = None;

        match self.session.quotes.quote(&request).await {
            Ok(plan) => {
                self.request = Some(request);
                self.state = FlowState::Confirming;
                Ok(&*self.plan.insert(plan))
            }
            Err(e) => {
                let classified = classify_quote(&e);
                warn!(error = %e, class = %classified.class, "Quote failed");
                self.request = Some(request);
                self.state = FlowState::Error;
                self.last_error = Some(classified.clone());
                Err(classified)
            }
        }
    }

    /// Quote again with the last request.
    pub async fn requote(&mut self) -> Result<&FundingPlan, ClassifiedError> {
        let Some(request) = self.request.clone() else {
            return Err(classify_execution(&ExecutionError::InvalidState {
                action: "requote",
                state: self.state.to_string(),
            }));
        };
        self.quote(request).await
    }

    /// Execute the confirmed plan.
    pub async fn execute(
        &mut self,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: &CancellationToken,
    ) -> FlowOutcome {
        if self.state != FlowState::Confirming {
            return self.refuse(ExecutionError::InvalidState {
                action: "execute",
                state: self.state.to_string(),
            });
        }
        self.run(sink, cancel).await
    }

    /// Execute the same plan again after a recoverable failure.
    pub async fn retry(
        &mut self,
        sink: Option<Arc<dyn ProgressSink>>,
        cancel: &CancellationToken,
    ) -> FlowOutcome {
        let recoverable = self.last_error.as_ref().is_some_and(|e| e.recoverable());
        if self.state != FlowState::Error || !recoverable || self.plan.is_none() {
            return self.refuse(ExecutionError::InvalidState {
                action: "retry",
                state: self.state.to_string(),
            });
        }
        self.run(sink, cancel).await
    }

    /// Return to `Input`, dropping the plan.
    pub fn reset(&mut self) -> Result<(), ExecutionError> {
        self.enter(FlowState::Input, "reset")?;
        self.request = None;
        self.plan = None;
        self.last_error = None;
        Ok(())
    }

    fn refuse(&self, error: ExecutionError) -> FlowOutcome {
        FlowOutcome {
            state: self.state,
            tx_hash: None,
            steps: Vec::new(),
            verified: None,
            error: Some(classify_execution(&error)),
        }
    }

    #[instrument(skip_all, fields(owner = %self.session.owner(), state = %self.state))]
    async fn run(&mut self, sink: Option<Arc<dyn ProgressSink>>, cancel: &CancellationToken) -> FlowOutcome {
        let Some(plan) = self.plan.clone() else {
            return self.refuse(ExecutionError::InvalidState {
                action: "execute",
                state: self.state.to_string(),
            });
        };
        let settlement = plan.settlement().clone();

        let Some(_permit) = self
            .session
            .flights
            .try_acquire(settlement.recipient, settlement.market)
        else {
            return self.refuse(ExecutionError::AlreadyRunning {
                market: settlement.market.to_string(),
            });
        };

        self.state = FlowState::Executing;
        self.last_error = None;
        let mut tracker = StepTracker::new(&plan, sink);
        let session = &self.session;
        let ctx = ExecutionContext {
            wallet: session.wallet.as_ref(),
            reader: session.reader.as_ref(),
            router: session.router.as_ref(),
            settlement_gas_limit: Some(session.quotes.settlement_gas_limit()),
        };

        let receipt = match execute_plan(ctx, &plan, &mut tracker).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let classified = classify_execution(&e);
                metrics::inc_executions_failed(classified.class.into());
                self.state = FlowState::Error;
                self.last_error = Some(classified.clone());
                return FlowOutcome {
                    state: self.state,
                    tx_hash: tracker.last_tx_hash().map(str::to_string),
                    steps: tracker.into_steps(),
                    verified: None,
                    error: Some(classified),
                };
            }
        };
        metrics::inc_executions_succeeded();

        if let Some(hash) = &receipt.tx_hash {
            let record = TradeRecord::buy(
                hash.clone(),
                settlement.side,
                settlement.spent(session.destination().settlement_decimals).to_string(),
                settlement.market_id.clone(),
                settlement.chain_id,
            );
            if let Err(e) = session.trade_log.record(settlement.recipient, record) {
                warn!(error = %e, "Failed to write trade log");
            }
        }

        let mut verified = None;
        if receipt.settled {
            self.state = FlowState::Verifying;
            let step = tracker.begin_verifying();
            let target = VerifyTarget {
                chain_id: settlement.chain_id,
                market: settlement.market,
                side: settlement.side,
                owner: settlement.recipient,
                baseline: receipt.baseline,
                decimals: session.destination().settlement_decimals,
            };
            verified = verify_position(
                session.reader.as_ref(),
                session.sleeper.as_ref(),
                session.verify,
                target,
                cancel,
            )
            .await;
            let label = verified
                .as_ref()
                .map(VerifiedPosition::summary)
                .unwrap_or_else(|| LABEL_VERIFICATION_PENDING.to_string());
            tracker.finish_verifying(step, label);
        }

        self.state = FlowState::Success;
        info!(tx_hash = ?receipt.tx_hash, verified = verified.is_some(), "Position flow succeeded");
        FlowOutcome {
            state: self.state,
            tx_hash: receipt.tx_hash,
            steps: tracker.into_steps(),
            verified,
            error: None,
        }
    }
}
