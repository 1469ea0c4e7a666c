//! Position close: sell position tokens back to the market.

use std::sync::Arc;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::log::{TradeLog, TradeRecord};
use crate::chain::catalog::explorer_tx_url;
use crate::chain::reader::{erc20_balance, position_token, ChainReader};
use crate::chain::units::{from_base_units, to_base_units};
use crate::error::{ExecutionError, QuoteError};
use crate::funding::classify::{classify_execution, classify_quote, ClassifiedError};
use crate::funding::steps::{PositionStep, ProgressSink, StepTracker};
use crate::market::contract::{approve_calldata, sell_calldata};
use crate::market::{Destination, MarketTarget, Side};
use crate::metrics;
use crate::signing::{TxRequest, WalletSigner};

/// Label of the position-token approval.
pub const LABEL_APPROVE_SHARES: &str = "Approve position tokens";
/// Label of the sell call.
pub const LABEL_SELL: &str = "Sell position";

/// Sell parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SellRequest {
    pub market: MarketTarget,
    pub side: Side,
    /// Shares to sell, in token units.
    pub amount: Decimal,
}

/// Result of a sell attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellOutcome {
    pub tx_hash: Option<String>,
    pub steps: Vec<PositionStep>,
    pub error: Option<ClassifiedError>,
}

impl SellOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Wallet, reader and log used by [`sell_position`].
#[derive(Clone)]
pub struct Withdrawer {
    wallet: Arc<dyn WalletSigner>,
    reader: Arc<dyn ChainReader>,
    trade_log: Arc<dyn TradeLog>,
    destination: Destination,
}

impl Withdrawer {
    pub fn new(
        wallet: Arc<dyn WalletSigner>,
        reader: Arc<dyn ChainReader>,
        trade_log: Arc<dyn TradeLog>,
        destination: Destination,
    ) -> Self {
        Self {
            wallet,
            reader,
            trade_log,
            destination,
        }
    }

    /// Approve the side's position token to the market, then call `sell`.
    ///
    /// Refuses to submit anything when the amount exceeds the current balance.
    #[instrument(skip(self, request, sink), fields(market = %request.market.address, side = %request.side, amount = %request.amount))]
    pub async fn sell_position(
        &self,
        request: &SellRequest,
        sink: Option<Arc<dyn ProgressSink>>,
    ) -> SellOutcome {
        let decimals = self.destination.settlement_decimals;
        let amount = match to_base_units(request.amount, decimals).filter(|a| !a.is_zero()) {
            Some(amount) => amount,
            None => {
                let error = QuoteError::InvalidAmount(format!("cannot sell {} shares", request.amount));
                return SellOutcome {
                    tx_hash: None,
                    steps: Vec::new(),
                    error: Some(classify_quote(&error)),
                };
            }
        };

        let mut tracker = StepTracker::from_steps(
            vec![
                PositionStep::pending(LABEL_APPROVE_SHARES),
                PositionStep::pending(LABEL_SELL),
            ],
            sink,
        );

        match self.submit(request, amount, &mut tracker).await {
            Ok(tx_hash) => {
                let record = TradeRecord::sell(
                    tx_hash.clone(),
                    request.side,
                    request.amount.to_string(),
                    request.market.id.clone(),
                    self.destination.chain_id,
                );
                if let Err(e) = self.trade_log.record(self.wallet.address(), record) {
                    warn!(error = %e, "Failed to write trade log");
                }
                info!(tx_hash = %tx_hash, "Position sold");
                SellOutcome {
                    tx_hash: Some(tx_hash),
                    steps: tracker.into_steps(),
                    error: None,
                }
            }
            Err(e) => {
                let classified = classify_execution(&e);
                metrics::inc_executions_failed(classified.class.into());
                tracker.fail(classified.message.clone());
                warn!(error = %e, class = %classified.class, "Sell failed");
                SellOutcome {
                    tx_hash: None,
                    steps: tracker.into_steps(),
                    error: Some(classified),
                }
            }
        }
    }

    async fn submit(
        &self,
        request: &SellRequest,
        amount: U256,
        tracker: &mut StepTracker,
    ) -> Result<String, ExecutionError> {
        let chain_id = self.destination.chain_id;
        let owner = self.wallet.address();
        let market = request.market.address;

        let token = position_token(self.reader.as_ref(), chain_id, market, request.side).await?;
        let balance = erc20_balance(self.reader.as_ref(), chain_id, token, owner).await?;
        debug!(token = %token, balance = %balance, "Position balance");
        if amount > balance {
            let decimals = self.destination.settlement_decimals;
            return Err(ExecutionError::InsufficientShares {
                requested: request.amount.to_string(),
                available: from_base_units(balance, decimals)
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| balance.to_string()),
            });
        }

        self.wallet.switch_chain(chain_id).await?;

        tracker.activate(0);
        let approve_hash = self
            .wallet
            .sign_and_send(TxRequest::call(chain_id, token, approve_calldata(market, amount)))
            .await?;
        let link = explorer_tx_url(chain_id, &approve_hash);
        tracker.complete(0, Some(approve_hash), link);

        tracker.activate(1);
        let tx_hash = self
            .wallet
            .sign_and_send(TxRequest::call(chain_id, market, sell_calldata(amount, request.side)))
            .await?;
        let link = explorer_tx_url(chain_id, &tx_hash);
        tracker.complete(1, Some(tx_hash.clone()), link);

        Ok(tx_hash)
    }
}
