//! Execution Engine: drives a [`FundingPlan`] to its settlement.
//!
//! Every transaction goes through the injected wallet and is awaited before
//! the next step starts. On failure the active step is marked as errored and
//! nothing further is submitted.

use alloy::primitives::U256;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::plan::{FundingPlan, RoutedPlan, Settlement};
use super::steps::StepTracker;
use crate::chain::catalog::explorer_tx_url;
use crate::chain::reader::{position_balance, ChainReader};
use crate::error::ExecutionError;
use crate::market::contract::{approve_calldata, buy_for_calldata};
use crate::metrics;
use crate::routing::RoutingEngine;
use crate::signing::{TxRequest, WalletSigner};

/// Ports used while executing.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Signs and submits transactions.
    pub wallet: &'a dyn WalletSigner,
    /// Reads the pre-settlement position balance.
    pub reader: &'a dyn ChainReader,
    /// Executes itineraries.
    pub router: &'a dyn RoutingEngine,
    /// Gas limit for the settlement call.
    pub settlement_gas_limit: Option<u64>,
}

/// Result of a completed plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReceipt {
    /// Hash of the terminal transaction, if one was submitted.
    pub tx_hash: Option<String>,
    /// Position balance captured before settlement.
    pub baseline: U256,
    /// Whether a real market settlement happened and can be verified.
    pub settled: bool,
}

/// Run `plan`, keeping `tracker` in sync.
#[instrument(skip_all, fields(kind = %plan.kind(), market = %plan.settlement().market))]
pub async fn execute_plan(
    ctx: ExecutionContext<'_>,
    plan: &FundingPlan,
    tracker: &mut StepTracker,
) -> Result<ExecutionReceipt, ExecutionError> {
    let _timer = metrics::timer_execution();

    match run(ctx, plan, tracker).await {
        Ok(receipt) => {
            info!(tx_hash = ?receipt.tx_hash, "Plan executed");
            Ok(receipt)
        }
        Err(e) => {
            let step = tracker.fail(e.to_string());
            warn!(error = %e, step = ?step, "Plan execution failed");
            Err(e)
        }
    }
}

async fn run(
    ctx: ExecutionContext<'_>,
    plan: &FundingPlan,
    tracker: &mut StepTracker,
) -> Result<ExecutionReceipt, ExecutionError> {
    let settlement = plan.settlement();
    let owner = ctx.wallet.address();
    if settlement.recipient != owner {
        return Err(ExecutionError::RecipientMismatch {
            expected: settlement.recipient.to_string(),
            actual: owner.to_string(),
        });
    }

    let baseline = if settlement.is_placeholder() {
        U256::ZERO
    } else {
        capture_baseline(ctx.reader, settlement).await
    };

    match plan {
        FundingPlan::Noop(_) => {
            tracker.complete_remaining();
            Ok(ExecutionReceipt {
                tx_hash: None,
                baseline,
                settled: false,
            })
        }
        FundingPlan::Direct(settlement) => {
            let tx_hash = settle(ctx, settlement, tracker, 0, 1).await?;
            Ok(ExecutionReceipt {
                settled: tx_hash.is_some(),
                tx_hash,
                baseline,
            })
        }
        FundingPlan::Routed(routed) => run_routed(ctx, routed, tracker, baseline).await,
    }
}

async fn capture_baseline(reader: &dyn ChainReader, settlement: &Settlement) -> U256 {
    match position_balance(
        reader,
        settlement.chain_id,
        settlement.market,
        settlement.side,
        settlement.recipient,
    )
    .await
    {
        Ok(balance) => balance,
        Err(e) => {
            warn!(error = %e, "Could not read position balance before settlement, assuming zero");
            U256::ZERO
        }
    }
}

async fn run_routed(
    ctx: ExecutionContext<'_>,
    routed: &RoutedPlan,
    tracker: &mut StepTracker,
    baseline: U256,
) -> Result<ExecutionReceipt, ExecutionError> {
    let (progress, mut updates) = mpsc::unbounded_channel();
    let execution = ctx.router.execute(&routed.itinerary, ctx.wallet, progress);
    tokio::pin!(execution);

    let result = loop {
        tokio::select! {
            biased;
            Some(update) = updates.recv() => {
                debug!(leg = update.index, status = %update.status, "Leg update");
                tracker.apply_leg(update);
            }
            result = &mut execution => break result,
        }
    };
    while let Ok(update) = updates.try_recv() {
        tracker.apply_leg(update);
    }
    result?;

    let legs = routed.itinerary.legs.len();
    for index in 0..legs {
        tracker.complete(index, None, None);
    }

    if routed.embeds_settlement() {
        tracker.complete_remaining();
        return Ok(ExecutionReceipt {
            tx_hash: tracker.last_tx_hash().map(str::to_string),
            baseline,
            settled: !routed.settlement.is_placeholder(),
        });
    }

    let tx_hash = settle(ctx, &routed.settlement, tracker, legs, legs + 1).await?;
    Ok(ExecutionReceipt {
        settled: tx_hash.is_some(),
        tx_hash,
        baseline,
    })
}

/// Approve then call `buyFor`; placeholder markets complete without transactions.
async fn settle(
    ctx: ExecutionContext<'_>,
    settlement: &Settlement,
    tracker: &mut StepTracker,
    approve_step: usize,
    place_step: usize,
) -> Result<Option<String>, ExecutionError> {
    if settlement.is_placeholder() {
        debug!("Placeholder market, skipping settlement transactions");
        tracker.complete(approve_step, None, None);
        tracker.complete(place_step, None, None);
        return Ok(None);
    }

    let chain_id = settlement.chain_id;
    ctx.wallet.switch_chain(chain_id).await?;

    tracker.activate(approve_step);
    let approve_hash = ctx
        .wallet
        .sign_and_send(TxRequest::call(
            chain_id,
            settlement.token,
            approve_calldata(settlement.market, settlement.amount),
        ))
        .await?;
    let link = explorer_tx_url(chain_id, &approve_hash);
    tracker.complete(approve_step, Some(approve_hash), link);

    tracker.activate(place_step);
    let mut buy = TxRequest::call(
        chain_id,
        settlement.market,
        buy_for_calldata(settlement.amount, settlement.side, settlement.recipient),
    );
    buy.gas_limit = ctx.settlement_gas_limit;
    let tx_hash = ctx.wallet.sign_and_send(buy).await?;
    let link = explorer_tx_url(chain_id, &tx_hash);
    tracker.complete(place_step, Some(tx_hash.clone()), link);

    info!(tx_hash = %tx_hash, "Settlement confirmed");
    Ok(Some(tx_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::catalog::SOURCE_CATALOG;
    use crate::chain::mock::{MockChainReader, MockFailure, MockRouter, MockWallet, TxMatch};
    use crate::funding::steps::{StepStatus, LABEL_BRIDGE};
    use crate::market::contract::{decode_write, WriteCall};
    use crate::market::{Side, PLACEHOLDER_MARKET};
    use crate::routing::{Itinerary, ItineraryLeg};
    use alloy::primitives::{address, Address};
    use rust_decimal_macros::dec;

    const OWNER: Address = address!("00000000000000000000000000000000000000aa");
    const MARKET: Address = address!("00000000000000000000000000000000000000bb");
    const YES: Address = address!("00000000000000000000000000000000000000cc");
    const NO: Address = address!("00000000000000000000000000000000000000dd");

    fn settlement(market: Address) -> Settlement {
        Settlement {
            market,
            market_id: "m-1".to_string(),
            side: Side::Yes,
            amount: U256::from(20_000_000u64),
            amount_human: dec!(20),
            recipient: OWNER,
            chain_id: 8453,
            token: SOURCE_CATALOG[0].token_address,
        }
    }

    fn routed(legs: Vec<ItineraryLeg>, embeds: bool, market: Address) -> FundingPlan {
        FundingPlan::Routed(RoutedPlan {
            source: SOURCE_CATALOG[12].clone(),
            itinerary: Itinerary::new("r-1", legs, embeds, None, serde_json::json!({ "toChainId": 8453 })),
            settlement: settlement(market),
        })
    }

    fn bridge_leg() -> ItineraryLeg {
        ItineraryLeg {
            from_chain_id: 1,
            to_chain_id: 8453,
            tool: "across".to_string(),
        }
    }

    fn context<'a>(
        wallet: &'a MockWallet,
        reader: &'a MockChainReader,
        router: &'a MockRouter,
    ) -> ExecutionContext<'a> {
        ExecutionContext {
            wallet,
            reader,
            router,
            settlement_gas_limit: Some(300_000),
        }
    }

    #[tokio::test]
    async fn direct_plan_approves_then_settles() {
        let reader = MockChainReader::new().with_market(MARKET, YES, NO);
        let wallet = MockWallet::new(OWNER).linked(reader.clone());
        let router = MockRouter::new();
        let plan = FundingPlan::Direct(settlement(MARKET));
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();

        let sent = wallet.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            decode_write(&sent[0].data),
            Some(WriteCall::Approve { spender, .. }) if spender == MARKET
        ));
        assert!(matches!(decode_write(&sent[1].data), Some(WriteCall::BuyFor { .. })));
        assert_eq!(sent[1].gas_limit, Some(300_000));

        assert!(receipt.settled);
        assert_eq!(receipt.tx_hash.as_deref(), tracker.steps()[1].tx_hash.as_deref());
        assert!(tracker.steps().iter().all(|s| s.status == StepStatus::Complete));
        assert!(tracker.steps()[1]
            .tx_link
            .as_deref()
            .unwrap()
            .starts_with("https://basescan.org/tx/"));
        assert_eq!(router.executions(), 0);
    }

    #[tokio::test]
    async fn noop_plan_submits_nothing() {
        let reader = MockChainReader::new();
        let wallet = MockWallet::new(OWNER);
        let router = MockRouter::new();
        let plan = FundingPlan::Noop(settlement(PLACEHOLDER_MARKET));
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();

        assert_eq!(receipt.tx_hash, None);
        assert!(!receipt.settled);
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn routed_plan_settles_after_legs() {
        let reader = MockChainReader::new().with_market(MARKET, YES, NO);
        let wallet = MockWallet::new(OWNER).linked(reader.clone());
        let router = MockRouter::new();
        let plan = routed(vec![bridge_leg()], false, MARKET);
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();

        assert_eq!(router.executions(), 1);
        assert_eq!(wallet.sent().len(), 3);
        assert_eq!(tracker.steps()[0].label, LABEL_BRIDGE);
        assert!(tracker.steps()[0].tx_hash.is_some());
        assert!(tracker.steps().iter().all(|s| s.status == StepStatus::Complete));
        assert_eq!(receipt.tx_hash.as_deref(), tracker.steps()[2].tx_hash.as_deref());
    }

    #[tokio::test]
    async fn embedded_plan_has_no_separate_settlement() {
        let reader = MockChainReader::new().with_market(MARKET, YES, NO);
        let wallet = MockWallet::new(OWNER);
        let router = MockRouter::new().with_embedded_calls();
        let plan = routed(vec![bridge_leg()], true, MARKET);
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();

        assert_eq!(wallet.sent().len(), 1);
        assert!(receipt.settled);
        assert_eq!(receipt.tx_hash.as_deref(), tracker.steps()[0].tx_hash.as_deref());
    }

    #[tokio::test]
    async fn placeholder_route_completes_settlement_without_transactions() {
        let reader = MockChainReader::new();
        let wallet = MockWallet::new(OWNER);
        let router = MockRouter::new();
        let plan = routed(vec![bridge_leg()], false, PLACEHOLDER_MARKET);
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();

        assert_eq!(wallet.sent().len(), 1);
        assert!(!receipt.settled);
        assert!(tracker.steps().iter().all(|s| s.status == StepStatus::Complete));
    }

    #[tokio::test]
    async fn rejected_settlement_marks_active_step() {
        let reader = MockChainReader::new().with_market(MARKET, YES, NO);
        let wallet = MockWallet::new(OWNER).fail_on(TxMatch::Settlement, MockFailure::Rejected);
        let router = MockRouter::new();
        let plan = FundingPlan::Direct(settlement(MARKET));
        let mut tracker = StepTracker::new(&plan, None);

        let err = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Wallet(_)));
        assert_eq!(tracker.steps()[0].status, StepStatus::Complete);
        assert_eq!(tracker.steps()[1].status, StepStatus::Error);
        assert!(tracker.steps()[1].message.is_some());
    }

    #[tokio::test]
    async fn failed_leg_stops_execution() {
        let reader = MockChainReader::new().with_market(MARKET, YES, NO);
        let wallet = MockWallet::new(OWNER);
        let router = MockRouter::new().failing_at_leg(1);
        let legs = vec![
            ItineraryLeg {
                from_chain_id: 1,
                to_chain_id: 1,
                tool: "uniswap".to_string(),
            },
            bridge_leg(),
        ];
        let plan = routed(legs, false, MARKET);
        let mut tracker = StepTracker::new(&plan, None);

        let err = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::Routing(_)));
        let statuses: Vec<StepStatus> = tracker.steps().iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![
                StepStatus::Complete,
                StepStatus::Error,
                StepStatus::Pending,
                StepStatus::Pending
            ]
        );
        assert_eq!(wallet.sent().len(), 1);
    }

    #[tokio::test]
    async fn foreign_recipient_is_refused() {
        let reader = MockChainReader::new();
        let wallet = MockWallet::new(Address::repeat_byte(0x01));
        let router = MockRouter::new();
        let plan = FundingPlan::Direct(settlement(MARKET));
        let mut tracker = StepTracker::new(&plan, None);

        let err = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::RecipientMismatch { .. }));
        assert!(wallet.sent().is_empty());
    }

    #[tokio::test]
    async fn baseline_is_captured_before_settlement() {
        let reader = MockChainReader::new()
            .with_market(MARKET, YES, NO)
            .with_token(8453, YES, OWNER, U256::from(7_000_000u64));
        let wallet = MockWallet::new(OWNER).linked(reader.clone());
        let router = MockRouter::new();
        let plan = FundingPlan::Direct(settlement(MARKET));
        let mut tracker = StepTracker::new(&plan, None);

        let receipt = execute_plan(context(&wallet, &reader, &router), &plan, &mut tracker)
            .await
            .unwrap();
        assert_eq!(receipt.baseline, U256::from(7_000_000u64));
    }
}
