//! Integration tests for the position-funding orchestrator.
//!
//! The scenario tests run against the in-memory chain, wallet and router
//! doubles. Tests marked `#[ignore]` talk to public RPC endpoints and the
//! LI.FI API.
//! Run them with: cargo test --test integration -- --ignored

use std::sync::Arc;

use alloy::primitives::{address, Address, U256};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

use pulse_funding::chain::catalog::{chain_ids, NATIVE_TOKEN, SOURCE_CATALOG};
use pulse_funding::chain::{
    MockChainReader, MockFailure, MockRouter, MockWallet, RpcChainReader, TxMatch,
};
use pulse_funding::config::Config;
use pulse_funding::funding::steps::{LABEL_APPROVE, LABEL_BRIDGE, LABEL_PLACE};
use pulse_funding::funding::{
    steps_for_plan, ErrorClass, FlowState, FundingSession, NoSleep, PlanKind, QuoteRequest,
    RetryAction, StepStatus,
};
use pulse_funding::market::{MarketTarget, Side};
use pulse_funding::routing::{LifiRouter, RouteRequest, RoutingEngine};
use pulse_funding::trading::{MemoryTradeLog, TradeKind, TradeLog};

const OWNER: Address = address!("1111111111111111111111111111111111111111");
const MARKET: Address = address!("2222222222222222222222222222222222222222");
const YES: Address = address!("3333333333333333333333333333333333333333");
const NO: Address = address!("4444444444444444444444444444444444444444");

const USDC_ON_BASE: usize = 0;

fn eth_on_ethereum() -> usize {
    SOURCE_CATALOG
        .iter()
        .position(|s| s.chain_id == chain_ids::ETHEREUM && s.token_address == NATIVE_TOKEN)
        .unwrap()
}

fn usdc(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000u64)
}

fn session(wallet: MockWallet, reader: MockChainReader, router: MockRouter) -> FundingSession {
    let destination = Config::default().destination().unwrap();
    FundingSession::new(Arc::new(wallet), Arc::new(reader), Arc::new(router), destination)
        .with_sleeper(Arc::new(NoSleep))
}

fn request(source: usize, market: MarketTarget) -> QuoteRequest {
    QuoteRequest {
        source: SOURCE_CATALOG[source].clone(),
        market,
        side: Side::Yes,
        amount: dec!(20),
        recipient: OWNER,
    }
}

#[tokio::test]
async fn scenario_a_settlement_asset_on_destination_goes_direct() {
    let reader = MockChainReader::new()
        .with_market(MARKET, YES, NO)
        .with_token(chain_ids::BASE, SOURCE_CATALOG[USDC_ON_BASE].token_address, OWNER, usdc(50));
    let wallet = MockWallet::new(OWNER).linked(reader.clone());
    let router = MockRouter::new();
    let session = session(wallet.clone(), reader, router.clone());

    let selection = session.find_source(dec!(20)).await;
    assert_eq!(selection.chosen_index(), Some(USDC_ON_BASE));

    let mut flow = session.flow();
    let plan = flow
        .quote(request(USDC_ON_BASE, MarketTarget::deployed(MARKET)))
        .await
        .unwrap();
    assert_eq!(plan.kind(), PlanKind::Direct);
    let labels: Vec<String> = steps_for_plan(plan).into_iter().map(|s| s.label).collect();
    assert_eq!(labels, vec![LABEL_APPROVE.to_string(), LABEL_PLACE.to_string()]);
    assert!(router.requests().is_empty());

    let outcome = flow.execute(None, &CancellationToken::new()).await;
    assert!(outcome.succeeded());
    assert_eq!(wallet.sent().len(), 2);
    assert_eq!(outcome.verified.unwrap().shares, "20");
}

#[tokio::test]
async fn scenario_a_placeholder_market_is_noop() {
    let reader = MockChainReader::new()
        .with_token(chain_ids::BASE, SOURCE_CATALOG[USDC_ON_BASE].token_address, OWNER, usdc(50));
    let wallet = MockWallet::new(OWNER);
    let router = MockRouter::new();
    let session = session(wallet.clone(), reader, router.clone());

    let mut flow = session.flow();
    let plan = flow
        .quote(request(USDC_ON_BASE, MarketTarget::placeholder("pre-launch")))
        .await
        .unwrap();
    assert_eq!(plan.kind(), PlanKind::Noop);
    assert_eq!(steps_for_plan(plan).len(), 1);

    let outcome = flow.execute(None, &CancellationToken::new()).await;
    assert!(outcome.succeeded());
    assert_eq!(outcome.tx_hash, None);
    assert!(wallet.sent().is_empty());
    assert!(router.requests().is_empty());
}

#[tokio::test]
async fn scenario_b_volatile_source_is_routed_through_bridge() {
    let eth = eth_on_ethereum();
    let reader = MockChainReader::new()
        .with_market(MARKET, YES, NO)
        .with_native(chain_ids::ETHEREUM, OWNER, U256::from(10u64).pow(U256::from(18u64)));
    let wallet = MockWallet::new(OWNER).linked(reader.clone());
    let router = MockRouter::new();
    let session = session(wallet.clone(), reader, router.clone());

    assert_eq!(session.find_source(dec!(20)).await.chosen_index(), Some(eth));

    let mut flow = session.flow();
    let plan = flow.quote(request(eth, MarketTarget::deployed(MARKET))).await.unwrap();
    assert_eq!(plan.kind(), PlanKind::Routed);
    assert!(steps_for_plan(plan).iter().any(|s| s.label == LABEL_BRIDGE));

    let requests = router.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].from_chain_id, chain_ids::ETHEREUM);
    assert_eq!(requests[0].to_chain_id, chain_ids::BASE);
    assert_eq!(requests[0].from_amount, None);
    assert_eq!(requests[0].to_amount, Some(usdc(20)));

    let outcome = flow.execute(None, &CancellationToken::new()).await;
    assert!(outcome.succeeded());
    assert!(outcome.steps.iter().all(|s| s.status == StepStatus::Complete));
    // bridge leg, approve, buyFor
    assert_eq!(wallet.sent().len(), 3);
    assert!(outcome.verified.is_some());
}

#[tokio::test]
async fn scenario_b_embedded_settlement_runs_inside_the_route() {
    let eth = eth_on_ethereum();
    let reader = MockChainReader::new().with_market(MARKET, YES, NO);
    let wallet = MockWallet::new(OWNER);
    let router = MockRouter::new().with_embedded_calls().linked(reader.clone());
    let session = session(wallet.clone(), reader, router.clone());

    let mut flow = session.flow();
    let plan = flow.quote(request(eth, MarketTarget::deployed(MARKET))).await.unwrap();
    assert!(plan.itinerary().unwrap().embeds_call);
    assert!(router.requests()[0].embedded_call.is_some());

    let outcome = flow.execute(None, &CancellationToken::new()).await;
    assert!(outcome.succeeded());
    assert_eq!(wallet.sent().len(), 1);
    assert_eq!(outcome.verified.unwrap().raw_shares, usdc(20));
}

#[tokio::test]
async fn scenario_c_rejected_settlement_offers_retry() {
    let reader = MockChainReader::new().with_market(MARKET, YES, NO);
    let wallet = MockWallet::new(OWNER).fail_on(TxMatch::Settlement, MockFailure::Rejected);
    let session = session(wallet.clone(), reader, MockRouter::new());

    let mut flow = session.flow();
    flow.quote(request(USDC_ON_BASE, MarketTarget::deployed(MARKET)))
        .await
        .unwrap();
    let outcome = flow.execute(None, &CancellationToken::new()).await;

    assert_eq!(outcome.state, FlowState::Error);
    assert_eq!(flow.state(), FlowState::Error);
    let error = outcome.error.unwrap();
    assert_eq!(error.class, ErrorClass::Recoverable);
    assert!(error.actions().contains(&RetryAction::RetrySamePlan));
    assert_eq!(outcome.steps[0].status, StepStatus::Complete);
    assert_eq!(outcome.steps[1].status, StepStatus::Error);
}

#[tokio::test]
async fn scenario_d_missing_route_requires_requote() {
    let eth = eth_on_ethereum();
    let session = session(
        MockWallet::new(OWNER),
        MockChainReader::new(),
        MockRouter::without_routes(),
    );

    let mut flow = session.flow();
    let error = flow
        .quote(request(eth, MarketTarget::deployed(MARKET)))
        .await
        .unwrap_err();

    assert_eq!(flow.state(), FlowState::Error);
    assert_eq!(error.class, ErrorClass::RequiresRequote);
    assert_eq!(error.actions(), vec![RetryAction::Requote]);
    assert!(flow.plan().is_none());
}

#[tokio::test]
async fn scenario_e_unconfirmed_position_still_succeeds() {
    let reader = MockChainReader::new().with_market(MARKET, YES, NO);
    let wallet = MockWallet::new(OWNER);
    let log = Arc::new(MemoryTradeLog::new());
    let session = session(wallet, reader.clone(), MockRouter::new()).with_trade_log(log.clone());

    let mut flow = session.flow();
    flow.quote(request(USDC_ON_BASE, MarketTarget::deployed(MARKET)))
        .await
        .unwrap();
    let outcome = flow.execute(None, &CancellationToken::new()).await;

    assert_eq!(outcome.state, FlowState::Success);
    assert!(outcome.error.is_none());
    assert!(outcome.verified.is_none());
    // one baseline read, then ten verification attempts
    assert_eq!(reader.token_reads(YES), 11);

    let history = log.history(OWNER).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].kind, TradeKind::Buy);
}

#[tokio::test]
#[ignore = "requires network access"]
async fn lifi_quotes_eth_to_base_usdc() {
    let config = Config::default();
    let router = LifiRouter::new(&config).unwrap();
    let destination = config.destination().unwrap();

    let route = router
        .get_route(&RouteRequest {
            from_chain_id: chain_ids::ETHEREUM,
            from_token: NATIVE_TOKEN,
            from_amount: Some(U256::from(10u64).pow(U256::from(16u64))),
            from_address: OWNER,
            to_chain_id: destination.chain_id,
            to_token: destination.settlement_token,
            to_amount: None,
            to_address: OWNER,
            embedded_call: None,
        })
        .await
        .unwrap();

    let route = route.expect("a route from ETH to Base USDC");
    assert!(!route.legs.is_empty());
}

#[tokio::test]
#[ignore = "requires network access"]
async fn public_rpc_scan_does_not_fail() {
    let config = Config::default();
    let reader = RpcChainReader::new(&config).unwrap();

    let entries = pulse_funding::funding::scan_balances(
        &reader,
        &SOURCE_CATALOG,
        OWNER,
        config.balance_query_timeout(),
    )
    .await;

    assert!(entries.iter().all(|e| e.raw_balance > U256::ZERO));
}
