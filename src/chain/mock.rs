//! In-memory doubles for the chain, wallet and routing ports.
//!
//! These can be used in tests without touching any network. The wallet and
//! router can be linked to a [`MockChainReader`] so that settlement calls
//! credit position tokens the way a real market contract would.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::catalog::explorer_tx_url;
use super::reader::ChainReader;
use crate::error::{ChainError, RoutingError, WalletError};
use crate::market::contract::{decode_view, decode_write, ViewCall, WriteCall};
use crate::market::Side;
use crate::routing::{Itinerary, ItineraryLeg, LegUpdate, RouteRequest, RoutingEngine};
use crate::signing::{TxRequest, WalletSigner};

#[derive(Debug, Default)]
struct ChainState {
    native: HashMap<(u64, Address), U256>,
    tokens: HashMap<(u64, Address, Address), U256>,
    scripted: HashMap<(Address, Address), VecDeque<U256>>,
    position_tokens: HashMap<(Address, Side), Address>,
    failing_chains: HashSet<u64>,
    slow_chains: HashMap<u64, Duration>,
    token_reads: HashMap<Address, usize>,
}

/// Scriptable [`ChainReader`].
#[derive(Debug, Clone, Default)]
pub struct MockChainReader {
    state: Arc<Mutex<ChainState>>,
}

impl MockChainReader {
    /// Create an empty reader; every balance reads as zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a native balance.
    pub fn with_native(self, chain_id: u64, owner: Address, amount: U256) -> Self {
        self.state
            .lock()
            .unwrap()
            .native
            .insert((chain_id, owner), amount);
        self
    }

    /// Set an ERC20 balance.
    pub fn with_token(self, chain_id: u64, token: Address, owner: Address, amount: U256) -> Self {
        self.set_token_balance(chain_id, token, owner, amount);
        self
    }

    /// Register the YES/NO tokens of a market.
    pub fn with_market(self, market: Address, yes_token: Address, no_token: Address) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.position_tokens.insert((market, Side::Yes), yes_token);
            state.position_tokens.insert((market, Side::No), no_token);
        }
        self
    }

    /// Script successive `balanceOf` results for a token; the last value repeats.
    pub fn with_balance_sequence(self, token: Address, owner: Address, values: Vec<U256>) -> Self {
        self.state
            .lock()
            .unwrap()
            .scripted
            .insert((token, owner), values.into());
        self
    }

    /// Fail every read on a chain.
    pub fn failing_chain(self, chain_id: u64) -> Self {
        self.state.lock().unwrap().failing_chains.insert(chain_id);
        self
    }

    /// Delay every read on a chain.
    pub fn slow_chain(self, chain_id: u64, delay: Duration) -> Self {
        self.state
            .lock()
            .unwrap()
            .slow_chains
            .insert(chain_id, delay);
        self
    }

    /// Overwrite an ERC20 balance.
    pub fn set_token_balance(&self, chain_id: u64, token: Address, owner: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .tokens
            .insert((chain_id, token, owner), amount);
    }

    /// Add to an ERC20 balance.
    pub fn credit(&self, chain_id: u64, token: Address, owner: Address, amount: U256) {
        let mut state = self.state.lock().unwrap();
        let entry = state.tokens.entry((chain_id, token, owner)).or_default();
        *entry = entry.saturating_add(amount);
    }

    /// Credit position tokens of one side of a market.
    pub fn credit_position(&self, chain_id: u64, market: Address, side: Side, owner: Address, amount: U256) {
        let token = self
            .state
            .lock()
            .unwrap()
            .position_tokens
            .get(&(market, side))
            .copied();
        if let Some(token) = token {
            self.credit(chain_id, token, owner, amount);
        }
    }

    /// Number of `balanceOf` calls made against a token.
    pub fn token_reads(&self, token: Address) -> usize {
        self.state
            .lock()
            .unwrap()
            .token_reads
            .get(&token)
            .copied()
            .unwrap_or(0)
    }

    async fn enter(&self, chain_id: u64) -> Result<(), ChainError> {
        let delay = self.state.lock().unwrap().slow_chains.get(&chain_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.lock().unwrap().failing_chains.contains(&chain_id) {
            return Err(ChainError::Rpc {
                chain_id,
                reason: "mock RPC failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_native_balance(&self, chain_id: u64, owner: Address) -> Result<U256, ChainError> {
        self.enter(chain_id).await?;
        let state = self.state.lock().unwrap();
        Ok(state.native.get(&(chain_id, owner)).copied().unwrap_or_default())
    }

    async fn read_contract(
        &self,
        chain_id: u64,
        to: Address,
        calldata: Bytes,
    ) -> Result<Bytes, ChainError> {
        self.enter(chain_id).await?;

        let call = decode_view(&calldata)
            .ok_or_else(|| ChainError::Decode("unknown view call".to_string()))?;

        let mut state = self.state.lock().unwrap();
        match call {
            ViewCall::BalanceOf(owner) => {
                *state.token_reads.entry(to).or_default() += 1;

                let scripted = state.scripted.get_mut(&(to, owner)).and_then(|values| {
                    if values.len() > 1 {
                        values.pop_front()
                    } else {
                        values.front().copied()
                    }
                });

                let balance = scripted.unwrap_or_else(|| {
                    state
                        .tokens
                        .get(&(chain_id, to, owner))
                        .copied()
                        .unwrap_or_default()
                });
                Ok(Bytes::from(balance.abi_encode()))
            }
            ViewCall::PositionToken(side) => {
                let token = state
                    .position_tokens
                    .get(&(to, side))
                    .copied()
                    .ok_or_else(|| ChainError::Decode(format!("no {} token for {}", side, to)))?;
                Ok(Bytes::from(token.abi_encode()))
            }
        }
    }
}

/// Which submissions a [`MockWallet`] failure rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxMatch {
    /// The n-th submission (0-based).
    Nth(usize),
    /// Any `approve`.
    Approve,
    /// Any `buyFor`.
    Settlement,
    /// Any `sell`.
    Sell,
}

/// Failure injected by a [`MockWallet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockFailure {
    /// User rejected the request.
    Rejected,
    /// Transaction mined but reverted.
    Reverted,
    /// Node refused the transaction.
    Submission(String),
}

impl MockFailure {
    fn into_error(self, tx_hash: String) -> WalletError {
        match self {
            MockFailure::Rejected => WalletError::Rejected("User rejected the request.".to_string()),
            MockFailure::Reverted => WalletError::Reverted { tx_hash },
            MockFailure::Submission(reason) => WalletError::Submission(reason),
        }
    }
}

#[derive(Debug, Default)]
struct WalletState {
    sent: Vec<TxRequest>,
    switches: Vec<u64>,
    failures: Vec<(TxMatch, MockFailure)>,
}

/// Scriptable [`WalletSigner`].
#[derive(Debug, Clone)]
pub struct MockWallet {
    address: Address,
    active_chain: Arc<AtomicU64>,
    nonce: Arc<AtomicU64>,
    state: Arc<Mutex<WalletState>>,
    chain: Option<MockChainReader>,
}

impl MockWallet {
    /// Create a wallet that accepts every request.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            active_chain: Arc::new(AtomicU64::new(0)),
            nonce: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(WalletState::default())),
            chain: None,
        }
    }

    /// Credit position tokens on `chain` whenever `buyFor` succeeds.
    pub fn linked(mut self, chain: MockChainReader) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Fail matching submissions.
    pub fn fail_on(self, matcher: TxMatch, failure: MockFailure) -> Self {
        self.state.lock().unwrap().failures.push((matcher, failure));
        self
    }

    /// Every submission so far, in order.
    pub fn sent(&self) -> Vec<TxRequest> {
        self.state.lock().unwrap().sent.clone()
    }

    /// Every chain switch so far.
    pub fn switches(&self) -> Vec<u64> {
        self.state.lock().unwrap().switches.clone()
    }

    /// Chain the wallet is on.
    pub fn active_chain(&self) -> u64 {
        self.active_chain.load(Ordering::SeqCst)
    }

    fn next_hash(&self) -> String {
        let n = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        format!("0x{:064x}", n)
    }
}

#[async_trait]
impl WalletSigner for MockWallet {
    fn address(&self) -> Address {
        self.address
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.state.lock().unwrap().switches.push(chain_id);
        self.active_chain.store(chain_id, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_and_send(&self, tx: TxRequest) -> Result<String, WalletError> {
        let call = decode_write(&tx.data);
        let failure = {
            let mut state = self.state.lock().unwrap();
            let index = state.sent.len();
            state.sent.push(tx.clone());
            state
                .failures
                .iter()
                .find(|(matcher, _)| match matcher {
                    TxMatch::Nth(n) => *n == index,
                    TxMatch::Approve => matches!(call, Some(WriteCall::Approve { .. })),
                    TxMatch::Settlement => matches!(call, Some(WriteCall::BuyFor { .. })),
                    TxMatch::Sell => matches!(call, Some(WriteCall::Sell { .. })),
                })
                .map(|(_, failure)| failure.clone())
        };

        let tx_hash = self.next_hash();
        if let Some(failure) = failure {
            return Err(failure.into_error(tx_hash));
        }

        if let (Some(chain), Some(WriteCall::BuyFor { amount, side, recipient })) = (&self.chain, call) {
            chain.credit_position(tx.chain_id, tx.to, side, recipient, amount);
        }

        Ok(tx_hash)
    }
}

#[derive(Debug, Default)]
struct RouterState {
    requests: Vec<RouteRequest>,
    executions: usize,
}

/// Scriptable [`RoutingEngine`].
///
/// Each leg is submitted through the wallet as an empty call so that wallet
/// failure rules apply to route execution too.
#[derive(Debug, Clone)]
pub struct MockRouter {
    embedded_calls: bool,
    no_route: bool,
    fail_at_leg: Option<usize>,
    legs: Option<Vec<ItineraryLeg>>,
    to_amount_min: Option<U256>,
    chain: Option<MockChainReader>,
    state: Arc<Mutex<RouterState>>,
}

impl Default for MockRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRouter {
    /// Router that returns a single-leg itinerary for any request.
    pub fn new() -> Self {
        Self {
            embedded_calls: false,
            no_route: false,
            fail_at_leg: None,
            legs: None,
            to_amount_min: None,
            chain: None,
            state: Arc::new(Mutex::new(RouterState::default())),
        }
    }

    /// Router that never finds an itinerary.
    pub fn without_routes() -> Self {
        Self {
            no_route: true,
            ..Self::new()
        }
    }

    /// Accept destination-side calls.
    pub fn with_embedded_calls(mut self) -> Self {
        self.embedded_calls = true;
        self
    }

    /// Use a fixed leg list instead of one leg per request.
    pub fn with_legs(mut self, legs: Vec<ItineraryLeg>) -> Self {
        self.legs = Some(legs);
        self
    }

    /// Report a guaranteed minimum output.
    pub fn with_to_amount_min(mut self, amount: U256) -> Self {
        self.to_amount_min = Some(amount);
        self
    }

    /// Fail execution at a leg.
    pub fn failing_at_leg(mut self, index: usize) -> Self {
        self.fail_at_leg = Some(index);
        self
    }

    /// Credit position tokens on `chain` when an embedded call executes.
    pub fn linked(mut self, chain: MockChainReader) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Route requests received so far.
    pub fn requests(&self) -> Vec<RouteRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Number of executions started.
    pub fn executions(&self) -> usize {
        self.state.lock().unwrap().executions
    }
}

#[async_trait]
impl RoutingEngine for MockRouter {
    fn supports_embedded_calls(&self) -> bool {
        self.embedded_calls
    }

    async fn get_route(&self, request: &RouteRequest) -> Result<Option<Itinerary>, RoutingError> {
        self.state.lock().unwrap().requests.push(request.clone());
        if self.no_route {
            return Ok(None);
        }

        let legs = self.legs.clone().unwrap_or_else(|| {
            vec![ItineraryLeg {
                from_chain_id: request.from_chain_id,
                to_chain_id: request.to_chain_id,
                tool: "mock".to_string(),
            }]
        });

        let embeds_call = self.embedded_calls && request.embedded_call.is_some();
        let payload = serde_json::json!({
            "embeddedCall": request
                .embedded_call
                .as_ref()
                .map(|call| (call.to_contract.to_string(), call.calldata.to_string())),
            "toChainId": request.to_chain_id,
        });

        let id = format!("mock-route-{}", self.state.lock().unwrap().requests.len());
        Ok(Some(Itinerary::new(id, legs, embeds_call, self.to_amount_min, payload)))
    }

    async fn execute(
        &self,
        itinerary: &Itinerary,
        wallet: &dyn WalletSigner,
        progress: UnboundedSender<LegUpdate>,
    ) -> Result<(), RoutingError> {
        self.state.lock().unwrap().executions += 1;

        for (index, leg) in itinerary.legs.iter().enumerate() {
            let _ = progress.send(LegUpdate::pending(index));

            if self.fail_at_leg == Some(index) {
                let message = "bridge transfer failed";
                let _ = progress.send(LegUpdate::failed(index, message));
                return Err(RoutingError::LegFailed {
                    leg: index,
                    message: message.to_string(),
                });
            }

            wallet.switch_chain(leg.from_chain_id).await?;
            let tx_hash = wallet
                .sign_and_send(TxRequest::call(leg.from_chain_id, Address::ZERO, Bytes::new()))
                .await?;
            let link = explorer_tx_url(leg.from_chain_id, &tx_hash);
            let _ = progress.send(LegUpdate::done(index, Some(tx_hash), link));
        }

        if itinerary.embeds_call {
            self.settle_embedded(itinerary);
        }
        Ok(())
    }
}

impl MockRouter {
    fn settle_embedded(&self, itinerary: &Itinerary) {
        let Some(chain) = &self.chain else {
            return;
        };

        let payload = &itinerary.payload.0;
        let to_chain = payload["toChainId"].as_u64().unwrap_or_default();
        let call = payload["embeddedCall"]
            .as_array()
            .and_then(|pair| Some((pair.first()?.as_str()?, pair.get(1)?.as_str()?)));

        if let Some((market, data)) = call {
            let market = market.parse::<Address>().ok();
            let data = data.parse::<Bytes>().ok();
            if let (Some(market), Some(data)) = (market, data) {
                if let Some(WriteCall::BuyFor { amount, side, recipient }) = decode_write(&data) {
                    chain.credit_position(to_chain, market, side, recipient, amount);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::reader::{erc20_balance, position_balance};
    use crate::market::contract::buy_for_calldata;

    fn owner() -> Address {
        Address::repeat_byte(0xaa)
    }

    #[tokio::test]
    async fn reader_returns_configured_balances() {
        let token = Address::repeat_byte(0x01);
        let reader = MockChainReader::new()
            .with_native(1, owner(), U256::from(5u64))
            .with_token(8453, token, owner(), U256::from(7u64));

        assert_eq!(reader.get_native_balance(1, owner()).await.unwrap(), U256::from(5u64));
        assert_eq!(
            erc20_balance(&reader, 8453, token, owner()).await.unwrap(),
            U256::from(7u64)
        );
        assert_eq!(reader.get_native_balance(10, owner()).await.unwrap(), U256::ZERO);
    }

    #[tokio::test]
    async fn failing_chain_errors() {
        let reader = MockChainReader::new().failing_chain(137);
        assert!(reader.get_native_balance(137, owner()).await.is_err());
    }

    #[tokio::test]
    async fn scripted_sequence_repeats_last_value() {
        let token = Address::repeat_byte(0x02);
        let reader = MockChainReader::new().with_balance_sequence(
            token,
            owner(),
            vec![U256::from(1u64), U256::from(2u64)],
        );

        for expected in [1u64, 2, 2] {
            let value = erc20_balance(&reader, 8453, token, owner()).await.unwrap();
            assert_eq!(value, U256::from(expected));
        }
        assert_eq!(reader.token_reads(token), 3);
    }

    #[tokio::test]
    async fn linked_wallet_credits_positions() {
        let market = Address::repeat_byte(0x10);
        let yes = Address::repeat_byte(0x11);
        let reader = MockChainReader::new().with_market(market, yes, Address::repeat_byte(0x12));
        let wallet = MockWallet::new(owner()).linked(reader.clone());

        let data = buy_for_calldata(U256::from(3u64), Side::Yes, owner());
        wallet
            .sign_and_send(TxRequest::call(8453, market, data))
            .await
            .unwrap();

        let shares = position_balance(&reader, 8453, market, Side::Yes, owner())
            .await
            .unwrap();
        assert_eq!(shares, U256::from(3u64));
    }

    #[tokio::test]
    async fn wallet_failure_rules() {
        let wallet = MockWallet::new(owner()).fail_on(TxMatch::Nth(1), MockFailure::Rejected);
        let tx = TxRequest::call(8453, Address::ZERO, Bytes::new());

        assert!(wallet.sign_and_send(tx.clone()).await.is_ok());
        assert!(matches!(
            wallet.sign_and_send(tx).await,
            Err(WalletError::Rejected(_))
        ));
        assert_eq!(wallet.sent().len(), 2);
    }
}
