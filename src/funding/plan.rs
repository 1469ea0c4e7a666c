//! Quote Builder and the [`FundingPlan`] it produces.

use std::sync::Arc;
use std::time::Instant;

use alloy::primitives::{Address, U256};
use rust_decimal::Decimal;
use strum::{Display, IntoStaticStr};
use tracing::{info, instrument};

use crate::chain::catalog::SourceOption;
use crate::chain::units::{from_base_units, to_base_units};
use crate::error::QuoteError;
use crate::market::contract::buy_for_calldata;
use crate::market::{Destination, MarketTarget, Side, PLACEHOLDER_MARKET};
use crate::metrics;
use crate::routing::{ContractCall, Itinerary, RouteRequest, RoutingEngine};

/// Everything needed to perform the terminal `buyFor` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Market contract.
    pub market: Address,
    /// Market identifier used in the trade log.
    pub market_id: String,
    /// Position side.
    pub side: Side,
    /// Amount of settlement token spent, in base units.
    pub amount: U256,
    /// Requested amount in settlement token units.
    pub amount_human: Decimal,
    /// Owner of the resulting position.
    pub recipient: Address,
    /// Destination chain.
    pub chain_id: u64,
    /// Settlement token.
    pub token: Address,
}

impl Settlement {
    /// Whether the market is the pre-deployment placeholder.
    pub fn is_placeholder(&self) -> bool {
        self.market == PLACEHOLDER_MARKET
    }

    /// Amount the settlement actually spends, in token units.
    pub fn spent(&self, decimals: u8) -> Decimal {
        from_base_units(self.amount, decimals).unwrap_or(self.amount_human)
    }
}

/// Swap/bridge itinerary followed by a settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedPlan {
    /// Source the itinerary spends.
    pub source: SourceOption,
    /// Itinerary returned by the routing engine.
    pub itinerary: Itinerary,
    /// Settlement performed after the itinerary, or embedded in it.
    pub settlement: Settlement,
}

impl RoutedPlan {
    /// Whether the routing engine performs the settlement call itself.
    pub fn embeds_settlement(&self) -> bool {
        self.itinerary.embeds_call
    }
}

/// Plan discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum PlanKind {
    /// Nothing to move, no real market to call.
    Noop,
    /// Approve and settle on the destination chain.
    Direct,
    /// Route through the engine, then settle.
    Routed,
}

/// How a position will be paid for.
#[derive(Debug, Clone, PartialEq)]
pub enum FundingPlan {
    /// Source is already the settlement asset and the market is a placeholder.
    Noop(Settlement),
    /// Source is already the settlement asset on the destination chain.
    Direct(Settlement),
    /// Source needs swapping and/or bridging first.
    Routed(RoutedPlan),
}

impl FundingPlan {
    /// Plan discriminant.
    pub fn kind(&self) -> PlanKind {
        match self {
            FundingPlan::Noop(_) => PlanKind::Noop,
            FundingPlan::Direct(_) => PlanKind::Direct,
            FundingPlan::Routed(_) => PlanKind::Routed,
        }
    }

    /// Settlement data.
    pub fn settlement(&self) -> &Settlement {
        match self {
            FundingPlan::Noop(s) | FundingPlan::Direct(s) => s,
            FundingPlan::Routed(routed) => &routed.settlement,
        }
    }

    /// Declared owner of the resulting position.
    pub fn recipient(&self) -> Address {
        self.settlement().recipient
    }

    /// Itinerary, for routed plans.
    pub fn itinerary(&self) -> Option<&Itinerary> {
        match self {
            FundingPlan::Routed(routed) => Some(&routed.itinerary),
            _ => None,
        }
    }
}

/// Input to [`QuoteBuilder::quote`].
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteRequest {
    /// Chosen source.
    pub source: SourceOption,
    /// Target market.
    pub market: MarketTarget,
    /// Position side.
    pub side: Side,
    /// Amount in settlement token units.
    pub amount: Decimal,
    /// Owner of the resulting position.
    pub recipient: Address,
}

/// Turns a chosen source into a [`FundingPlan`].
///
/// Quoting only reads from the routing engine; it never touches the wallet.
#[derive(Clone)]
pub struct QuoteBuilder {
    router: Arc<dyn RoutingEngine>,
    destination: Destination,
    settlement_gas_limit: u64,
}

impl QuoteBuilder {
    /// Create a builder.
    pub fn new(router: Arc<dyn RoutingEngine>, destination: Destination, settlement_gas_limit: u64) -> Self {
        Self {
            router,
            destination,
            settlement_gas_limit,
        }
    }

    /// Destination settlement asset.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Gas limit attached to settlement calls.
    pub fn settlement_gas_limit(&self) -> u64 {
        self.settlement_gas_limit
    }

    fn settlement(&self, request: &QuoteRequest) -> Result<Settlement, QuoteError> {
        if request.amount <= Decimal::ZERO {
            return Err(QuoteError::InvalidAmount(format!(
                "amount must be positive, got {}",
                request.amount
            )));
        }

        let amount = to_base_units(request.amount, self.destination.settlement_decimals)
            .filter(|a| !a.is_zero())
            .ok_or_else(|| {
                QuoteError::InvalidAmount(format!(
                    "{} is not representable with {} decimals",
                    request.amount, self.destination.settlement_decimals
                ))
            })?;

        Ok(Settlement {
            market: request.market.address,
            market_id: request.market.id.clone(),
            side: request.side,
            amount,
            amount_human: request.amount,
            recipient: request.recipient,
            chain_id: self.destination.chain_id,
            token: self.destination.settlement_token,
        })
    }

    /// Build a plan for `request`.
    #[instrument(skip(self, request), fields(source = request.source.label, side = %request.side, amount = %request.amount))]
    pub async fn quote(&self, request: &QuoteRequest) -> Result<FundingPlan, QuoteError> {
        let start = Instant::now();
        let mut settlement = self.settlement(request)?;
        let source = &request.source;

        if self
            .destination
            .is_settlement_asset(source.chain_id, source.token_address)
        {
            let plan = if request.market.is_placeholder() {
                FundingPlan::Noop(settlement)
            } else {
                FundingPlan::Direct(settlement)
            };
            metrics::record_quote_latency(start, plan.kind().into());
            info!(kind = %plan.kind(), "Quote ready");
            return Ok(plan);
        }

        let embed = self.router.supports_embedded_calls();

        // Real markets are paid an exact settlement amount, so their routes are
        // sized on the output side. The placeholder spends the entered amount
        // of the source token.
        let route_request = if request.market.is_placeholder() {
            let from_amount = to_base_units(request.amount, source.decimals)
                .filter(|a| !a.is_zero())
                .ok_or_else(|| {
                    QuoteError::InvalidAmount(format!(
                        "{} is not representable in {}",
                        request.amount, source.token_symbol
                    ))
                })?;
            RouteRequest {
                from_chain_id: source.chain_id,
                from_token: source.token_address,
                from_amount: Some(from_amount),
                from_address: request.recipient,
                to_chain_id: self.destination.chain_id,
                to_token: self.destination.settlement_token,
                to_amount: None,
                to_address: request.recipient,
                embedded_call: None,
            }
        } else {
            RouteRequest {
                from_chain_id: source.chain_id,
                from_token: source.token_address,
                from_amount: None,
                from_address: request.recipient,
                to_chain_id: self.destination.chain_id,
                to_token: self.destination.settlement_token,
                to_amount: Some(settlement.amount),
                to_address: request.recipient,
                embedded_call: embed.then(|| ContractCall {
                    from_token: self.destination.settlement_token,
                    from_amount: settlement.amount,
                    to_contract: settlement.market,
                    calldata: buy_for_calldata(settlement.amount, settlement.side, settlement.recipient),
                    gas_limit: self.settlement_gas_limit,
                }),
            }
        };

        let Some(itinerary) = self.router.get_route(&route_request).await? else {
            metrics::inc_quotes_no_route();
            return Err(QuoteError::NoRouteFound {
                from_chain_id: source.chain_id,
                from_token: source.token_symbol.to_string(),
                to_chain_id: self.destination.chain_id,
            });
        };

        if !itinerary.embeds_call {
            if let Some(min) = itinerary.to_amount_min {
                settlement.amount = settlement.amount.min(min);
            }
        }

        let plan = FundingPlan::Routed(RoutedPlan {
            source: source.clone(),
            itinerary,
            settlement,
        });
        metrics::record_quote_latency(start, plan.kind().into());
        info!(kind = %plan.kind(), "Quote ready");
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::catalog::SOURCE_CATALOG;
    use crate::chain::mock::MockRouter;
    use crate::market::contract::{decode_write, WriteCall};
    use rust_decimal_macros::dec;

    fn destination() -> Destination {
        Destination {
            chain_id: 8453,
            settlement_token: SOURCE_CATALOG[0].token_address,
            settlement_symbol: "USDC".to_string(),
            settlement_decimals: 6,
        }
    }

    fn source(label: &str) -> SourceOption {
        SOURCE_CATALOG
            .iter()
            .find(|s| s.label == label)
            .cloned()
            .unwrap()
    }

    fn request(label: &str, market: MarketTarget) -> QuoteRequest {
        QuoteRequest {
            source: source(label),
            market,
            side: Side::Yes,
            amount: dec!(20),
            recipient: Address::repeat_byte(0x42),
        }
    }

    fn market() -> MarketTarget {
        MarketTarget::deployed(Address::repeat_byte(0x77))
    }

    #[tokio::test]
    async fn settlement_asset_gives_direct_plan_without_route() {
        let router = MockRouter::new();
        let builder = QuoteBuilder::new(Arc::new(router.clone()), destination(), 300_000);

        let plan = builder.quote(&request("USDC on Base", market())).await.unwrap();

        assert_eq!(plan.kind(), PlanKind::Direct);
        assert_eq!(plan.settlement().amount, U256::from(20_000_000u64));
        assert!(router.requests().is_empty());
    }

    #[tokio::test]
    async fn placeholder_market_gives_noop() {
        let builder = QuoteBuilder::new(Arc::new(MockRouter::new()), destination(), 300_000);
        let plan = builder
            .quote(&request("USDC on Base", MarketTarget::placeholder("demo")))
            .await
            .unwrap();
        assert_eq!(plan.kind(), PlanKind::Noop);
    }

    #[tokio::test]
    async fn embeds_settlement_when_supported() {
        let router = MockRouter::new().with_embedded_calls();
        let builder = QuoteBuilder::new(Arc::new(router.clone()), destination(), 300_000);

        let plan = builder.quote(&request("ETH on Ethereum", market())).await.unwrap();

        let FundingPlan::Routed(routed) = &plan else {
            panic!("expected routed plan");
        };
        assert!(routed.embeds_settlement());

        let sent = router.requests();
        let call = sent[0].embedded_call.as_ref().unwrap();
        assert_eq!(call.gas_limit, 300_000);
        assert_eq!(
            decode_write(&call.calldata),
            Some(WriteCall::BuyFor {
                amount: U256::from(20_000_000u64),
                side: Side::Yes,
                recipient: Address::repeat_byte(0x42),
            })
        );
        assert_eq!(plan.recipient(), Address::repeat_byte(0x42));
    }

    #[tokio::test]
    async fn placeholder_never_embeds() {
        let router = MockRouter::new().with_embedded_calls();
        let builder = QuoteBuilder::new(Arc::new(router.clone()), destination(), 300_000);

        let plan = builder
            .quote(&request("USDT on Polygon", MarketTarget::placeholder("demo")))
            .await
            .unwrap();

        assert_eq!(plan.kind(), PlanKind::Routed);
        assert!(router.requests()[0].embedded_call.is_none());
        assert_eq!(router.requests()[0].from_amount, Some(U256::from(20_000_000u64)));
        assert_eq!(router.requests()[0].to_amount, None);
    }

    #[tokio::test]
    async fn volatile_source_route_is_sized_by_settlement_amount() {
        let router = MockRouter::new();
        let builder = QuoteBuilder::new(Arc::new(router.clone()), destination(), 300_000);

        let plan = builder.quote(&request("ETH on Ethereum", market())).await.unwrap();

        assert_eq!(plan.kind(), PlanKind::Routed);
        let sent = router.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from_chain_id, 1);
        assert_eq!(sent[0].from_amount, None);
        assert_eq!(sent[0].to_amount, Some(U256::from(20_000_000u64)));
        assert!(sent[0].embedded_call.is_none());
        assert_eq!(plan.settlement().amount, U256::from(20_000_000u64));
    }

    #[tokio::test]
    async fn embedded_route_is_sized_by_settlement_amount() {
        let router = MockRouter::new().with_embedded_calls();
        let builder = QuoteBuilder::new(Arc::new(router.clone()), destination(), 300_000);

        builder.quote(&request("USDT on Polygon", market())).await.unwrap();

        let sent = router.requests();
        assert_eq!(sent[0].from_amount, None);
        assert_eq!(sent[0].to_amount, Some(U256::from(20_000_000u64)));
    }

    #[tokio::test]
    async fn plain_route_caps_settlement_at_minimum_output() {
        let router = MockRouter::new().with_to_amount_min(U256::from(19_500_000u64));
        let builder = QuoteBuilder::new(Arc::new(router), destination(), 300_000);

        let plan = builder.quote(&request("USDC on Arbitrum", market())).await.unwrap();
        assert_eq!(plan.settlement().amount, U256::from(19_500_000u64));
        assert_eq!(plan.settlement().spent(6), dec!(19.5));
        assert_eq!(plan.settlement().amount_human, dec!(20));
    }

    #[tokio::test]
    async fn missing_route_is_no_route_found() {
        let builder = QuoteBuilder::new(Arc::new(MockRouter::without_routes()), destination(), 300_000);
        let err = builder
            .quote(&request("BNB on BSC", market()))
            .await
            .unwrap_err();
        assert!(matches!(err, QuoteError::NoRouteFound { from_chain_id: 56, .. }));
    }

    #[tokio::test]
    async fn rejects_non_positive_amounts() {
        let builder = QuoteBuilder::new(Arc::new(MockRouter::new()), destination(), 300_000);
        let mut req = request("USDC on Base", market());
        req.amount = dec!(0);
        assert!(matches!(
            builder.quote(&req).await,
            Err(QuoteError::InvalidAmount(_))
        ));
    }
}
