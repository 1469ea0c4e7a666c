//! External swap/bridge routing engine.
//!
//! The orchestrator only sees the fields of an [`Itinerary`] it depends on;
//! whatever the engine needs to execute it later stays inside an opaque
//! [`RoutePayload`] that is handed back to the same engine.

pub mod lifi;

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;
use strum::Display;
use tokio::sync::mpsc::UnboundedSender;

use crate::error::RoutingError;
use crate::signing::WalletSigner;

pub use lifi::LifiRouter;

/// Destination-side call attached to an itinerary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    /// Token the call spends on the destination chain.
    pub from_token: Address,
    /// Amount the call spends.
    pub from_amount: U256,
    /// Contract to call.
    pub to_contract: Address,
    /// Encoded call.
    pub calldata: Bytes,
    /// Gas limit for the call.
    pub gas_limit: u64,
}

/// Route request for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    /// Source chain.
    pub from_chain_id: u64,
    /// Source token.
    pub from_token: Address,
    /// Amount to spend, in source token base units; `None` when the route is
    /// sized by `to_amount`.
    pub from_amount: Option<U256>,
    /// Wallet paying for the route.
    pub from_address: Address,
    /// Destination chain.
    pub to_chain_id: u64,
    /// Destination token.
    pub to_token: Address,
    /// Exact amount required on the destination.
    pub to_amount: Option<U256>,
    /// Who receives the output.
    pub to_address: Address,
    /// Optional trailing call executed atomically on the destination.
    pub embedded_call: Option<ContractCall>,
}

/// One swap/bridge hop of an itinerary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItineraryLeg {
    /// Chain the leg starts on.
    pub from_chain_id: u64,
    /// Chain the leg ends on.
    pub to_chain_id: u64,
    /// Bridge/DEX used by the engine.
    pub tool: String,
}

impl ItineraryLeg {
    /// Whether the leg moves funds between chains.
    pub fn is_cross_chain(&self) -> bool {
        self.from_chain_id != self.to_chain_id
    }
}

/// Engine-specific data needed to execute an itinerary.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePayload(pub(crate) serde_json::Value);

/// Multi-leg swap/bridge path returned by the routing engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    /// Engine route identifier.
    pub id: String,
    /// Ordered legs.
    pub legs: Vec<ItineraryLeg>,
    /// Whether the settlement call runs inside the itinerary.
    pub embeds_call: bool,
    /// Guaranteed minimum output on the destination, when reported.
    pub to_amount_min: Option<U256>,
    pub(crate) payload: RoutePayload,
}

impl Itinerary {
    /// Build an itinerary around an engine payload.
    pub fn new(
        id: impl Into<String>,
        legs: Vec<ItineraryLeg>,
        embeds_call: bool,
        to_amount_min: Option<U256>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            legs,
            embeds_call,
            to_amount_min,
            payload: RoutePayload(payload),
        }
    }
}

/// Execution status of one leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LegStatus {
    /// Leg is being signed or is in flight.
    Pending,
    /// Leg finished.
    Done,
    /// Leg failed.
    Failed,
}

/// Progress event emitted by the engine while executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegUpdate {
    /// Leg index within the itinerary.
    pub index: usize,
    /// New status.
    pub status: LegStatus,
    /// Transaction hash, once known.
    pub tx_hash: Option<String>,
    /// Explorer link, once known.
    pub tx_link: Option<String>,
    /// Failure message.
    pub message: Option<String>,
}

impl LegUpdate {
    /// Leg started or progressed.
    pub fn pending(index: usize) -> Self {
        Self {
            index,
            status: LegStatus::Pending,
            tx_hash: None,
            tx_link: None,
            message: None,
        }
    }

    /// Leg finished.
    pub fn done(index: usize, tx_hash: Option<String>, tx_link: Option<String>) -> Self {
        Self {
            index,
            status: LegStatus::Done,
            tx_hash,
            tx_link,
            message: None,
        }
    }

    /// Leg failed.
    pub fn failed(index: usize, message: impl Into<String>) -> Self {
        Self {
            index,
            status: LegStatus::Failed,
            tx_hash: None,
            tx_link: None,
            message: Some(message.into()),
        }
    }

    /// Attach a transaction hash.
    pub fn with_tx(mut self, tx_hash: String, tx_link: Option<String>) -> Self {
        self.tx_hash = Some(tx_hash);
        self.tx_link = tx_link;
        self
    }
}

/// Swap/bridge quoting and execution service.
#[async_trait]
pub trait RoutingEngine: Send + Sync {
    /// Whether a destination-side call can be attached atomically.
    fn supports_embedded_calls(&self) -> bool;

    /// Find an itinerary; `None` when the pair is not routable.
    async fn get_route(&self, request: &RouteRequest) -> Result<Option<Itinerary>, RoutingError>;

    /// Execute an itinerary, reporting per-leg progress on `progress`.
    async fn execute(
        &self,
        itinerary: &Itinerary,
        wallet: &dyn WalletSigner,
        progress: UnboundedSender<LegUpdate>,
    ) -> Result<(), RoutingError>;
}
