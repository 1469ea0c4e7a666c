//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use dashmap::DashMap;
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chain::catalog::{SourceOption, SOURCE_CATALOG};
use crate::chain::reader::ChainReader;
use crate::funding::scanner::{scan_balances, BalanceEntry, ScanCoordinator};
use crate::funding::selector::{cost_score, select_source};
use crate::market::Destination;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the service is ready to serve scans.
    pub ready: Arc<AtomicBool>,
    /// Chain access for balance scans.
    pub reader: Arc<dyn ChainReader>,
    /// Destination settlement asset.
    pub destination: Destination,
    /// Per-query balance timeout.
    pub balance_timeout: Duration,
    /// Prometheus renderer, when the recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// Debounce window for balance scans.
    pub scan_debounce: Duration,
    /// One scan coordinator per owner; a newer scan supersedes an older one.
    pub scans: Arc<DashMap<Address, ScanCoordinator>>,
}

impl AppState {
    /// Create new app state.
    pub fn new(reader: Arc<dyn ChainReader>, destination: Destination, balance_timeout: Duration) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            reader,
            destination,
            balance_timeout,
            metrics: None,
            scan_debounce: Duration::ZERO,
            scans: Arc::new(DashMap::new()),
        }
    }

    /// Debounce balance scans for the same owner.
    pub fn with_scan_debounce(mut self, debounce: Duration) -> Self {
        self.scan_debounce = debounce;
        self
    }

    /// Scan coordinator for `owner`.
    pub fn scan_coordinator(&self, owner: Address) -> ScanCoordinator {
        self.scans
            .entry(owner)
            .or_insert_with(|| ScanCoordinator::new(self.scan_debounce))
            .clone()
    }

    /// Attach the Prometheus renderer.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
    /// Destination chain.
    pub destination_chain_id: u64,
    /// Settlement token symbol.
    pub settlement_symbol: String,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Query string of the balances endpoint.
#[derive(Debug, Deserialize)]
pub struct BalancesQuery {
    /// Amount the position needs, in settlement token units.
    pub amount: Option<Decimal>,
}

/// One positive balance.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceView {
    pub source: SourceOption,
    pub balance: String,
    pub raw_balance: String,
    pub cost_score: u8,
}

/// Scan and selection result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesResponse {
    pub owner: String,
    pub required: String,
    pub chosen: Option<BalanceView>,
    pub candidates: Vec<BalanceView>,
    pub balances: Vec<BalanceView>,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse {
        ready: is_ready,
        destination_chain_id: state.destination.chain_id,
        settlement_symbol: state.destination.settlement_symbol.clone(),
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// Funding source catalog.
pub async fn sources() -> impl IntoResponse {
    Json(SOURCE_CATALOG.to_vec())
}

fn view(entry: &BalanceEntry, destination: &Destination) -> Option<BalanceView> {
    let source = SOURCE_CATALOG.get(entry.source_index)?;
    Some(BalanceView {
        source: source.clone(),
        balance: entry.human_balance.to_string(),
        raw_balance: entry.raw_balance.to_string(),
        cost_score: cost_score(source, destination),
    })
}

/// Scan every source for `owner` and select one for `amount`.
pub async fn balances(
    State(state): State<AppState>,
    Path(owner): Path<String>,
    Query(query): Query<BalancesQuery>,
) -> Result<Json<BalancesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let owner: Address = owner.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid address: {}", owner),
            }),
        )
    })?;
    let required = query.amount.unwrap_or(Decimal::ZERO);
    if required < Decimal::ZERO {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "amount must not be negative".to_string(),
            }),
        ));
    }

    let outcome = state
        .scan_coordinator(owner)
        .refresh(|| scan_balances(state.reader.as_ref(), &SOURCE_CATALOG, owner, state.balance_timeout))
        .await;
    let Some(entries) = outcome.fresh() else {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "superseded by a newer scan".to_string(),
            }),
        ));
    };
    let selection = select_source(&entries, required, &SOURCE_CATALOG, &state.destination);
    debug!(owner = %owner, found = entries.len(), chosen = ?selection.chosen_index(), "Balance scan served");

    let destination = &state.destination;
    Ok(Json(BalancesResponse {
        owner: owner.to_string(),
        required: required.to_string(),
        chosen: selection.chosen.as_ref().and_then(|e| view(e, destination)),
        candidates: selection.candidates.iter().filter_map(|e| view(e, destination)).collect(),
        balances: selection.all_balances.iter().filter_map(|e| view(e, destination)).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChainReader;
    use crate::config::Config;

    #[test]
    fn app_state_ready_toggle() {
        let state = AppState::new(
            Arc::new(MockChainReader::new()),
            Config::default().destination().unwrap(),
            Duration::from_secs(1),
        );
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_balance_scan_supersedes_older_one() {
        let owner = Address::repeat_byte(0x11);
        let reader = MockChainReader::new().with_token(
            8453,
            SOURCE_CATALOG[0].token_address,
            owner,
            alloy::primitives::U256::from(50_000_000u64),
        );
        let state = AppState::new(
            Arc::new(reader),
            Config::default().destination().unwrap(),
            Duration::from_secs(1),
        )
        .with_scan_debounce(Duration::from_millis(400));

        let query = |amount| Query(BalancesQuery { amount: Some(amount) });
        let (first, second) = tokio::join!(
            balances(State(state.clone()), Path(owner.to_string()), query(Decimal::from(10))),
            balances(State(state.clone()), Path(owner.to_string()), query(Decimal::from(20))),
        );

        let (status, _) = first.unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        let Json(body) = second.unwrap();
        assert_eq!(body.required, "20");
        assert_eq!(body.chosen.unwrap().balance, "50");
    }
}
