//! Balance Scanner: parallel, fault-isolated balance queries over the catalog.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use futures::future::join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::chain::catalog::SourceOption;
use crate::chain::reader::{source_balance, ChainReader};
use crate::chain::units::from_base_units;
use crate::error::ChainError;
use crate::metrics;

/// Positive balance of one catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceEntry {
    /// Index into the catalog the scan ran over.
    pub source_index: usize,
    /// Balance in token units.
    pub human_balance: Decimal,
    /// Balance in base units.
    #[serde(serialize_with = "serialize_u256")]
    pub raw_balance: U256,
}

fn serialize_u256<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

async fn query_entry(
    reader: &dyn ChainReader,
    index: usize,
    source: &SourceOption,
    owner: Address,
    timeout: Duration,
) -> Result<Option<BalanceEntry>, ChainError> {
    let raw = tokio::time::timeout(timeout, source_balance(reader, source, owner))
        .await
        .map_err(|_| ChainError::Timeout {
            chain_id: source.chain_id,
        })??;

    let human = from_base_units(raw, source.decimals)
        .ok_or_else(|| ChainError::Decode(format!("balance {} does not fit a decimal", raw)))?;

    if raw.is_zero() || human <= Decimal::ZERO {
        return Ok(None);
    }

    Ok(Some(BalanceEntry {
        source_index: index,
        human_balance: human,
        raw_balance: raw,
    }))
}

/// Query every catalog entry concurrently and keep the positive balances.
///
/// A failure or timeout on one entry is logged and dropped; the rest of the
/// scan is unaffected. Results are in catalog order.
#[instrument(skip(reader, catalog), fields(owner = %owner, sources = catalog.len()))]
pub async fn scan_balances(
    reader: &dyn ChainReader,
    catalog: &[SourceOption],
    owner: Address,
    timeout: Duration,
) -> Vec<BalanceEntry> {
    let _timer = metrics::timer_scan();

    let queries = catalog
        .iter()
        .enumerate()
        .map(|(index, source)| query_entry(reader, index, source, owner, timeout));

    let results = join_all(queries).await;

    let entries: Vec<BalanceEntry> = results
        .into_iter()
        .zip(catalog)
        .filter_map(|(result, source)| match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!(source = source.label, error = %e, "Balance query failed");
                metrics::inc_balance_queries_failed(source.chain_id);
                None
            }
        })
        .collect();

    debug!(found = entries.len(), "Balance scan complete");
    entries
}

/// Result of a [`ScanCoordinator::refresh`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome<T> {
    /// This refresh is still the newest one.
    Fresh(T),
    /// A newer refresh started while this one was running.
    Superseded,
}

impl<T> ScanOutcome<T> {
    /// The result, if it was not superseded.
    pub fn fresh(self) -> Option<T> {
        match self {
            ScanOutcome::Fresh(value) => Some(value),
            ScanOutcome::Superseded => None,
        }
    }
}

/// Debounces scan refreshes and drops results overtaken by a newer refresh.
///
/// Every refresh stamps a generation before its debounce window. The work
/// only runs if no newer refresh arrived during the window, and its result
/// is only returned if no newer refresh started before it finished.
#[derive(Debug, Clone)]
pub struct ScanCoordinator {
    generation: Arc<AtomicU64>,
    debounce: Duration,
}

impl ScanCoordinator {
    /// Create a coordinator with the given debounce window.
    pub fn new(debounce: Duration) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            debounce,
        }
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Invalidate every in-flight refresh.
    pub fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, stamp: u64) -> bool {
        self.generation() == stamp
    }

    /// Run `work` after the debounce window unless a newer refresh supersedes it.
    pub async fn refresh<F, Fut, T>(&self, work: F) -> ScanOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let stamp = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }
        if !self.is_current(stamp) {
            debug!(stamp, "Refresh debounced away");
            metrics::inc_scans_superseded();
            return ScanOutcome::Superseded;
        }

        let result = work().await;

        if !self.is_current(stamp) {
            debug!(stamp, current = self.generation(), "Discarding stale scan");
            metrics::inc_scans_superseded();
            return ScanOutcome::Superseded;
        }
        ScanOutcome::Fresh(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::catalog::{chain_ids, NATIVE_TOKEN, SOURCE_CATALOG};
    use crate::chain::mock::MockChainReader;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    fn owner() -> Address {
        Address::repeat_byte(0xab)
    }

    fn usdc_base() -> Address {
        SOURCE_CATALOG[0].token_address
    }

    #[tokio::test]
    async fn keeps_only_positive_balances_in_catalog_order() {
        let reader = MockChainReader::new()
            .with_native(chain_ids::ETHEREUM, owner(), U256::from(10u64).pow(U256::from(17u64)))
            .with_token(chain_ids::BASE, usdc_base(), owner(), U256::from(50_000_000u64));

        let entries = scan_balances(&reader, &SOURCE_CATALOG, owner(), Duration::from_secs(1)).await;

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_index, 0);
        assert_eq!(entries[0].human_balance, dec!(50));
        assert_eq!(SOURCE_CATALOG[entries[1].source_index].label, "ETH on Ethereum");
        assert_eq!(entries[1].human_balance, dec!(0.1));
        assert!(entries.iter().all(|e| e.human_balance > Decimal::ZERO));
    }

    #[tokio::test]
    async fn failing_chain_does_not_abort_scan() {
        let reader = MockChainReader::new()
            .with_token(chain_ids::BASE, usdc_base(), owner(), U256::from(1_000_000u64))
            .with_native(chain_ids::POLYGON, owner(), U256::from(1u64))
            .failing_chain(chain_ids::POLYGON);

        let entries = scan_balances(&reader, &SOURCE_CATALOG, owner(), Duration::from_secs(1)).await;

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_index, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_chain_times_out_individually() {
        let reader = MockChainReader::new()
            .with_token(chain_ids::BASE, usdc_base(), owner(), U256::from(1_000_000u64))
            .with_native(chain_ids::BSC, owner(), U256::from(5u64))
            .slow_chain(chain_ids::BSC, Duration::from_secs(60));

        let entries = scan_balances(&reader, &SOURCE_CATALOG, owner(), Duration::from_secs(2)).await;

        assert_eq!(entries.len(), 1);
        assert!(entries
            .iter()
            .all(|e| SOURCE_CATALOG[e.source_index].chain_id != chain_ids::BSC));
    }

    #[tokio::test]
    async fn empty_wallet_yields_nothing() {
        let reader = MockChainReader::new();
        let catalog = vec![SourceOption {
            label: "ETH on Base",
            chain_id: chain_ids::BASE,
            chain_name: "Base",
            token_address: NATIVE_TOKEN,
            token_symbol: "ETH",
            decimals: 18,
        }];

        let entries = scan_balances(&reader, &catalog, owner(), Duration::from_secs(1)).await;
        assert!(entries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_refresh_supersedes_older() {
        let coordinator = ScanCoordinator::new(Duration::from_millis(400));

        let slow = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .refresh(|| async {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        "stale"
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        let fresh = coordinator.refresh(|| async { "fresh" }).await;

        assert_eq!(fresh, ScanOutcome::Fresh("fresh"));
        assert_eq!(slow.await.unwrap(), ScanOutcome::Superseded);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_refreshes_are_debounced() {
        let coordinator = ScanCoordinator::new(Duration::from_millis(400));

        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.refresh(|| async { 1 }).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = coordinator.refresh(|| async { 2 }).await;

        assert_eq!(first.await.unwrap(), ScanOutcome::Superseded);
        assert_eq!(second.fresh(), Some(2));
    }
}
