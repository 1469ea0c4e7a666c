//! Local trade log.
//!
//! Records are written on settlement success and never read back by the
//! funding flow. Each owner keeps at most [`MAX_RECORDS`] entries, newest first.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use alloy::primitives::Address;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::error::{FundingError, Result};
use crate::market::Side;

/// Records kept per owner.
pub const MAX_RECORDS: usize = 50;

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradeKind {
    Buy,
    Sell,
}

/// Trade status as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradeStatus {
    Confirmed,
}

/// One trade log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    /// Terminal transaction hash.
    pub hash: String,
    #[serde(rename = "type")]
    pub kind: TradeKind,
    pub side: Side,
    /// Amount in token units, as entered.
    pub amount: String,
    pub status: TradeStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub market_id: Option<String>,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    pub chain_id: u64,
}

impl TradeRecord {
    /// Confirmed buy, stamped now.
    pub fn buy(hash: impl Into<String>, side: Side, amount: impl Into<String>, market_id: impl Into<String>, chain_id: u64) -> Self {
        Self {
            hash: hash.into(),
            kind: TradeKind::Buy,
            side,
            amount: amount.into(),
            status: TradeStatus::Confirmed,
            market_id: Some(market_id.into()),
            timestamp: Utc::now().timestamp_millis(),
            chain_id,
        }
    }

    /// Confirmed sell, stamped now.
    pub fn sell(hash: impl Into<String>, side: Side, amount: impl Into<String>, market_id: impl Into<String>, chain_id: u64) -> Self {
        Self {
            kind: TradeKind::Sell,
            ..Self::buy(hash, side, amount, market_id, chain_id)
        }
    }
}

/// Sink for trade records.
pub trait TradeLog: Send + Sync {
    /// Prepend `record` to the owner's history.
    fn record(&self, owner: Address, record: TradeRecord) -> Result<()>;

    /// Owner's history, newest first.
    fn history(&self, owner: Address) -> Result<Vec<TradeRecord>>;
}

fn prepend(records: &mut Vec<TradeRecord>, record: TradeRecord) {
    records.insert(0, record);
    records.truncate(MAX_RECORDS);
}

/// One JSON file per owner under a directory.
#[derive(Debug)]
pub struct JsonFileTradeLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileTradeLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Directory holding the log files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, owner: Address) -> PathBuf {
        self.dir.join(format!("pulse_txns_{:#x}.json", owner))
    }

    fn read(&self, path: &Path) -> Result<Vec<TradeRecord>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

impl TradeLog for JsonFileTradeLog {
    fn record(&self, owner: Address, record: TradeRecord) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| FundingError::TradeLog("lock poisoned".to_string()))?;

        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(owner);
        let mut records = self.read(&path)?;
        prepend(&mut records, record);
        fs::write(&path, serde_json::to_string_pretty(&records)?)?;

        debug!(path = %path.display(), count = records.len(), "Trade recorded");
        Ok(())
    }

    fn history(&self, owner: Address) -> Result<Vec<TradeRecord>> {
        self.read(&self.path_for(owner))
    }
}

/// In-memory log.
#[derive(Debug, Default)]
pub struct MemoryTradeLog {
    records: Mutex<HashMap<Address, Vec<TradeRecord>>>,
}

impl MemoryTradeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TradeLog for MemoryTradeLog {
    fn record(&self, owner: Address, record: TradeRecord) -> Result<()> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| FundingError::TradeLog("lock poisoned".to_string()))?;
        prepend(records.entry(owner).or_default(), record);
        Ok(())
    }

    fn history(&self, owner: Address) -> Result<Vec<TradeRecord>> {
        let records = self
            .records
            .lock()
            .map_err(|_| FundingError::TradeLog("lock poisoned".to_string()))?;
        Ok(records.get(&owner).cloned().unwrap_or_default())
    }
}
