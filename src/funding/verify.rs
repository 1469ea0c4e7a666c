//! Verification Poller: confirms a settled position on-chain.

use std::time::Duration;

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::chain::reader::{erc20_balance, position_token, ChainReader};
use crate::chain::units::from_base_units;
use crate::error::ChainError;
use crate::market::Side;
use crate::metrics;

/// Poller bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Balance reads before giving up.
    pub max_attempts: u32,
    /// Delay between reads.
    pub interval: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(3),
        }
    }
}

/// Injectable delay.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Real timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSleep;

#[async_trait]
impl Sleeper for NoSleep {
    async fn sleep(&self, _duration: Duration) {}
}

/// Position observed after settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedPosition {
    /// New shares, in token units.
    pub shares: String,
    /// New shares, in base units.
    #[serde(serialize_with = "serialize_u256")]
    pub raw_shares: U256,
    /// Position token read.
    pub token: Address,
    /// Position side.
    pub side: Side,
}

fn serialize_u256<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_string())
}

impl VerifiedPosition {
    /// Step label shown once the position is confirmed.
    pub fn summary(&self) -> String {
        format!("{} {} shares received", self.shares, self.side)
    }
}

/// What to verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyTarget {
    /// Destination chain.
    pub chain_id: u64,
    /// Market contract.
    pub market: Address,
    /// Position side.
    pub side: Side,
    /// Position owner.
    pub owner: Address,
    /// Balance before settlement.
    pub baseline: U256,
    /// Position token decimals.
    pub decimals: u8,
}

async fn read_position(
    reader: &dyn ChainReader,
    target: &VerifyTarget,
    token: &mut Option<Address>,
) -> Result<(Address, U256), ChainError> {
    let resolved = match *token {
        Some(resolved) => resolved,
        None => {
            let resolved = position_token(reader, target.chain_id, target.market, target.side).await?;
            *token = Some(resolved);
            resolved
        }
    };
    let balance = erc20_balance(reader, target.chain_id, resolved, target.owner).await?;
    Ok((resolved, balance))
}

/// Poll the position balance until it exceeds the baseline.
///
/// Makes exactly `max_attempts` balance reads when no increase shows up,
/// sleeping between reads but not after the last one. Read errors count as
/// "no increase yet". Returns `None` when the budget runs out or `cancel`
/// fires; neither is an error.
#[instrument(skip(reader, sleeper, cancel), fields(market = %target.market, side = %target.side))]
pub async fn verify_position(
    reader: &dyn ChainReader,
    sleeper: &dyn Sleeper,
    config: VerifyConfig,
    target: VerifyTarget,
    cancel: &CancellationToken,
) -> Option<VerifiedPosition> {
    let mut token = None;

    for attempt in 0..config.max_attempts {
        metrics::inc_verify_attempts();
        let read = tokio::select! {
            _ = cancel.cancelled() => return None,
            read = read_position(reader, &target, &mut token) => read,
        };

        match read {
            Ok((token, balance)) if balance > target.baseline => {
                let delta = balance - target.baseline;
                let shares = from_base_units(delta, target.decimals)
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| delta.to_string());
                info!(attempt, shares = %shares, "Position verified");
                metrics::inc_verification_result(true);
                return Some(VerifiedPosition {
                    shares,
                    raw_shares: delta,
                    token,
                    side: target.side,
                });
            }
            Ok((_, balance)) => debug!(attempt, balance = %balance, "No increase yet"),
            Err(e) => debug!(attempt, error = %e, "Position read failed"),
        }

        if attempt + 1 < config.max_attempts {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = sleeper.sleep(config.interval) => {}
            }
        }
    }

    info!(attempts = config.max_attempts, "Position not confirmed within budget");
    metrics::inc_verification_result(false);
    None
}
