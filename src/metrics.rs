//! Prometheus metrics for the funding orchestrator.
//!
//! This module provides metrics for:
//! - Balance scan, quote and execution latency
//! - Per-source balance query failures and superseded scans
//! - Execution outcomes labelled by error class
//! - Verification attempts and results

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// Balance scan latency metric name.
pub const METRIC_SCAN_LATENCY: &str = "balance_scan_latency_ms";
/// Quote latency metric name.
pub const METRIC_QUOTE_LATENCY: &str = "quote_latency_ms";
/// Execution latency metric name.
pub const METRIC_EXECUTION_LATENCY: &str = "execution_latency_ms";
/// Failed balance queries counter metric name.
pub const METRIC_BALANCE_QUERIES_FAILED: &str = "balance_queries_failed_total";
/// Superseded scans counter metric name.
pub const METRIC_SCANS_SUPERSEDED: &str = "balance_scans_superseded_total";
/// Quotes without route counter metric name.
pub const METRIC_QUOTES_NO_ROUTE: &str = "quotes_no_route_total";
/// Successful executions counter metric name.
pub const METRIC_EXECUTIONS_SUCCEEDED: &str = "executions_succeeded_total";
/// Failed executions counter metric name.
pub const METRIC_EXECUTIONS_FAILED: &str = "executions_failed_total";
/// Verification attempts counter metric name.
pub const METRIC_VERIFY_ATTEMPTS: &str = "verification_attempts_total";
/// Verified positions counter metric name.
pub const METRIC_POSITIONS_VERIFIED: &str = "positions_verified_total";
/// Unverified positions counter metric name.
pub const METRIC_POSITIONS_UNVERIFIED: &str = "positions_unverified_total";

/// Install the global Prometheus recorder, then register descriptions with it.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_SCAN_LATENCY,
        "Time to scan every funding source in milliseconds"
    );
    describe_histogram!(METRIC_QUOTE_LATENCY, "Quote building latency in milliseconds");
    describe_histogram!(
        METRIC_EXECUTION_LATENCY,
        "Funding plan execution latency in milliseconds"
    );

    describe_counter!(
        METRIC_BALANCE_QUERIES_FAILED,
        "Balance queries that failed or timed out"
    );
    describe_counter!(
        METRIC_SCANS_SUPERSEDED,
        "Balance scans discarded because a newer scan started"
    );
    describe_counter!(
        METRIC_QUOTES_NO_ROUTE,
        "Quotes that failed because no route exists"
    );
    describe_counter!(
        METRIC_EXECUTIONS_SUCCEEDED,
        "Funding plans executed to completion"
    );
    describe_counter!(METRIC_EXECUTIONS_FAILED, "Funding plans that failed");
    describe_counter!(
        METRIC_VERIFY_ATTEMPTS,
        "Position balance reads made while verifying"
    );
    describe_counter!(
        METRIC_POSITIONS_VERIFIED,
        "Positions confirmed by an on-chain balance increase"
    );
    describe_counter!(
        METRIC_POSITIONS_UNVERIFIED,
        "Positions whose balance increase was not observed in time"
    );

    debug!("Metrics initialized");
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Record balance scan latency.
pub fn record_scan_latency(start: Instant) {
    histogram!(METRIC_SCAN_LATENCY).record(elapsed_ms(start));
}

/// Record quote latency.
pub fn record_quote_latency(start: Instant, kind: &'static str) {
    histogram!(METRIC_QUOTE_LATENCY, "kind" => kind).record(elapsed_ms(start));
}

/// Record execution latency.
pub fn record_execution_latency(start: Instant) {
    histogram!(METRIC_EXECUTION_LATENCY).record(elapsed_ms(start));
}

/// Increment failed balance queries.
pub fn inc_balance_queries_failed(chain_id: u64) {
    counter!(METRIC_BALANCE_QUERIES_FAILED, "chain_id" => chain_id.to_string()).increment(1);
}

/// Increment superseded scans.
pub fn inc_scans_superseded() {
    counter!(METRIC_SCANS_SUPERSEDED).increment(1);
}

/// Increment quotes without route.
pub fn inc_quotes_no_route() {
    counter!(METRIC_QUOTES_NO_ROUTE).increment(1);
}

/// Increment successful executions.
pub fn inc_executions_succeeded() {
    counter!(METRIC_EXECUTIONS_SUCCEEDED).increment(1);
}

/// Increment failed executions, labelled by error class.
pub fn inc_executions_failed(class: &'static str) {
    counter!(METRIC_EXECUTIONS_FAILED, "class" => class).increment(1);
}

/// Increment verification attempts.
pub fn inc_verify_attempts() {
    counter!(METRIC_VERIFY_ATTEMPTS).increment(1);
}

/// Record a verification result.
pub fn inc_verification_result(verified: bool) {
    if verified {
        counter!(METRIC_POSITIONS_VERIFIED).increment(1);
    } else {
        counter!(METRIC_POSITIONS_UNVERIFIED).increment(1);
    }
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        elapsed_ms(self.start)
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(self.metric_name).record(elapsed_ms(self.start));
    }
}

/// Create a latency timer for balance scans.
pub fn timer_scan() -> LatencyTimer {
    LatencyTimer::new(METRIC_SCAN_LATENCY)
}

/// Create a latency timer for plan execution.
pub fn timer_execution() -> LatencyTimer {
    LatencyTimer::new(METRIC_EXECUTION_LATENCY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn latency_timer_measures_time() {
        let timer = LatencyTimer::new("test_metric");
        sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 9.0);
    }

    #[test]
    fn installed_recorder_renders_descriptions() {
        let handle = install_prometheus().unwrap();
        inc_scans_superseded();

        let rendered = handle.render();
        assert!(rendered.contains("# HELP balance_scans_superseded_total"));
        assert!(rendered.contains("# TYPE balance_scans_superseded_total counter"));
    }

    #[test]
    fn recording_without_recorder_is_harmless() {
        init_metrics();
        inc_executions_failed("recoverable");
        inc_verification_result(false);
        record_quote_latency(Instant::now(), "direct");
    }
}
