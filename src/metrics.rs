//! Prometheus metrics for the gatekeeper.
//!
//! Exposed by a dedicated listener when `METRICS_PORT` is non-zero. Recording
//! functions are safe to call without an installed recorder; they become no-ops.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gatekeeper_auth_decisions_total` - Pipeline outcomes (labels: outcome, error)
//! - `gatekeeper_introspection_attempts_total` - Introspection attempts (labels: result)
//! - `gatekeeper_token_cache_hits_total` - Requests answered from the token cache
//! - `gatekeeper_rate_limited_total` - Rate-limit rejections (labels: class)
//!
//! ## Histograms
//! - `gatekeeper_introspection_duration_seconds` - Duration of a single attempt
//!
//! ## Gauges
//! - `gatekeeper_rate_windows` - Rate windows tracked after the last sweep
//! - `gatekeeper_token_cache_entries` - Cache entries held after the last sweep

use std::net::SocketAddr;

use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const AUTH_DECISIONS_TOTAL: &str = "gatekeeper_auth_decisions_total";
    pub const INTROSPECTION_ATTEMPTS_TOTAL: &str = "gatekeeper_introspection_attempts_total";
    pub const INTROSPECTION_DURATION_SECONDS: &str = "gatekeeper_introspection_duration_seconds";
    pub const TOKEN_CACHE_HITS_TOTAL: &str = "gatekeeper_token_cache_hits_total";
    pub const RATE_LIMITED_TOTAL: &str = "gatekeeper_rate_limited_total";
    pub const RATE_WINDOWS: &str = "gatekeeper_rate_windows";
    pub const TOKEN_CACHE_ENTRIES: &str = "gatekeeper_token_cache_entries";
}

/// Install the Prometheus exporter listening on `metrics_addr`.
///
/// # Errors
///
/// Fails if a recorder is already installed or the listener cannot bind.
pub fn init_metrics(metrics_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .context("failed to install Prometheus exporter")?;

    describe_counter!(
        names::AUTH_DECISIONS_TOTAL,
        "Authentication pipeline outcomes"
    );
    describe_counter!(
        names::INTROSPECTION_ATTEMPTS_TOTAL,
        "Token introspection attempts by result"
    );
    describe_counter!(
        names::TOKEN_CACHE_HITS_TOTAL,
        "Requests authenticated from the token cache"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by the rate limiter"
    );
    describe_histogram!(
        names::INTROSPECTION_DURATION_SECONDS,
        "Duration of one introspection attempt in seconds"
    );
    describe_gauge!(names::RATE_WINDOWS, "Rate windows currently tracked");
    describe_gauge!(
        names::TOKEN_CACHE_ENTRIES,
        "Token cache entries currently held"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %format!("{e:#}"), "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a pipeline outcome. `error` is empty for admissions and bypasses.
pub fn record_auth_decision(outcome: &'static str, error: &'static str) {
    counter!(names::AUTH_DECISIONS_TOTAL, "outcome" => outcome, "error" => error).increment(1);
}

/// Record one introspection attempt (`success` or `failure`).
pub fn record_introspection_attempt(result: &'static str) {
    counter!(names::INTROSPECTION_ATTEMPTS_TOTAL, "result" => result).increment(1);
}

pub fn record_introspection_duration(duration_secs: f64) {
    histogram!(names::INTROSPECTION_DURATION_SECONDS).record(duration_secs);
}

pub fn record_token_cache_hit() {
    counter!(names::TOKEN_CACHE_HITS_TOTAL).increment(1);
}

pub fn record_rate_limited(class: &'static str) {
    counter!(names::RATE_LIMITED_TOTAL, "class" => class).increment(1);
}

/// Publish state sizes observed by the sweeper.
pub fn set_tracked_state(rate_windows: usize, cache_entries: usize) {
    gauge!(names::RATE_WINDOWS).set(rate_windows as f64);
    gauge!(names::TOKEN_CACHE_ENTRIES).set(cache_entries as f64);
}
