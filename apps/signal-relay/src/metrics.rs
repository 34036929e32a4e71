//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Signals**: accepted, duplicate, rejected, terminal outcomes
//! - **Rate limiting**: denials by tier
//! - **Connections**: dependency up/down state, reconnect attempts
//! - **Latency**: venue execution latency
//!
//! Metrics are rendered at `GET /metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let builder = PrometheusBuilder::new();
            let handle = builder
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

fn register_metrics() {
    describe_counter!(
        "relay_signals_accepted_total",
        "Signals accepted into the pipeline"
    );
    describe_counter!(
        "relay_signals_duplicate_total",
        "Signals rejected as duplicates within the retention window"
    );
    describe_counter!(
        "relay_signals_invalid_total",
        "Signals rejected at validation"
    );
    describe_counter!(
        "relay_signals_terminal_total",
        "Signals reaching a terminal status, by status and error kind"
    );
    describe_counter!(
        "relay_rate_limit_denied_total",
        "Requests denied by the rate limiter, by tier"
    );
    describe_counter!(
        "relay_reconnect_attempts_total",
        "Reconnection attempts per dependency"
    );
    describe_gauge!(
        "relay_connection_up",
        "Dependency connectivity (1 connected, 0 otherwise)"
    );
    describe_gauge!("relay_queue_depth", "Signals waiting in the dispatch queue");
    describe_histogram!(
        "relay_execution_latency_seconds",
        "Venue call latency for terminal signals"
    );
}

/// Record an accepted signal.
pub fn record_signal_accepted() {
    counter!("relay_signals_accepted_total").increment(1);
}

/// Record a duplicate rejection.
pub fn record_signal_duplicate() {
    counter!("relay_signals_duplicate_total").increment(1);
}

/// Record a validation rejection.
pub fn record_signal_invalid() {
    counter!("relay_signals_invalid_total").increment(1);
}

/// Record a terminal outcome.
pub fn record_signal_terminal(status: &'static str, error_kind: &'static str) {
    counter!(
        "relay_signals_terminal_total",
        "status" => status,
        "error_kind" => error_kind
    )
    .increment(1);
}

/// Record a rate-limit denial.
pub fn record_rate_limit_denied(tier: &'static str) {
    counter!("relay_rate_limit_denied_total", "tier" => tier).increment(1);
}

/// Record a reconnection attempt for a dependency.
pub fn record_reconnect_attempt(dependency: &str) {
    counter!(
        "relay_reconnect_attempts_total",
        "dependency" => dependency.to_string()
    )
    .increment(1);
}

/// Update dependency connectivity state.
pub fn set_connection_up(dependency: &str, up: bool) {
    gauge!(
        "relay_connection_up",
        "dependency" => dependency.to_string()
    )
    .set(if up { 1.0 } else { 0.0 });
}

/// Update the dispatch queue depth.
pub fn set_queue_depth(depth: f64) {
    gauge!("relay_queue_depth").set(depth);
}

/// Record venue execution latency.
pub fn record_execution_latency(latency: Duration) {
    histogram!("relay_execution_latency_seconds").record(latency.as_secs_f64());
}
