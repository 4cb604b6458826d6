//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_invocations_total` (counter): invocations by outcome and status
//! - `relay_invocation_duration_seconds` (histogram): end-to-end latency
//! - `relay_upstream_in_flight` (gauge): upstream requests currently running
//!
//! Recording is a no-op until a recorder is installed, so tests and the
//! default configuration pay nothing.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one finished invocation.
pub fn record_invocation(outcome: &'static str, status: u16, start: Instant) {
    counter!(
        "relay_invocations_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_invocation_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_in_flight(count: u64) {
    gauge!("relay_upstream_in_flight").set(count as f64);
}

/// Record the outcome of a readiness check.
pub fn record_readiness(ready: bool) {
    gauge!("relay_upstream_ready").set(if ready { 1.0 } else { 0.0 });
}
