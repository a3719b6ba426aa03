//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, resolve failures, live sockets)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `dashboard_proxy_requests_total` (counter): requests by method, status
//! - `dashboard_proxy_request_duration_seconds` (histogram): latency distribution
//! - `dashboard_proxy_resolve_failures_total` (counter): failures by reason
//! - `dashboard_proxy_websocket_sessions_active` (gauge): relays in progress
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed
//! - Labels stay low-cardinality; cluster ids go to logs, not metrics

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const REQUESTS_TOTAL: &str = "dashboard_proxy_requests_total";
pub const REQUEST_DURATION_SECONDS: &str = "dashboard_proxy_request_duration_seconds";
pub const RESOLVE_FAILURES_TOTAL: &str = "dashboard_proxy_resolve_failures_total";
pub const WEBSOCKET_SESSIONS_ACTIVE: &str = "dashboard_proxy_websocket_sessions_active";

/// Install the Prometheus recorder and serve it on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    describe_counter!(REQUESTS_TOTAL, "Total number of proxied dashboard requests");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        "Time until the response (or upgrade) was handed to the client"
    );
    describe_counter!(
        RESOLVE_FAILURES_TOTAL,
        "Requests that could not be resolved to a dashboard backend"
    );
    describe_gauge!(WEBSOCKET_SESSIONS_ACTIVE, "WebSocket relays currently open");

    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    counter!(
        REQUESTS_TOTAL,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!(REQUEST_DURATION_SECONDS, "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

/// Record a request that failed before reaching a backend.
pub fn record_resolve_failure(reason: &'static str) {
    counter!(RESOLVE_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// Counts one open WebSocket relay for as long as it lives.
#[derive(Debug)]
pub struct WebSocketSessionGuard(());

impl WebSocketSessionGuard {
    pub fn new() -> Self {
        gauge!(WEBSOCKET_SESSIONS_ACTIVE).increment(1.0);
        Self(())
    }
}

impl Default for WebSocketSessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WebSocketSessionGuard {
    fn drop(&mut self) {
        gauge!(WEBSOCKET_SESSIONS_ACTIVE).decrement(1.0);
    }
}
