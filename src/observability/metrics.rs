//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, backend errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency by route
//! - `gateway_rate_limited_total` (counter): requests rejected by the limiter
//! - `gateway_auth_failures_total` (counter): requests rejected by token checks, by reason
//! - `gateway_upstream_errors_total` (counter): backend failures by upstream, kind
//! - `gateway_upstream_duration_seconds` (histogram): backend latency by upstream
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup
//! - The rate-limit key is not a label (client IPs are unbounded)

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, route: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("route", route.to_string()),
    ];
    metrics::counter!("gateway_requests_total", &labels).increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(key: &str) {
    let scope = if key == crate::security::rate_limit::GLOBAL_KEY {
        "global"
    } else {
        "client"
    };
    metrics::counter!("gateway_rate_limited_total", "scope" => scope).increment(1);
}

/// `reason` is `missing_header`, `malformed_header` or `invalid_token`.
pub fn record_auth_failure(reason: &'static str) {
    metrics::counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

/// `kind` is `transport`, `timeout` or `body_timeout`.
pub fn record_upstream_error(upstream: &'static str, kind: &'static str) {
    metrics::counter!("gateway_upstream_errors_total", "upstream" => upstream, "kind" => kind)
        .increment(1);
}

pub fn record_upstream_latency(upstream: &'static str, start: Instant) {
    metrics::histogram!("gateway_upstream_duration_seconds", "upstream" => upstream)
        .record(start.elapsed().as_secs_f64());
}
