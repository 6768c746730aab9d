//! Metrics collection and exposition.
//!
//! # Metrics
//! - `app_gate_decisions_total` (counter): decisions by outcome and reason
//! - `app_gate_classification_seconds` (histogram): time spent classifying
//! - `app_gate_upstream_requests_total` (counter): forwarded requests by status
//! - `app_gate_access_log_dropped_total` (counter): records dropped by a full access log queue

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::gate::Classification;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_decision(classification: &Classification, started: Instant) {
    metrics::counter!(
        "app_gate_decisions_total",
        "outcome" => classification.outcome.as_str(),
        "reason" => classification.reason.label(),
    )
    .increment(1);
    metrics::histogram!("app_gate_classification_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_upstream(status: u16) {
    metrics::counter!("app_gate_upstream_requests_total", "status" => status.to_string()).increment(1);
}

pub fn record_access_log_drop() {
    metrics::counter!("app_gate_access_log_dropped_total").increment(1);
}
