//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): forwarded requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_selections_total` (counter): selection outcomes by service
//! - `gateway_cache_lookups_total` (counter): instance cache hits/misses
//! - `gateway_cache_evictions_total` (counter): evictions by reason
//! - `gateway_chooser_fallbacks_total` (counter): unknown chooser names
//! - `gateway_deregistrations_total` (counter): deregistration outcomes

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::registry::InstanceList;

/// Label for services with no known instances. Service names come from
/// request paths, so only registered services get their own series.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Metric label for a looked-up service.
pub fn service_label(list: &InstanceList) -> &str {
    if list.is_empty() {
        UNKNOWN_SERVICE
    } else {
        list.service()
    }
}

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("service", service.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_selection(service: &str, outcome: &'static str) {
    counter!("gateway_selections_total", "service" => service.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_eviction(reason: &'static str) {
    counter!("gateway_cache_evictions_total", "reason" => reason).increment(1);
}

pub fn record_chooser_fallback() {
    counter!("gateway_chooser_fallbacks_total").increment(1);
}

pub fn record_deregistration(outcome: &'static str) {
    counter!("gateway_deregistrations_total", "outcome" => outcome).increment(1);
}
