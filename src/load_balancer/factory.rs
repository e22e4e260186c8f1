//! Chooser construction by configured name.
//!
//! Accepts short names (`round_robin`) as well as path-like identifiers
//! whose last segment names the strategy (`lb::chooser::RoundRobin`).
//! Lookup failures are logged and fall back to round-robin; they never
//! propagate past this module.

use std::sync::Arc;

use crate::load_balancer::least_conn::LeastConnections;
use crate::load_balancer::random::WeightedRandom;
use crate::load_balancer::round_robin::RoundRobin;
use crate::load_balancer::Chooser;

/// Build the chooser named by `name`, or round-robin when unset or unknown.
pub fn chooser_from_name(name: Option<&str>) -> Arc<dyn Chooser> {
    let Some(raw) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Arc::new(RoundRobin::new());
    };

    match lookup(raw) {
        Some(chooser) => {
            tracing::info!(chooser = chooser.name(), "Using configured chooser");
            chooser
        }
        None => {
            tracing::error!(chooser = %raw, "Unknown chooser, falling back to round-robin");
            crate::observability::metrics::record_chooser_fallback();
            Arc::new(RoundRobin::new())
        }
    }
}

fn lookup(raw: &str) -> Option<Arc<dyn Chooser>> {
    let last = raw.rsplit([':', '.']).next().unwrap_or(raw);
    let normalized: String = last
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    match normalized.as_str() {
        "roundrobin" | "round" | "roundrulechooser" => Some(Arc::new(RoundRobin::new())),
        "random" | "weightedrandom" => Some(Arc::new(WeightedRandom::new())),
        "leastconn" | "leastconnections" => Some(Arc::new(LeastConnections::new())),
        _ => None,
    }
}
