//! Least Connections tie-break strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::load_balancer::Chooser;
use crate::registry::ServiceInstance;

/// Least connections chooser.
/// Selects the candidate with the minimum number of in-flight requests.
///
/// Instance snapshots are replaced on every topology change, so in-flight
/// counts are keyed by endpoint rather than held on the instance itself.
#[derive(Debug, Default)]
pub struct LeastConnections {
    in_flight: DashMap<String, AtomicUsize>,
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// In-flight requests currently attributed to `instance`.
    pub fn in_flight(&self, instance: &ServiceInstance) -> usize {
        self.in_flight
            .get(&endpoint_key(instance))
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

fn endpoint_key(instance: &ServiceInstance) -> String {
    format!("{}/{}", instance.service, instance.authority())
}

impl Chooser for LeastConnections {
    fn choose(&self, candidates: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        // In case of tie, the first one is selected (stability)
        let chosen = candidates
            .iter()
            .min_by_key(|instance| self.in_flight(instance))?
            .clone();

        self.in_flight
            .entry(endpoint_key(&chosen))
            .or_default()
            .fetch_add(1, Ordering::Relaxed);
        Some(chosen)
    }

    fn name(&self) -> &'static str {
        "least_conn"
    }

    fn release(&self, instance: &ServiceInstance) {
        if let Some(count) = self.in_flight.get(&endpoint_key(instance)) {
            let _ = count.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| c.checked_sub(1));
        }
    }
}
