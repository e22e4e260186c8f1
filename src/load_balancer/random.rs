//! Weighted random tie-break strategy.

use std::sync::Arc;

use rand::Rng;

use crate::load_balancer::Chooser;
use crate::registry::ServiceInstance;

/// Metadata key holding an instance's relative weight.
pub const WEIGHT_METADATA_KEY: &str = "weight";

/// Picks a candidate at random, proportionally to its `weight` metadata.
/// Missing, zero or unparsable weights count as 1.
#[derive(Debug, Default)]
pub struct WeightedRandom;

impl WeightedRandom {
    pub fn new() -> Self {
        Self
    }
}

pub(crate) fn weight_of(instance: &ServiceInstance) -> u64 {
    instance
        .metadata
        .get(WEIGHT_METADATA_KEY)
        .and_then(|w| w.trim().parse::<u64>().ok())
        .filter(|w| *w > 0)
        .unwrap_or(1)
}

impl Chooser for WeightedRandom {
    fn choose(&self, candidates: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if candidates.is_empty() {
            return None;
        }

        let total: u64 = candidates.iter().map(|i| weight_of(i)).fold(0, u64::saturating_add);
        let mut point = rand::thread_rng().gen_range(0..total);
        for instance in candidates {
            let weight = weight_of(instance);
            if point < weight {
                return Some(instance.clone());
            }
            point -= weight;
        }
        // Only reachable if the weights saturated.
        candidates.last().cloned()
    }

    fn name(&self) -> &'static str {
        "random"
    }
}
