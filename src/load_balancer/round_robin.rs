//! Round-robin tie-break strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::Chooser;
use crate::registry::ServiceInstance;

/// Starting offset of the counter; non-zero so a fresh chooser does not
/// always hand the first request to the first candidate.
pub const DEFAULT_START_OFFSET: usize = 1000;

/// Round-robin chooser.
/// Stores an internal counter to rotate through candidates.
///
/// Empty candidate sets return `None` without advancing the counter.
#[derive(Debug)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::with_offset(DEFAULT_START_OFFSET)
    }

    /// Create a chooser whose counter starts at `offset`.
    pub fn with_offset(offset: usize) -> Self {
        Self {
            counter: AtomicUsize::new(offset),
        }
    }

    /// Current counter value.
    pub fn position(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl Chooser for RoundRobin {
    fn choose(&self, candidates: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>> {
        if candidates.is_empty() {
            return None;
        }

        // Wrapping add keeps the index in range even after overflow.
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let instance = &candidates[count % candidates.len()];
        tracing::debug!(host = %instance.host, port = instance.port, "Round-robin chose instance");
        Some(instance.clone())
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}
