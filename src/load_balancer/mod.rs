//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request (service, version token)
//!     → version.rs (VersionLoadBalancer)
//!         → InstanceCache::current_instances(service)
//!         → selector.rs (exact version > co-located > unversioned)
//!         → Chooser tie-break:
//!             - round_robin.rs (rotate through candidates)
//!             - random.rs (metadata-weighted random)
//!             - least_conn.rs (fewest in-flight requests)
//!     → Some(instance) or None ("no instance available")
//! ```
//!
//! # Design Decisions
//! - Selection is a pure function; all I/O happens before it
//! - Chooser state (counters) is owned by the chooser instance
//! - Chooser implementations are picked by name through `factory.rs`,
//!   which never fails: unknown names fall back to round-robin
//! - An empty candidate set is an expected outcome, not an error

pub mod factory;
pub mod least_conn;
pub mod random;
pub mod round_robin;
pub mod selector;
pub mod version;

use std::sync::Arc;

use crate::registry::ServiceInstance;

pub use factory::chooser_from_name;
pub use selector::select_candidates;
pub use version::VersionLoadBalancer;

/// Tie-break strategy picking one instance out of a candidate set.
pub trait Chooser: Send + Sync + std::fmt::Debug {
    /// Pick one candidate, or `None` when `candidates` is empty.
    fn choose(&self, candidates: &[Arc<ServiceInstance>]) -> Option<Arc<ServiceInstance>>;

    /// Stable identifier used in config and logs.
    fn name(&self) -> &'static str;

    /// Called once the request served by `instance` has completed.
    fn release(&self, _instance: &ServiceInstance) {}
}
