//! Instance list caching and change-event bridging.
//!
//! # Data Flow
//! ```text
//! VersionLoadBalancer
//!     → instance_cache.rs (fresh entry? return it)
//!     → miss/expired → InstanceSource (registry)
//!
//! Registry change event "<group>@@<service>"
//!     → bridge.rs (strip to "<service>")
//!     → CacheManager::evict(service)
//! ```
//!
//! # Design Decisions
//! - The cache is a TTL-bounded memo, not a correctness boundary
//! - Explicit eviction shortens the staleness window to the registry's own
//!   propagation delay; it cannot remove it
//! - The bridge is only installed when a cache manager exists

pub mod bridge;
pub mod instance_cache;

pub use bridge::EventBridge;
pub use instance_cache::InstanceCache;

/// Eviction capability of a cache.
pub trait CacheManager: Send + Sync {
    /// Evict one service. Returns whether an entry was present.
    fn evict(&self, service: &str) -> bool;

    /// Evict every service.
    fn evict_all(&self);
}
