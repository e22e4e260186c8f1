//! TTL-bounded cache of instance lists.
//!
//! # Responsibilities
//! - Serve the last observed `InstanceList` per service name
//! - Reload from the registry on miss or TTL expiry
//! - Evict on explicit invalidation
//!
//! # Design Decisions
//! - Entries are replaced wholesale; readers see the old or the new list,
//!   never a mix
//! - No lock is held across the registry call; concurrent misses may load
//!   twice, which is harmless
//! - A lookup that overlaps an invalidation of the same service returns its
//!   result but does not store it, so an eviction is never undone by an
//!   older load
//! - Empty lists are never stored. Service names come from request paths,
//!   so only services with instances occupy the cache

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::cache::CacheManager;
use crate::config::CacheConfig;
use crate::observability::metrics;
use crate::registry::{InstanceList, InstanceSource, RegistryError};

#[derive(Debug, Clone)]
struct CacheEntry {
    instances: Arc<InstanceList>,
    created: Instant,
}

/// Registry loads in flight for one service.
#[derive(Debug, Default)]
struct PendingLoads {
    loads: usize,
    /// Bumped by every eviction of the service while loads are in flight.
    generation: u64,
}

/// Read-only view of a cached entry.
#[derive(Debug, Clone)]
pub struct CachedInstances {
    pub instances: Arc<InstanceList>,
    pub age: Duration,
}

/// Instance list cache in front of an `InstanceSource`.
pub struct InstanceCache {
    source: Arc<dyn InstanceSource>,
    entries: DashMap<String, CacheEntry>,
    /// Only holds services with a load in flight.
    pending: DashMap<String, PendingLoads>,
    ttl: Duration,
    enabled: bool,
}

impl std::fmt::Debug for InstanceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceCache")
            .field("entries", &self.entries.len())
            .field("pending", &self.pending.len())
            .field("ttl", &self.ttl)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl InstanceCache {
    pub fn new(source: Arc<dyn InstanceSource>, config: &CacheConfig) -> Self {
        Self::with_ttl(source, Duration::from_secs(config.ttl_secs), config.enabled)
    }

    pub fn with_ttl(source: Arc<dyn InstanceSource>, ttl: Duration, enabled: bool) -> Self {
        Self {
            source,
            entries: DashMap::new(),
            pending: DashMap::new(),
            ttl,
            enabled,
        }
    }

    /// The eviction capability, absent when caching is disabled.
    pub fn cache_manager(self: &Arc<Self>) -> Option<Arc<dyn CacheManager>> {
        if self.enabled {
            Some(self.clone() as Arc<dyn CacheManager>)
        } else {
            None
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current instances of `service`, possibly up to one TTL stale.
    pub async fn current_instances(&self, service: &str) -> Result<Arc<InstanceList>, RegistryError> {
        if !self.enabled {
            return Ok(Arc::new(self.source.instances(service).await?));
        }

        if let Some(entry) = self.entries.get(service) {
            if entry.created.elapsed() < self.ttl {
                metrics::record_cache_lookup(true);
                return Ok(entry.instances.clone());
            }
        }
        metrics::record_cache_lookup(false);

        let ticket = self.begin_load(service);
        let list = Arc::new(self.source.instances(service).await?);
        tracing::debug!(service = %service, instances = list.len(), "Loaded instances from registry");
        ticket.store(list.clone());
        Ok(list)
    }

    fn begin_load(&self, service: &str) -> LoadTicket<'_> {
        let mut pending = self.pending.entry(service.to_string()).or_default();
        pending.loads += 1;
        LoadTicket {
            cache: self,
            service: service.to_string(),
            generation: pending.generation,
        }
    }

    /// Force the next lookup of `service` to go to the registry.
    /// Returns whether an entry was present.
    pub fn invalidate(&self, service: &str) -> bool {
        if let Some(mut pending) = self.pending.get_mut(service) {
            pending.generation += 1;
        }
        let evicted = self.entries.remove(service).is_some();
        if evicted {
            metrics::record_cache_eviction("invalidate");
            tracing::debug!(service = %service, "Cache entry evicted");
        }
        evicted
    }

    /// Evict every entry.
    pub fn invalidate_all(&self) {
        self.pending.iter_mut().for_each(|mut pending| pending.generation += 1);
        let count = self.entries.len();
        self.entries.clear();
        metrics::record_cache_eviction("invalidate_all");
        tracing::info!(entries = count, "All cache entries evicted");
    }

    /// The cached entry for `service`, if any (fresh or stale).
    pub fn peek(&self, service: &str) -> Option<CachedInstances> {
        self.entries.get(service).map(|entry| CachedInstances {
            instances: entry.instances.clone(),
            age: entry.created.elapsed(),
        })
    }

    /// Names of services with a cached entry.
    pub fn cached_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Registration of one in-flight load. Dropping it, on completion or
/// cancellation, unregisters the load.
struct LoadTicket<'a> {
    cache: &'a InstanceCache,
    service: String,
    generation: u64,
}

impl LoadTicket<'_> {
    /// Store `list` unless the service was evicted since the load began.
    fn store(&self, list: Arc<InstanceList>) {
        // Holding the pending entry orders this check against `invalidate`.
        let Some(pending) = self.cache.pending.get(&self.service) else {
            return;
        };
        if pending.generation != self.generation {
            tracing::debug!(service = %self.service, "Cache invalidated during load, result not cached");
            return;
        }
        if list.is_empty() {
            self.cache.entries.remove(&self.service);
        } else {
            self.cache.entries.insert(
                self.service.clone(),
                CacheEntry {
                    instances: list,
                    created: Instant::now(),
                },
            );
        }
    }
}

impl Drop for LoadTicket<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut pending) = self.cache.pending.entry(self.service.clone()) {
            pending.get_mut().loads -= 1;
            if pending.get().loads == 0 {
                pending.remove();
            }
        }
    }
}

impl CacheManager for InstanceCache {
    fn evict(&self, service: &str) -> bool {
        self.invalidate(service)
    }

    fn evict_all(&self) {
        self.invalidate_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{InMemoryRegistry, ServiceInstance};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts registry calls on top of an in-memory registry.
    struct CountingSource {
        registry: InMemoryRegistry,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl InstanceSource for CountingSource {
        async fn instances(&self, service: &str) -> Result<InstanceList, RegistryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.registry.instances(service).await
        }
    }

    fn source() -> Arc<CountingSource> {
        let registry = InMemoryRegistry::default();
        registry.put(ServiceInstance::new("orders", "10.0.0.1", 8080));
        Arc::new(CountingSource {
            registry,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_hit_within_ttl() {
        let src = source();
        let cache = InstanceCache::with_ttl(src.clone(), Duration::from_secs(60), true);

        let first = cache.current_instances("orders").await.unwrap();
        let second = cache.current_instances("orders").await.unwrap();
        assert_eq!(src.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_stale_until_ttl_then_refreshed() {
        let src = source();
        let cache = InstanceCache::with_ttl(src.clone(), Duration::from_millis(50), true);

        assert_eq!(cache.current_instances("orders").await.unwrap().len(), 1);
        src.registry.put(ServiceInstance::new("orders", "10.0.0.2", 8080));

        // Stale view is an accepted trade-off inside the TTL.
        assert_eq!(cache.current_instances("orders").await.unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(cache.current_instances("orders").await.unwrap().len(), 2);
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload_and_is_idempotent() {
        let src = source();
        let cache = InstanceCache::with_ttl(src.clone(), Duration::from_secs(60), true);
        cache.current_instances("orders").await.unwrap();

        src.registry.put(ServiceInstance::new("orders", "10.0.0.2", 8080));
        assert!(cache.invalidate("orders"));
        assert!(!cache.invalidate("orders"));
        assert!(cache.peek("orders").is_none());
        assert!(cache.cached_services().is_empty());

        assert_eq!(cache.current_instances("orders").await.unwrap().len(), 2);
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let src = source();
        let cache = Arc::new(InstanceCache::with_ttl(src.clone(), Duration::from_secs(60), false));
        assert!(cache.cache_manager().is_none());

        cache.current_instances("orders").await.unwrap();
        cache.current_instances("orders").await.unwrap();
        assert_eq!(src.calls.load(Ordering::SeqCst), 2);
        assert!(cache.peek("orders").is_none());
    }

    #[tokio::test]
    async fn test_unknown_service_is_empty_list() {
        let cache = InstanceCache::with_ttl(source(), Duration::from_secs(60), true);
        let list = cache.current_instances("missing").await.unwrap();
        assert!(list.is_empty());
        assert_eq!(list.service(), "missing");
    }

    /// Source that blocks until released, to interleave an invalidation.
    struct GatedSource {
        gate: tokio::sync::Notify,
        inner: Arc<CountingSource>,
    }

    #[async_trait]
    impl InstanceSource for GatedSource {
        async fn instances(&self, service: &str) -> Result<InstanceList, RegistryError> {
            let list = self.inner.instances(service).await;
            self.gate.notified().await;
            list
        }
    }

    #[tokio::test]
    async fn test_invalidation_during_load_is_not_undone() {
        let gated = Arc::new(GatedSource {
            gate: tokio::sync::Notify::new(),
            inner: source(),
        });
        let cache = Arc::new(InstanceCache::with_ttl(gated.clone(), Duration::from_secs(60), true));

        let loader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.current_instances("orders").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.invalidate("orders");
        gated.gate.notify_one();

        assert_eq!(loader.await.unwrap().unwrap().len(), 1);
        assert!(cache.peek("orders").is_none());
    }

    #[tokio::test]
    async fn test_unknown_services_do_not_grow_the_cache() {
        let src = source();
        let cache = InstanceCache::with_ttl(src.clone(), Duration::from_millis(1), true);

        for i in 0..5000 {
            let list = cache.current_instances(&format!("nope-{}", i)).await.unwrap();
            assert!(list.is_empty());
        }
        cache.current_instances("orders").await.unwrap();

        assert_eq!(cache.cached_services(), vec!["orders".to_string()]);
        assert!(cache.pending.is_empty());
    }

    #[tokio::test]
    async fn test_service_that_loses_all_instances_is_dropped() {
        let src = source();
        let cache = InstanceCache::with_ttl(src.clone(), Duration::from_millis(10), true);
        cache.current_instances("orders").await.unwrap();
        assert!(cache.peek("orders").is_some());

        src.registry.remove(&ServiceInstance::new("orders", "10.0.0.1", 8080));
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert!(cache.current_instances("orders").await.unwrap().is_empty());
        assert!(cache.peek("orders").is_none());
    }

    #[tokio::test]
    async fn test_invalidating_another_service_keeps_load_cached() {
        let gated = Arc::new(GatedSource {
            gate: tokio::sync::Notify::new(),
            inner: source(),
        });
        let cache = Arc::new(InstanceCache::with_ttl(gated.clone(), Duration::from_secs(60), true));

        let loader = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.current_instances("orders").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache.invalidate("billing");
        gated.gate.notify_one();

        assert_eq!(loader.await.unwrap().unwrap().len(), 1);
        assert!(cache.peek("orders").is_some());
    }

    #[tokio::test]
    async fn test_cancelled_load_leaves_nothing_pending() {
        let gated = Arc::new(GatedSource {
            gate: tokio::sync::Notify::new(),
            inner: source(),
        });
        let cache = InstanceCache::with_ttl(gated.clone(), Duration::from_secs(60), true);

        let load = cache.current_instances("orders");
        assert!(tokio::time::timeout(Duration::from_millis(20), load).await.is_err());

        assert!(cache.pending.is_empty());
        assert!(cache.peek("orders").is_none());
    }
}
