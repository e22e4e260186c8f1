//! Registry change events → cache eviction.
//!
//! # States
//! ```text
//! Idle → Subscribed (installed at startup when a cache manager exists)
//! Subscribed → stopped (shutdown signal or event source closed)
//! ```
//!
//! Eviction is idempotent, so bursts of events for one service are safe.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

use crate::cache::CacheManager;
use crate::registry::{ChangeSubscription, InstancesChanged};

/// Strip an event key's group prefix: the service name is the substring
/// after the last `@`.
pub fn strip_service_name(key: &str) -> &str {
    match key.rfind('@') {
        Some(idx) => &key[idx + 1..],
        None => key,
    }
}

/// Evicts cached instance lists when the registry reports a change.
#[derive(Clone)]
pub struct EventBridge {
    cache: Arc<dyn CacheManager>,
}

impl EventBridge {
    pub fn new(cache: Arc<dyn CacheManager>) -> Self {
        Self { cache }
    }

    /// Subscribe to `events` and spawn the bridge task.
    ///
    /// Returns `None` without subscribing when no cache manager is present.
    pub fn install(
        cache: Option<Arc<dyn CacheManager>>,
        events: &dyn ChangeSubscription,
        shutdown: broadcast::Receiver<()>,
    ) -> Option<JoinHandle<()>> {
        let Some(cache) = cache else {
            tracing::info!("No cache manager present, change events will not be bridged");
            return None;
        };

        let bridge = Self::new(cache);
        let rx = events.subscribe();
        tracing::info!("Event bridge subscribed to registry changes");
        Some(tokio::spawn(bridge.run(rx, shutdown)))
    }

    /// Handle one notification. Returns whether an entry was evicted.
    pub fn on_event(&self, event: &InstancesChanged) -> bool {
        let service = strip_service_name(&event.key);
        if service.is_empty() {
            tracing::debug!(key = %event.key, "Ignoring change event without service name");
            return false;
        }
        tracing::debug!(key = %event.key, service = %service, "Instances changed, refreshing cache");
        self.cache.evict(service)
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<InstancesChanged>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => {
                        self.on_event(&event);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Event bridge lagged, evicting all cached services");
                        self.cache.evict_all();
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!("Registry event source closed, event bridge stopping");
                        break;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Event bridge received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::cache::InstanceCache;
    use crate::lifecycle::Shutdown;
    use crate::registry::{InMemoryRegistry, ServiceInstance};

    #[derive(Default)]
    struct RecordingCache {
        evicted: Mutex<Vec<String>>,
        evicted_all: Mutex<usize>,
    }

    impl CacheManager for RecordingCache {
        fn evict(&self, service: &str) -> bool {
            self.evicted.lock().unwrap().push(service.to_string());
            true
        }

        fn evict_all(&self) {
            *self.evicted_all.lock().unwrap() += 1;
        }
    }

    #[test]
    fn test_strip_service_name() {
        assert_eq!(strip_service_name("DEFAULT_GROUP@@orders"), "orders");
        assert_eq!(strip_service_name("a@b@@orders"), "orders");
        assert_eq!(strip_service_name("orders"), "orders");
        assert_eq!(strip_service_name("group@@"), "");
        assert_eq!(strip_service_name(""), "");
    }

    #[test]
    fn test_on_event_evicts_stripped_name() {
        let cache = Arc::new(RecordingCache::default());
        let bridge = EventBridge::new(cache.clone());

        bridge.on_event(&InstancesChanged::new("DEFAULT_GROUP@@orders"));
        assert!(!bridge.on_event(&InstancesChanged::new("DEFAULT_GROUP@@")));
        assert_eq!(*cache.evicted.lock().unwrap(), vec!["orders".to_string()]);
    }

    #[tokio::test]
    async fn test_not_installed_without_cache_manager() {
        let registry = InMemoryRegistry::default();
        let shutdown = Shutdown::new();
        assert!(EventBridge::install(None, &registry, shutdown.subscribe()).is_none());
    }

    #[tokio::test]
    async fn test_registry_change_evicts_cache_entry() {
        let registry = Arc::new(InMemoryRegistry::default());
        registry.put(ServiceInstance::new("orders", "10.0.0.1", 8080));
        let cache = Arc::new(InstanceCache::with_ttl(registry.clone(), Duration::from_secs(60), true));
        let shutdown = Shutdown::new();

        let handle = EventBridge::install(cache.cache_manager(), registry.as_ref(), shutdown.subscribe())
            .expect("bridge installed");

        assert_eq!(cache.current_instances("orders").await.unwrap().len(), 1);
        registry.put(ServiceInstance::new("orders", "10.0.0.2", 8080));

        // Eventually consistent: the bridge runs on its own task.
        let mut refreshed = false;
        for _ in 0..50 {
            if cache.current_instances("orders").await.unwrap().len() == 2 {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refreshed, "cache entry should be evicted after registry change");

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("bridge stops on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_repeated_events_are_idempotent() {
        let registry = Arc::new(InMemoryRegistry::default());
        registry.put(ServiceInstance::new("orders", "10.0.0.1", 8080));
        let cache = Arc::new(InstanceCache::with_ttl(registry.clone(), Duration::from_secs(60), true));
        let bridge = EventBridge::new(cache.clone());

        cache.current_instances("orders").await.unwrap();
        let event = InstancesChanged::new("DEFAULT_GROUP@@orders");
        assert!(bridge.on_event(&event));
        let after_once = cache.cached_services();
        assert!(!bridge.on_event(&event));
        assert_eq!(cache.cached_services(), after_once);
        assert!(after_once.is_empty());
    }
}
