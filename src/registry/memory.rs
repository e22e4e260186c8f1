//! In-memory service registry.
//!
//! Serves as the registry in standalone deployments (seeded from config)
//! and as the registry fake in tests. Every mutation replaces the service's
//! instance vector wholesale and publishes an `InstancesChanged` event keyed
//! `<group>@@<service>`.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::RegistryConfig;
use crate::registry::{
    ChangeSubscription, InstanceList, InstanceSource, InstancesChanged, RegistryError,
    ServiceInstance, ServiceRegistry,
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Thread-safe registry holding instance lists by service name.
#[derive(Debug)]
pub struct InMemoryRegistry {
    group: String,
    services: DashMap<String, Arc<Vec<Arc<ServiceInstance>>>>,
    events: broadcast::Sender<InstancesChanged>,
}

impl InMemoryRegistry {
    /// Create an empty registry publishing events under `group`.
    pub fn new(group: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            group: group.into(),
            services: DashMap::new(),
            events,
        }
    }

    /// Create a registry seeded with the configured instances.
    pub fn from_config(config: &RegistryConfig) -> Self {
        let registry = Self::new(config.group.clone());
        for seed in &config.instances {
            registry.put(seed.to_instance());
        }
        tracing::info!(
            group = %registry.group,
            services = registry.services.len(),
            instances = config.instances.len(),
            "In-memory registry seeded"
        );
        registry
    }

    /// Event key for a service, e.g. `DEFAULT_GROUP@@orders`.
    pub fn event_key(&self, service: &str) -> String {
        format!("{}@@{}", self.group, service)
    }

    /// Insert or replace an instance (matched by service, host and port).
    pub fn put(&self, instance: ServiceInstance) {
        let service = instance.service.clone();
        let instance = Arc::new(instance);
        {
            let mut entry = self.services.entry(service.clone()).or_default();
            let mut next: Vec<Arc<ServiceInstance>> = entry.as_ref().clone();
            match next.iter().position(|i| i.same_endpoint(&instance)) {
                Some(idx) => next[idx] = instance,
                None => next.push(instance),
            }
            *entry = Arc::new(next);
        }
        self.publish(&service);
    }

    /// Remove an instance. Returns false when it was not registered.
    pub fn remove(&self, instance: &ServiceInstance) -> bool {
        let removed = match self.services.get_mut(&instance.service) {
            Some(mut entry) => {
                let before = entry.len();
                let next: Vec<Arc<ServiceInstance>> = entry
                    .iter()
                    .filter(|i| !i.same_endpoint(instance))
                    .cloned()
                    .collect();
                let removed = next.len() != before;
                *entry = Arc::new(next);
                removed
            }
            None => false,
        };
        if removed {
            self.publish(&instance.service);
        }
        removed
    }

    fn publish(&self, service: &str) {
        let key = self.event_key(service);
        tracing::debug!(key = %key, "Publishing instances changed event");
        // No subscribers is fine; the event is simply dropped.
        let _ = self.events.send(InstancesChanged::new(key));
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new(crate::config::schema::DEFAULT_GROUP)
    }
}

#[async_trait]
impl InstanceSource for InMemoryRegistry {
    async fn instances(&self, service: &str) -> Result<InstanceList, RegistryError> {
        let instances = self
            .services
            .get(service)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        Ok(InstanceList::new(service, instances.iter().cloned()))
    }
}

impl ChangeSubscription for InMemoryRegistry {
    fn subscribe(&self) -> broadcast::Receiver<InstancesChanged> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        if instance.service.is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "service name must not be empty".to_string(),
            ));
        }
        self.put(instance.clone());
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError> {
        if self.remove(instance) {
            Ok(())
        } else {
            Err(RegistryError::NotRegistered(instance.to_string()))
        }
    }
}
