//! Service instance snapshots.
//!
//! # Responsibilities
//! - Represent one running backend as an immutable value
//! - Group instances of one service into an `InstanceList`
//!
//! # Design Decisions
//! - Instances are shared as `Arc<ServiceInstance>`; a topology change
//!   produces a new list, never an in-place update
//! - `InstanceList` enforces the single-service invariant at construction

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Metadata key carrying the deployed version of an instance.
pub const VERSION_METADATA_KEY: &str = "version";

/// A single running backend of a logical service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Registry-unique identifier of this instance.
    pub instance_id: String,
    /// Logical service name the instance belongs to.
    pub service: String,
    pub host: String,
    pub port: u16,
    /// Free-form registration metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Create an instance without metadata.
    pub fn new(service: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let service = service.into();
        let host = host.into();
        Self {
            instance_id: format!("{}#{}#{}", host, port, service),
            service,
            host,
            port,
            metadata: BTreeMap::new(),
        }
    }

    /// Builder-style metadata insert.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Builder-style version tag.
    pub fn with_version(self, version: impl Into<String>) -> Self {
        self.with_metadata(VERSION_METADATA_KEY, version)
    }

    /// The version tag, if the instance declares one.
    pub fn version(&self) -> Option<&str> {
        self.metadata.get(VERSION_METADATA_KEY).map(String::as_str)
    }

    /// `host:port` authority used to reach the instance.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether two snapshots point at the same running process.
    pub fn same_endpoint(&self, other: &ServiceInstance) -> bool {
        self.service == other.service && self.host == other.host && self.port == other.port
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version() {
            Some(v) => write!(f, "{}@{}:{} ({})", self.service, self.host, self.port, v),
            None => write!(f, "{}@{}:{}", self.service, self.host, self.port),
        }
    }
}

/// The last observed instances of one service, in registry order.
#[derive(Debug, Clone, Default)]
pub struct InstanceList {
    service: String,
    instances: Vec<Arc<ServiceInstance>>,
}

impl InstanceList {
    /// Build a list for `service`. Instances registered under another
    /// service name are dropped.
    pub fn new<I>(service: impl Into<String>, instances: I) -> Self
    where
        I: IntoIterator<Item = Arc<ServiceInstance>>,
    {
        let service = service.into();
        let instances = instances
            .into_iter()
            .filter(|instance| {
                let belongs = instance.service == service;
                if !belongs {
                    tracing::warn!(
                        service = %service,
                        instance = %instance,
                        "Dropping instance registered under a different service"
                    );
                }
                belongs
            })
            .collect();
        Self { service, instances }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn instances(&self) -> &[Arc<ServiceInstance>] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_tag() {
        let plain = ServiceInstance::new("orders", "10.0.0.1", 8080);
        assert_eq!(plain.version(), None);

        let tagged = plain.clone().with_version("v2");
        assert_eq!(tagged.version(), Some("v2"));
        assert_eq!(tagged.authority(), "10.0.0.1:8080");
        assert!(tagged.same_endpoint(&plain));
    }

    #[test]
    fn test_list_drops_foreign_instances() {
        let list = InstanceList::new(
            "orders",
            vec![
                Arc::new(ServiceInstance::new("orders", "10.0.0.1", 8080)),
                Arc::new(ServiceInstance::new("billing", "10.0.0.2", 8080)),
                Arc::new(ServiceInstance::new("orders", "10.0.0.3", 8080)),
            ],
        );

        assert_eq!(list.len(), 2);
        assert!(list.instances().iter().all(|i| i.service == "orders"));
        assert_eq!(list.instances()[1].host, "10.0.0.3");
    }
}
