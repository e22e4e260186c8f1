//! Service registry collaborator boundary.
//!
//! # Data Flow
//! ```text
//! Registry (system of record)
//!     → InstanceSource::instances      (pull: current view, may lag)
//!     → ChangeSubscription::subscribe  (push: InstancesChanged events)
//!     → ServiceRegistry::{register, deregister}
//! ```
//!
//! # Design Decisions
//! - Pull and push are separate traits so cache and event handling can be
//!   exercised with fakes that never touch the network
//! - `memory.rs` implements all three and doubles as the standalone registry
//! - Event keys follow the `<group>@@<service>` layout

pub mod instance;
pub mod memory;
pub mod registration;

use async_trait::async_trait;
use tokio::sync::broadcast;

pub use instance::{InstanceList, ServiceInstance, VERSION_METADATA_KEY};
pub use memory::InMemoryRegistry;

/// Errors surfaced by registry collaborators.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    #[error("instance {0} is not registered")]
    NotRegistered(String),
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),
}

/// Topology-change notification for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstancesChanged {
    /// Event key, possibly prefixed with a group (`DEFAULT_GROUP@@orders`).
    pub key: String,
}

impl InstancesChanged {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Pull-style accessor for the registry's current view of a service.
#[async_trait]
pub trait InstanceSource: Send + Sync {
    /// Return the instances currently known for `service`.
    async fn instances(&self, service: &str) -> Result<InstanceList, RegistryError>;
}

/// Push-style topology change subscription.
pub trait ChangeSubscription: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<InstancesChanged>;
}

/// Registration lifecycle operations for this process.
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    async fn register(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;
    async fn deregister(&self, instance: &ServiceInstance) -> Result<(), RegistryError>;
}
