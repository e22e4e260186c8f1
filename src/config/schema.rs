//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::registry::ServiceInstance;

/// Default registry group used in event keys.
pub const DEFAULT_GROUP: &str = "DEFAULT_GROUP";

/// Default time-to-live of cached instance lists, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 35;

/// Default drain window after deregistration, in milliseconds.
///
/// Exceeds the registry client's nominal 10 second poll interval.
pub const DEFAULT_DEREGISTER_WAIT_MILLIS: u64 = 15_000;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Instance selection policy.
    pub load_balancer: LoadBalancerConfig,

    /// Instance list cache.
    pub cache: CacheConfig,

    /// Registry settings and seed instances.
    pub registry: RegistryConfig,

    /// Self-registration and graceful deregistration.
    pub registration: RegistrationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Instance selection policy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Enable version-aware selection and the `X-Backend-Version` header.
    pub version_isolation: bool,

    /// Chooser identifier (`round_robin`, `random`, `least_conn`).
    /// Unknown identifiers fall back to round-robin.
    pub chooser: Option<String>,

    /// Host used for co-location preference. Detected when unset.
    pub local_host: Option<String>,

    /// Answer 404 instead of 503 when no instance can serve a request.
    pub use_404: bool,
}

/// Instance list cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable caching. When disabled, every lookup hits the registry and
    /// change events are not bridged.
    pub enabled: bool,

    /// Time-to-live of a cached list in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Group prefix of change event keys.
    pub group: String,

    /// Instances known at startup.
    pub instances: Vec<InstanceSeed>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP.to_string(),
            instances: Vec::new(),
        }
    }
}

/// A statically configured backend instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstanceSeed {
    /// Service the instance belongs to.
    pub service: String,

    pub host: String,

    pub port: u16,

    /// Registration metadata (e.g. `version = "v2"`).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl InstanceSeed {
    pub fn to_instance(&self) -> ServiceInstance {
        let mut instance = ServiceInstance::new(self.service.clone(), self.host.clone(), self.port);
        instance.metadata = self.metadata.clone();
        instance
    }
}

/// Self-registration of the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Register on startup and deregister gracefully on shutdown.
    pub enabled: bool,

    /// Service name to register under.
    pub service: String,

    /// Advertised host. Detected when unset.
    pub host: Option<String>,

    /// Advertised port.
    pub port: u16,

    /// Extra registration metadata.
    pub metadata: BTreeMap<String, String>,

    /// File holding the deployed version identifier.
    pub version_file: Option<String>,

    /// Drain window after deregistration in milliseconds.
    pub deregister_wait_millis: u64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            service: String::new(),
            host: None,
            port: 8080,
            metadata: BTreeMap::new(),
            version_file: None,
            deregister_wait_millis: DEFAULT_DEREGISTER_WAIT_MILLIS,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token). Empty rejects every request.
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
