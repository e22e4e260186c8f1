//! Version-aware load balancer.
//!
//! # Responsibilities
//! - Fetch the current instance list through the cache
//! - Filter candidates by version and locality (when isolation is on)
//! - Delegate the final pick to the configured chooser
//!
//! # Design Decisions
//! - The policy (isolation flag + chooser) lives behind an `ArcSwap` so a
//!   config reload never blocks or tears an in-flight selection
//! - A `Selection` carries the chooser that made it, so completion
//!   callbacks reach the same chooser even across a reload

use std::net::UdpSocket;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cache::InstanceCache;
use crate::config::LoadBalancerConfig;
use crate::load_balancer::{chooser_from_name, select_candidates, Chooser};
use crate::observability::metrics;
use crate::registry::{RegistryError, ServiceInstance};

/// Hot-swappable selection policy.
#[derive(Debug, Clone)]
pub struct BalancerPolicy {
    /// Apply version/locality filtering and annotate responses.
    pub version_isolation: bool,
    pub chooser: Arc<dyn Chooser>,
}

impl BalancerPolicy {
    pub fn from_config(config: &LoadBalancerConfig) -> Self {
        Self {
            version_isolation: config.version_isolation,
            chooser: chooser_from_name(config.chooser.as_deref()),
        }
    }
}

/// Outcome of one selection.
///
/// Holds the chosen instance for the lifetime of the request and releases
/// it on the chooser that made the pick when dropped, including when the
/// request future is cancelled.
#[derive(Debug)]
pub struct Selection {
    instance: Option<Arc<ServiceInstance>>,
    chooser: Arc<dyn Chooser>,
    annotate: bool,
}

impl Selection {
    /// The chosen instance; `None` means no instance can serve the request.
    pub fn instance(&self) -> Option<&Arc<ServiceInstance>> {
        self.instance.as_ref()
    }

    /// Whether the response should carry the backend version.
    pub fn annotate(&self) -> bool {
        self.annotate
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        if let Some(instance) = &self.instance {
            self.chooser.release(instance);
        }
    }
}

/// Composes the instance cache, the candidate selector and a chooser.
#[derive(Debug)]
pub struct VersionLoadBalancer {
    cache: Arc<InstanceCache>,
    policy: ArcSwap<BalancerPolicy>,
    local_host: String,
}

impl VersionLoadBalancer {
    pub fn new(cache: Arc<InstanceCache>, config: &LoadBalancerConfig) -> Self {
        let local_host = config
            .local_host
            .clone()
            .unwrap_or_else(detect_local_host);
        Self::with_local_host(cache, config, local_host)
    }

    pub fn with_local_host(
        cache: Arc<InstanceCache>,
        config: &LoadBalancerConfig,
        local_host: impl Into<String>,
    ) -> Self {
        let policy = BalancerPolicy::from_config(config);
        let local_host = local_host.into();
        tracing::info!(
            version_isolation = policy.version_isolation,
            chooser = policy.chooser.name(),
            local_host = %local_host,
            "Load balancer initialized"
        );
        Self {
            cache,
            policy: ArcSwap::from_pointee(policy),
            local_host,
        }
    }

    pub fn cache(&self) -> &Arc<InstanceCache> {
        &self.cache
    }

    pub fn local_host(&self) -> &str {
        &self.local_host
    }

    /// Snapshot of the current policy.
    pub fn policy(&self) -> Arc<BalancerPolicy> {
        self.policy.load_full()
    }

    /// Apply a reloaded configuration. An unchanged chooser keeps its state.
    pub fn reconfigure(&self, config: &LoadBalancerConfig) {
        let current = self.policy.load_full();
        let mut next = BalancerPolicy::from_config(config);
        if next.chooser.name() == current.chooser.name() {
            next.chooser = current.chooser.clone();
        }
        tracing::info!(
            version_isolation = next.version_isolation,
            chooser = next.chooser.name(),
            "Load balancer policy reloaded"
        );
        self.policy.store(Arc::new(next));
    }

    /// Choose an instance of `service` for a request carrying `version`.
    ///
    /// `Ok` with an empty selection is the expected "no instance" outcome;
    /// `Err` means the registry could not be consulted.
    pub async fn choose(&self, service: &str, version: Option<&str>) -> Result<Selection, RegistryError> {
        let policy = self.policy.load_full();
        let list = match self.cache.current_instances(service).await {
            Ok(list) => list,
            Err(e) => {
                metrics::record_selection(metrics::UNKNOWN_SERVICE, "lookup_failed");
                return Err(e);
            }
        };
        let label = metrics::service_label(&list);

        tracing::debug!(
            service = %service,
            version = ?version,
            instances = %list
                .instances()
                .iter()
                .map(|i| i.authority())
                .collect::<Vec<_>>()
                .join(", "),
            "Selecting instance"
        );

        let instance = if policy.version_isolation {
            let candidates = select_candidates(list.instances(), version, &self.local_host);
            policy.chooser.choose(&candidates)
        } else {
            policy.chooser.choose(list.instances())
        };

        match &instance {
            Some(chosen) => {
                tracing::debug!(
                    service = %service,
                    version = ?version,
                    address = %chosen.authority(),
                    "Chose instance"
                );
                metrics::record_selection(label, "chosen");
            }
            None => {
                tracing::debug!(service = %service, version = ?version, "No instance available");
                metrics::record_selection(label, "no_candidate");
            }
        }

        Ok(Selection {
            instance,
            chooser: policy.chooser.clone(),
            annotate: policy.version_isolation,
        })
    }
}

/// Best-effort detection of this host's outbound address.
///
/// Connecting a UDP socket sends no packets; it only resolves the route.
/// Returns an empty string when no route exists, which disables
/// co-location preference.
pub fn detect_local_host() -> String {
    let detected = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string());

    match detected {
        Ok(host) => host,
        Err(e) => {
            tracing::warn!(error = %e, "Could not detect local host, co-location preference disabled");
            String::new()
        }
    }
}
