//! Startup orchestration.
//!
//! # Responsibilities
//! - Build subsystems in dependency order from a validated config
//! - Start background tasks (event bridge, config reloads, admin API)
//! - Run the ordered shutdown sequence
//!
//! # Design Decisions
//! - Missing optional collaborators disable the dependent feature instead
//!   of failing startup (no cache → no event bridge)
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::admin::{setup_admin_router, AdminState};
use crate::cache::{EventBridge, InstanceCache};
use crate::config::GatewayConfig;
use crate::http::HttpServer;
use crate::lifecycle::{GracefulDeregistration, Shutdown};
use crate::load_balancer::VersionLoadBalancer;
use crate::registry::registration::build_registration;
use crate::registry::{InMemoryRegistry, RegistryError};

/// Errors that abort startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("registration: {0}")]
    Registration(#[from] RegistryError),
}

/// A fully wired gateway, ready to serve.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<InMemoryRegistry>,
    balancer: Arc<VersionLoadBalancer>,
    deregistration: Option<Arc<GracefulDeregistration>>,
    shutdown: Shutdown,
    bridge: Option<JoinHandle<()>>,
}

impl Gateway {
    /// Wire all subsystems and register this process when enabled.
    pub async fn build(config: GatewayConfig) -> Result<Self, StartupError> {
        let shutdown = Shutdown::new();
        let registry = Arc::new(InMemoryRegistry::from_config(&config.registry));

        let cache = Arc::new(InstanceCache::new(registry.clone(), &config.cache));
        let balancer = Arc::new(VersionLoadBalancer::new(cache.clone(), &config.load_balancer));

        let bridge = EventBridge::install(cache.cache_manager(), registry.as_ref(), shutdown.subscribe());

        let deregistration = if config.registration.enabled {
            let registration = build_registration(&config.registration, balancer.local_host()).await?;
            let dereg = Arc::new(GracefulDeregistration::new(
                registry.clone(),
                registration,
                Duration::from_millis(config.registration.deregister_wait_millis),
            ));
            dereg.start().await;
            Some(dereg)
        } else {
            None
        };

        Ok(Self {
            config,
            registry,
            balancer,
            deregistration,
            shutdown,
            bridge,
        })
    }

    pub fn registry(&self) -> &Arc<InMemoryRegistry> {
        &self.registry
    }

    pub fn balancer(&self) -> &Arc<VersionLoadBalancer> {
        &self.balancer
    }

    pub fn deregistration(&self) -> Option<&Arc<GracefulDeregistration>> {
        self.deregistration.as_ref()
    }

    /// Serve on `listener` until `stop` resolves, then run the ordered
    /// shutdown: deregister, drain while serving, stop listeners.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<GatewayConfig>>,
        stop: F,
    ) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send,
    {
        let server = HttpServer::new(&self.config, self.balancer.clone());
        let server_task = tokio::spawn(server.run(listener, self.shutdown.subscribe()));

        let admin_task = if self.config.admin.enabled {
            Some(self.spawn_admin().await?)
        } else {
            None
        };

        if let Some(updates) = config_updates {
            tokio::spawn(apply_config_updates(self.balancer.clone(), updates, self.shutdown.subscribe()));
        }

        stop.await;

        if let Some(dereg) = &self.deregistration {
            dereg.stop().await;
        }

        tracing::info!("Stopping listeners");
        self.shutdown.trigger();

        let served = server_task
            .await
            .map_err(std::io::Error::other)?;
        if let Some(admin) = admin_task {
            let _ = admin.await;
        }
        if let Some(bridge) = self.bridge {
            let _ = bridge.await;
        }
        served
    }

    async fn spawn_admin(&self) -> Result<JoinHandle<()>, std::io::Error> {
        let listener = TcpListener::bind(&self.config.admin.bind_address).await?;
        tracing::info!(address = %listener.local_addr()?, "Admin API listening");

        let router = setup_admin_router(AdminState {
            balancer: self.balancer.clone(),
            deregistration: self.deregistration.clone(),
            api_key: Arc::from(self.config.admin.api_key.as_str()),
        });
        let shutdown = self.shutdown.clone();
        Ok(tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.wait().await })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API server failed");
            }
        }))
    }
}

async fn apply_config_updates(
    balancer: Arc<VersionLoadBalancer>,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut stop: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Some(config) => balancer.reconfigure(&config.load_balancer),
                None => break,
            },
            _ = stop.recv() => break,
        }
    }
}
