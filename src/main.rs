//! Version-aware service gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ version load balancer ──▶ chooser
//!                         │                  │
//!                         │                  ▼
//!                         │           instance cache ◀── event bridge ◀── registry events
//!                         │                  │
//!                         ▼                  ▼
//!     Client Response ◀── X-Backend-Version ◀── upstream instance
//! ```
//!
//! On SIGINT/SIGTERM the gateway deregisters itself, keeps serving for the
//! drain window, then stops its listeners.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use version_gateway::config::loader::load_config;
use version_gateway::config::watcher::ConfigWatcher;
use version_gateway::lifecycle::signals::shutdown_signal;
use version_gateway::observability::{logging, metrics};
use version_gateway::{Gateway, GatewayConfig};

#[derive(Parser)]
#[command(name = "version-gateway")]
#[command(about = "Version-aware service gateway", long_about = None)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the load balancer policy when the config file changes.
    #[arg(short, long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!("version-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        version_isolation = config.load_balancer.version_isolation,
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // Keep the watcher alive for the lifetime of the process.
    let (config_updates, _watcher) = match (&args.config, args.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(updates), Some(watcher.run()?))
        }
        _ => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let gateway = Gateway::build(config).await?;
    gateway.run(listener, config_updates, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
