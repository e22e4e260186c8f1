//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use version_gateway::config::{GatewayConfig, InstanceSeed};
use version_gateway::lifecycle::GracefulDeregistration;
use version_gateway::registry::InMemoryRegistry;
use version_gateway::Gateway;

/// Start a mock backend on an ephemeral port that answers every request
/// with `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// Start a mock backend whose status and body come from `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                read_request_head(&mut socket).await;
                let (status, body) = f().await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    503 => "503 Service Unavailable",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    return;
                }
            }
        }
    }
}

/// Registry seed for a backend listening on `addr`.
pub fn seed(service: &str, addr: SocketAddr, version: Option<&str>) -> InstanceSeed {
    let mut metadata = BTreeMap::new();
    if let Some(v) = version {
        metadata.insert("version".to_string(), v.to_string());
    }
    InstanceSeed {
        service: service.to_string(),
        host: addr.ip().to_string(),
        port: addr.port(),
        metadata,
    }
}

/// Config with version isolation on and a local host that matches no
/// test backend.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.load_balancer.version_isolation = true;
    config.load_balancer.local_host = Some("192.0.2.1".to_string());
    config.cache.ttl_secs = 300;
    config.admin.enabled = false;
    config
}

/// A gateway running in the background.
pub struct RunningGateway {
    pub addr: SocketAddr,
    pub registry: Arc<InMemoryRegistry>,
    pub deregistration: Option<Arc<GracefulDeregistration>>,
    stop: Option<oneshot::Sender<()>>,
    pub task: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningGateway {
    /// Begin the shutdown sequence without waiting for it.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Bind an ephemeral port and run a gateway on it. When registration is
/// enabled, the gateway advertises the bound port.
pub async fn spawn_gateway(mut config: GatewayConfig) -> RunningGateway {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    config.listener.bind_address = addr.to_string();
    config.registration.port = addr.port();

    let gateway = Gateway::build(config).await.unwrap();
    let registry = gateway.registry().clone();
    let deregistration = gateway.deregistration().cloned();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(gateway.run(listener, None, async move {
        let _ = stop_rx.await;
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    RunningGateway {
        addr,
        registry,
        deregistration,
        stop: Some(stop_tx),
        task,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
