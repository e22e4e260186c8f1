//! Graceful deregistration.
//!
//! # States
//! ```text
//! Running → Deregistering → Draining (bounded wait) → Stopped
//! ```
//!
//! On shutdown the instance is removed from the registry first, then the
//! process keeps serving for `wait` so registry clients elsewhere (which
//! poll every ~10s) stop routing here before the listener closes.
//!
//! # Design Decisions
//! - Deregistration is issued at most once; a repeated or resumed `stop`
//!   never retries it
//! - Deregistration errors and timeouts are logged, and the drain still
//!   elapses

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::registry::{ServiceInstance, ServiceRegistry};

/// Upper bound on a single registry deregister call.
const DEREGISTER_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Deregistration lifecycle state.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeregistrationState {
    Running = 0,
    Deregistering = 1,
    Draining = 2,
    Stopped = 3,
}

impl From<u8> for DeregistrationState {
    fn from(val: u8) -> Self {
        match val {
            1 => DeregistrationState::Deregistering,
            2 => DeregistrationState::Draining,
            3 => DeregistrationState::Stopped,
            _ => DeregistrationState::Running,
        }
    }
}

impl DeregistrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeregistrationState::Running => "running",
            DeregistrationState::Deregistering => "deregistering",
            DeregistrationState::Draining => "draining",
            DeregistrationState::Stopped => "stopped",
        }
    }
}

/// Registers this process on start and deregisters it gracefully on stop.
pub struct GracefulDeregistration {
    registry: Arc<dyn ServiceRegistry>,
    registration: ServiceInstance,
    wait: Duration,
    state: AtomicU8,
}

impl std::fmt::Debug for GracefulDeregistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GracefulDeregistration")
            .field("registration", &self.registration)
            .field("wait", &self.wait)
            .field("state", &self.state())
            .finish()
    }
}

impl GracefulDeregistration {
    pub fn new(registry: Arc<dyn ServiceRegistry>, registration: ServiceInstance, wait: Duration) -> Self {
        Self {
            registry,
            registration,
            wait,
            state: AtomicU8::new(DeregistrationState::Running as u8),
        }
    }

    pub fn state(&self) -> DeregistrationState {
        self.state.load(Ordering::Acquire).into()
    }

    pub fn registration(&self) -> &ServiceInstance {
        &self.registration
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Register with the registry. Failures are logged, not fatal.
    pub async fn start(&self) -> bool {
        match self.registry.register(&self.registration).await {
            Ok(()) => {
                tracing::info!(instance = %self.registration, "Registered with service registry");
                true
            }
            Err(e) => {
                tracing::error!(instance = %self.registration, error = %e, "Service registration failed");
                false
            }
        }
    }

    /// Deregister, then wait out the drain window.
    ///
    /// Only the first call deregisters and drains; later calls return
    /// immediately.
    pub async fn stop(&self) {
        if self
            .state
            .compare_exchange(
                DeregistrationState::Running as u8,
                DeregistrationState::Deregistering as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            tracing::debug!(state = self.state().as_str(), "Deregistration already in progress");
            return;
        }

        tracing::info!(instance = %self.registration, "Deregistering from service registry");
        match tokio::time::timeout(DEREGISTER_CALL_TIMEOUT, self.registry.deregister(&self.registration)).await {
            Ok(Ok(())) => {
                metrics::record_deregistration("ok");
                tracing::info!("Deregistered");
            }
            Ok(Err(e)) => {
                metrics::record_deregistration("failed");
                tracing::warn!(error = %e, "Deregistration failed, draining anyway");
            }
            Err(_) => {
                metrics::record_deregistration("timeout");
                tracing::warn!(timeout = ?DEREGISTER_CALL_TIMEOUT, "Deregistration timed out, draining anyway");
            }
        }

        self.state.store(DeregistrationState::Draining as u8, Ordering::Release);
        tracing::info!(wait_ms = self.wait.as_millis() as u64, "Draining before shutdown, still serving requests");
        tokio::time::sleep(self.wait).await;

        self.state.store(DeregistrationState::Stopped as u8, Ordering::Release);
        tracing::info!("Drain window elapsed");
    }
}
