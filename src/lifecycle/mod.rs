//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Registry → Cache → Load balancer → Event bridge
//!     → Register self → Start listeners
//!
//! Shutdown:
//!     Signal received (signals.rs)
//!     → Deregister, keep serving for the drain window (deregistration.rs)
//!     → Broadcast stop (shutdown.rs) → Server drains in-flight requests → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: deregister first, stop accepting last
//! - The drain wait blocks only the shutdown task; request tasks keep running
//! - Deregistration failures never block or abort shutdown

pub mod deregistration;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use deregistration::{DeregistrationState, GracefulDeregistration};
pub use shutdown::Shutdown;
pub use startup::Gateway;
