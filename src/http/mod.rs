//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (service name, version token)
//!     → [load balancer picks an instance]
//!     → forward to instance
//!     → response.rs (X-Backend-Version)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{split_service_path, version_token, ServiceRoute, VERSION_HEADER};
pub use response::{annotate_backend_version, X_BACKEND_VERSION};
pub use server::HttpServer;
