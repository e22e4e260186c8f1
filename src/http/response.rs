//! Response annotation.
//!
//! Tags responses with the version of the instance that served them, so a
//! caller testing several deployed versions can tell which one answered.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::registry::ServiceInstance;

/// Response header carrying the serving instance's version.
pub const X_BACKEND_VERSION: HeaderName = HeaderName::from_static("x-backend-version");

/// Attach `X-Backend-Version` when the chosen instance declares a version.
/// No-op for `None` or untagged instances. A value set by the upstream is
/// kept; ours is appended after it.
pub fn annotate_backend_version(chosen: Option<&ServiceInstance>, headers: &mut HeaderMap) {
    let Some(version) = chosen.and_then(ServiceInstance::version) else {
        return;
    };
    match HeaderValue::from_str(version) {
        Ok(value) => {
            headers.append(X_BACKEND_VERSION, value);
        }
        Err(_) => {
            tracing::debug!(version = %version, "Version tag is not a valid header value, skipping");
        }
    }
}
