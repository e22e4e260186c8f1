use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::admin::AdminState;
use crate::registry::ServiceInstance;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub version_isolation: bool,
    pub chooser: &'static str,
    pub local_host: String,
    pub cache_enabled: bool,
    pub cached_services: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct InstancesView {
    pub service: String,
    /// Age of the cached list in milliseconds, if it was served from cache.
    pub cache_age_ms: Option<u64>,
    pub instances: Vec<ServiceInstance>,
}

#[derive(Debug, Serialize)]
pub struct InvalidateResult {
    pub service: String,
    pub evicted: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let policy = state.balancer.policy();
    let cache = state.balancer.cache();
    let status = state
        .deregistration
        .as_ref()
        .map(|d| d.state().as_str())
        .unwrap_or("running");

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status,
        version_isolation: policy.version_isolation,
        chooser: policy.chooser.name(),
        local_host: state.balancer.local_host().to_string(),
        cache_enabled: cache.is_enabled(),
        cached_services: cache.cached_services(),
    })
}

pub async fn get_instances(State(state): State<AdminState>, Path(service): Path<String>) -> Response {
    let cache = state.balancer.cache();
    match cache.current_instances(&service).await {
        Ok(list) => {
            let cache_age_ms = cache.peek(&service).map(|cached| cached.age.as_millis() as u64);
            Json(InstancesView {
                service,
                cache_age_ms,
                instances: list.instances().iter().map(|i| (**i).clone()).collect(),
            })
            .into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

pub async fn invalidate_service(State(state): State<AdminState>, Path(service): Path<String>) -> Json<InvalidateResult> {
    let evicted = state.balancer.cache().invalidate(&service);
    tracing::info!(service = %service, evicted, "Cache entry invalidated via admin API");
    Json(InvalidateResult { service, evicted })
}
