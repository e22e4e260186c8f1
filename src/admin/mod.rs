//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: gateway version, policy and drain state
//! - `GET /admin/services/{service}/instances`: current instance list
//! - `POST /admin/services/{service}/invalidate`: drop a cached list
//!
//! Every endpoint requires `Authorization: Bearer <api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::lifecycle::GracefulDeregistration;
use crate::load_balancer::VersionLoadBalancer;

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub balancer: Arc<VersionLoadBalancer>,
    pub deregistration: Option<Arc<GracefulDeregistration>>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/services/{service}/instances", get(get_instances))
        .route("/admin/services/{service}/invalidate", post(invalidate_service))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
