//! HTTP server setup and request forwarding.
//!
//! # Responsibilities
//! - Create the Axum router and its middleware (timeout, request ID, tracing)
//! - Resolve `/{service}/{rest..}` to an instance through the load balancer
//! - Forward the request and stream the upstream response back
//! - Tag responses with the serving instance's version
//!
//! # Status Codes
//! - 404: no service segment in the path, or no instance with `use_404`
//! - 503: no instance available, or the registry cannot be consulted
//! - 502: the chosen instance could not be reached

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::http::request::{split_service_path, version_token};
use crate::http::response::annotate_backend_version;
use crate::load_balancer::VersionLoadBalancer;
use crate::observability::metrics;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub balancer: Arc<VersionLoadBalancer>,
    pub client: Client<HttpConnector, Body>,
    pub use_404: bool,
}

/// Forwarding HTTP server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &GatewayConfig, balancer: Arc<VersionLoadBalancer>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            balancer,
            client,
            use_404: config.load_balancer.use_404,
        };
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Serve on `listener` until `shutdown` fires, then finish in-flight
    /// requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Resolve the target service, choose an instance and forward.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let Some(route) = split_service_path(request.uri()) else {
        tracing::debug!(request_id = %request_id, path = %request.uri().path(), "No service in path");
        metrics::record_request(&method, 404, metrics::UNKNOWN_SERVICE, start_time);
        return (StatusCode::NOT_FOUND, "No service in request path").into_response();
    };
    let version = version_token(request.uri(), request.headers());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        service = %route.service,
        version = ?version,
        "Proxying request"
    );

    let selection = match state.balancer.choose(&route.service, version.as_deref()).await {
        Ok(selection) => selection,
        Err(e) => {
            tracing::error!(request_id = %request_id, service = %route.service, error = %e, "Instance lookup failed");
            metrics::record_request(&method, 503, metrics::UNKNOWN_SERVICE, start_time);
            return (StatusCode::SERVICE_UNAVAILABLE, "Service registry unavailable").into_response();
        }
    };

    let Some(instance) = selection.instance().cloned() else {
        let status = if state.use_404 {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };
        tracing::warn!(request_id = %request_id, service = %route.service, version = ?version, "No instance available");
        metrics::record_request(&method, status.as_u16(), metrics::UNKNOWN_SERVICE, start_time);
        return (status, "No instance available").into_response();
    };

    let uri: Uri = match format!("http://{}{}", instance.authority(), route.path_and_query).parse() {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, instance = %instance, error = %e, "Invalid upstream URI");
            metrics::record_request(&method, 502, &instance.service, start_time);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream address").into_response();
        }
    };

    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let (mut parts, body) = request.into_parts();
    parts.uri = uri;
    if let Ok(host) = HeaderValue::from_str(&instance.authority()) {
        parts.headers.insert(header::HOST, host);
    }
    if let Some(ip) = client_addr {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            parts.headers.append(X_FORWARDED_FOR, value);
        }
    }

    // Dropping the selection releases the instance, also when this future
    // is cancelled by the timeout layer or a client disconnect.
    let annotate = selection.annotate();
    let result = state.client.request(Request::from_parts(parts, body)).await;
    drop(selection);

    match result {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(&method, status.as_u16(), &instance.service, start_time);

            let (mut parts, body) = response.into_parts();
            if annotate {
                annotate_backend_version(Some(&instance), &mut parts.headers);
            }
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, instance = %instance, error = %e, "Upstream error");
            metrics::record_request(&method, 502, &instance.service, start_time);
            (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}
