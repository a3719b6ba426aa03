//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router for the dashboard routes under the configured prefix
//! - Wire up middleware (tracing, request ID)
//! - Bind server to listener and stop on shutdown
//! - Dispatch each request: resolve cluster, then forward HTTP or relay WebSocket
//!
//! # Routes
//! ```text
//! {prefix}/{cluster_id}                   → proxied path ""
//! {prefix}/{cluster_id}/                  → proxied path "/"
//! {prefix}/{cluster_id}/{*proxied_path}   → proxied path "/{proxied_path}"
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        ConnectInfo, Path, State,
    },
    http::{header::SEC_WEBSOCKET_PROTOCOL, request::Parts, HeaderMap, Method, Request},
    response::{IntoResponse, Response},
    routing::{on, MethodFilter},
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::http::forward::Forwarder;
use crate::http::request::{proxied_path, request_id, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::websocket::{self, SessionState, WsSession};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::ClusterRegistry;
use crate::resolver::{RequestContext, Resolver};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Resolver,
    pub forwarder: Forwarder,
    pub handshake_timeout: Duration,
    pub shutdown: Shutdown,
}

/// HTTP server for the dashboard proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    shutdown: Shutdown,
}

#[derive(Debug, Deserialize)]
struct ClusterPath {
    cluster_id: String,
}

impl HttpServer {
    /// Create a server resolving clusters through `registry`.
    pub fn new(config: ProxyConfig, registry: Arc<dyn ClusterRegistry>, shutdown: Shutdown) -> Self {
        let state = AppState {
            resolver: Resolver::new(registry, config.resolver),
            forwarder: Forwarder::new(&config.timeouts),
            handshake_timeout: Duration::from_secs(config.timeouts.handshake_secs),
            shutdown: shutdown.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            shutdown,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let methods = MethodFilter::GET
            .or(MethodFilter::POST)
            .or(MethodFilter::PUT)
            .or(MethodFilter::DELETE)
            .or(MethodFilter::PATCH)
            .or(MethodFilter::HEAD)
            .or(MethodFilter::OPTIONS);

        let dashboard = Router::new()
            .route("/{cluster_id}", on(methods, dashboard_handler))
            .route("/{cluster_id}/", on(methods, dashboard_handler))
            .route("/{cluster_id}/{*proxied_path}", on(methods, dashboard_handler));

        let prefix = config.listener.route_prefix.as_str();
        let routes = if prefix == "/" {
            dashboard
        } else {
            Router::new().nest(prefix, dashboard)
        };

        routes.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(X_REQUEST_ID)),
        )
    }

    /// The router, for serving without a listener (tests, embedding).
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// shutdown is triggered.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            route_prefix = %self.config.listener.route_prefix,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(self.shutdown.wait())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Proxy one dashboard request.
///
/// Resolution (and for WebSockets the backend handshake) completes before
/// anything is sent, so failures reach the client as plain 404/502 responses.
async fn dashboard_handler(
    State(state): State<AppState>,
    Path(ClusterPath { cluster_id }): Path<ClusterPath>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();
    let request_id = request_id(request.headers()).to_string();
    let path = proxied_path(request.uri().path()).to_string();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ctx = RequestContext::from_request(request.headers(), request.uri());

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        cluster_id = %cluster_id,
        proxied_path = %path,
        websocket = upgrade.is_ok(),
        "Proxying dashboard request"
    );

    let response = match upgrade {
        Ok(ws) => {
            let (parts, _) = request.into_parts();
            proxy_websocket(&state, ws, &cluster_id, &path, &ctx, peer, &parts).await
        }
        Err(_) => proxy_http(&state, method.clone(), &cluster_id, &path, &ctx, peer, request).await,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            match &e {
                ProxyError::ClusterNotFound(_) => {
                    tracing::info!(request_id = %request_id, cluster_id = %cluster_id, "Unknown cluster")
                }
                _ => tracing::warn!(
                    request_id = %request_id,
                    cluster_id = %cluster_id,
                    error = %e,
                    "Dashboard request failed"
                ),
            }
            if !matches!(e, ProxyError::BackendUnreachable { .. }) {
                metrics::record_resolve_failure(e.kind());
            }
            e.into_response()
        }
    };

    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

async fn proxy_http(
    state: &AppState,
    method: Method,
    cluster_id: &str,
    path: &str,
    ctx: &RequestContext,
    peer: Option<SocketAddr>,
    request: Request<Body>,
) -> Result<Response, ProxyError> {
    let target = state.resolver.resolve(cluster_id, ctx).await?;
    state
        .forwarder
        .forward(method, &target, path, ctx, peer, request)
        .await
}

async fn proxy_websocket(
    state: &AppState,
    ws: WebSocketUpgrade,
    cluster_id: &str,
    path: &str,
    ctx: &RequestContext,
    peer: Option<SocketAddr>,
    request: &Parts,
) -> Result<Response, ProxyError> {
    let mut session = WsSession::new(cluster_id);

    let target = match state.resolver.resolve(cluster_id, ctx).await {
        Ok(target) => target,
        Err(e) => {
            session.fail(&e);
            return Err(e);
        }
    };

    session.advance(SessionState::Handshaking);
    let (backend, protocol) = match websocket::connect_backend(
        &target,
        path,
        request.uri.query(),
        &request.headers,
        ctx,
        peer,
        state.handshake_timeout,
    )
    .await
    {
        Ok(connected) => connected,
        Err(e) => {
            session.fail(&e);
            return Err(e);
        }
    };

    tracing::info!(
        cluster_id = %cluster_id,
        target = %target,
        proxied_path = %path,
        "WebSocket backend connected"
    );

    let ws = match protocol.filter(|p| offered_protocol(&request.headers, p)) {
        Some(protocol) => ws.protocols([protocol]),
        None => ws,
    };

    let shutdown = state.shutdown.subscribe();
    let failed_cluster = cluster_id.to_string();
    let response = ws
        .on_failed_upgrade(move |e| {
            tracing::warn!(cluster_id = %failed_cluster, error = %e, "Client WebSocket upgrade failed");
        })
        .on_upgrade(move |client| async move {
            session.advance(SessionState::Relaying);
            let end = websocket::relay(client, backend, shutdown).await;
            tracing::debug!(end = ?end, "WebSocket session ended");
            session.advance(SessionState::Closed);
        });

    Ok(response)
}

/// Whether the client offered `protocol` in its handshake.
fn offered_protocol(headers: &HeaderMap, protocol: &str) -> bool {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|offered| offered.trim() == protocol)
}
