//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use dashboard_proxy::config::{ClusterConfig, ProxyConfig};
use dashboard_proxy::{HttpServer, Shutdown, StaticRegistry};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// What the WebSocket side of a mock dashboard observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A close frame arrived, with its code.
    Closed(Option<u16>),
    /// The connection ended without a close frame.
    Lost,
}

pub struct MockDashboard {
    pub addr: SocketAddr,
    pub events: mpsc::UnboundedReceiver<BackendEvent>,
}

/// Start a mock dashboard on an ephemeral port.
///
/// - HTTP requests are answered with a JSON description of what arrived
/// - paths ending in `/missing` answer `404` from the backend itself
/// - WebSockets echo text and binary frames; the text `close-me` makes the
///   backend close with code 4000, the text `headers` returns the handshake
///   headers it received as JSON
pub async fn start_mock_dashboard() -> MockDashboard {
    let (tx, events) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/", any(dashboard_handler))
        .route("/{*path}", any(dashboard_handler))
        .with_state(tx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockDashboard { addr, events }
}

async fn dashboard_handler(
    State(events): State<mpsc::UnboundedSender<BackendEvent>>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Ok(ws) = upgrade {
        let handshake: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.into())))
            .collect();
        let handshake = serde_json::Value::Object(handshake).to_string();
        return ws.on_upgrade(move |socket| echo_socket(socket, handshake, events));
    }

    if uri.path().ends_with("/missing") {
        return (StatusCode::NOT_FOUND, "backend has no such page").into_response();
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let seen = serde_json::json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query(),
        "host": header("host"),
        "request_id": header("x-request-id"),
        "forwarded_for": header("x-forwarded-for"),
        "forwarded_proto": header("x-forwarded-proto"),
        "proxy_authorization": header("proxy-authorization"),
        "body": String::from_utf8_lossy(&body),
    });

    ([("x-dashboard", "bokeh")], Json(seen)).into_response()
}

async fn echo_socket(
    mut socket: WebSocket,
    handshake: String,
    events: mpsc::UnboundedSender<BackendEvent>,
) {
    while let Some(message) = socket.recv().await {
        let reply = match message {
            Ok(Message::Text(text)) if text.as_str() == "headers" => Message::Text(handshake.clone().into()),
            Ok(Message::Text(text)) if text.as_str() == "close-me" => Message::Close(Some(CloseFrame {
                code: 4000,
                reason: "done".into(),
            })),
            Ok(Message::Text(text)) => Message::Text(text),
            Ok(Message::Binary(data)) => Message::Binary(data),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(frame)) => {
                let _ = events.send(BackendEvent::Closed(frame.map(|f| f.code)));
                return;
            }
            Err(_) => {
                let _ = events.send(BackendEvent::Lost);
                return;
            }
        };
        if socket.send(reply).await.is_err() {
            let _ = events.send(BackendEvent::Lost);
            return;
        }
    }
    let _ = events.send(BackendEvent::Lost);
}

pub struct RunningProxy {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub registry: Arc<StaticRegistry>,
}

impl RunningProxy {
    /// `http://addr/dask/dashboard/{rest}`
    pub fn url(&self, rest: &str) -> String {
        format!("http://{}/dask/dashboard/{}", self.addr, rest)
    }

    /// `ws://addr/dask/dashboard/{rest}`
    pub fn ws_url(&self, rest: &str) -> String {
        format!("ws://{}/dask/dashboard/{}", self.addr, rest)
    }
}

pub fn cluster(id: &str, dashboard_link: impl Into<String>) -> ClusterConfig {
    ClusterConfig {
        id: id.to_string(),
        name: None,
        dashboard_link: dashboard_link.into(),
    }
}

/// Start the proxy on an ephemeral port with a static registry.
pub async fn start_proxy(clusters: Vec<ClusterConfig>) -> RunningProxy {
    start_proxy_with(ProxyConfig::default(), clusters).await
}

pub async fn start_proxy_with(mut config: ProxyConfig, clusters: Vec<ClusterConfig>) -> RunningProxy {
    config.clusters = clusters;
    let registry = Arc::new(StaticRegistry::from_configs(&config.clusters));
    let shutdown = Shutdown::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, registry.clone(), shutdown.clone());
    tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });

    RunningProxy {
        addr,
        shutdown,
        registry,
    }
}

/// HTTP client that ignores environment proxy settings.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// A backend that accepts connections and never answers.
pub async fn start_silent_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

/// Proxy config with one-second backend deadlines.
pub fn short_timeouts() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.timeouts.request_secs = 1;
    config.timeouts.handshake_secs = 1;
    config
}
