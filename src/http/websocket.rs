//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Establish WebSocket connection to backend before accepting the client upgrade
//! - Bidirectional frame forwarding
//! - Close the surviving side when either side closes or fails
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Backend
//! ```
//!
//! # Session States
//! ```text
//! Resolving → Handshaking → Relaying → Closed
//!     │            │
//!     └────────────┴──→ Closed (404/502 returned instead of upgrading)
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions with their code and reason
//! - Ping/pong forwarded like any other frame

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{self, close_code, WebSocket};
use axum::http::{
    header::{
        HOST, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_EXTENSIONS, SEC_WEBSOCKET_KEY,
        SEC_WEBSOCKET_PROTOCOL, SEC_WEBSOCKET_VERSION,
    },
    HeaderMap, HeaderName,
};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::ProxyError;
use crate::http::request::apply_forwarded_headers;
use crate::http::response::strip_hop_by_hop;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::resolver::{ProxyTarget, RequestContext};

pub type BackendSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of one proxied WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Resolving,
    Handshaking,
    Relaying,
    Closed,
}

/// Tracks a proxied WebSocket through its states.
#[derive(Debug)]
pub struct WsSession {
    cluster_id: String,
    state: SessionState,
}

impl WsSession {
    pub fn new(cluster_id: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            state: SessionState::Resolving,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to `next`. Sessions only move forward; `Closed` is terminal.
    pub fn advance(&mut self, next: SessionState) {
        let allowed = matches!(
            (self.state, next),
            (SessionState::Resolving, SessionState::Handshaking)
                | (SessionState::Handshaking, SessionState::Relaying)
                | (
                    SessionState::Resolving | SessionState::Handshaking | SessionState::Relaying,
                    SessionState::Closed
                )
        );
        if !allowed {
            tracing::debug!(from = ?self.state, to = ?next, "Ignoring invalid session transition");
            return;
        }

        tracing::debug!(
            cluster_id = %self.cluster_id,
            from = ?self.state,
            to = ?next,
            "WebSocket session transition"
        );
        self.state = next;
    }

    /// Close the session because of `error`.
    pub fn fail(&mut self, error: &ProxyError) {
        tracing::warn!(
            cluster_id = %self.cluster_id,
            state = ?self.state,
            error = %error,
            "WebSocket session failed"
        );
        self.advance(SessionState::Closed);
    }
}

/// Headers the WebSocket client generates itself for the backend handshake.
const HANDSHAKE_HEADERS: [HeaderName; 5] = [
    HOST,
    SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION,
    SEC_WEBSOCKET_EXTENSIONS,
    SEC_WEBSOCKET_ACCEPT,
];

/// Inbound headers to copy onto the backend handshake: everything except
/// hop-by-hop headers (including those named in `Connection`) and the ones
/// the WebSocket client generates.
fn handshake_headers(inbound: &HeaderMap) -> HeaderMap {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);
    for name in &HANDSHAKE_HEADERS {
        headers.remove(name);
    }
    headers
}

/// Open the backend WebSocket for `target`.
///
/// Returns the socket and the subprotocol the backend selected, which must
/// be echoed to the client.
pub async fn connect_backend(
    target: &ProxyTarget,
    proxied_path: &str,
    query: Option<&str>,
    inbound: &HeaderMap,
    ctx: &RequestContext,
    peer: Option<SocketAddr>,
    handshake_timeout: Duration,
) -> Result<(BackendSocket, Option<String>), ProxyError> {
    let url = target.url("ws", proxied_path, query);
    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ProxyError::MalformedDashboardLink {
            link: url.clone(),
            reason: e.to_string(),
        })?;

    let headers = request.headers_mut();
    for (name, value) in &handshake_headers(inbound) {
        headers.append(name.clone(), value.clone());
    }
    apply_forwarded_headers(headers, ctx, peer);

    tracing::debug!(url = %url, "Connecting to backend WebSocket");

    let (socket, response) = with_deadline(
        handshake_timeout,
        &target.authority(),
        "handshake",
        tokio_tungstenite::connect_async(request),
    )
    .await?;

    let protocol = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok((socket, protocol))
}

/// How a relay ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEnd {
    /// The client sent a close frame, already forwarded to the backend.
    ClientClosed,
    /// The backend sent a close frame, already forwarded to the client.
    BackendClosed,
    /// The client connection failed or vanished without a close frame.
    ClientLost(String),
    /// The backend connection failed or vanished without a close frame.
    BackendLost(String),
    /// The proxy is shutting down.
    Shutdown,
}

/// Relay frames between `client` and `backend` until one side ends.
///
/// The other side is closed before returning, so no half-open session is left.
pub async fn relay(
    client: WebSocket,
    backend: BackendSocket,
    mut shutdown: broadcast::Receiver<()>,
) -> RelayEnd {
    let _active = metrics::WebSocketSessionGuard::new();

    let (mut client_tx, mut client_rx) = client.split();
    let (mut backend_tx, mut backend_rx) = backend.split();

    let end = tokio::select! {
        end = pump(&mut client_rx, &mut backend_tx, client_to_backend, Direction::ClientToBackend) => end,
        end = pump(&mut backend_rx, &mut client_tx, backend_to_client, Direction::BackendToClient) => end,
        _ = shutdown.recv() => RelayEnd::Shutdown,
    };

    match &end {
        RelayEnd::ClientClosed | RelayEnd::BackendClosed => {}
        RelayEnd::ClientLost(reason) => {
            let error = ProxyError::RelayInterrupted(format!("client: {reason}"));
            tracing::debug!(error = %error, "Client WebSocket lost, closing backend");
            let _ = backend_tx.send(backend_close(CloseCode::Away, "client went away")).await;
        }
        RelayEnd::BackendLost(reason) => {
            let error = ProxyError::RelayInterrupted(format!("backend: {reason}"));
            tracing::warn!(error = %error, "Backend WebSocket lost, closing client");
            let _ = client_tx
                .send(client_close(close_code::ERROR, "backend connection lost"))
                .await;
        }
        RelayEnd::Shutdown => {
            let _ = client_tx.send(client_close(close_code::AWAY, "proxy shutting down")).await;
            let _ = backend_tx.send(backend_close(CloseCode::Away, "proxy shutting down")).await;
        }
    }

    let _ = client_tx.close().await;
    let _ = backend_tx.close().await;

    tracing::debug!(end = ?end, "WebSocket relay finished");
    end
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    ClientToBackend,
    BackendToClient,
}

impl Direction {
    fn closed(self) -> RelayEnd {
        match self {
            Direction::ClientToBackend => RelayEnd::ClientClosed,
            Direction::BackendToClient => RelayEnd::BackendClosed,
        }
    }

    fn source_lost(self, reason: String) -> RelayEnd {
        match self {
            Direction::ClientToBackend => RelayEnd::ClientLost(reason),
            Direction::BackendToClient => RelayEnd::BackendLost(reason),
        }
    }

    fn sink_lost(self, reason: String) -> RelayEnd {
        match self {
            Direction::ClientToBackend => RelayEnd::BackendLost(reason),
            Direction::BackendToClient => RelayEnd::ClientLost(reason),
        }
    }
}

/// A converted frame, flagged when it is a close frame.
struct Converted<M> {
    message: M,
    is_close: bool,
}

/// Forward frames from `source` to `sink` in order until a close or failure.
async fn pump<S, K, In, Out, SE, KE>(
    source: &mut S,
    sink: &mut K,
    convert: fn(In) -> Option<Converted<Out>>,
    direction: Direction,
) -> RelayEnd
where
    S: Stream<Item = Result<In, SE>> + Unpin,
    K: Sink<Out, Error = KE> + Unpin,
    SE: std::fmt::Display,
    KE: std::fmt::Display,
{
    loop {
        let frame = match source.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => return direction.source_lost(e.to_string()),
            None => return direction.source_lost("connection ended without close frame".into()),
        };

        let Some(Converted { message, is_close }) = convert(frame) else {
            continue;
        };

        if let Err(e) = sink.send(message).await {
            return direction.sink_lost(e.to_string());
        }
        if is_close {
            return direction.closed();
        }
    }
}

fn client_to_backend(message: ws::Message) -> Option<Converted<Message>> {
    let (message, is_close) = match message {
        ws::Message::Text(text) => (Message::text(text.as_str()), false),
        ws::Message::Binary(data) => (Message::Binary(data), false),
        ws::Message::Ping(data) => (Message::Ping(data), false),
        ws::Message::Pong(data) => (Message::Pong(data), false),
        ws::Message::Close(frame) => {
            let frame = frame.map(|f| CloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.as_str().into(),
            });
            (Message::Close(frame), true)
        }
    };
    Some(Converted { message, is_close })
}

fn backend_to_client(message: Message) -> Option<Converted<ws::Message>> {
    let (message, is_close) = match message {
        Message::Text(text) => (ws::Message::Text(text.as_str().into()), false),
        Message::Binary(data) => (ws::Message::Binary(data), false),
        Message::Ping(data) => (ws::Message::Ping(data), false),
        Message::Pong(data) => (ws::Message::Pong(data), false),
        Message::Close(frame) => {
            let frame = frame.map(|f| ws::CloseFrame {
                code: u16::from(f.code),
                reason: f.reason.as_str().into(),
            });
            (ws::Message::Close(frame), true)
        }
        // Raw frames only appear when writing; never yielded by the reader.
        Message::Frame(_) => return None,
    };
    Some(Converted { message, is_close })
}

fn client_close(code: u16, reason: &str) -> ws::Message {
    ws::Message::Close(Some(ws::CloseFrame {
        code,
        reason: reason.into(),
    }))
}

fn backend_close(code: CloseCode, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.into(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;

    #[test]
    fn session_walks_forward() {
        let mut session = WsSession::new("c");
        assert_eq!(session.state(), SessionState::Resolving);
        session.advance(SessionState::Handshaking);
        session.advance(SessionState::Relaying);
        session.advance(SessionState::Closed);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn resolution_failure_closes_directly() {
        let mut session = WsSession::new("c");
        session.fail(&ProxyError::ClusterNotFound("c".into()));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn closed_is_terminal() {
        let mut session = WsSession::new("c");
        session.advance(SessionState::Closed);
        session.advance(SessionState::Relaying);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn handshake_drops_connection_listed_and_generated_headers() {
        let mut inbound = HeaderMap::new();
        inbound.insert("connection", "Upgrade, x-session-hint".parse().unwrap());
        inbound.insert("upgrade", "websocket".parse().unwrap());
        inbound.insert("x-session-hint", "1".parse().unwrap());
        inbound.insert(HOST, "proxy.example".parse().unwrap());
        inbound.insert(SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==".parse().unwrap());
        inbound.insert(SEC_WEBSOCKET_VERSION, "13".parse().unwrap());
        inbound.insert(SEC_WEBSOCKET_PROTOCOL, "bokeh".parse().unwrap());
        inbound.insert("cookie", "_xsrf=1".parse().unwrap());

        let headers = handshake_headers(&inbound);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers[SEC_WEBSOCKET_PROTOCOL], "bokeh");
        assert_eq!(headers["cookie"], "_xsrf=1");
    }

    #[test]
    fn frames_keep_their_kind() {
        let text = client_to_backend(ws::Message::Text("hello".into())).unwrap();
        assert_eq!(text.message, Message::text("hello"));
        assert!(!text.is_close);

        let binary = backend_to_client(Message::Binary(Bytes::from_static(&[0, 159, 146, 150])))
            .unwrap();
        assert_eq!(
            binary.message,
            ws::Message::Binary(Bytes::from_static(&[0, 159, 146, 150]))
        );
    }

    #[test]
    fn close_codes_survive_both_directions() {
        let to_backend = client_to_backend(client_close(4001, "session expired")).unwrap();
        assert!(to_backend.is_close);
        assert_eq!(
            to_backend.message,
            backend_close(CloseCode::from(4001), "session expired")
        );

        let to_client = backend_to_client(backend_close(CloseCode::Normal, "bye")).unwrap();
        assert!(to_client.is_close);
        assert_eq!(to_client.message, client_close(close_code::NORMAL, "bye"));
    }
}
