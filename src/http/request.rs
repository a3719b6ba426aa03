//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4)
//! - Extract routing-relevant information (cluster id segment, proxied path)
//! - Prepare request headers for forwarding to backend
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing and copied to the backend
//! - Proxied path is cut from the raw URI so it reaches the backend unmodified

use std::net::SocketAddr;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::resolver::RequestContext;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Generates `x-request-id` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok()?;
        Some(RequestId::new(id))
    }
}

/// Request id of an inbound request, for log fields.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

/// Everything after the cluster id segment of a route-relative path.
///
/// `/abc/individual-plots.json` → `/individual-plots.json`, `/abc/` → `/`,
/// `/abc` → empty.
pub fn proxied_path(route_path: &str) -> &str {
    let rest = route_path.strip_prefix('/').unwrap_or(route_path);
    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "",
    }
}

/// Set `X-Forwarded-*` headers describing the inbound hop.
pub fn apply_forwarded_headers(
    headers: &mut HeaderMap,
    ctx: &RequestContext,
    peer: Option<SocketAddr>,
) {
    if let Some(peer) = peer {
        let forwarded_for = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) => format!("{}, {}", existing, peer.ip()),
            None => peer.ip().to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&ctx.scheme) {
        headers.insert(X_FORWARDED_PROTO, value);
    }

    if let Some(value) = ctx
        .host
        .as_deref()
        .and_then(|h| HeaderValue::from_str(h).ok())
    {
        headers.insert(X_FORWARDED_HOST, value);
    }
}
