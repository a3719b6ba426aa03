//! HTTP forwarding to a resolved dashboard backend.
//!
//! # Data Flow
//! ```text
//! inbound request (any method)
//!     → rewrite URI to http://{target}{base_path}{proxied_path}?{query}
//!     → strip hop-by-hop headers, set Host and X-Forwarded-*
//!     → hyper client (connect timeout on the connector)
//!     → response headers within request timeout
//!     → stream status, headers and body back
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header::HOST, HeaderValue, Method, Request, Uri},
    response::Response,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::config::TimeoutConfig;
use crate::error::ProxyError;
use crate::http::request::apply_forwarded_headers;
use crate::http::response::{relay_response, strip_hop_by_hop};
use crate::resilience::timeouts::with_deadline;
use crate::resolver::{ProxyTarget, RequestContext};

/// Relays HTTP requests to dashboard backends.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    response_timeout: Duration,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .build(connector);

        Self {
            client,
            response_timeout: Duration::from_secs(timeouts.request_secs),
        }
    }

    /// Forward `request` to `target` with `method`, streaming the answer back.
    ///
    /// Backend statuses (including errors) are returned untouched; only a
    /// failure to reach the backend becomes a `ProxyError`.
    pub async fn forward(
        &self,
        method: Method,
        target: &ProxyTarget,
        proxied_path: &str,
        ctx: &RequestContext,
        peer: Option<SocketAddr>,
        request: Request<Body>,
    ) -> Result<Response, ProxyError> {
        let (parts, body) = request.into_parts();

        let url = target.url("http", proxied_path, parts.uri.query());
        let uri: Uri = url.parse().map_err(|e| ProxyError::MalformedDashboardLink {
            link: url.clone(),
            reason: format!("{e}"),
        })?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        apply_forwarded_headers(&mut headers, ctx, peer);
        let host = HeaderValue::from_str(&target.authority()).map_err(|e| {
            ProxyError::MalformedDashboardLink {
                link: target.endpoint.to_string(),
                reason: format!("{e}"),
            }
        })?;
        headers.insert(HOST, host);

        let mut outbound = Request::new(body);
        *outbound.method_mut() = method;
        *outbound.uri_mut() = uri;
        *outbound.headers_mut() = headers;

        tracing::debug!(
            method = %outbound.method(),
            uri = %outbound.uri(),
            "Forwarding request to backend"
        );

        let response = with_deadline(
            self.response_timeout,
            &target.authority(),
            "request",
            self.client.request(outbound),
        )
        .await?;

        Ok(relay_response(response))
    }
}
