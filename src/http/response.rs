//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Hand backend responses to the client without buffering
//!
//! # Design Decisions
//! - Streaming responses avoid buffering entire body
//! - Backend error statuses are relayed as-is; only proxy failures map to 404/502

use axum::{
    body::Body,
    http::{
        header::{
            CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
            UPGRADE,
        },
        HeaderMap, HeaderName,
    },
    response::Response,
};

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

/// Turn a backend response into the client response, streaming the body.
pub fn relay_response<B>(response: hyper::Response<B>) -> Response
where
    B: hyper::body::Body<Data = axum::body::Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn removes_standard_and_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, X-Session-Hint"));
        headers.insert(KEEP_ALIVE, HeaderValue::from_static("timeout=5"));
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert("x-session-hint", HeaderValue::from_static("1"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("x-request-id", HeaderValue::from_static("abc"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 2);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-request-id"], "abc");
    }

    #[tokio::test]
    async fn relayed_response_keeps_status_and_body() {
        let backend = hyper::Response::builder()
            .status(418)
            .header("content-type", "text/plain")
            .header(CONNECTION, "close")
            .body(Body::from("short and stout"))
            .unwrap();

        let response = relay_response(backend);
        assert_eq!(response.status(), 418);
        assert!(response.headers().get(CONNECTION).is_none());

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"short and stout");
    }
}
