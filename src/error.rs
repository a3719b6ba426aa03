//! Error taxonomy for the dashboard proxy.
//!
//! # Propagation
//! ```text
//! registry lookup / link normalization
//!     → ProxyError (ClusterNotFound, MalformedDashboardLink, RegistryUnavailable, MissingHost)
//!     → HTTP status before any byte reaches the client
//!
//! backend dial / handshake
//!     → ProxyError::BackendUnreachable → 502
//!
//! established relay
//!     → ProxyError::RelayInterrupted → logged, stream terminated
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Errors surfaced while resolving and forwarding a dashboard request.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The registry has no record for the cluster identifier.
    #[error("cluster {0} not found")]
    ClusterNotFound(String),

    /// The registry's dashboard link cannot be turned into a backend address.
    #[error("malformed dashboard link '{link}': {reason}")]
    MalformedDashboardLink { link: String, reason: String },

    /// The registry itself could not answer.
    #[error("cluster registry unavailable: {0}")]
    RegistryUnavailable(String),

    /// A relative dashboard link needs the request host, and there is none.
    #[error("request carries no host to resolve a relative dashboard link against")]
    MissingHost,

    /// Connect or handshake with the resolved backend failed or timed out.
    #[error("backend {target} unreachable: {reason}")]
    BackendUnreachable { target: String, reason: String },

    /// An established relay broke mid-stream.
    #[error("relay interrupted: {0}")]
    RelayInterrupted(String),
}

impl ProxyError {
    /// HTTP status the error maps to when nothing has been sent yet.
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ClusterNotFound(_) => StatusCode::NOT_FOUND,
            ProxyError::MissingHost => StatusCode::BAD_REQUEST,
            ProxyError::MalformedDashboardLink { .. }
            | ProxyError::RegistryUnavailable(_)
            | ProxyError::BackendUnreachable { .. }
            | ProxyError::RelayInterrupted(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::ClusterNotFound(_) => "cluster_not_found",
            ProxyError::MalformedDashboardLink { .. } => "malformed_link",
            ProxyError::RegistryUnavailable(_) => "registry_unavailable",
            ProxyError::MissingHost => "missing_host",
            ProxyError::BackendUnreachable { .. } => "backend_unreachable",
            ProxyError::RelayInterrupted(_) => "relay_interrupted",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
