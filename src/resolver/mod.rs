//! Address resolution subsystem.
//!
//! # Data Flow
//! ```text
//! cluster id + RequestContext
//!     → registry lookup (fresh on every request)
//!     → normalize.rs (absolute URL, `/status` stripped)
//!     → parse, pick host and port per ResolverConfig
//!     → ProxyTarget
//! ```
//!
//! # Design Decisions
//! - Registry injected at construction, shared via Arc
//! - Port is the explicit port of the link; otherwise the PortPolicy default
//! - Relative links name the serving host itself, so they dial loopback;
//!   the inbound Host header only shapes the normalized URL

pub mod normalize;

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, Uri};

use crate::config::{HostPolicy, PortPolicy, ResolverConfig};
use crate::error::ProxyError;
use crate::registry::ClusterRegistry;

pub use normalize::{normalize_dashboard_link, url_path_join};

/// Host dialed for dashboards served next to the proxy.
pub const LOOPBACK_HOST: &str = "localhost";

/// Scheme and host of the inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub scheme: String,
    pub host: Option<String>,
}

impl RequestContext {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: Some(host.into()),
        }
    }

    /// Derive the context from inbound headers and URI.
    ///
    /// `X-Forwarded-Proto` and `X-Forwarded-Host` win over the values seen on
    /// this hop, since the proxy normally sits behind the serving host.
    pub fn from_request(headers: &HeaderMap, uri: &Uri) -> Self {
        let scheme = first_value(headers, "x-forwarded-proto")
            .map(str::to_ascii_lowercase)
            .filter(|s| s == "http" || s == "https")
            .or_else(|| uri.scheme_str().map(str::to_ascii_lowercase))
            .unwrap_or_else(|| "http".to_string());

        let host = first_value(headers, "x-forwarded-host")
            .or_else(|| first_value(headers, "host"))
            .map(str::to_string)
            .or_else(|| uri.authority().map(|a| a.to_string()));

        Self { scheme, host }
    }
}

fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// An absolute dashboard URL with the default page stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEndpoint(String);

impl NormalizedEndpoint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NormalizedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where the proxy connects for one resolved cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub endpoint: NormalizedEndpoint,
    pub host: String,
    pub port: u16,
    /// Path of the endpoint without a trailing slash, empty for a root dashboard.
    pub base_path: String,
}

impl ProxyTarget {
    /// `host:port` used for dialing and as the outbound `Host` header.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Backend path and query for a proxied path such as `/individual-plots.json`.
    pub fn path_and_query(&self, proxied_path: &str, query: Option<&str>) -> String {
        let mut path = format!("{}{}", self.base_path, proxied_path);
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            path.push('?');
            path.push_str(query);
        }
        path
    }

    /// Backend URL using `scheme` (`http` or `ws`).
    pub fn url(&self, scheme: &str, proxied_path: &str, query: Option<&str>) -> String {
        format!(
            "{}://{}{}",
            scheme,
            self.authority(),
            self.path_and_query(proxied_path, query)
        )
    }
}

impl fmt::Display for ProxyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.authority(), self.base_path)
    }
}

/// Resolves cluster identifiers to backend targets.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<dyn ClusterRegistry>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(registry: Arc<dyn ClusterRegistry>, config: ResolverConfig) -> Self {
        Self { registry, config }
    }

    /// Look up `cluster_id` and turn its dashboard link into a target.
    pub async fn resolve(
        &self,
        cluster_id: &str,
        ctx: &RequestContext,
    ) -> Result<ProxyTarget, ProxyError> {
        let record = self
            .registry
            .get_cluster(cluster_id)
            .await
            .map_err(|e| ProxyError::RegistryUnavailable(e.to_string()))?
            .ok_or_else(|| ProxyError::ClusterNotFound(cluster_id.to_string()))?;

        let target = self.target_for_link(&record.dashboard_link, ctx)?;

        tracing::debug!(
            cluster_id = %cluster_id,
            dashboard_link = %record.dashboard_link,
            endpoint = %target.endpoint,
            target = %target,
            "Cluster resolved"
        );
        Ok(target)
    }

    /// Normalize a dashboard link and extract the connection target.
    pub fn target_for_link(
        &self,
        dashboard_link: &str,
        ctx: &RequestContext,
    ) -> Result<ProxyTarget, ProxyError> {
        let relative = !normalize::is_absolute_link(dashboard_link);
        let endpoint = normalize_dashboard_link(dashboard_link, ctx)?;

        let malformed = |reason: String| ProxyError::MalformedDashboardLink {
            link: endpoint.clone(),
            reason,
        };

        let uri: Uri = endpoint.parse().map_err(|e| malformed(format!("{e}")))?;
        let scheme = uri
            .scheme_str()
            .map(str::to_ascii_lowercase)
            .ok_or_else(|| malformed("missing scheme".to_string()))?;
        let link_host = uri
            .host()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| malformed("missing host".to_string()))?;

        let explicit_port = uri
            .authority()
            .map(|authority| explicit_port(authority.as_str(), link_host))
            .transpose()
            .map_err(malformed)?
            .flatten();

        let port = match (explicit_port, self.config.port_policy) {
            (Some(port), _) => port,
            (None, PortPolicy::Fixed443) => 443,
            (None, PortPolicy::Scheme) if scheme == "http" => 80,
            (None, PortPolicy::Scheme) => 443,
        };

        let host = match self.config.host_policy {
            HostPolicy::Link if !relative => link_host.to_string(),
            _ => LOOPBACK_HOST.to_string(),
        };

        let base_path = uri.path().trim_end_matches('/').to_string();

        Ok(ProxyTarget {
            endpoint: NormalizedEndpoint(endpoint),
            host,
            port,
            base_path,
        })
    }
}

/// Port written in `authority`, if any. An empty or out-of-range port is an
/// error rather than a missing one.
fn explicit_port(authority: &str, host: &str) -> Result<Option<u16>, String> {
    let host_and_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host_and_port)| host_and_port);
    let rest = host_and_port.get(host.len()..).unwrap_or_default();

    match rest.strip_prefix(':') {
        None => Ok(None),
        Some(port) => port
            .parse::<u16>()
            .map(Some)
            .map_err(|_| format!("invalid port '{port}'")),
    }
}
