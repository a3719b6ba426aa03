//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the dashboard proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, route prefix).
    pub listener: ListenerConfig,

    /// Address resolution policies.
    pub resolver: ResolverConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Where cluster records come from.
    pub registry: RegistryConfig,

    /// Clusters served by the static registry.
    pub clusters: Vec<ClusterConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Path prefix the `{cluster_id}/{path}` route is mounted under.
    pub route_prefix: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            route_prefix: "/dask/dashboard".to_string(),
        }
    }
}

/// Which host the proxy dials for a resolved dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HostPolicy {
    /// Host taken from absolute links; relative links dial loopback.
    #[default]
    Link,
    /// Always dial loopback.
    Loopback,
}

/// Port used when the dashboard link carries none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum PortPolicy {
    /// 443 regardless of scheme.
    #[default]
    #[serde(rename = "fixed-443")]
    Fixed443,
    /// 80 for http, 443 for https.
    Scheme,
}

/// Address resolution configuration.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ResolverConfig {
    pub host_policy: HostPolicy,
    pub port_policy: PortPolicy,
}

/// Timeout configuration for backend operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// TCP connect timeout to the backend in seconds.
    pub connect_secs: u64,

    /// Time allowed until backend response headers arrive, in seconds.
    pub request_secs: u64,

    /// Backend WebSocket handshake timeout in seconds.
    pub handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            handshake_secs: 10,
        }
    }
}

/// Registry backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryKind {
    /// Clusters listed in this file under `[[clusters]]`.
    #[default]
    Static,
    /// Clusters fetched from a cluster manager's REST API.
    Remote,
}

/// Registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub kind: RegistryKind,

    /// Base URL of the cluster manager API (remote registry only).
    pub url: Option<String>,

    /// Lookup timeout in seconds (remote registry only).
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: RegistryKind::Static,
            url: None,
            timeout_secs: 5,
        }
    }
}

/// A statically configured cluster.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Identifier used in the proxy route.
    pub id: String,

    /// Human readable name.
    #[serde(default)]
    pub name: Option<String>,

    /// Dashboard link, absolute or relative to the serving host.
    pub dashboard_link: String,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_filter: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_filter: "dashboard_proxy=info,tower_http=info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.listener.route_prefix, "/dask/dashboard");
        assert_eq!(config.resolver.host_policy, HostPolicy::Link);
        assert_eq!(config.resolver.port_policy, PortPolicy::Fixed443);
        assert_eq!(config.registry.kind, RegistryKind::Static);
        assert_eq!(config.timeouts.connect_secs, 5);
        assert!(config.clusters.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let doc = r#"
            [listener]
            bind_address = "127.0.0.1:8888"
            route_prefix = "/proxy"

            [resolver]
            host_policy = "loopback"
            port_policy = "scheme"

            [registry]
            kind = "remote"
            url = "http://localhost:8888/dask/clusters"

            [observability]
            log_format = "json"

            [[clusters]]
            id = "local"
            dashboard_link = "http://localhost:8787/status"
        "#;
        let config: ProxyConfig = toml::from_str(doc).unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:8888");
        assert_eq!(config.resolver.host_policy, HostPolicy::Loopback);
        assert_eq!(config.resolver.port_policy, PortPolicy::Scheme);
        assert_eq!(config.registry.kind, RegistryKind::Remote);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.clusters.len(), 1);
        assert_eq!(config.clusters[0].name, None);
    }
}
