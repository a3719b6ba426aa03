//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the cluster registry the configuration asks for
//! - Keep the static cluster table in sync with the config file
//! - Bind the listener, start metrics, run the server until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::RecommendedWatcher;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::watcher::ConfigWatcher;
use crate::config::{ProxyConfig, RegistryKind};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{ClusterRegistry, RegistryError, RemoteRegistry, StaticRegistry};

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("registry setup failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("remote registry requires registry.url")]
    MissingRegistryUrl,

    #[error("invalid {field} '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("metrics setup failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("config watcher failed: {0}")]
    Watcher(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The registry serving lookups, plus the static table when there is one.
pub struct RegistryHandle {
    pub registry: Arc<dyn ClusterRegistry>,
    pub static_table: Option<Arc<StaticRegistry>>,
}

/// Build the registry selected by `[registry] kind`.
pub fn build_registry(config: &ProxyConfig) -> Result<RegistryHandle, StartupError> {
    match config.registry.kind {
        RegistryKind::Static => {
            let table = Arc::new(StaticRegistry::from_configs(&config.clusters));
            tracing::info!(clusters = table.len(), "Using static cluster registry");
            Ok(RegistryHandle {
                registry: table.clone(),
                static_table: Some(table),
            })
        }
        RegistryKind::Remote => {
            let url = config
                .registry
                .url
                .as_deref()
                .ok_or(StartupError::MissingRegistryUrl)?;
            let remote =
                RemoteRegistry::new(url, Duration::from_secs(config.registry.timeout_secs))?;
            tracing::info!(url = %url, "Using remote cluster registry");
            Ok(RegistryHandle {
                registry: Arc::new(remote),
                static_table: None,
            })
        }
    }
}

/// Apply every reloaded `[[clusters]]` table to `table` until shutdown.
///
/// The returned watcher must be kept alive for updates to keep flowing.
pub fn spawn_cluster_reload(
    path: &Path,
    table: Arc<StaticRegistry>,
    shutdown: Shutdown,
) -> Result<RecommendedWatcher, StartupError> {
    let (watcher, mut updates) = ConfigWatcher::new(path);
    let watcher = watcher.run()?;

    tokio::spawn(async move {
        let mut stop = shutdown.subscribe();
        loop {
            tokio::select! {
                update = updates.recv() => match update {
                    Some(config) => table.replace(&config.clusters),
                    None => break,
                },
                _ = stop.recv() => break,
            }
        }
    });

    Ok(watcher)
}

fn parse_address(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

/// Run the proxy until `shutdown` fires.
///
/// `config_path` enables hot reload of the static cluster table.
pub async fn run(
    config: ProxyConfig,
    config_path: Option<&Path>,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let addr = parse_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
        )?;
        metrics::init_metrics(addr)?;
    }

    let handle = build_registry(&config)?;

    let _watcher = match (config_path, handle.static_table) {
        (Some(path), Some(table)) => Some(spawn_cluster_reload(path, table, shutdown.clone())?),
        _ => None,
    };

    let bind = parse_address("listener.bind_address", &config.listener.bind_address)?;
    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(config, handle.registry, shutdown);
    server.run(listener).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterConfig, RegistryConfig};

    #[tokio::test]
    async fn static_registry_serves_configured_clusters() {
        let config = ProxyConfig {
            clusters: vec![ClusterConfig {
                id: "abc".into(),
                name: None,
                dashboard_link: "http://10.0.0.5:8787/status".into(),
            }],
            ..ProxyConfig::default()
        };

        let handle = build_registry(&config).unwrap();
        assert!(handle.static_table.is_some());
        let record = handle.registry.get_cluster("abc").await.unwrap().unwrap();
        assert_eq!(record.dashboard_link, "http://10.0.0.5:8787/status");
    }

    #[test]
    fn remote_registry_needs_url() {
        let config = ProxyConfig {
            registry: RegistryConfig {
                kind: RegistryKind::Remote,
                ..RegistryConfig::default()
            },
            ..ProxyConfig::default()
        };
        assert!(matches!(
            build_registry(&config),
            Err(StartupError::MissingRegistryUrl)
        ));
    }

    #[test]
    fn remote_registry_from_url() {
        let config = ProxyConfig {
            registry: RegistryConfig {
                kind: RegistryKind::Remote,
                url: Some("http://manager.internal/api/clusters".into()),
                timeout_secs: 2,
            },
            ..ProxyConfig::default()
        };
        let handle = build_registry(&config).unwrap();
        assert!(handle.static_table.is_none());
    }
}
