//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect duplicate cluster identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{ProxyConfig, RegistryKind};

/// A single semantic problem found in a configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid address for {field}: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("route_prefix must start with '/' and must not end with '/': {0}")]
    InvalidPrefix(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("remote registry requires registry.url")]
    MissingRegistryUrl,

    #[error("invalid registry.url {0}")]
    InvalidRegistryUrl(String),

    #[error("cluster entry {index} has an empty {field}")]
    EmptyClusterField { index: usize, field: &'static str },

    #[error("duplicate cluster id: {0}")]
    DuplicateCluster(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    let prefix = &config.listener.route_prefix;
    if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }

    for (field, value) in [
        ("timeouts.connect_secs", config.timeouts.connect_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("timeouts.handshake_secs", config.timeouts.handshake_secs),
        ("registry.timeout_secs", config.registry.timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroTimeout(field));
        }
    }

    if config.registry.kind == RegistryKind::Remote {
        match &config.registry.url {
            None => errors.push(ValidationError::MissingRegistryUrl),
            Some(url) if url::Url::parse(url).is_err() => {
                errors.push(ValidationError::InvalidRegistryUrl(url.clone()))
            }
            Some(_) => {}
        }
    }

    let mut seen = HashSet::new();
    for (index, cluster) in config.clusters.iter().enumerate() {
        if cluster.id.trim().is_empty() {
            errors.push(ValidationError::EmptyClusterField { index, field: "id" });
        } else if !seen.insert(cluster.id.as_str()) {
            errors.push(ValidationError::DuplicateCluster(cluster.id.clone()));
        }
        if cluster.dashboard_link.trim().is_empty() {
            errors.push(ValidationError::EmptyClusterField {
                index,
                field: "dashboard_link",
            });
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ClusterConfig;

    fn cluster(id: &str, link: &str) -> ClusterConfig {
        ClusterConfig {
            id: id.to_string(),
            name: None,
            dashboard_link: link.to_string(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.route_prefix = "dashboards/".to_string();
        config.timeouts.connect_secs = 0;
        config.registry.kind = RegistryKind::Remote;
        config.clusters.push(cluster("a", "http://localhost:8787/status"));
        config.clusters.push(cluster("a", ""));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidPrefix("dashboards/".into())));
        assert!(errors.contains(&ValidationError::ZeroTimeout("timeouts.connect_secs")));
        assert!(errors.contains(&ValidationError::MissingRegistryUrl));
        assert!(errors.contains(&ValidationError::DuplicateCluster("a".into())));
        assert!(errors.contains(&ValidationError::EmptyClusterField {
            index: 1,
            field: "dashboard_link"
        }));
    }

    #[test]
    fn root_prefix_is_allowed() {
        let mut config = ProxyConfig::default();
        config.listener.route_prefix = "/".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
