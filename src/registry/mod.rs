//! Cluster registry subsystem.
//!
//! # Data Flow
//! ```text
//! cluster id
//!     → ClusterRegistry::get_cluster
//!         → memory.rs (table from config, swapped on reload)
//!         → remote.rs (cluster manager REST API)
//!     → Some(ClusterRecord) | None | RegistryError
//! ```
//!
//! # Design Decisions
//! - The registry is injected into the resolver, never a global
//! - Lookups are fresh per request; backends come and go with clusters
//! - Implementations must tolerate concurrent readers

pub mod memory;
pub mod remote;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::StaticRegistry;
pub use remote::RemoteRegistry;

/// What a registry knows about one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClusterRecord {
    /// Dashboard link, absolute or relative to the serving host.
    pub dashboard_link: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub scheduler_address: Option<String>,
}

impl ClusterRecord {
    pub fn new(dashboard_link: impl Into<String>) -> Self {
        Self {
            dashboard_link: dashboard_link.into(),
            name: None,
            scheduler_address: None,
        }
    }
}

/// Failure of the lookup service itself (as opposed to "no such cluster").
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry request failed: {0}")]
    Transport(String),

    #[error("registry answered with status {0}")]
    Status(u16),

    #[error("registry returned an unreadable record: {0}")]
    Decode(String),
}

pub type LookupFuture<'a> = BoxFuture<'a, Result<Option<ClusterRecord>, RegistryError>>;

/// Lookup service mapping cluster identifiers to their records.
pub trait ClusterRegistry: Send + Sync + 'static {
    fn get_cluster<'a>(&'a self, cluster_id: &'a str) -> LookupFuture<'a>;
}
