//! In-memory registry backed by the configuration file.
//!
//! The table is an immutable map behind an `ArcSwap`: lookups load a
//! snapshot without locking, config reloads swap the whole table at once.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::future::{self, FutureExt};

use crate::config::ClusterConfig;
use crate::registry::{ClusterRecord, ClusterRegistry, LookupFuture};

#[derive(Debug, Default)]
pub struct StaticRegistry {
    clusters: ArcSwap<HashMap<String, ClusterRecord>>,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from `[[clusters]]` entries.
    pub fn from_configs(configs: &[ClusterConfig]) -> Self {
        let registry = Self::new();
        registry.replace(configs);
        registry
    }

    /// Replace the whole table, e.g. after a config reload.
    pub fn replace(&self, configs: &[ClusterConfig]) {
        let table = configs
            .iter()
            .map(|c| {
                let record = ClusterRecord {
                    dashboard_link: c.dashboard_link.clone(),
                    name: c.name.clone(),
                    scheduler_address: None,
                };
                (c.id.clone(), record)
            })
            .collect::<HashMap<_, _>>();

        tracing::info!(clusters = table.len(), "Cluster table loaded");
        self.clusters.store(Arc::new(table));
    }

    /// Register or update one cluster.
    pub fn insert(&self, cluster_id: impl Into<String>, record: ClusterRecord) {
        let cluster_id = cluster_id.into();
        self.clusters.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(cluster_id.clone(), record.clone());
            next
        });
    }

    /// Forget a cluster. Returns whether it was known.
    pub fn remove(&self, cluster_id: &str) -> bool {
        let previous = self.clusters.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.remove(cluster_id);
            next
        });
        previous.contains_key(cluster_id)
    }

    pub fn len(&self) -> usize {
        self.clusters.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClusterRegistry for StaticRegistry {
    fn get_cluster<'a>(&'a self, cluster_id: &'a str) -> LookupFuture<'a> {
        let record = self.clusters.load().get(cluster_id).cloned();
        future::ready(Ok(record)).boxed()
    }
}
