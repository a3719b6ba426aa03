//! Registry that asks a cluster manager's REST API.
//!
//! `GET {base_url}/{cluster_id}`:
//! - `200` with a JSON record → found
//! - `404` → unknown cluster
//! - anything else → `RegistryError`

use std::time::Duration;

use futures_util::future::FutureExt;
use reqwest::StatusCode;
use url::Url;

use crate::registry::{ClusterRecord, ClusterRegistry, LookupFuture, RegistryError};

#[derive(Debug, Clone)]
pub struct RemoteRegistry {
    client: reqwest::Client,
    base_url: Url,
}

impl RemoteRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RegistryError> {
        let base_url =
            Url::parse(base_url).map_err(|e| RegistryError::Transport(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::Transport(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// URL of one cluster's record. The identifier is percent-encoded as a
    /// single path segment.
    fn record_url(&self, cluster_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(cluster_id);
        }
        url
    }

    async fn fetch(&self, cluster_id: &str) -> Result<Option<ClusterRecord>, RegistryError> {
        let url = self.record_url(cluster_id);
        tracing::debug!(cluster_id = %cluster_id, url = %url, "Querying cluster manager");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<ClusterRecord>()
                .await
                .map(Some)
                .map_err(|e| RegistryError::Decode(e.to_string())),
            status => Err(RegistryError::Status(status.as_u16())),
        }
    }
}

impl ClusterRegistry for RemoteRegistry {
    fn get_cluster<'a>(&'a self, cluster_id: &'a str) -> LookupFuture<'a> {
        self.fetch(cluster_id).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::Path,
        http::StatusCode as AxumStatus,
        response::{IntoResponse, Response},
        routing::get,
        Json, Router,
    };
    use serde_json::json;

    async fn cluster_record(Path(id): Path<String>) -> Response {
        match id.as_str() {
            "known" => Json(json!({
                "id": "known",
                "name": "Local cluster",
                "scheduler_address": "tcp://127.0.0.1:8786",
                "dashboard_link": "http://127.0.0.1:8787/status",
                "workers": 4
            }))
            .into_response(),
            "with space" => Json(json!({ "dashboard_link": "/proxy/8787/status" })).into_response(),
            "broken" => (AxumStatus::OK, "not json").into_response(),
            "crash" => (AxumStatus::INTERNAL_SERVER_ERROR, "boom").into_response(),
            _ => (AxumStatus::NOT_FOUND, "no such cluster").into_response(),
        }
    }

    async fn spawn_manager() -> String {
        let app = Router::new().route("/clusters/{id}", get(cluster_record));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}/clusters/")
    }

    #[tokio::test]
    async fn fetches_known_cluster() {
        let registry = RemoteRegistry::new(&spawn_manager().await, Duration::from_secs(5)).unwrap();

        let record = registry.get_cluster("known").await.unwrap().unwrap();
        assert_eq!(record.dashboard_link, "http://127.0.0.1:8787/status");
        assert_eq!(record.name.as_deref(), Some("Local cluster"));
        assert_eq!(record.scheduler_address.as_deref(), Some("tcp://127.0.0.1:8786"));
    }

    #[tokio::test]
    async fn encodes_identifier_as_one_segment() {
        let registry = RemoteRegistry::new(&spawn_manager().await, Duration::from_secs(5)).unwrap();
        assert!(registry.record_url("with space").as_str().ends_with("/clusters/with%20space"));

        let record = registry.get_cluster("with space").await.unwrap().unwrap();
        assert_eq!(record.dashboard_link, "/proxy/8787/status");
    }

    #[tokio::test]
    async fn maps_manager_answers() {
        let registry = RemoteRegistry::new(&spawn_manager().await, Duration::from_secs(5)).unwrap();

        assert!(registry.get_cluster("missing").await.unwrap().is_none());
        assert!(matches!(
            registry.get_cluster("broken").await,
            Err(RegistryError::Decode(_))
        ));
        assert!(matches!(
            registry.get_cluster("crash").await,
            Err(RegistryError::Status(500))
        ));
    }

    #[tokio::test]
    async fn unreachable_manager_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let registry =
            RemoteRegistry::new(&format!("http://{addr}/clusters"), Duration::from_secs(2)).unwrap();
        assert!(matches!(
            registry.get_cluster("any").await,
            Err(RegistryError::Transport(_))
        ));
    }
}
