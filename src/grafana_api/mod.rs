//! # Grafana API
//!
//! Capability traits for everything the reconcilers do against Grafana and
//! the grafana.com dashboard catalog, plus their HTTP implementations.
//!
//! - `rest.rs` - [`GrafanaRestClient`], one per instance and reconcile call
//! - `catalog.rs` - [`GrafanaComCatalog`] for grafana.com and plain URL downloads
//! - `factory.rs` - [`GrafanaClientFactory`], resolves credentials, timeout and TLS policy
//!
//! No call retries internally; failures surface as [`GrafanaApiError`] carrying
//! the URL and status so the reconcilers can decide what to do.

mod catalog;
mod factory;
mod rest;

pub use catalog::GrafanaComCatalog;
pub use factory::{
    client_timeout, read_admin_credentials, ClientSetupError, GrafanaClientFactory,
    KubeClientFactory,
};
pub use rest::{AdminCredentials, GrafanaRestClient};

use std::time::Instant;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::crd::DashboardFolder;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum GrafanaApiError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}: {body}")]
    Http {
        url: String,
        status: u16,
        body: String,
    },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url}: {reason}")]
    Unexpected { url: String, reason: String },
}

impl GrafanaApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GrafanaApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// A folder as Grafana reports it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemoteFolder {
    pub id: i64,
    pub uid: String,
    pub title: String,
}

/// Identity and version of a dashboard after a write
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DashboardRef {
    #[serde(default)]
    pub id: i64,
    pub uid: String,
    #[serde(default)]
    pub version: i64,
}

/// Body of a dashboard write; always overwrites an existing dashboard with the same UID
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardUpsert {
    pub model: Value,
    pub folder_id: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemotePlaylist {
    #[serde(default)]
    pub uid: String,
    pub name: String,
    pub interval: String,
    #[serde(default)]
    pub items: Vec<RemotePlaylistItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RemotePlaylistItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub value: String,
    #[serde(default)]
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Operations the reconcilers perform against one Grafana instance
#[async_trait]
pub trait GrafanaApi: Send + Sync {
    /// Find the folder by UID when one is given, otherwise by title; create it if absent
    async fn ensure_folder(&self, folder: &DashboardFolder) -> Result<RemoteFolder, GrafanaApiError>;

    /// Current version of a dashboard, `None` when it does not exist
    async fn dashboard_version(&self, uid: &str) -> Result<Option<i64>, GrafanaApiError>;

    async fn upsert_dashboard(&self, request: &DashboardUpsert) -> Result<DashboardRef, GrafanaApiError>;

    /// Deleting a dashboard that does not exist succeeds
    async fn delete_dashboard(&self, uid: &str) -> Result<(), GrafanaApiError>;

    async fn playlist(&self, uid: &str) -> Result<Option<RemotePlaylist>, GrafanaApiError>;

    async fn create_playlist(&self, playlist: &RemotePlaylist) -> Result<RemotePlaylist, GrafanaApiError>;

    async fn update_playlist(&self, playlist: &RemotePlaylist) -> Result<(), GrafanaApiError>;

    /// Deleting a playlist that does not exist succeeds
    async fn delete_playlist(&self, uid: &str) -> Result<(), GrafanaApiError>;
}

/// Where dashboard models come from when they are not inline
#[async_trait]
pub trait DashboardCatalog: Send + Sync {
    /// Highest published revision of a grafana.com dashboard
    async fn latest_revision(&self, id: i64) -> Result<i64, GrafanaApiError>;

    async fn download(&self, id: i64, revision: i64) -> Result<Value, GrafanaApiError>;

    async fn fetch_json(&self, url: &str) -> Result<Value, GrafanaApiError>;
}

/// Send a request, recording metrics, and turn non-2xx answers into errors
pub(crate) async fn execute(
    operation: &'static str,
    request: RequestBuilder,
    url: &str,
) -> Result<Response, GrafanaApiError> {
    let start = Instant::now();
    metrics::increment_grafana_api_requests(operation);

    let result = match request.send().await {
        Ok(response) if response.status().is_success() => Ok(response),
        Ok(response) => {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(GrafanaApiError::Http {
                url: url.to_string(),
                status,
                body,
            })
        }
        Err(source) => Err(GrafanaApiError::Transport {
            url: url.to_string(),
            source,
        }),
    };

    metrics::observe_grafana_api_duration(operation, start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        if !e.is_not_found() {
            metrics::increment_grafana_api_errors(operation);
        }
    }
    result
}

pub(crate) async fn decode<T: DeserializeOwned>(
    response: Response,
    url: &str,
) -> Result<T, GrafanaApiError> {
    response
        .json::<T>()
        .await
        .map_err(|source| GrafanaApiError::Decode {
            url: url.to_string(),
            source,
        })
}
