//! grafana.com dashboard catalog
//!
//! Resolves published dashboards (`/api/dashboards/{id}/revisions`) and
//! downloads dashboard models from arbitrary URLs. Shares one HTTP client
//! for the life of the process.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{decode, execute, DashboardCatalog, GrafanaApiError};

#[derive(Debug, Clone)]
pub struct GrafanaComCatalog {
    http_client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct RevisionList {
    #[serde(default)]
    items: Vec<RevisionEntry>,
}

#[derive(Debug, Deserialize)]
struct RevisionEntry {
    revision: i64,
}

impl GrafanaComCatalog {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GrafanaApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GrafanaApiError::Client)?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn revisions_url(&self, id: i64) -> String {
        format!("{}/{}/revisions", self.base_url, id)
    }

    pub fn download_url(&self, id: i64, revision: i64) -> String {
        format!("{}/{}/revisions/{}/download", self.base_url, id, revision)
    }
}

#[async_trait]
impl DashboardCatalog for GrafanaComCatalog {
    async fn latest_revision(&self, id: i64) -> Result<i64, GrafanaApiError> {
        let url = self.revisions_url(id);
        let response = execute("catalog_revisions", self.http_client.get(&url), &url).await?;
        let list: RevisionList = decode(response, &url).await?;
        let latest = list
            .items
            .iter()
            .map(|entry| entry.revision)
            .max()
            .ok_or_else(|| GrafanaApiError::Unexpected {
                url: url.clone(),
                reason: format!("dashboard {id} has no published revisions"),
            })?;
        debug!(dashboard.id = id, revision = latest, "Resolved latest catalog revision");
        Ok(latest)
    }

    async fn download(&self, id: i64, revision: i64) -> Result<Value, GrafanaApiError> {
        self.fetch_json(&self.download_url(id, revision)).await
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, GrafanaApiError> {
        let response = execute("fetch_dashboard", self.http_client.get(url), url).await?;
        decode(response, url).await
    }
}
