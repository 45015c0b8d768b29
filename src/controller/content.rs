//! # Dashboard Content
//!
//! Turns a dashboard's source field into the JSON model pushed to Grafana.
//! Resolution happens at most once per reconcile call; the caller reuses the
//! model for every instance.

use std::io::Read;

use base64::{engine::general_purpose, Engine as _};
use flate2::read::GzDecoder;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::crd::GrafanaDashboardSpec;
use crate::grafana_api::{DashboardCatalog, GrafanaApiError};

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("dashboard json is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("gzipJson is not valid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),
    #[error("gzipJson could not be decompressed: {0}")]
    InvalidGzip(#[source] std::io::Error),
    #[error("dashboard model must be a JSON object")]
    NotAnObject,
    #[error("failed to fetch dashboard: {0}")]
    Fetch(#[from] GrafanaApiError),
}

impl ContentError {
    /// Errors that will not go away until the resource is edited
    pub fn is_invalid(&self) -> bool {
        !matches!(self, ContentError::Fetch(_))
    }
}

/// Resolve the dashboard model; `None` when no source is set.
///
/// Sources are tried in the order `json`, `gzipJson`, `url`, `grafanaCom`.
/// A grafana.com reference without a revision uses the latest published one.
pub async fn resolve_dashboard_content(
    spec: &GrafanaDashboardSpec,
    catalog: &dyn DashboardCatalog,
) -> Result<Option<Value>, ContentError> {
    let non_empty = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let model = if let Some(json) = non_empty(&spec.json) {
        serde_json::from_str(&json).map_err(ContentError::InvalidJson)?
    } else if let Some(encoded) = non_empty(&spec.gzip_json) {
        decode_gzip_json(&encoded)?
    } else if let Some(url) = non_empty(&spec.url) {
        debug!(url = %url, "Fetching dashboard from URL");
        catalog.fetch_json(&url).await?
    } else if let Some(reference) = &spec.grafana_com {
        let revision = match reference.revision {
            Some(revision) => revision,
            None => catalog.latest_revision(reference.id).await?,
        };
        debug!(dashboard.id = reference.id, revision, "Downloading dashboard from grafana.com");
        catalog.download(reference.id, revision).await?
    } else {
        return Ok(None);
    };

    if !model.is_object() {
        return Err(ContentError::NotAnObject);
    }
    Ok(Some(model))
}

/// base64 → gzip → JSON
pub fn decode_gzip_json(encoded: &str) -> Result<Value, ContentError> {
    let compressed = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(ContentError::InvalidBase64)?;
    let mut json = String::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_string(&mut json)
        .map_err(ContentError::InvalidGzip)?;
    serde_json::from_str(&json).map_err(ContentError::InvalidJson)
}
