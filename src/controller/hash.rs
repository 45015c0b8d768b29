//! # Change Detection
//!
//! Artifacts are fingerprinted over their content-bearing fields only, so
//! metadata churn (labels, annotations, resourceVersion) and status writes
//! never look like a content change.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::crd::{
    DashboardFolder, GrafanaComDashboardReference, GrafanaDashboard, GrafanaPlaylist,
    GrafanaPlugin, PlaylistDefinition,
};

/// Lowercase hex SHA-256 of the canonical JSON encoding of `content`
pub fn fingerprint<T: Serialize + ?Sized>(content: &T) -> String {
    sha256_hex(&serde_json::to_vec(content).unwrap_or_default())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub trait Fingerprint {
    /// Fingerprint of the current desired content
    fn fingerprint(&self) -> String;

    /// Fingerprint recorded in status by the last pass
    fn recorded_fingerprint(&self) -> Option<&str>;

    fn unchanged(&self) -> bool {
        self.recorded_fingerprint() == Some(self.fingerprint().as_str())
    }
}

#[derive(Serialize)]
struct DashboardContent<'a> {
    json: Option<&'a str>,
    gzip_json: Option<&'a str>,
    url: Option<&'a str>,
    grafana_com: Option<&'a GrafanaComDashboardReference>,
    folder: Option<&'a DashboardFolder>,
    plugins: &'a [GrafanaPlugin],
}

/// Fingerprint of a dashboard as written to an instance: the spec fingerprint
/// together with the model its source resolved to, so a new catalog revision
/// or changed content behind a URL counts as a change.
pub fn resolved_fingerprint(spec_fingerprint: &str, model: &Value) -> String {
    fingerprint(&(spec_fingerprint, model))
}

impl Fingerprint for GrafanaDashboard {
    fn fingerprint(&self) -> String {
        fingerprint(&DashboardContent {
            json: self.spec.json.as_deref(),
            gzip_json: self.spec.gzip_json.as_deref(),
            url: self.spec.url.as_deref(),
            grafana_com: self.spec.grafana_com.as_ref(),
            folder: self.spec.folder.as_ref(),
            plugins: &self.spec.plugins,
        })
    }

    fn recorded_fingerprint(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.hash.as_deref())
    }
}

#[derive(Serialize)]
struct PlaylistContent<'a> {
    playlist: Option<&'a PlaylistDefinition>,
    plugins: &'a [GrafanaPlugin],
}

impl Fingerprint for GrafanaPlaylist {
    fn fingerprint(&self) -> String {
        fingerprint(&PlaylistContent {
            playlist: self.spec.playlist.as_ref(),
            plugins: &self.spec.plugins,
        })
    }

    fn recorded_fingerprint(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.hash.as_deref())
    }
}
