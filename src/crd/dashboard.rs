//! # GrafanaDashboard
//!
//! A dashboard pushed to every ready instance matching its selector.

use std::collections::BTreeMap;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::crd::{GrafanaPlugin, InstanceKey, InstanceSelector};

/// GrafanaDashboard Custom Resource Definition
///
/// Exactly one content source should be set: `json`, `gzipJson`, `url` or `grafanaCom`.
///
/// # Example
///
/// ```yaml
/// apiVersion: grafana.integreatly.org/v1beta1
/// kind: GrafanaDashboard
/// metadata:
///   name: node-exporter
///   namespace: monitoring
/// spec:
///   instanceSelector:
///     matchLabels:
///       dashboards: grafana
///   folder:
///     name: Infrastructure
///   grafanaCom:
///     id: 1860
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GrafanaDashboard",
    group = "grafana.integreatly.org",
    version = "v1beta1",
    namespaced,
    status = "GrafanaDashboardStatus",
    shortname = "gdashboard",
    printcolumn = r#"{"name":"Hash", "type":"string", "jsonPath":".status.hash", "priority": 1}, {"name":"Message", "type":"string", "jsonPath":".status.lastMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDashboardSpec {
    /// Inline dashboard model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<String>,
    /// Base64 of the gzip-compressed dashboard model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip_json: Option<String>,
    /// URL serving the dashboard model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Dashboard published on grafana.com
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grafana_com: Option<GrafanaComDashboardReference>,
    /// Target folder; named after the dashboard's namespace when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<DashboardFolder>,
    /// Instances to push to; nothing is pushed without a selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_selector: Option<InstanceSelector>,
    /// Plugins the dashboard needs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<GrafanaPlugin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct GrafanaComDashboardReference {
    pub id: i64,
    /// Latest published revision when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct DashboardFolder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Looked up before the name when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// What was last written to one instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardInstanceStatus {
    pub uid: String,
    pub version: i64,
    pub folder_id: i64,
    /// Fingerprint of the spec and resolved model that was written
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDashboardStatus {
    /// Fingerprint of the spec and resolved model as of the last complete pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Keyed by `namespace/name` of the instance
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(with = "BTreeMap<String, DashboardInstanceStatus>")]
    pub instances: BTreeMap<InstanceKey, DashboardInstanceStatus>,
}

impl GrafanaDashboard {
    /// Folder the dashboard belongs in, with the namespace as default title
    pub fn folder_target(&self) -> DashboardFolder {
        let folder = self.spec.folder.clone().unwrap_or_default();
        DashboardFolder {
            name: folder
                .name
                .filter(|name| !name.trim().is_empty())
                .or_else(|| self.namespace()),
            uid: folder.uid.filter(|uid| !uid.trim().is_empty()),
        }
    }

    pub fn has_source(&self) -> bool {
        let set = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        set(&self.spec.json)
            || set(&self.spec.gzip_json)
            || set(&self.spec.url)
            || self.spec.grafana_com.is_some()
    }
}
