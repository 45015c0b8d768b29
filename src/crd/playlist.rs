//! # GrafanaPlaylist
//!
//! A playlist pushed to every ready instance matching its selector. The
//! remote UID is the Kubernetes object's UID, identical on every instance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crd::{GrafanaPlugin, InstanceKey, InstanceSelector};

/// GrafanaPlaylist Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: grafana.integreatly.org/v1beta1
/// kind: GrafanaPlaylist
/// metadata:
///   name: wallboard
/// spec:
///   instanceSelector:
///     matchLabels:
///       dashboards: grafana
///   playlist:
///     name: Wallboard
///     interval: 5m
///     items:
///       - type: dashboard_by_tag
///         value: wallboard
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "GrafanaPlaylist",
    group = "grafana.integreatly.org",
    version = "v1beta1",
    namespaced,
    status = "GrafanaPlaylistStatus",
    shortname = "gplaylist",
    printcolumn = r#"{"name":"Message", "type":"string", "jsonPath":".status.lastMessage"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaPlaylistSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist: Option<PlaylistDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_selector: Option<InstanceSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<GrafanaPlugin>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PlaylistDefinition {
    pub name: String,
    /// Time each item is shown, e.g. `5m`
    pub interval: String,
    #[serde(default)]
    pub items: Vec<PlaylistItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PlaylistItem {
    #[serde(rename = "type")]
    pub item_type: PlaylistItemType,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistItemType {
    DashboardByUid,
    DashboardByTag,
    DashboardById,
}

impl PlaylistItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaylistItemType::DashboardByUid => "dashboard_by_uid",
            PlaylistItemType::DashboardByTag => "dashboard_by_tag",
            PlaylistItemType::DashboardById => "dashboard_by_id",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct PlaylistInstanceStatus {
    pub uid: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaPlaylistStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(with = "BTreeMap<String, PlaylistInstanceStatus>")]
    pub instances: BTreeMap<InstanceKey, PlaylistInstanceStatus>,
}
