//! # Custom Resource Definitions
//!
//! CRD types for the Grafana operator, API group `grafana.integreatly.org/v1beta1`.
//!
//! ## Module Structure
//!
//! - `grafana.rs` - `Grafana` instances and the provisioning stages
//! - `dashboard.rs` - `GrafanaDashboard` artifacts
//! - `playlist.rs` - `GrafanaPlaylist` artifacts
//! - `plugins.rs` - Plugin requirements and their consolidation
//! - `selector.rs` - Label selectors and instance keys

mod dashboard;
mod grafana;
mod playlist;
mod plugins;
mod selector;

pub use dashboard::{
    DashboardFolder, DashboardInstanceStatus, GrafanaComDashboardReference, GrafanaDashboard,
    GrafanaDashboardSpec, GrafanaDashboardStatus,
};
pub use grafana::{
    AdminCredentialsRef, DeploymentConfig, EnvVarConfig, Grafana, GrafanaClientConfig,
    GrafanaSpec, GrafanaStatus, IngressConfig, OperatorStage, PersistentVolumeClaimConfig,
    ServiceAccountConfig, ServiceConfig, StageStatus,
};
pub use playlist::{
    GrafanaPlaylist, GrafanaPlaylistSpec, GrafanaPlaylistStatus, PlaylistDefinition,
    PlaylistInstanceStatus, PlaylistItem, PlaylistItemType,
};
pub use plugins::{GrafanaPlugin, PluginError, PluginList, PluginRequirement};
pub use selector::{InstanceKey, InstanceKeyError, InstanceSelector};

/// API group shared by every resource the operator serves
pub const API_GROUP: &str = "grafana.integreatly.org";
