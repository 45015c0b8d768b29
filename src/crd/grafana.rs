//! # Grafana
//!
//! A managed Grafana instance. The operator provisions the Kubernetes objects
//! an instance needs in a fixed sequence of stages and records progress in
//! status; artifacts are only pushed to instances whose last pass completed.

use std::collections::BTreeMap;
use std::fmt;

use kube::ResourceExt;
use serde::{Deserialize, Serialize};

use crate::crd::{InstanceKey, PluginList};

/// Grafana Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: grafana.integreatly.org/v1beta1
/// kind: Grafana
/// metadata:
///   name: grafana-a
///   namespace: monitoring
///   labels:
///     dashboards: grafana
/// spec:
///   config:
///     auth:
///       disable_login_form: "false"
///   ingress:
///     host: grafana.example.com
///   client:
///     preferIngress: true
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Grafana",
    group = "grafana.integreatly.org",
    version = "v1beta1",
    namespaced,
    status = "GrafanaStatus",
    shortname = "grafana",
    printcolumn = r#"{"name":"Stage", "type":"string", "jsonPath":".status.stage"}, {"name":"Stage status", "type":"string", "jsonPath":".status.stageStatus"}, {"name":"Admin URL", "type":"string", "jsonPath":".status.adminUrl"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaSpec {
    /// grafana.ini content: section name to key/value pairs
    #[serde(default)]
    pub config: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceConfig>,
    /// Expose the instance through an Ingress; skipped when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<IngressConfig>,
    /// Persist Grafana's data directory; an emptyDir is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<PersistentVolumeClaimConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<ServiceAccountConfig>,
    /// Existing secret with admin credentials; generated when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_credentials: Option<AdminCredentialsRef>,
    /// How the operator talks to this instance's HTTP API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<GrafanaClientConfig>,
    /// Admin URL used verbatim, for instances reachable by other means
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVarConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
pub struct EnvVarConfig {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Service type, `ClusterIP` when unset
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub service_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressConfig {
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    /// Requested storage, e.g. `10Gi`
    pub size: String,
    /// `ReadWriteOnce` when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccountConfig {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminCredentialsRef {
    /// Secret in the instance namespace; `<name>-admin-credentials` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaClientConfig {
    /// Request timeout in seconds; negative values are treated as zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<i64>,
    /// Talk to the instance through its ingress host instead of the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer_ingress: Option<bool>,
    /// Skip TLS verification (defaults to true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_skip_verify: Option<bool>,
}

/// Provisioning stages, in the order they run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum OperatorStage {
    #[serde(rename = "admin user")]
    AdminUser,
    #[serde(rename = "config")]
    Config,
    #[serde(rename = "pvc")]
    Pvc,
    #[serde(rename = "service account")]
    ServiceAccount,
    #[serde(rename = "service")]
    Service,
    #[serde(rename = "ingress")]
    Ingress,
    #[serde(rename = "plugins")]
    Plugins,
    #[serde(rename = "deployment")]
    Deployment,
    #[serde(rename = "complete")]
    Complete,
}

impl OperatorStage {
    pub const ORDERED: [OperatorStage; 9] = [
        OperatorStage::AdminUser,
        OperatorStage::Config,
        OperatorStage::Pvc,
        OperatorStage::ServiceAccount,
        OperatorStage::Service,
        OperatorStage::Ingress,
        OperatorStage::Plugins,
        OperatorStage::Deployment,
        OperatorStage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorStage::AdminUser => "admin user",
            OperatorStage::Config => "config",
            OperatorStage::Pvc => "pvc",
            OperatorStage::ServiceAccount => "service account",
            OperatorStage::Service => "service",
            OperatorStage::Ingress => "ingress",
            OperatorStage::Plugins => "plugins",
            OperatorStage::Deployment => "deployment",
            OperatorStage::Complete => "complete",
        }
    }

    /// Zero-based position in [`OperatorStage::ORDERED`]
    pub fn position(&self) -> usize {
        Self::ORDERED
            .iter()
            .position(|stage| stage == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for OperatorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum StageStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "in progress")]
    InProgress,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::InProgress => "in progress",
        })
    }
}

/// Status of a Grafana instance
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaStatus {
    /// Last stage the pipeline ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<OperatorStage>,
    /// Outcome of that stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_status: Option<StageStatus>,
    /// Error reported by the last failing stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    /// Base URL of the HTTP API, set once provisioning completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_url: Option<String>,
    /// Plugins requested by artifacts pushed to this instance
    #[serde(default, skip_serializing_if = "PluginList::is_empty")]
    pub plugins: PluginList,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Grafana {
    pub fn instance_key(&self) -> InstanceKey {
        InstanceKey::new(self.namespace().unwrap_or_default(), self.name_any())
    }

    pub fn admin_secret_name(&self) -> String {
        self.spec
            .admin_credentials
            .as_ref()
            .and_then(|c| c.secret_name.clone())
            .unwrap_or_else(|| format!("{}-admin-credentials", self.name_any()))
    }

    pub fn admin_user_key(&self) -> String {
        self.spec
            .admin_credentials
            .as_ref()
            .and_then(|c| c.user_key.clone())
            .unwrap_or_else(|| crate::constants::ADMIN_USER_KEY.to_string())
    }

    pub fn admin_password_key(&self) -> String {
        self.spec
            .admin_credentials
            .as_ref()
            .and_then(|c| c.password_key.clone())
            .unwrap_or_else(|| crate::constants::ADMIN_PASSWORD_KEY.to_string())
    }

    /// Whether the admin secret is provided by the user rather than generated
    pub fn has_external_admin_secret(&self) -> bool {
        self.spec
            .admin_credentials
            .as_ref()
            .is_some_and(|c| c.secret_name.is_some())
    }

    pub fn config_map_name(&self) -> String {
        format!("{}-ini", self.name_any())
    }

    pub fn pvc_name(&self) -> String {
        format!("{}-pvc", self.name_any())
    }

    pub fn service_account_name(&self) -> String {
        format!("{}-sa", self.name_any())
    }

    pub fn service_name(&self) -> String {
        format!("{}-service", self.name_any())
    }

    pub fn ingress_name(&self) -> String {
        format!("{}-ingress", self.name_any())
    }

    pub fn deployment_name(&self) -> String {
        format!("{}-deployment", self.name_any())
    }

    pub fn service_port(&self) -> i32 {
        self.spec
            .service
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(crate::constants::GRAFANA_HTTP_PORT)
    }

    pub fn prefer_ingress(&self) -> bool {
        self.spec
            .client
            .as_ref()
            .and_then(|c| c.prefer_ingress)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_and_wire_names() {
        let names: Vec<_> = OperatorStage::ORDERED.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "admin user",
                "config",
                "pvc",
                "service account",
                "service",
                "ingress",
                "plugins",
                "deployment",
                "complete"
            ]
        );
        for (index, stage) in OperatorStage::ORDERED.iter().enumerate() {
            assert_eq!(stage.position(), index);
            let json = serde_json::to_value(stage).unwrap();
            assert_eq!(json, serde_json::json!(stage.as_str()));
        }
    }

    #[test]
    fn test_stage_status_wire_names() {
        assert_eq!(
            serde_json::to_value(StageStatus::InProgress).unwrap(),
            serde_json::json!("in progress")
        );
        let parsed: StageStatus = serde_json::from_str(r#""failed""#).unwrap();
        assert_eq!(parsed, StageStatus::Failed);
    }

    #[test]
    fn test_admin_credentials_defaults() {
        let mut grafana = Grafana::new("grafana-a", GrafanaSpec::default());
        assert_eq!(grafana.admin_secret_name(), "grafana-a-admin-credentials");
        assert_eq!(grafana.admin_user_key(), "GF_SECURITY_ADMIN_USER");
        assert!(!grafana.has_external_admin_secret());

        grafana.spec.admin_credentials = Some(AdminCredentialsRef {
            secret_name: Some("shared-admin".to_string()),
            user_key: Some("user".to_string()),
            password_key: None,
        });
        assert_eq!(grafana.admin_secret_name(), "shared-admin");
        assert_eq!(grafana.admin_user_key(), "user");
        assert_eq!(grafana.admin_password_key(), "GF_SECURITY_ADMIN_PASSWORD");
        assert!(grafana.has_external_admin_secret());
    }

    #[test]
    fn test_status_omits_unset_fields() {
        let json = serde_json::to_value(GrafanaStatus::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }
}
