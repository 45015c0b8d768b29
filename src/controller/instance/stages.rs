//! Stage handlers for the standard pipeline

use std::sync::Arc;

use async_trait::async_trait;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::hash::sha256_hex;
use crate::controller::instance::ini::{render_ini, with_defaults};
use crate::controller::instance::pipeline::{
    ReconcileVars, StageError, StageHandler, StageOutcome,
};
use crate::controller::instance::resources;
use crate::controller::store::ClusterResources;
use crate::crd::{Grafana, GrafanaStatus};
use crate::grafana_api::read_admin_credentials;

fn generate_password() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Creates the generated admin secret once, or checks a referenced one
pub struct AdminUserStage {
    cluster: Arc<dyn ClusterResources>,
}

impl AdminUserStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for AdminUserStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        let namespace = instance.namespace().unwrap_or_default();
        let secret_name = instance.admin_secret_name();
        let existing = self.cluster.get_secret(&namespace, &secret_name).await?;

        if instance.has_external_admin_secret() {
            let Some(secret) = existing else {
                return Ok(StageOutcome::failed(format!(
                    "admin secret {namespace}/{secret_name} not found"
                )));
            };
            return Ok(match read_admin_credentials(instance, &secret) {
                Ok(_) => StageOutcome::success(),
                Err(e) => StageOutcome::failed(e.to_string()),
            });
        }

        if existing.is_some() {
            return Ok(StageOutcome::success());
        }

        info!(
            instance = %instance.instance_key(),
            secret = %secret_name,
            "Creating admin credentials"
        );
        self.cluster
            .apply_secret(resources::admin_secret(instance, &generate_password()))
            .await?;
        Ok(StageOutcome::success())
    }
}

pub struct ConfigStage {
    cluster: Arc<dyn ClusterResources>,
}

impl ConfigStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for ConfigStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        let ini = render_ini(&with_defaults(&instance.spec.config));
        vars.config_hash = sha256_hex(ini.as_bytes());
        debug!(instance = %instance.instance_key(), hash = %vars.config_hash, "Rendered grafana.ini");
        self.cluster
            .apply_config_map(resources::config_map(instance, &ini))
            .await?;
        Ok(StageOutcome::success())
    }
}

pub struct PvcStage {
    cluster: Arc<dyn ClusterResources>,
}

impl PvcStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for PvcStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        if let Some(config) = &instance.spec.persistent_volume_claim {
            self.cluster
                .apply_persistent_volume_claim(resources::persistent_volume_claim(instance, config))
                .await?;
        }
        Ok(StageOutcome::success())
    }
}

pub struct ServiceAccountStage {
    cluster: Arc<dyn ClusterResources>,
}

impl ServiceAccountStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for ServiceAccountStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        self.cluster
            .apply_service_account(resources::service_account(instance))
            .await?;
        Ok(StageOutcome::success())
    }
}

pub struct ServiceStage {
    cluster: Arc<dyn ClusterResources>,
}

impl ServiceStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for ServiceStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        self.cluster.apply_service(resources::service(instance)).await?;
        Ok(StageOutcome::success())
    }
}

pub struct IngressStage {
    cluster: Arc<dyn ClusterResources>,
}

impl IngressStage {
    pub fn new(cluster: Arc<dyn ClusterResources>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl StageHandler for IngressStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        if let Some(config) = &instance.spec.ingress {
            self.cluster
                .apply_ingress(resources::ingress(instance, config))
                .await?;
        }
        Ok(StageOutcome::success())
    }
}

/// Turns the plugin inventory recorded by artifact reconcilers into the install list
pub struct PluginsStage;

#[async_trait]
impl StageHandler for PluginsStage {
    async fn run(
        &self,
        _instance: &Grafana,
        status: &mut GrafanaStatus,
        vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        vars.plugins = status.plugins.install_string()?;
        Ok(StageOutcome::success())
    }
}

pub struct DeploymentStage {
    cluster: Arc<dyn ClusterResources>,
    default_image: String,
}

impl DeploymentStage {
    pub fn new(cluster: Arc<dyn ClusterResources>, default_image: String) -> Self {
        Self {
            cluster,
            default_image,
        }
    }
}

#[async_trait]
impl StageHandler for DeploymentStage {
    async fn run(
        &self,
        instance: &Grafana,
        _status: &mut GrafanaStatus,
        vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        let applied = self
            .cluster
            .apply_deployment(resources::deployment(instance, vars, &self.default_image))
            .await?;

        let available = applied
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        if available < 1 {
            return Ok(StageOutcome::in_progress(format!(
                "waiting for deployment {} to have an available replica",
                instance.deployment_name()
            )));
        }
        Ok(StageOutcome::success())
    }
}

/// Publishes the admin URL; instances are only ready after this ran
pub struct CompleteStage;

#[async_trait]
impl StageHandler for CompleteStage {
    async fn run(
        &self,
        instance: &Grafana,
        status: &mut GrafanaStatus,
        _vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError> {
        status.admin_url = Some(resources::admin_url(instance));
        Ok(StageOutcome::success())
    }
}
