//! # Stage Pipeline
//!
//! An instance is provisioned by running an ordered list of stage handlers.
//! The list is plain data (`Vec<StageDescriptor>`), built once at startup
//! and shared by every reconcile.
//!
//! A pass runs handlers in order while they succeed. The first handler that
//! reports `failed` or `in progress` ends the pass; its stage, outcome and
//! message are what the instance status shows until the next pass.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::OperatorConfig;
use crate::controller::instance::stages;
use crate::controller::store::{ClusterResources, StoreError};
use crate::crd::{Grafana, GrafanaStatus, OperatorStage, PluginError, StageStatus};

/// Values handed from earlier stages to later ones within one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileVars {
    /// SHA-256 of the rendered grafana.ini
    pub config_hash: String,
    /// `GF_INSTALL_PLUGINS` value
    pub plugins: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub message: Option<String>,
}

impl StageOutcome {
    pub fn success() -> Self {
        Self {
            status: StageStatus::Success,
            message: None,
        }
    }

    pub fn in_progress(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::InProgress,
            message: Some(message.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Plugins(#[from] PluginError),
}

/// One provisioning step
///
/// Handlers must be idempotent: every pass re-applies the full desired state.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(
        &self,
        instance: &Grafana,
        status: &mut GrafanaStatus,
        vars: &mut ReconcileVars,
    ) -> Result<StageOutcome, StageError>;
}

pub struct StageDescriptor {
    pub stage: OperatorStage,
    pub handler: Box<dyn StageHandler>,
}

impl StageDescriptor {
    pub fn new(stage: OperatorStage, handler: impl StageHandler + 'static) -> Self {
        Self {
            stage,
            handler: Box::new(handler),
        }
    }
}

impl fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// What one pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    /// Every stage ran and the last one was `complete`
    pub completed: bool,
    /// Stages that ran, in order, with their outcome
    pub ran: Vec<(OperatorStage, StageStatus)>,
}

pub struct StagePipeline {
    stages: Vec<StageDescriptor>,
}

impl fmt::Debug for StagePipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.stages.iter().map(|s| s.stage))
            .finish()
    }
}

impl StagePipeline {
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        Self { stages }
    }

    /// The production sequence, applying objects through `cluster`
    pub fn standard(cluster: Arc<dyn ClusterResources>, config: &OperatorConfig) -> Self {
        Self::new(vec![
            StageDescriptor::new(
                OperatorStage::AdminUser,
                stages::AdminUserStage::new(cluster.clone()),
            ),
            StageDescriptor::new(OperatorStage::Config, stages::ConfigStage::new(cluster.clone())),
            StageDescriptor::new(OperatorStage::Pvc, stages::PvcStage::new(cluster.clone())),
            StageDescriptor::new(
                OperatorStage::ServiceAccount,
                stages::ServiceAccountStage::new(cluster.clone()),
            ),
            StageDescriptor::new(OperatorStage::Service, stages::ServiceStage::new(cluster.clone())),
            StageDescriptor::new(OperatorStage::Ingress, stages::IngressStage::new(cluster.clone())),
            StageDescriptor::new(OperatorStage::Plugins, stages::PluginsStage),
            StageDescriptor::new(
                OperatorStage::Deployment,
                stages::DeploymentStage::new(cluster, config.grafana_image.clone()),
            ),
            StageDescriptor::new(OperatorStage::Complete, stages::CompleteStage),
        ])
    }

    pub fn stages(&self) -> impl Iterator<Item = OperatorStage> + '_ {
        self.stages.iter().map(|descriptor| descriptor.stage)
    }

    /// Run one pass, recording progress into `status`
    pub async fn run(&self, instance: &Grafana, status: &mut GrafanaStatus) -> PipelineReport {
        let mut vars = ReconcileVars::default();
        let mut ran = Vec::with_capacity(self.stages.len());

        for descriptor in &self.stages {
            let outcome = match descriptor.handler.run(instance, status, &mut vars).await {
                Ok(outcome) => outcome,
                Err(e) => StageOutcome::failed(e.to_string()),
            };

            status.stage = Some(descriptor.stage);
            status.stage_status = Some(outcome.status);
            status.last_message = outcome.message.clone();
            ran.push((descriptor.stage, outcome.status));

            match outcome.status {
                StageStatus::Success => {
                    debug!(
                        instance = %instance.instance_key(),
                        stage = %descriptor.stage,
                        "Stage succeeded"
                    );
                }
                StageStatus::InProgress => {
                    debug!(
                        instance = %instance.instance_key(),
                        stage = %descriptor.stage,
                        message = outcome.message.as_deref().unwrap_or_default(),
                        "Stage in progress"
                    );
                    return PipelineReport {
                        completed: false,
                        ran,
                    };
                }
                StageStatus::Failed => {
                    warn!(
                        instance = %instance.instance_key(),
                        stage = %descriptor.stage,
                        error = outcome.message.as_deref().unwrap_or_default(),
                        "Stage failed"
                    );
                    return PipelineReport {
                        completed: false,
                        ran,
                    };
                }
            }
        }

        PipelineReport {
            completed: status.stage == Some(OperatorStage::Complete),
            ran,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::GrafanaSpec;
    use std::sync::Mutex;

    struct Recording {
        log: Arc<Mutex<Vec<OperatorStage>>>,
        stage: OperatorStage,
        outcome: StageOutcome,
    }

    #[async_trait]
    impl StageHandler for Recording {
        async fn run(
            &self,
            _instance: &Grafana,
            _status: &mut GrafanaStatus,
            _vars: &mut ReconcileVars,
        ) -> Result<StageOutcome, StageError> {
            self.log.lock().unwrap().push(self.stage);
            Ok(self.outcome.clone())
        }
    }

    fn pipeline(
        log: &Arc<Mutex<Vec<OperatorStage>>>,
        outcomes: &[(OperatorStage, StageOutcome)],
    ) -> StagePipeline {
        StagePipeline::new(
            outcomes
                .iter()
                .map(|(stage, outcome)| {
                    StageDescriptor::new(
                        *stage,
                        Recording {
                            log: log.clone(),
                            stage: *stage,
                            outcome: outcome.clone(),
                        },
                    )
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_stops_at_first_unsuccessful_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(
            &log,
            &[
                (OperatorStage::AdminUser, StageOutcome::success()),
                (OperatorStage::Config, StageOutcome::failed("bad ini")),
                (OperatorStage::Pvc, StageOutcome::success()),
            ],
        );
        let instance = Grafana::new("g", GrafanaSpec::default());
        let mut status = GrafanaStatus::default();

        let report = pipeline.run(&instance, &mut status).await;

        assert!(!report.completed);
        assert_eq!(
            *log.lock().unwrap(),
            vec![OperatorStage::AdminUser, OperatorStage::Config]
        );
        assert_eq!(status.stage, Some(OperatorStage::Config));
        assert_eq!(status.stage_status, Some(StageStatus::Failed));
        assert_eq!(status.last_message.as_deref(), Some("bad ini"));
    }

    #[tokio::test]
    async fn test_success_clears_previous_message() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline(
            &log,
            &[
                (OperatorStage::AdminUser, StageOutcome::success()),
                (OperatorStage::Complete, StageOutcome::success()),
            ],
        );
        let instance = Grafana::new("g", GrafanaSpec::default());
        let mut status = GrafanaStatus {
            last_message: Some("old failure".to_string()),
            ..Default::default()
        };

        let report = pipeline.run(&instance, &mut status).await;

        assert!(report.completed);
        assert_eq!(status.stage, Some(OperatorStage::Complete));
        assert_eq!(status.last_message, None);
    }

    #[test]
    fn test_standard_order() {
        struct NoCluster;
        #[async_trait]
        impl ClusterResources for NoCluster {
            async fn get_secret(
                &self,
                _: &str,
                _: &str,
            ) -> Result<Option<k8s_openapi::api::core::v1::Secret>, StoreError> {
                Ok(None)
            }
            async fn apply_secret(
                &self,
                s: k8s_openapi::api::core::v1::Secret,
            ) -> Result<k8s_openapi::api::core::v1::Secret, StoreError> {
                Ok(s)
            }
            async fn apply_config_map(
                &self,
                c: k8s_openapi::api::core::v1::ConfigMap,
            ) -> Result<k8s_openapi::api::core::v1::ConfigMap, StoreError> {
                Ok(c)
            }
            async fn apply_persistent_volume_claim(
                &self,
                c: k8s_openapi::api::core::v1::PersistentVolumeClaim,
            ) -> Result<k8s_openapi::api::core::v1::PersistentVolumeClaim, StoreError> {
                Ok(c)
            }
            async fn apply_service_account(
                &self,
                a: k8s_openapi::api::core::v1::ServiceAccount,
            ) -> Result<k8s_openapi::api::core::v1::ServiceAccount, StoreError> {
                Ok(a)
            }
            async fn apply_service(
                &self,
                s: k8s_openapi::api::core::v1::Service,
            ) -> Result<k8s_openapi::api::core::v1::Service, StoreError> {
                Ok(s)
            }
            async fn apply_ingress(
                &self,
                i: k8s_openapi::api::networking::v1::Ingress,
            ) -> Result<k8s_openapi::api::networking::v1::Ingress, StoreError> {
                Ok(i)
            }
            async fn apply_deployment(
                &self,
                d: k8s_openapi::api::apps::v1::Deployment,
            ) -> Result<k8s_openapi::api::apps::v1::Deployment, StoreError> {
                Ok(d)
            }
        }

        let pipeline = StagePipeline::standard(Arc::new(NoCluster), &OperatorConfig::default());
        let order: Vec<_> = pipeline.stages().collect();
        assert_eq!(order, OperatorStage::ORDERED.to_vec());
    }
}
