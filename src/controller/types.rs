//! # Types
//!
//! Shared context and error type for the three reconcilers.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::OperatorConfig;
use crate::controller::content::ContentError;
use crate::controller::instance::StagePipeline;
use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::PluginError;
use crate::grafana_api::{ClientSetupError, DashboardCatalog, GrafanaApiError, GrafanaClientFactory};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("grafana api error: {0}")]
    Remote(#[from] GrafanaApiError),
    #[error("cannot build client: {0}")]
    Credentials(#[from] ClientSetupError),
    /// Desired state that cannot succeed until the resource is edited
    #[error("invalid desired state: {0}")]
    Invalid(String),
    #[error("reconcile cancelled by shutdown")]
    Cancelled,
}

impl ReconcilerError {
    pub fn is_invalid(&self) -> bool {
        matches!(self, ReconcilerError::Invalid(_))
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Store(e) if e.is_conflict() => "conflict",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::Remote(_) => "remote",
            ReconcilerError::Credentials(_) => "credentials",
            ReconcilerError::Invalid(_) => "invalid",
            ReconcilerError::Cancelled => "cancelled",
        }
    }
}

impl From<PluginError> for ReconcilerError {
    fn from(error: PluginError) -> Self {
        ReconcilerError::Invalid(error.to_string())
    }
}

impl From<ContentError> for ReconcilerError {
    fn from(error: ContentError) -> Self {
        match error {
            ContentError::Fetch(remote) => ReconcilerError::Remote(remote),
            other => ReconcilerError::Invalid(other.to_string()),
        }
    }
}

/// Everything a reconcile call needs, built once at startup
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn ResourceStore>,
    pub clients: Arc<dyn GrafanaClientFactory>,
    pub catalog: Arc<dyn DashboardCatalog>,
    pub pipeline: Arc<StagePipeline>,
    pub config: OperatorConfig,
    /// Cancelled on SIGINT/SIGTERM; in-flight reconciles stop at their next await
    pub shutdown: CancellationToken,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Race a reconcile against shutdown
pub async fn cancellable<T, F>(token: &CancellationToken, work: F) -> Result<T, ReconcilerError>
where
    F: Future<Output = Result<T, ReconcilerError>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(ReconcilerError::Cancelled),
        result = work => result,
    }
}
