//! # Instance Selection
//!
//! Resolves an artifact's selector to instances and decides which of them
//! may receive writes. Callers do the readiness split themselves so that
//! matching-but-not-ready instances can be logged and counted as pending.

use crate::controller::store::{ResourceStore, StoreError};
use crate::crd::{Grafana, InstanceSelector, OperatorStage, StageStatus};

/// Every instance whose labels satisfy the selector; empty is not an error
pub async fn select_instances(
    store: &dyn ResourceStore,
    selector: &InstanceSelector,
) -> Result<Vec<Grafana>, StoreError> {
    let instances = store.list_instances(selector).await?;
    Ok(instances
        .into_iter()
        .filter(|instance| selector.matches(instance.metadata.labels.as_ref()))
        .collect())
}

/// Provisioning finished successfully and the API endpoint is known
pub fn is_ready(instance: &Grafana) -> bool {
    instance.status.as_ref().is_some_and(|status| {
        status.admin_url.as_deref().is_some_and(|url| !url.is_empty())
            && status.stage == Some(OperatorStage::Complete)
            && status.stage_status == Some(StageStatus::Success)
    })
}

/// Split into (ready, not ready)
pub fn partition_ready(instances: Vec<Grafana>) -> (Vec<Grafana>, Vec<Grafana>) {
    instances.into_iter().partition(is_ready)
}
