//! # Instance Reconciler
//!
//! Drives a `Grafana` resource through the [`StagePipeline`] and persists the
//! outcome in its status. Owned objects carry owner references, so deletion
//! needs no cleanup here.

pub mod ini;
mod pipeline;
pub mod resources;
pub mod stages;

pub use pipeline::{
    PipelineReport, ReconcileVars, StageDescriptor, StageError, StageHandler, StageOutcome,
    StagePipeline,
};

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info, info_span, Instrument};

use crate::controller::types::{cancellable, Context, ReconcilerError};
use crate::crd::{Grafana, InstanceKey, OperatorStage};
use crate::observability::metrics;

const CONTROLLER: &str = "grafana";

pub async fn reconcile(instance: Arc<Grafana>, ctx: Arc<Context>) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.grafana.reconcile",
        resource.name = %instance.name_any(),
        resource.namespace = %instance.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(CONTROLLER);

    let result = cancellable(&ctx.shutdown, reconcile_instance(&instance, &ctx))
        .instrument(span)
        .await;

    metrics::observe_reconciliation_duration(CONTROLLER, start.elapsed().as_secs_f64());
    result
}

/// Drop per-instance metric series of an instance that is going away
pub fn forget_instance(key: &InstanceKey) {
    if metrics::remove_instance_stage(&key.to_string()) {
        debug!(instance = %key, "Removed instance stage series");
    }
}

async fn reconcile_instance(instance: &Grafana, ctx: &Context) -> Result<Action, ReconcilerError> {
    if instance.metadata.deletion_timestamp.is_some() {
        debug!("Instance is being deleted, owned objects are garbage collected");
        forget_instance(&instance.instance_key());
        return Ok(Action::await_change());
    }

    let previous = instance.status.clone().unwrap_or_default();
    let mut status = previous.clone();
    let report = ctx.pipeline.run(instance, &mut status).await;
    status.observed_generation = instance.metadata.generation;

    if status != previous {
        ctx.store.update_instance_status(instance, &status).await?;
        if report.completed && previous.stage != Some(OperatorStage::Complete) {
            info!(
                admin_url = status.admin_url.as_deref().unwrap_or_default(),
                "Instance provisioned"
            );
        }
    }

    if let Some(stage) = status.stage {
        metrics::set_instance_stage(&instance.instance_key().to_string(), stage.position());
    }

    Ok(if report.completed {
        Action::requeue(ctx.config.poll_again())
    } else {
        Action::requeue(ctx.config.retry_soon())
    })
}
