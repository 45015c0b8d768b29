//! # Dashboard Reconciler
//!
//! Pushes a `GrafanaDashboard` to every ready instance its selector matches
//! and records what was written per instance, so that unchanged dashboards
//! are not rewritten and deletion knows where to clean up.
//!
//! Per pass:
//! 1. A deleted dashboard is removed from every recorded instance along with
//!    its plugin requirements; the finalizer goes once no recorded instance
//!    is left.
//! 2. The finalizer is added.
//! 3. For each ready instance, sequentially: record the dashboard's plugins
//!    on the instance (replacing what it recorded before), ensure the folder,
//!    resolve the model (once per pass), then upsert unless the recorded
//!    hash, folder and remote version all still match. The hash covers the
//!    resolved model, so a newly published catalog revision or edited URL
//!    content is pushed like a spec change.
//!
//! Failures are isolated per instance; the pass is incomplete when any
//! instance failed or was not ready, and is retried soon.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::constants::{DASHBOARD_FINALIZER, DASHBOARD_UPDATE_MESSAGE};
use crate::controller::content::{resolve_dashboard_content, ContentError};
use crate::controller::finalizer::{has_finalizer, with_finalizer, without_finalizer};
use crate::controller::hash::{resolved_fingerprint, Fingerprint};
use crate::controller::plugins::{reconcile_plugins, release_plugins, requirement_source};
use crate::controller::selector::{is_ready, partition_ready, select_instances};
use crate::controller::types::{cancellable, Context, ReconcilerError};
use crate::crd::{DashboardInstanceStatus, Grafana, GrafanaDashboard, GrafanaDashboardStatus};
use crate::grafana_api::{DashboardCatalog, DashboardUpsert};
use crate::observability::metrics;

const CONTROLLER: &str = "dashboard";

pub async fn reconcile(
    dashboard: Arc<GrafanaDashboard>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.dashboard.reconcile",
        resource.name = %dashboard.name_any(),
        resource.namespace = %dashboard.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(CONTROLLER);

    let result = cancellable(&ctx.shutdown, reconcile_dashboard(&dashboard, &ctx))
        .instrument(span)
        .await;

    metrics::observe_reconciliation_duration(CONTROLLER, start.elapsed().as_secs_f64());
    result
}

/// Model a dashboard's source resolved to, with its write fingerprint
struct ResolvedModel {
    model: Value,
    hash: String,
}

/// Dashboard model, resolved on first use and shared by every instance of a pass
enum LazyContent {
    Unresolved,
    Resolved(Option<ResolvedModel>),
    Failed(ContentError),
}

impl LazyContent {
    async fn get(
        &mut self,
        dashboard: &GrafanaDashboard,
        spec_hash: &str,
        catalog: &dyn DashboardCatalog,
    ) -> Result<Option<&ResolvedModel>, ReconcilerError> {
        if matches!(self, LazyContent::Unresolved) {
            *self = match resolve_dashboard_content(&dashboard.spec, catalog).await {
                Ok(model) => LazyContent::Resolved(model.map(|model| ResolvedModel {
                    hash: resolved_fingerprint(spec_hash, &model),
                    model,
                })),
                Err(e) => LazyContent::Failed(e),
            };
        }
        match self {
            LazyContent::Resolved(resolved) => Ok(resolved.as_ref()),
            LazyContent::Failed(e) => Err(ReconcilerError::Invalid(e.to_string())),
            LazyContent::Unresolved => Ok(None),
        }
    }

    fn hash(&self) -> Option<&str> {
        match self {
            LazyContent::Resolved(Some(resolved)) => Some(&resolved.hash),
            _ => None,
        }
    }

    fn failure(&self) -> Option<&ContentError> {
        match self {
            LazyContent::Failed(e) => Some(e),
            _ => None,
        }
    }
}

enum InstanceSync {
    Written(DashboardInstanceStatus),
    Unchanged,
    NoSource,
}

async fn reconcile_dashboard(
    dashboard: &GrafanaDashboard,
    ctx: &Context,
) -> Result<Action, ReconcilerError> {
    if dashboard.metadata.deletion_timestamp.is_some() {
        return finalize(dashboard, ctx).await;
    }

    let mut current = dashboard.clone();
    if !has_finalizer(&current.metadata, DASHBOARD_FINALIZER) {
        let finalizers = with_finalizer(&current.metadata, DASHBOARD_FINALIZER);
        current = ctx
            .store
            .update_dashboard_finalizers(&current, finalizers)
            .await?;
    }

    let Some(selector) = current.spec.instance_selector.clone() else {
        debug!("No instance selector, nothing to push");
        return Ok(Action::await_change());
    };

    let (ready, not_ready) = partition_ready(select_instances(ctx.store.as_ref(), &selector).await?);
    for instance in &not_ready {
        debug!(instance = %instance.instance_key(), "Matching instance not ready yet");
    }
    if ready.is_empty() {
        info!(
            not_ready = not_ready.len(),
            "No ready instances match, retrying later"
        );
        return Ok(Action::requeue(ctx.config.retry_soon()));
    }

    let spec_hash = current.fingerprint();
    let mut status = current.status.clone().unwrap_or_default();
    let mut content = LazyContent::Unresolved;
    let mut failures: Vec<String> = Vec::new();
    let mut only_invalid_failures = true;
    let mut missing_source = false;

    for instance in &ready {
        let key = instance.instance_key();
        match sync_instance(ctx, &current, &status, instance, &spec_hash, &mut content).await {
            Ok(InstanceSync::Written(entry)) => {
                info!(instance = %key, uid = %entry.uid, version = entry.version, "Dashboard written");
                status.instances.insert(key, entry);
                current = ctx.store.update_dashboard_status(&current, &status).await?;
            }
            Ok(InstanceSync::Unchanged) => {
                debug!(instance = %key, "Dashboard unchanged");
            }
            Ok(InstanceSync::NoSource) => {
                warn!("Dashboard has no content source, skipping");
                missing_source = true;
                break;
            }
            Err(e) => {
                if content.failure().is_some() {
                    break;
                }
                warn!(instance = %key, error = %e, "Failed to push dashboard");
                metrics::increment_artifact_instance_failures(CONTROLLER);
                only_invalid_failures &= e.is_invalid();
                failures.push(format!("{key}: {e}"));
            }
        }
    }

    let mut next = status.clone();
    let action = if let Some(error) = content.failure() {
        warn!(error = %error, "Cannot resolve dashboard content");
        next.last_message = Some(error.to_string());
        if error.is_invalid() {
            Action::requeue(ctx.config.poll_again())
        } else {
            Action::requeue(ctx.config.retry_soon())
        }
    } else if missing_source {
        next.last_message = Some("dashboard has no content source".to_string());
        Action::requeue(ctx.config.poll_again())
    } else if !failures.is_empty() {
        next.last_message = Some(failures.join("; "));
        if only_invalid_failures && not_ready.is_empty() {
            Action::requeue(ctx.config.poll_again())
        } else {
            Action::requeue(ctx.config.retry_soon())
        }
    } else {
        if let Some(hash) = content.hash() {
            next.hash = Some(hash.to_string());
        }
        next.last_message = None;
        if not_ready.is_empty() {
            Action::requeue(ctx.config.poll_again())
        } else {
            Action::requeue(ctx.config.retry_soon())
        }
    };

    if current.status.clone().unwrap_or_default() != next {
        ctx.store.update_dashboard_status(&current, &next).await?;
    }
    Ok(action)
}

/// UID the dashboard has on every instance: the recorded one, else the
/// model's own, else the Kubernetes UID
fn dashboard_uid(
    recorded: Option<&DashboardInstanceStatus>,
    model: &Value,
    dashboard: &GrafanaDashboard,
) -> String {
    recorded
        .map(|entry| entry.uid.clone())
        .filter(|uid| !uid.is_empty())
        .or_else(|| {
            model
                .get("uid")
                .and_then(Value::as_str)
                .filter(|uid| !uid.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| dashboard.uid().unwrap_or_default())
}

async fn sync_instance(
    ctx: &Context,
    dashboard: &GrafanaDashboard,
    status: &GrafanaDashboardStatus,
    instance: &Grafana,
    spec_hash: &str,
    content: &mut LazyContent,
) -> Result<InstanceSync, ReconcilerError> {
    let instance = reconcile_plugins(
        ctx.store.as_ref(),
        instance,
        &requirement_source(dashboard),
        &dashboard.spec.plugins,
    )
    .await?;
    let api = ctx.clients.client_for(&instance).await?;
    let folder = api.ensure_folder(&dashboard.folder_target()).await?;

    let Some(ResolvedModel { model, hash }) = content
        .get(dashboard, spec_hash, ctx.catalog.as_ref())
        .await?
    else {
        return Ok(InstanceSync::NoSource);
    };

    let recorded = status.instances.get(&instance.instance_key());
    let uid = dashboard_uid(recorded, model, dashboard);

    if let Some(entry) = recorded {
        if entry.hash == *hash && entry.folder_id == folder.id && entry.uid == uid {
            let remote_version = api.dashboard_version(&uid).await?;
            if remote_version == Some(entry.version) {
                return Ok(InstanceSync::Unchanged);
            }
            debug!(
                uid = %uid,
                recorded = entry.version,
                remote = ?remote_version,
                "Remote dashboard drifted"
            );
        }
    }

    let mut model = model.clone();
    if let Some(object) = model.as_object_mut() {
        object.remove("id");
        object.insert("uid".to_string(), json!(uid));
    }
    let written = api
        .upsert_dashboard(&DashboardUpsert {
            model,
            folder_id: folder.id,
            message: format!(
                "{DASHBOARD_UPDATE_MESSAGE}{}",
                dashboard.resource_version().unwrap_or_default()
            ),
        })
        .await?;

    Ok(InstanceSync::Written(DashboardInstanceStatus {
        uid: written.uid,
        version: written.version,
        folder_id: folder.id,
        hash: hash.clone(),
    }))
}

async fn finalize(dashboard: &GrafanaDashboard, ctx: &Context) -> Result<Action, ReconcilerError> {
    if !has_finalizer(&dashboard.metadata, DASHBOARD_FINALIZER) {
        return Ok(Action::await_change());
    }

    let mut current = dashboard.clone();
    let mut status = current.status.clone().unwrap_or_default();
    let recorded: Vec<_> = status
        .instances
        .iter()
        .map(|(key, entry)| (key.clone(), entry.uid.clone()))
        .collect();
    let source = requirement_source(dashboard);
    let mut pending = 0usize;

    for (key, uid) in recorded {
        match ctx.store.get_instance(&key).await? {
            None => {
                debug!(instance = %key, "Instance is gone, forgetting dashboard");
            }
            Some(instance) if !is_ready(&instance) => {
                info!(instance = %key, "Instance not ready, keeping finalizer");
                pending += 1;
                continue;
            }
            Some(instance) => {
                let deleted = async {
                    let api = ctx.clients.client_for(&instance).await?;
                    api.delete_dashboard(&uid).await?;
                    release_plugins(ctx.store.as_ref(), &instance, &source).await?;
                    Ok::<_, ReconcilerError>(())
                }
                .await;
                if let Err(e) = deleted {
                    warn!(instance = %key, uid = %uid, error = %e, "Failed to delete dashboard");
                    metrics::increment_artifact_instance_failures(CONTROLLER);
                    pending += 1;
                    continue;
                }
                info!(instance = %key, uid = %uid, "Dashboard deleted");
            }
        }
        status.instances.remove(&key);
        current = ctx.store.update_dashboard_status(&current, &status).await?;
    }

    if pending > 0 {
        return Ok(Action::requeue(ctx.config.retry_soon()));
    }

    let finalizers = without_finalizer(&current.metadata, DASHBOARD_FINALIZER);
    ctx.store
        .update_dashboard_finalizers(&current, finalizers)
        .await?;
    info!("Dashboard removed from all instances");
    Ok(Action::await_change())
}
