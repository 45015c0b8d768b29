//! # Playlist Reconciler
//!
//! Same shape as the dashboard reconciler: finalizer, per-instance sync of
//! ready instances, per-instance bookkeeping in status, cleanup on deletion.
//! The remote UID is the Kubernetes object's UID.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube_runtime::controller::Action;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::constants::PLAYLIST_FINALIZER;
use crate::controller::finalizer::{has_finalizer, with_finalizer, without_finalizer};
use crate::controller::hash::Fingerprint;
use crate::controller::plugins::{reconcile_plugins, release_plugins, requirement_source};
use crate::controller::selector::{is_ready, partition_ready, select_instances};
use crate::controller::types::{cancellable, Context, ReconcilerError};
use crate::crd::{
    Grafana, GrafanaPlaylist, GrafanaPlaylistStatus, PlaylistDefinition, PlaylistInstanceStatus,
};
use crate::grafana_api::{RemotePlaylist, RemotePlaylistItem};
use crate::observability::metrics;

const CONTROLLER: &str = "playlist";

pub async fn reconcile(
    playlist: Arc<GrafanaPlaylist>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcilerError> {
    let span = info_span!(
        "controller.playlist.reconcile",
        resource.name = %playlist.name_any(),
        resource.namespace = %playlist.namespace().unwrap_or_default(),
    );
    let start = Instant::now();
    metrics::increment_reconciliations(CONTROLLER);

    let result = cancellable(&ctx.shutdown, reconcile_playlist(&playlist, &ctx))
        .instrument(span)
        .await;

    metrics::observe_reconciliation_duration(CONTROLLER, start.elapsed().as_secs_f64());
    result
}

/// Grafana representation; items without an explicit order keep their position
pub fn to_remote(uid: &str, definition: &PlaylistDefinition) -> RemotePlaylist {
    RemotePlaylist {
        uid: uid.to_string(),
        name: definition.name.clone(),
        interval: definition.interval.clone(),
        items: definition
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| RemotePlaylistItem {
                item_type: item.item_type.as_str().to_string(),
                value: item.value.clone(),
                order: item.order.unwrap_or(index as i64 + 1),
                title: item.title.clone(),
            })
            .collect(),
    }
}

enum InstanceSync {
    Written(PlaylistInstanceStatus),
    Unchanged,
}

async fn reconcile_playlist(
    playlist: &GrafanaPlaylist,
    ctx: &Context,
) -> Result<Action, ReconcilerError> {
    if playlist.metadata.deletion_timestamp.is_some() {
        return finalize(playlist, ctx).await;
    }

    let mut current = playlist.clone();
    if !has_finalizer(&current.metadata, PLAYLIST_FINALIZER) {
        let finalizers = with_finalizer(&current.metadata, PLAYLIST_FINALIZER);
        current = ctx
            .store
            .update_playlist_finalizers(&current, finalizers)
            .await?;
    }

    let Some(selector) = current.spec.instance_selector.clone() else {
        debug!("No instance selector, nothing to push");
        return Ok(Action::await_change());
    };

    let Some(definition) = current.spec.playlist.clone() else {
        warn!("Playlist has no definition, skipping");
        let mut next = current.status.clone().unwrap_or_default();
        next.last_message = Some("playlist has no definition".to_string());
        if current.status.clone().unwrap_or_default() != next {
            ctx.store.update_playlist_status(&current, &next).await?;
        }
        return Ok(Action::requeue(ctx.config.poll_again()));
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

    let hash = current.fingerprint();
    let mut status = current.status.clone().unwrap_or_default();
    let mut failures: Vec<String> = Vec::new();
    let mut only_invalid_failures = true;

    for instance in &ready {
        let key = instance.instance_key();
        match sync_instance(ctx, &current, &status, &definition, instance, &hash).await {
            Ok(InstanceSync::Written(entry)) => {
                info!(instance = %key, uid = %entry.uid, "Playlist written");
                status.instances.insert(key, entry);
                current = ctx.store.update_playlist_status(&current, &status).await?;
            }
            Ok(InstanceSync::Unchanged) => {
                debug!(instance = %key, "Playlist unchanged");
            }
            Err(e) => {
                warn!(instance = %key, error = %e, "Failed to push playlist");
                metrics::increment_artifact_instance_failures(CONTROLLER);
                only_invalid_failures &= e.is_invalid();
                failures.push(format!("{key}: {e}"));
            }
        }
    }

    let mut next = status;
    let action = if failures.is_empty() {
        next.hash = Some(hash);
        next.last_message = None;
        if not_ready.is_empty() {
            Action::requeue(ctx.config.poll_again())
        } else {
            Action::requeue(ctx.config.retry_soon())
        }
    } else {
        next.last_message = Some(failures.join("; "));
        if only_invalid_failures && not_ready.is_empty() {
            Action::requeue(ctx.config.poll_again())
        } else {
            Action::requeue(ctx.config.retry_soon())
        }
    };

    if current.status.clone().unwrap_or_default() != next {
        ctx.store.update_playlist_status(&current, &next).await?;
    }
    Ok(action)
}

async fn sync_instance(
    ctx: &Context,
    playlist: &GrafanaPlaylist,
    status: &GrafanaPlaylistStatus,
    definition: &PlaylistDefinition,
    instance: &Grafana,
    hash: &str,
) -> Result<InstanceSync, ReconcilerError> {
    let instance = reconcile_plugins(
        ctx.store.as_ref(),
        instance,
        &requirement_source(playlist),
        &playlist.spec.plugins,
    )
    .await?;
    let api = ctx.clients.client_for(&instance).await?;

    let recorded = status.instances.get(&instance.instance_key());
    let uid = recorded
        .map(|entry| entry.uid.clone())
        .filter(|uid| !uid.is_empty())
        .unwrap_or_else(|| playlist.uid().unwrap_or_default());

    let existing = api.playlist(&uid).await?;
    if existing.is_some() && recorded.is_some_and(|entry| entry.hash == hash) {
        return Ok(InstanceSync::Unchanged);
    }

    let desired = to_remote(&uid, definition);
    let written_uid = if existing.is_some() {
        api.update_playlist(&desired).await?;
        uid
    } else {
        match api.create_playlist(&desired).await {
            Ok(created) if !created.uid.is_empty() => created.uid,
            Ok(_) => uid,
            // created concurrently since the lookup
            Err(e) if e.is_conflict() => {
                api.update_playlist(&desired).await?;
                uid
            }
            Err(e) => return Err(e.into()),
        }
    };

    Ok(InstanceSync::Written(PlaylistInstanceStatus {
        uid: written_uid,
        hash: hash.to_string(),
    }))
}

async fn finalize(playlist: &GrafanaPlaylist, ctx: &Context) -> Result<Action, ReconcilerError> {
    if !has_finalizer(&playlist.metadata, PLAYLIST_FINALIZER) {
        return Ok(Action::await_change());
    }

    let mut current = playlist.clone();
    let mut status = current.status.clone().unwrap_or_default();
    let recorded: Vec<_> = status
        .instances
        .iter()
        .map(|(key, entry)| (key.clone(), entry.uid.clone()))
        .collect();
    let source = requirement_source(playlist);
    let mut pending = 0usize;

    for (key, uid) in recorded {
        match ctx.store.get_instance(&key).await? {
            None => {
                debug!(instance = %key, "Instance is gone, forgetting playlist");
            }
            Some(instance) if !is_ready(&instance) => {
                info!(instance = %key, "Instance not ready, keeping finalizer");
                pending += 1;
                continue;
            }
            Some(instance) => {
                let deleted = async {
                    let api = ctx.clients.client_for(&instance).await?;
                    api.delete_playlist(&uid).await?;
                    release_plugins(ctx.store.as_ref(), &instance, &source).await?;
                    Ok::<_, ReconcilerError>(())
                }
                .await;
                if let Err(e) = deleted {
                    warn!(instance = %key, uid = %uid, error = %e, "Failed to delete playlist");
                    metrics::increment_artifact_instance_failures(CONTROLLER);
                    pending += 1;
                    continue;
                }
                info!(instance = %key, uid = %uid, "Playlist deleted");
            }
        }
        status.instances.remove(&key);
        current = ctx.store.update_playlist_status(&current, &status).await?;
    }

    if pending > 0 {
        return Ok(Action::requeue(ctx.config.retry_soon()));
    }

    let finalizers = without_finalizer(&current.metadata, PLAYLIST_FINALIZER);
    ctx.store
        .update_playlist_finalizers(&current, finalizers)
        .await?;
    info!("Playlist removed from all instances");
    Ok(Action::await_change())
}
