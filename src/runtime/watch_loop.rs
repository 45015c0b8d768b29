//! # Watch Loop
//!
//! One `kube_runtime::Controller` per custom resource kind, run side by side.
//! The Grafana controller also watches the Deployments and ConfigMaps it owns
//! so rollout progress re-triggers the pipeline.
//!
//! SIGINT/SIGTERM marks the server not ready, cancels the shared token so
//! in-flight reconciles stop at their next await, and lets the controllers
//! drain.

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::{Client, Resource};
use kube_runtime::{controller, watcher, Controller};
use serde::de::DeserializeOwned;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::controller::types::Context;
use crate::controller::{dashboard, instance, playlist};
use crate::crd::{Grafana, GrafanaDashboard, GrafanaPlaylist, InstanceKey};
use crate::runtime::error_policy::{handle_reconciliation_error, log_controller_result};
use crate::server::ServerState;

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()> + DeserializeOwned,
{
    match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    }
}

/// Resolves with the signal name on the first SIGINT or SIGTERM
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    let mut terminate = signal(SignalKind::terminate())?;
    #[cfg(unix)]
    let terminated = terminate.recv();
    #[cfg(not(unix))]
    let terminated = std::future::pending::<Option<()>>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminated => Ok("SIGTERM"),
    }
}

/// Marks the server not ready and cancels `shutdown` once `received` resolves.
///
/// A handler that could not be installed leaves the token alone; the
/// controllers still stop through `shutdown_on_signal`.
async fn cancel_on_signal<F>(
    received: F,
    shutdown: CancellationToken,
    server_state: Arc<ServerState>,
) where
    F: Future<Output = std::io::Result<&'static str>>,
{
    match received.await {
        Ok(name) => {
            info!(signal = name, "Received shutdown signal, initiating graceful shutdown...");
            server_state.mark_ready(false);
            shutdown.cancel();
        }
        Err(e) => {
            error!(error = %e, "Failed to install shutdown signal handler");
        }
    }
}

pub async fn run_watch_loop(
    client: Client,
    ctx: Arc<Context>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let namespace = ctx.config.watch_namespace.clone();
    match &namespace {
        Some(namespace) => info!(namespace = %namespace, "Watching a single namespace"),
        None => info!("Watching all namespaces"),
    }

    tokio::spawn(cancel_on_signal(
        shutdown_signal(),
        ctx.shutdown.clone(),
        server_state.clone(),
    ));

    let watch_config = || watcher::Config::default().any_semantic();

    let instances = Controller::new(
        scoped_api::<Grafana>(&client, namespace.as_deref()),
        watch_config(),
    )
    .owns(
        scoped_api::<Deployment>(&client, namespace.as_deref()),
        watcher::Config::default(),
    )
    .owns(
        scoped_api::<ConfigMap>(&client, namespace.as_deref()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(
        instance::reconcile,
        |obj, error, ctx| handle_reconciliation_error(obj, error, ctx, "grafana"),
        ctx.clone(),
    )
    .for_each(|result| async move {
        if let Err(controller::Error::ObjectNotFound(object)) = &result {
            instance::forget_instance(&InstanceKey::new(
                object.namespace.clone().unwrap_or_default(),
                object.name.clone(),
            ));
        }
        log_controller_result("grafana", result)
    });

    let dashboards = Controller::new(
        scoped_api::<GrafanaDashboard>(&client, namespace.as_deref()),
        watch_config(),
    )
    .shutdown_on_signal()
    .run(
        dashboard::reconcile,
        |obj, error, ctx| handle_reconciliation_error(obj, error, ctx, "dashboard"),
        ctx.clone(),
    )
    .for_each(|result| async move { log_controller_result("dashboard", result) });

    let playlists = Controller::new(
        scoped_api::<GrafanaPlaylist>(&client, namespace.as_deref()),
        watch_config(),
    )
    .shutdown_on_signal()
    .run(
        playlist::reconcile,
        |obj, error, ctx| handle_reconciliation_error(obj, error, ctx, "playlist"),
        ctx.clone(),
    )
    .for_each(|result| async move { log_controller_result("playlist", result) });

    info!("Controllers started");
    tokio::join!(instances, dashboards, playlists);

    info!("Controllers stopped gracefully");
    Ok(())
}
