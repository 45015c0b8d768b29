//! # Initialization
//!
//! Startup: rustls provider, tracing, metrics, the probe server, the
//! Kubernetes client, and the shared reconcile [`Context`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{LogFormat, OperatorConfig};
use crate::constants::{DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS};
use crate::controller::instance::StagePipeline;
use crate::controller::store::{ClusterResources, KubeClusterResources, KubeStore};
use crate::controller::types::Context;
use crate::crd::Grafana;
use crate::grafana_api::{GrafanaComCatalog, KubeClientFactory};
use crate::observability;
use crate::server::{start_server, ServerState};

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub context: Arc<Context>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("context", &self.context)
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

pub fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "grafana_operator=info".into());
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    if let Err(e) = result {
        eprintln!("tracing subscriber already installed: {e}");
    }
}

pub async fn initialize(config: OperatorConfig) -> Result<InitializationResult> {
    // rustls 0.23 needs a process-wide provider before any TLS client exists
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing(config.log_format);

    info!("Starting Grafana Operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let state_for_server = server_state.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let store = Arc::new(KubeStore::new(client.clone(), config.watch_namespace.clone()));
    let cluster: Arc<dyn ClusterResources> = Arc::new(KubeClusterResources::new(client.clone()));
    let clients = Arc::new(KubeClientFactory::new(
        cluster.clone(),
        config.default_client_timeout(),
    ));
    let catalog = Arc::new(
        GrafanaComCatalog::new(&config.catalog_base_url, config.catalog_timeout())
            .context("Failed to build grafana.com client")?,
    );
    let pipeline = Arc::new(StagePipeline::standard(cluster, &config));

    check_crds(&client, config.watch_namespace.as_deref()).await;

    let context = Arc::new(Context {
        store,
        clients,
        catalog,
        pipeline,
        config,
        shutdown: CancellationToken::new(),
    });

    info!("Operator initialized, starting controllers...");
    Ok(InitializationResult {
        client,
        context,
        server_state,
    })
}

async fn wait_for_server_ready(
    server_state: &ServerState,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }
        if server_state.ready() {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }
        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }
        tokio::time::sleep(poll_interval).await;
    }
}

/// Startup probe: a missing CRD is logged, the controllers keep retrying
async fn check_crds(client: &Client, namespace: Option<&str>) {
    let api: Api<Grafana> = match namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };
    match api.list(&ListParams::default().limit(1)).await {
        Ok(_) => info!("Grafana CRD is queryable"),
        Err(e) => {
            error!("Grafana CRD is not queryable: {}. Is the CRD installed?", e);
            warn!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        }
    }
}
