//! # Grafana Operator
//!
//! Provisions Grafana instances on Kubernetes and keeps dashboards, folders,
//! playlists and plugins declared as custom resources in sync with them.
//!
//! ## Resources
//!
//! - `Grafana` - a managed instance, provisioned in ordered stages (admin
//!   credentials, grafana.ini, storage, service account, service, ingress,
//!   plugins, deployment) until its HTTP API is reachable
//! - `GrafanaDashboard` - a dashboard (inline, gzip, URL or grafana.com)
//!   pushed to every ready instance its `instanceSelector` matches
//! - `GrafanaPlaylist` - a playlist pushed the same way
//!
//! ## Configuration
//!
//! Environment variables (see `OperatorConfig`), overridable by flags:
//! `--metrics-port`, `--namespace`, `--log-format`.

use anyhow::Result;
use clap::Parser;

use grafana_operator::config::{LogFormat, OperatorConfig};
use grafana_operator::runtime::{initialization, watch_loop};

#[derive(Parser, Debug)]
#[command(name = "grafana-operator")]
#[command(version, about = "Kubernetes operator for Grafana instances, dashboards and playlists")]
struct Args {
    /// Port for /metrics, /healthz and /readyz
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Only watch resources in this namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Log output format: text or json
    #[arg(long)]
    log_format: Option<String>,
}

impl Args {
    fn apply(self, mut config: OperatorConfig) -> OperatorConfig {
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(namespace) = self.namespace.filter(|ns| !ns.trim().is_empty()) {
            config.watch_namespace = Some(namespace);
        }
        if let Some(format) = self.log_format {
            config.log_format = LogFormat::parse(&format);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().apply(OperatorConfig::from_env());

    let init = initialization::initialize(config).await?;
    watch_loop::run_watch_loop(init.client, init.context, init.server_state).await
}
