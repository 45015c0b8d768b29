//! # Operator Configuration
//!
//! Operator-level settings loaded from environment variables.

use std::time::Duration;

/// Log output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Anything other than `json` (case-insensitive) falls back to text
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Operator-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Requeue delay after a failed or incomplete pass (seconds)
    pub retry_soon_secs: u64,
    /// Requeue delay after a complete pass (seconds)
    /// Also used for desired state that cannot succeed until the user edits it
    pub poll_again_secs: u64,
    /// Grafana API timeout when an instance does not configure one (seconds)
    pub default_client_timeout_secs: u64,
    /// Timeout for grafana.com and dashboard URL downloads (seconds)
    pub catalog_timeout_secs: u64,
    /// grafana.com dashboard API root
    pub catalog_base_url: String,
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Restrict all watches to this namespace; cluster-wide when unset
    pub watch_namespace: Option<String>,
    /// Log format (json, text)
    pub log_format: LogFormat,
    /// Grafana image used when an instance does not override it
    pub grafana_image: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            retry_soon_secs: DEFAULT_RETRY_SOON_SECS,
            poll_again_secs: DEFAULT_POLL_AGAIN_SECS,
            default_client_timeout_secs: DEFAULT_CLIENT_TIMEOUT_SECS,
            catalog_timeout_secs: DEFAULT_CATALOG_TIMEOUT_SECS,
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            watch_namespace: None,
            log_format: LogFormat::Text,
            grafana_image: DEFAULT_GRAFANA_IMAGE.to_string(),
        }
    }
}

impl OperatorConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            retry_soon_secs: env_var_or_default("RETRY_SOON_SECS", DEFAULT_RETRY_SOON_SECS),
            poll_again_secs: env_var_or_default("POLL_AGAIN_SECS", DEFAULT_POLL_AGAIN_SECS),
            default_client_timeout_secs: env_var_or_default(
                "DEFAULT_CLIENT_TIMEOUT_SECS",
                DEFAULT_CLIENT_TIMEOUT_SECS,
            ),
            catalog_timeout_secs: env_var_or_default(
                "CATALOG_TIMEOUT_SECS",
                DEFAULT_CATALOG_TIMEOUT_SECS,
            ),
            catalog_base_url: env_var_or_default_str("CATALOG_BASE_URL", DEFAULT_CATALOG_BASE_URL),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            watch_namespace: env_var_opt("WATCH_NAMESPACE"),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "text")),
            grafana_image: env_var_or_default_str("GRAFANA_IMAGE", DEFAULT_GRAFANA_IMAGE),
        }
    }

    /// Get requeue delay for incomplete passes
    pub fn retry_soon(&self) -> Duration {
        Duration::from_secs(self.retry_soon_secs)
    }

    /// Get requeue delay for complete passes
    pub fn poll_again(&self) -> Duration {
        Duration::from_secs(self.poll_again_secs)
    }

    /// Get default Grafana API timeout
    pub fn default_client_timeout(&self) -> Duration {
        Duration::from_secs(self.default_client_timeout_secs)
    }

    /// Get catalog download timeout
    pub fn catalog_timeout(&self) -> Duration {
        Duration::from_secs(self.catalog_timeout_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Read environment variable, treating empty values as unset
fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
