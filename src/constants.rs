//! # Constants
//!
//! Shared constants used throughout the operator.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Requeue delay after a failed or incomplete pass (seconds)
pub const DEFAULT_RETRY_SOON_SECS: u64 = 5;

/// Requeue delay after a fully successful pass (seconds)
pub const DEFAULT_POLL_AGAIN_SECS: u64 = 10;

/// Timeout for Grafana HTTP API calls when the instance does not set one (seconds)
pub const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 10;

/// Timeout for grafana.com catalog and dashboard URL downloads (seconds)
pub const DEFAULT_CATALOG_TIMEOUT_SECS: u64 = 30;

/// Root of the grafana.com dashboard catalog API
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://grafana.com/api/dashboards";

/// Image used for Grafana deployments without an explicit image
pub const DEFAULT_GRAFANA_IMAGE: &str = "docker.io/grafana/grafana:10.4.3";

/// Port Grafana listens on inside the pod
pub const GRAFANA_HTTP_PORT: i32 = 3000;

/// Field manager used for server-side apply of owned objects
pub const FIELD_MANAGER: &str = "grafana-operator";

/// Finalizer guarding remote cleanup of dashboards
pub const DASHBOARD_FINALIZER: &str = "grafana.integreatly.org/dashboard-finalizer";

/// Finalizer guarding remote cleanup of playlists
pub const PLAYLIST_FINALIZER: &str = "grafana.integreatly.org/playlist-finalizer";

/// Pod template annotation carrying the grafana.ini hash
pub const CONFIG_HASH_ANNOTATION: &str = "grafana.integreatly.org/config-hash";

/// Secret key holding the admin user name
pub const ADMIN_USER_KEY: &str = "GF_SECURITY_ADMIN_USER";

/// Secret key holding the admin password
pub const ADMIN_PASSWORD_KEY: &str = "GF_SECURITY_ADMIN_PASSWORD";

/// Admin user name written into generated credentials
pub const DEFAULT_ADMIN_USER: &str = "admin";

/// ConfigMap key holding the rendered grafana.ini
pub const GRAFANA_INI_KEY: &str = "grafana.ini";

/// Commit message attached to dashboard writes; the resourceVersion is appended
pub const DASHBOARD_UPDATE_MESSAGE: &str = "Updated by Grafana Operator. ResourceVersion: ";
