//! Per-instance client construction
//!
//! Everything a client needs is resolved once per reconcile call: the admin
//! URL from status, credentials from the admin secret, the request timeout
//! and the TLS policy from the instance's `client` settings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use thiserror::Error;

use super::{AdminCredentials, GrafanaApi, GrafanaApiError, GrafanaRestClient};
use crate::controller::store::{ClusterResources, StoreError};
use crate::crd::Grafana;

#[derive(Debug, Error)]
pub enum ClientSetupError {
    #[error("instance {instance} has no admin URL yet")]
    NoAdminUrl { instance: String },
    #[error("admin secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },
    #[error("admin secret {namespace}/{name} has no usable key {key}")]
    MissingKey {
        namespace: String,
        name: String,
        key: String,
    },
    #[error("failed to read admin secret: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Client(#[from] GrafanaApiError),
}

/// Builds a [`GrafanaApi`] for a ready instance
#[async_trait]
pub trait GrafanaClientFactory: Send + Sync {
    async fn client_for(&self, instance: &Grafana) -> Result<Arc<dyn GrafanaApi>, ClientSetupError>;
}

/// `None` disables the timeout: an explicit zero or negative setting asks for no limit.
pub fn client_timeout(instance: &Grafana, default: Duration) -> Option<Duration> {
    match instance.spec.client.as_ref().and_then(|c| c.timeout) {
        None => Some(default),
        Some(secs) if secs <= 0 => None,
        Some(secs) => Some(Duration::from_secs(secs.unsigned_abs())),
    }
}

/// Extract the admin user and password from the instance's credentials secret
pub fn read_admin_credentials(
    instance: &Grafana,
    secret: &Secret,
) -> Result<AdminCredentials, ClientSetupError> {
    let read = |key: String| -> Result<String, ClientSetupError> {
        secret
            .data
            .as_ref()
            .and_then(|data| data.get(&key))
            .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
            .filter(|value| !value.is_empty())
            .or_else(|| {
                secret
                    .string_data
                    .as_ref()
                    .and_then(|data| data.get(&key).cloned())
            })
            .ok_or_else(|| ClientSetupError::MissingKey {
                namespace: secret.namespace().unwrap_or_default(),
                name: secret.name_any(),
                key,
            })
    };

    Ok(AdminCredentials {
        user: read(instance.admin_user_key())?,
        password: read(instance.admin_password_key())?,
    })
}

/// Factory producing [`GrafanaRestClient`]s, reading secrets through [`ClusterResources`]
#[derive(Clone)]
pub struct KubeClientFactory {
    cluster: Arc<dyn ClusterResources>,
    default_timeout: Duration,
}

impl std::fmt::Debug for KubeClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClientFactory")
            .field("default_timeout", &self.default_timeout)
            .finish_non_exhaustive()
    }
}

impl KubeClientFactory {
    pub fn new(cluster: Arc<dyn ClusterResources>, default_timeout: Duration) -> Self {
        Self {
            cluster,
            default_timeout,
        }
    }
}

#[async_trait]
impl GrafanaClientFactory for KubeClientFactory {
    async fn client_for(&self, instance: &Grafana) -> Result<Arc<dyn GrafanaApi>, ClientSetupError> {
        let admin_url = instance
            .status
            .as_ref()
            .and_then(|s| s.admin_url.clone())
            .ok_or_else(|| ClientSetupError::NoAdminUrl {
                instance: instance.instance_key().to_string(),
            })?;

        let namespace = instance.namespace().unwrap_or_default();
        let secret_name = instance.admin_secret_name();
        let secret = self
            .cluster
            .get_secret(&namespace, &secret_name)
            .await?
            .ok_or_else(|| ClientSetupError::SecretNotFound {
                namespace: namespace.clone(),
                name: secret_name.clone(),
            })?;
        let credentials = read_admin_credentials(instance, &secret)?;

        let insecure_skip_verify = instance
            .spec
            .client
            .as_ref()
            .and_then(|c| c.insecure_skip_verify)
            .unwrap_or(true);

        let client = GrafanaRestClient::new(
            &admin_url,
            credentials,
            client_timeout(instance, self.default_timeout),
            insecure_skip_verify,
        )?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{GrafanaClientConfig, GrafanaSpec};
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn instance_with_timeout(timeout: Option<i64>) -> Grafana {
        let mut grafana = Grafana::new("grafana-a", GrafanaSpec::default());
        grafana.spec.client = Some(GrafanaClientConfig {
            timeout,
            ..Default::default()
        });
        grafana
    }

    #[test]
    fn test_client_timeout() {
        let default = Duration::from_secs(10);
        assert_eq!(
            client_timeout(&Grafana::new("g", GrafanaSpec::default()), default),
            Some(default)
        );
        assert_eq!(client_timeout(&instance_with_timeout(None), default), Some(default));
        assert_eq!(
            client_timeout(&instance_with_timeout(Some(3)), default),
            Some(Duration::from_secs(3))
        );
        assert_eq!(client_timeout(&instance_with_timeout(Some(-5)), default), None);
        assert_eq!(client_timeout(&instance_with_timeout(Some(0)), default), None);
    }

    #[test]
    fn test_read_admin_credentials() {
        let grafana = Grafana::new("grafana-a", GrafanaSpec::default());
        let mut secret = Secret::default();
        secret.metadata.name = Some("grafana-a-admin-credentials".to_string());
        secret.data = Some(BTreeMap::from([
            (
                "GF_SECURITY_ADMIN_USER".to_string(),
                ByteString(b"admin".to_vec()),
            ),
            (
                "GF_SECURITY_ADMIN_PASSWORD".to_string(),
                ByteString(b"secret".to_vec()),
            ),
        ]));

        let credentials = read_admin_credentials(&grafana, &secret).unwrap();
        assert_eq!(credentials.user, "admin");
        assert_eq!(credentials.password, "secret");
    }

    #[test]
    fn test_missing_password_key_is_reported() {
        let grafana = Grafana::new("grafana-a", GrafanaSpec::default());
        let mut secret = Secret::default();
        secret.data = Some(BTreeMap::from([(
            "GF_SECURITY_ADMIN_USER".to_string(),
            ByteString(b"admin".to_vec()),
        )]));

        match read_admin_credentials(&grafana, &secret) {
            Err(ClientSetupError::MissingKey { key, .. }) => {
                assert_eq!(key, "GF_SECURITY_ADMIN_PASSWORD")
            }
            other => panic!("expected missing key, got {other:?}"),
        }
    }
}
