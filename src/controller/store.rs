//! # Persistence
//!
//! Everything the reconcilers read from or write to the Kubernetes API goes
//! through two traits so the reconcile logic can run against in-memory fakes:
//!
//! - [`ResourceStore`] - the operator's own custom resources. Status writes
//!   are JSON patches (`json-patch` diffs of the status as read) and
//!   finalizer writes are merge patches; both carry the resourceVersion the
//!   caller read, so a write based on a stale read fails with
//!   [`StoreError::Conflict`] instead of silently clobbering a concurrent one.
//! - [`ClusterResources`] - the Kubernetes objects owned by an instance,
//!   written with server-side apply.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use json_patch::PatchOperation;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use crate::constants::FIELD_MANAGER;
use crate::crd::{
    Grafana, GrafanaDashboard, GrafanaDashboardStatus, GrafanaPlaylist, GrafanaPlaylistStatus,
    GrafanaStatus, InstanceKey, InstanceSelector,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} was modified concurrently; write was based on a stale read")]
    Conflict { kind: String, key: String },
    #[error("kubernetes api error: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to serialize {kind}: {source}")]
    Serialize {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Reads and conditional writes of the operator's custom resources
///
/// Update methods take the object as last read (its resourceVersion is the
/// precondition and its status the diff base) and return the stored result.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Every instance whose labels satisfy the selector
    async fn list_instances(&self, selector: &InstanceSelector) -> Result<Vec<Grafana>, StoreError>;

    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<Grafana>, StoreError>;

    async fn update_instance_status(
        &self,
        instance: &Grafana,
        status: &GrafanaStatus,
    ) -> Result<Grafana, StoreError>;

    async fn update_dashboard_status(
        &self,
        dashboard: &GrafanaDashboard,
        status: &GrafanaDashboardStatus,
    ) -> Result<GrafanaDashboard, StoreError>;

    async fn update_dashboard_finalizers(
        &self,
        dashboard: &GrafanaDashboard,
        finalizers: Vec<String>,
    ) -> Result<GrafanaDashboard, StoreError>;

    async fn update_playlist_status(
        &self,
        playlist: &GrafanaPlaylist,
        status: &GrafanaPlaylistStatus,
    ) -> Result<GrafanaPlaylist, StoreError>;

    async fn update_playlist_finalizers(
        &self,
        playlist: &GrafanaPlaylist,
        finalizers: Vec<String>,
    ) -> Result<GrafanaPlaylist, StoreError>;
}

/// Kubernetes objects provisioned for instances
///
/// `apply_*` methods server-side apply the full desired object and return
/// what the API server stored (including status, for deployments).
#[async_trait]
pub trait ClusterResources: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;
    async fn apply_secret(&self, secret: Secret) -> Result<Secret, StoreError>;
    async fn apply_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, StoreError>;
    async fn apply_persistent_volume_claim(
        &self,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, StoreError>;
    async fn apply_service_account(
        &self,
        account: ServiceAccount,
    ) -> Result<ServiceAccount, StoreError>;
    async fn apply_service(&self, service: Service) -> Result<Service, StoreError>;
    async fn apply_ingress(&self, ingress: Ingress) -> Result<Ingress, StoreError>;
    async fn apply_deployment(&self, deployment: Deployment) -> Result<Deployment, StoreError>;
}

/// JSON patch turning the `previous` status into `next`.
///
/// The patched object carries the resourceVersion the caller read, so the
/// API server rejects it with a conflict when the object moved on since.
pub fn status_patch(
    resource_version: Option<&str>,
    previous: Option<&Value>,
    next: &Value,
) -> Result<json_patch::Patch, serde_json::Error> {
    let before = previous.map_or_else(|| json!({}), |status| json!({ "status": status }));
    let mut operations: Vec<PatchOperation> = Vec::new();
    if let Some(rv) = resource_version {
        operations.push(serde_json::from_value(json!({
            "op": "replace",
            "path": "/metadata/resourceVersion",
            "value": rv,
        }))?);
    }
    operations.extend(json_patch::diff(&before, &json!({ "status": next })).0);
    Ok(json_patch::Patch(operations))
}

fn to_value<T: Serialize>(kind: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Serialize {
        kind: kind.to_string(),
        source,
    })
}

fn object_key<K: Resource>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

fn map_write_error<K: Resource<DynamicType = ()>>(obj: &K, error: kube::Error) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: K::kind(&()).to_string(),
            key: object_key(obj),
        },
        other => StoreError::Kube(other),
    }
}

/// Optimistic-concurrency precondition for a merge patch
fn with_resource_version<K: Resource>(obj: &K, mut patch: Value) -> Value {
    if let Some(rv) = obj.resource_version() {
        patch["metadata"]["resourceVersion"] = json!(rv);
    }
    patch
}

/// [`ResourceStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    /// Namespace instances are listed in; all namespaces when unset
    namespace: Option<String>,
}

impl Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl KubeStore {
    pub fn new(client: Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn namespaced<K>(&self, obj: &K) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), &obj.namespace().unwrap_or_default())
    }

    async fn patch_status<K, S>(
        &self,
        obj: &K,
        previous: Option<&S>,
        next: &S,
    ) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
        S: Serialize,
    {
        let kind = K::kind(&()).to_string();
        let previous = previous.map(|status| to_value(&kind, status)).transpose()?;
        let next = to_value(&kind, next)?;
        let patch = status_patch(obj.resource_version().as_deref(), previous.as_ref(), &next)
            .map_err(|source| StoreError::Serialize {
                kind: kind.clone(),
                source,
            })?;
        debug!(
            resource = %object_key(obj),
            kind = %kind,
            operations = patch.0.len(),
            "Patching status"
        );

        self.namespaced::<K>(obj)
            .patch_status(
                &obj.name_any(),
                &PatchParams::default(),
                &Patch::<()>::Json(patch),
            )
            .await
            .map_err(|e| map_write_error(obj, e))
    }

    async fn patch_finalizers<K>(&self, obj: &K, finalizers: Vec<String>) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let patch = with_resource_version(obj, json!({ "metadata": { "finalizers": finalizers } }));
        debug!(resource = %object_key(obj), "Patching finalizers");

        self.namespaced::<K>(obj)
            .patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| map_write_error(obj, e))
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn list_instances(&self, selector: &InstanceSelector) -> Result<Vec<Grafana>, StoreError> {
        let api: Api<Grafana> = match &self.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let params = ListParams::default().labels(&selector.to_label_selector());
        Ok(api.list(&params).await?.items)
    }

    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<Grafana>, StoreError> {
        let api: Api<Grafana> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn update_instance_status(
        &self,
        instance: &Grafana,
        status: &GrafanaStatus,
    ) -> Result<Grafana, StoreError> {
        self.patch_status(instance, instance.status.as_ref(), status)
            .await
    }

    async fn update_dashboard_status(
        &self,
        dashboard: &GrafanaDashboard,
        status: &GrafanaDashboardStatus,
    ) -> Result<GrafanaDashboard, StoreError> {
        self.patch_status(dashboard, dashboard.status.as_ref(), status)
            .await
    }

    async fn update_dashboard_finalizers(
        &self,
        dashboard: &GrafanaDashboard,
        finalizers: Vec<String>,
    ) -> Result<GrafanaDashboard, StoreError> {
        self.patch_finalizers(dashboard, finalizers).await
    }

    async fn update_playlist_status(
        &self,
        playlist: &GrafanaPlaylist,
        status: &GrafanaPlaylistStatus,
    ) -> Result<GrafanaPlaylist, StoreError> {
        self.patch_status(playlist, playlist.status.as_ref(), status)
            .await
    }

    async fn update_playlist_finalizers(
        &self,
        playlist: &GrafanaPlaylist,
        finalizers: Vec<String>,
    ) -> Result<GrafanaPlaylist, StoreError> {
        self.patch_finalizers(playlist, finalizers).await
    }
}

/// [`ClusterResources`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterResources {
    client: Client,
}

impl Debug for KubeClusterResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterResources").finish_non_exhaustive()
    }
}

impl KubeClusterResources {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn apply<K>(&self, obj: K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Serialize
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &obj.namespace().unwrap_or_default());
        let params = PatchParams::apply(FIELD_MANAGER).force();
        debug!(resource = %object_key(&obj), kind = %K::kind(&()), "Applying owned object");
        Ok(api.patch(&obj.name_any(), &params, &Patch::Apply(&obj)).await?)
    }
}

#[async_trait]
impl ClusterResources for KubeClusterResources {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn apply_secret(&self, secret: Secret) -> Result<Secret, StoreError> {
        self.apply(secret).await
    }

    async fn apply_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, StoreError> {
        self.apply(config_map).await
    }

    async fn apply_persistent_volume_claim(
        &self,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, StoreError> {
        self.apply(claim).await
    }

    async fn apply_service_account(
        &self,
        account: ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        self.apply(account).await
    }

    async fn apply_service(&self, service: Service) -> Result<Service, StoreError> {
        self.apply(service).await
    }

    async fn apply_ingress(&self, ingress: Ingress) -> Result<Ingress, StoreError> {
        self.apply(ingress).await
    }

    async fn apply_deployment(&self, deployment: Deployment) -> Result<Deployment, StoreError> {
        self.apply(deployment).await
    }
}
