//! Shared fixtures for the reconcile and Pact tests
//!
//! In-memory stand-ins for the Kubernetes API and Grafana, plus builders for
//! the custom resources the scenarios use.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{
    ConfigMap, PersistentVolumeClaim, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use grafana_operator::config::OperatorConfig;
use grafana_operator::controller::instance::StagePipeline;
use grafana_operator::controller::store::{ClusterResources, ResourceStore, StoreError};
use grafana_operator::controller::types::Context;
use grafana_operator::crd::{
    DashboardFolder, Grafana, GrafanaDashboard, GrafanaDashboardSpec, GrafanaDashboardStatus,
    GrafanaPlaylist, GrafanaPlaylistSpec, GrafanaPlaylistStatus, GrafanaSpec, GrafanaStatus,
    InstanceKey, InstanceSelector, OperatorStage, StageStatus,
};
use grafana_operator::grafana_api::{
    ClientSetupError, DashboardCatalog, DashboardRef, DashboardUpsert, GrafanaApi,
    GrafanaApiError, GrafanaClientFactory, RemoteFolder, RemotePlaylist,
};

static RUSTLS_INIT: Once = Once::new();

/// Install the rustls crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

// ---------------------------------------------------------------------------
// Kubernetes API

#[derive(Default)]
struct StoreState {
    instances: BTreeMap<InstanceKey, Grafana>,
    dashboards: BTreeMap<InstanceKey, GrafanaDashboard>,
    playlists: BTreeMap<InstanceKey, GrafanaPlaylist>,
    next_version: u64,
    status_writes: usize,
}

impl StoreState {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        format!("rv-{}", self.next_version)
    }
}

/// Object store enforcing resourceVersion preconditions like the API server
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

pub fn deletion_time<T: serde::de::DeserializeOwned>() -> T {
    serde_json::from_value(serde_json::json!("2026-01-01T00:00:00Z"))
        .expect("valid RFC 3339 timestamp")
}

fn key_of<K: kube::Resource>(obj: &K) -> InstanceKey {
    InstanceKey::new(obj.namespace().unwrap_or_default(), obj.name_any())
}

fn conflict<K: kube::Resource>(obj: &K, kind: &str) -> StoreError {
    StoreError::Conflict {
        kind: kind.to_string(),
        key: key_of(obj).to_string(),
    }
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn put_instance(&self, mut instance: Grafana) -> Grafana {
        let mut state = self.state.lock().unwrap();
        instance.metadata.resource_version = Some(state.bump());
        state
            .instances
            .insert(key_of(&instance), instance.clone());
        instance
    }

    pub fn put_dashboard(&self, mut dashboard: GrafanaDashboard) -> GrafanaDashboard {
        let mut state = self.state.lock().unwrap();
        dashboard.metadata.resource_version = Some(state.bump());
        state
            .dashboards
            .insert(key_of(&dashboard), dashboard.clone());
        dashboard
    }

    pub fn put_playlist(&self, mut playlist: GrafanaPlaylist) -> GrafanaPlaylist {
        let mut state = self.state.lock().unwrap();
        playlist.metadata.resource_version = Some(state.bump());
        state.playlists.insert(key_of(&playlist), playlist.clone());
        playlist
    }

    pub fn instance(&self, namespace: &str, name: &str) -> Option<Grafana> {
        let state = self.state.lock().unwrap();
        state
            .instances
            .get(&InstanceKey::new(namespace, name))
            .cloned()
    }

    pub fn remove_instance(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.instances.remove(&InstanceKey::new(namespace, name));
    }

    pub fn dashboard(&self, namespace: &str, name: &str) -> Option<GrafanaDashboard> {
        let state = self.state.lock().unwrap();
        state
            .dashboards
            .get(&InstanceKey::new(namespace, name))
            .cloned()
    }

    pub fn playlist(&self, namespace: &str, name: &str) -> Option<GrafanaPlaylist> {
        let state = self.state.lock().unwrap();
        state
            .playlists
            .get(&InstanceKey::new(namespace, name))
            .cloned()
    }

    /// Mark a stored object deleted, as `kubectl delete` does for objects with finalizers
    pub fn delete_dashboard(&self, namespace: &str, name: &str) -> Option<GrafanaDashboard> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let dashboard = state
            .dashboards
            .get_mut(&InstanceKey::new(namespace, name))?;
        dashboard.metadata.deletion_timestamp = Some(deletion_time());
        dashboard.metadata.resource_version = Some(version);
        Some(dashboard.clone())
    }

    pub fn delete_playlist(&self, namespace: &str, name: &str) -> Option<GrafanaPlaylist> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let playlist = state
            .playlists
            .get_mut(&InstanceKey::new(namespace, name))?;
        playlist.metadata.deletion_timestamp = Some(deletion_time());
        playlist.metadata.resource_version = Some(version);
        Some(playlist.clone())
    }

    pub fn status_writes(&self) -> usize {
        self.state.lock().unwrap().status_writes
    }
}

#[async_trait]
impl ResourceStore for FakeStore {
    async fn list_instances(&self, selector: &InstanceSelector) -> Result<Vec<Grafana>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .values()
            .filter(|instance| selector.matches(instance.metadata.labels.as_ref()))
            .cloned()
            .collect())
    }

    async fn get_instance(&self, key: &InstanceKey) -> Result<Option<Grafana>, StoreError> {
        Ok(self.state.lock().unwrap().instances.get(key).cloned())
    }

    async fn update_instance_status(
        &self,
        instance: &Grafana,
        status: &GrafanaStatus,
    ) -> Result<Grafana, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        state.status_writes += 1;
        let stored = state
            .instances
            .get_mut(&key_of(instance))
            .ok_or_else(|| conflict(instance, "Grafana"))?;
        if stored.metadata.resource_version != instance.metadata.resource_version {
            return Err(conflict(instance, "Grafana"));
        }
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn update_dashboard_status(
        &self,
        dashboard: &GrafanaDashboard,
        status: &GrafanaDashboardStatus,
    ) -> Result<GrafanaDashboard, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        state.status_writes += 1;
        let stored = state
            .dashboards
            .get_mut(&key_of(dashboard))
            .ok_or_else(|| conflict(dashboard, "GrafanaDashboard"))?;
        if stored.metadata.resource_version != dashboard.metadata.resource_version {
            return Err(conflict(dashboard, "GrafanaDashboard"));
        }
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn update_dashboard_finalizers(
        &self,
        dashboard: &GrafanaDashboard,
        finalizers: Vec<String>,
    ) -> Result<GrafanaDashboard, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let key = key_of(dashboard);
        let stored = state
            .dashboards
            .get_mut(&key)
            .ok_or_else(|| conflict(dashboard, "GrafanaDashboard"))?;
        if stored.metadata.resource_version != dashboard.metadata.resource_version {
            return Err(conflict(dashboard, "GrafanaDashboard"));
        }
        stored.metadata.finalizers = Some(finalizers.clone());
        stored.metadata.resource_version = Some(version);
        let result = stored.clone();
        if finalizers.is_empty() && result.metadata.deletion_timestamp.is_some() {
            state.dashboards.remove(&key);
        }
        Ok(result)
    }

    async fn update_playlist_status(
        &self,
        playlist: &GrafanaPlaylist,
        status: &GrafanaPlaylistStatus,
    ) -> Result<GrafanaPlaylist, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        state.status_writes += 1;
        let stored = state
            .playlists
            .get_mut(&key_of(playlist))
            .ok_or_else(|| conflict(playlist, "GrafanaPlaylist"))?;
        if stored.metadata.resource_version != playlist.metadata.resource_version {
            return Err(conflict(playlist, "GrafanaPlaylist"));
        }
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn update_playlist_finalizers(
        &self,
        playlist: &GrafanaPlaylist,
        finalizers: Vec<String>,
    ) -> Result<GrafanaPlaylist, StoreError> {
        let mut state = self.state.lock().unwrap();
        let version = state.bump();
        let key = key_of(playlist);
        let stored = state
            .playlists
            .get_mut(&key)
            .ok_or_else(|| conflict(playlist, "GrafanaPlaylist"))?;
        if stored.metadata.resource_version != playlist.metadata.resource_version {
            return Err(conflict(playlist, "GrafanaPlaylist"));
        }
        stored.metadata.finalizers = Some(finalizers.clone());
        stored.metadata.resource_version = Some(version);
        let result = stored.clone();
        if finalizers.is_empty() && result.metadata.deletion_timestamp.is_some() {
            state.playlists.remove(&key);
        }
        Ok(result)
    }
}

/// Records every applied object; deployments report an available replica
/// once `set_deployment_available(true)` was called
#[derive(Default)]
pub struct FakeCluster {
    secrets: Mutex<BTreeMap<String, Secret>>,
    applied: Mutex<Vec<String>>,
    config_maps: Mutex<Vec<ConfigMap>>,
    deployments: Mutex<Vec<Deployment>>,
    deployment_available: AtomicBool,
}

impl FakeCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_deployment_available(&self, available: bool) {
        self.deployment_available.store(available, Ordering::SeqCst);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let key = format!("{}/{}", secret.namespace().unwrap_or_default(), secret.name_any());
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&format!("{namespace}/{name}"))
            .cloned()
    }

    /// `Kind/name` of every apply, in order
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    pub fn last_config_map(&self) -> Option<ConfigMap> {
        self.config_maps.lock().unwrap().last().cloned()
    }

    pub fn last_deployment(&self) -> Option<Deployment> {
        self.deployments.lock().unwrap().last().cloned()
    }

    fn record(&self, kind: &str, name: String) {
        self.applied.lock().unwrap().push(format!("{kind}/{name}"));
    }
}

#[async_trait]
impl ClusterResources for FakeCluster {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.secret(namespace, name))
    }

    async fn apply_secret(&self, secret: Secret) -> Result<Secret, StoreError> {
        self.record("Secret", secret.name_any());
        self.insert_secret(secret.clone());
        Ok(secret)
    }

    async fn apply_config_map(&self, config_map: ConfigMap) -> Result<ConfigMap, StoreError> {
        self.record("ConfigMap", config_map.name_any());
        self.config_maps.lock().unwrap().push(config_map.clone());
        Ok(config_map)
    }

    async fn apply_persistent_volume_claim(
        &self,
        claim: PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, StoreError> {
        self.record("PersistentVolumeClaim", claim.name_any());
        Ok(claim)
    }

    async fn apply_service_account(
        &self,
        account: ServiceAccount,
    ) -> Result<ServiceAccount, StoreError> {
        self.record("ServiceAccount", account.name_any());
        Ok(account)
    }

    async fn apply_service(&self, service: Service) -> Result<Service, StoreError> {
        self.record("Service", service.name_any());
        Ok(service)
    }

    async fn apply_ingress(&self, ingress: Ingress) -> Result<Ingress, StoreError> {
        self.record("Ingress", ingress.name_any());
        Ok(ingress)
    }

    async fn apply_deployment(&self, mut deployment: Deployment) -> Result<Deployment, StoreError> {
        self.record("Deployment", deployment.name_any());
        self.deployments.lock().unwrap().push(deployment.clone());
        if self.deployment_available.load(Ordering::SeqCst) {
            deployment.status = Some(DeploymentStatus {
                available_replicas: Some(1),
                ..Default::default()
            });
        }
        Ok(deployment)
    }
}

// ---------------------------------------------------------------------------
// Grafana

#[derive(Debug, Clone)]
pub struct StoredDashboard {
    pub model: Value,
    pub folder_id: i64,
    pub version: i64,
}

#[derive(Default)]
struct GrafanaState {
    folders: Vec<RemoteFolder>,
    dashboards: BTreeMap<String, StoredDashboard>,
    playlists: BTreeMap<String, RemotePlaylist>,
    calls: Vec<String>,
    fail_with: Option<u16>,
}

/// One Grafana instance's HTTP API, in memory
#[derive(Default)]
pub struct FakeGrafana {
    state: Mutex<GrafanaState>,
}

impl FakeGrafana {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Answer every call with this HTTP status until cleared
    pub fn fail_with(&self, status: Option<u16>) {
        self.state.lock().unwrap().fail_with = status;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.split(':').next() == Some(operation))
            .count()
    }

    pub fn dashboard(&self, uid: &str) -> Option<StoredDashboard> {
        self.state.lock().unwrap().dashboards.get(uid).cloned()
    }

    pub fn dashboard_uids(&self) -> Vec<String> {
        self.state.lock().unwrap().dashboards.keys().cloned().collect()
    }

    /// Simulate someone editing the dashboard in the Grafana UI
    pub fn bump_dashboard_version(&self, uid: &str) {
        if let Some(stored) = self.state.lock().unwrap().dashboards.get_mut(uid) {
            stored.version += 1;
        }
    }

    pub fn folders(&self) -> Vec<RemoteFolder> {
        self.state.lock().unwrap().folders.clone()
    }

    pub fn playlist_entry(&self, uid: &str) -> Option<RemotePlaylist> {
        self.state.lock().unwrap().playlists.get(uid).cloned()
    }

    pub fn remove_playlist(&self, uid: &str) {
        self.state.lock().unwrap().playlists.remove(uid);
    }

    fn begin(&self, call: String) -> Result<(), GrafanaApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.clone());
        match state.fail_with {
            Some(status) => Err(GrafanaApiError::Http {
                url: format!("http://fake-grafana/{call}"),
                status,
                body: "injected failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl GrafanaApi for FakeGrafana {
    async fn ensure_folder(&self, folder: &DashboardFolder) -> Result<RemoteFolder, GrafanaApiError> {
        self.begin(format!(
            "ensure_folder:{}",
            folder.name.as_deref().unwrap_or_default()
        ))?;
        let mut state = self.state.lock().unwrap();
        let existing = state.folders.iter().find(|f| match (&folder.uid, &folder.name) {
            (Some(uid), _) => &f.uid == uid,
            (None, Some(title)) => &f.title == title,
            (None, None) => false,
        });
        if let Some(existing) = existing {
            return Ok(existing.clone());
        }
        let id = state.folders.len() as i64 + 1;
        let created = RemoteFolder {
            id,
            uid: folder.uid.clone().unwrap_or_else(|| format!("folder-{id}")),
            title: folder.name.clone().unwrap_or_default(),
        };
        state.folders.push(created.clone());
        Ok(created)
    }

    async fn dashboard_version(&self, uid: &str) -> Result<Option<i64>, GrafanaApiError> {
        self.begin(format!("dashboard_version:{uid}"))?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .dashboards
            .get(uid)
            .map(|d| d.version))
    }

    async fn upsert_dashboard(&self, request: &DashboardUpsert) -> Result<DashboardRef, GrafanaApiError> {
        let uid = request
            .model
            .get("uid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.begin(format!("upsert_dashboard:{uid}"))?;
        let mut state = self.state.lock().unwrap();
        let version = state.dashboards.get(&uid).map_or(1, |d| d.version + 1);
        state.dashboards.insert(
            uid.clone(),
            StoredDashboard {
                model: request.model.clone(),
                folder_id: request.folder_id,
                version,
            },
        );
        Ok(DashboardRef {
            id: state.dashboards.len() as i64,
            uid,
            version,
        })
    }

    async fn delete_dashboard(&self, uid: &str) -> Result<(), GrafanaApiError> {
        self.begin(format!("delete_dashboard:{uid}"))?;
        self.state.lock().unwrap().dashboards.remove(uid);
        Ok(())
    }

    async fn playlist(&self, uid: &str) -> Result<Option<RemotePlaylist>, GrafanaApiError> {
        self.begin(format!("playlist:{uid}"))?;
        Ok(self.state.lock().unwrap().playlists.get(uid).cloned())
    }

    async fn create_playlist(&self, playlist: &RemotePlaylist) -> Result<RemotePlaylist, GrafanaApiError> {
        self.begin(format!("create_playlist:{}", playlist.uid))?;
        let mut state = self.state.lock().unwrap();
        if state.playlists.contains_key(&playlist.uid) {
            return Err(GrafanaApiError::Http {
                url: "http://fake-grafana/api/playlists".to_string(),
                status: 409,
                body: "playlist exists".to_string(),
            });
        }
        state
            .playlists
            .insert(playlist.uid.clone(), playlist.clone());
        Ok(playlist.clone())
    }

    async fn update_playlist(&self, playlist: &RemotePlaylist) -> Result<(), GrafanaApiError> {
        self.begin(format!("update_playlist:{}", playlist.uid))?;
        self.state
            .lock()
            .unwrap()
            .playlists
            .insert(playlist.uid.clone(), playlist.clone());
        Ok(())
    }

    async fn delete_playlist(&self, uid: &str) -> Result<(), GrafanaApiError> {
        self.begin(format!("delete_playlist:{uid}"))?;
        self.state.lock().unwrap().playlists.remove(uid);
        Ok(())
    }
}

/// Hands out the registered [`FakeGrafana`] for each instance
#[derive(Default)]
pub struct FakeClientFactory {
    clients: Mutex<BTreeMap<InstanceKey, Arc<FakeGrafana>>>,
}

impl FakeClientFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, namespace: &str, name: &str) -> Arc<FakeGrafana> {
        let grafana = FakeGrafana::new();
        self.clients
            .lock()
            .unwrap()
            .insert(InstanceKey::new(namespace, name), grafana.clone());
        grafana
    }

    pub fn total_calls(&self) -> usize {
        self.clients
            .lock()
            .unwrap()
            .values()
            .map(|client| client.calls().len())
            .sum()
    }
}

#[async_trait]
impl GrafanaClientFactory for FakeClientFactory {
    async fn client_for(&self, instance: &Grafana) -> Result<Arc<dyn GrafanaApi>, ClientSetupError> {
        let key = instance.instance_key();
        let client = self.clients.lock().unwrap().get(&key).cloned();
        match client {
            Some(client) => Ok(client as Arc<dyn GrafanaApi>),
            None => Err(ClientSetupError::SecretNotFound {
                namespace: key.namespace,
                name: instance.admin_secret_name(),
            }),
        }
    }
}

/// grafana.com catalog and URL downloads
#[derive(Default)]
pub struct FakeCatalog {
    revisions: Mutex<BTreeMap<i64, BTreeMap<i64, Value>>>,
    urls: Mutex<BTreeMap<String, Value>>,
    fail: AtomicBool,
    calls: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn publish(&self, id: i64, revision: i64, model: Value) {
        self.revisions
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .insert(revision, model);
    }

    pub fn serve_url(&self, url: &str, model: Value) {
        self.urls.lock().unwrap().insert(url.to_string(), model);
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn begin(&self, call: String) -> Result<(), GrafanaApiError> {
        self.calls.lock().unwrap().push(call.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(GrafanaApiError::Http {
                url: format!("https://grafana.com/{call}"),
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn not_found(what: String) -> GrafanaApiError {
        GrafanaApiError::Http {
            url: what,
            status: 404,
            body: String::new(),
        }
    }
}

#[async_trait]
impl DashboardCatalog for FakeCatalog {
    async fn latest_revision(&self, id: i64) -> Result<i64, GrafanaApiError> {
        self.begin(format!("latest_revision:{id}"))?;
        self.revisions
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|revisions| revisions.keys().max().copied())
            .ok_or_else(|| Self::not_found(format!("dashboards/{id}/revisions")))
    }

    async fn download(&self, id: i64, revision: i64) -> Result<Value, GrafanaApiError> {
        self.begin(format!("download:{id}:{revision}"))?;
        self.revisions
            .lock()
            .unwrap()
            .get(&id)
            .and_then(|revisions| revisions.get(&revision).cloned())
            .ok_or_else(|| Self::not_found(format!("dashboards/{id}/revisions/{revision}")))
    }

    async fn fetch_json(&self, url: &str) -> Result<Value, GrafanaApiError> {
        self.begin(format!("fetch_json:{url}"))?;
        self.urls
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Self::not_found(url.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Wiring and builders

pub struct Harness {
    pub store: Arc<FakeStore>,
    pub clients: Arc<FakeClientFactory>,
    pub catalog: Arc<FakeCatalog>,
    pub cluster: Arc<FakeCluster>,
    pub ctx: Arc<Context>,
}

pub fn test_config() -> OperatorConfig {
    OperatorConfig {
        retry_soon_secs: 5,
        poll_again_secs: 10,
        ..Default::default()
    }
}

impl Harness {
    pub fn new() -> Self {
        let store = FakeStore::new();
        let clients = FakeClientFactory::new();
        let catalog = FakeCatalog::new();
        let cluster = FakeCluster::new();
        let config = test_config();
        let ctx = Arc::new(Context {
            store: store.clone(),
            clients: clients.clone(),
            catalog: catalog.clone(),
            pipeline: Arc::new(StagePipeline::standard(cluster.clone(), &config)),
            config,
            shutdown: CancellationToken::new(),
        });
        Self {
            store,
            clients,
            catalog,
            cluster,
            ctx,
        }
    }

    /// A provisioned instance with a registered fake API
    pub fn ready_instance(&self, namespace: &str, name: &str) -> Arc<FakeGrafana> {
        self.store.put_instance(ready_instance(namespace, name));
        self.clients.register(namespace, name)
    }
}

pub fn labels() -> BTreeMap<String, String> {
    BTreeMap::from([("dashboards".to_string(), "grafana".to_string())])
}

pub fn selector() -> InstanceSelector {
    InstanceSelector {
        match_labels: labels(),
    }
}

pub fn instance(namespace: &str, name: &str) -> Grafana {
    let mut grafana = Grafana::new(name, GrafanaSpec::default());
    grafana.metadata.namespace = Some(namespace.to_string());
    grafana.metadata.uid = Some(format!("{name}-uid"));
    grafana.metadata.generation = Some(1);
    grafana.metadata.labels = Some(labels());
    grafana
}

pub fn ready_instance(namespace: &str, name: &str) -> Grafana {
    let mut grafana = instance(namespace, name);
    grafana.status = Some(GrafanaStatus {
        stage: Some(OperatorStage::Complete),
        stage_status: Some(StageStatus::Success),
        admin_url: Some(format!("http://{name}-service.{namespace}:3000")),
        ..Default::default()
    });
    grafana
}

pub fn not_ready_instance(namespace: &str, name: &str) -> Grafana {
    let mut grafana = instance(namespace, name);
    grafana.status = Some(GrafanaStatus {
        stage: Some(OperatorStage::Deployment),
        stage_status: Some(StageStatus::InProgress),
        ..Default::default()
    });
    grafana
}

pub fn dashboard(namespace: &str, name: &str, json: &str) -> GrafanaDashboard {
    let mut dashboard = GrafanaDashboard::new(
        name,
        GrafanaDashboardSpec {
            json: Some(json.to_string()),
            instance_selector: Some(selector()),
            ..Default::default()
        },
    );
    dashboard.metadata.namespace = Some(namespace.to_string());
    dashboard.metadata.uid = Some(format!("{name}-k8s-uid"));
    dashboard
}

pub fn playlist(namespace: &str, name: &str, spec: GrafanaPlaylistSpec) -> GrafanaPlaylist {
    let mut playlist = GrafanaPlaylist::new(name, spec);
    playlist.metadata.namespace = Some(namespace.to_string());
    playlist.metadata.uid = Some(format!("{name}-k8s-uid"));
    playlist
}
