//! Grafana HTTP API client
//!
//! REST implementation of [`GrafanaApi`] using reqwest with basic auth.
//!
//! References:
//! - [Folder API](https://grafana.com/docs/grafana/latest/developers/http_api/folder/)
//! - [Dashboard API](https://grafana.com/docs/grafana/latest/developers/http_api/dashboard/)
//! - [Playlist API](https://grafana.com/docs/grafana/latest/developers/http_api/playlist/)

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, info_span, Instrument};

use super::{
    decode, execute, DashboardRef, DashboardUpsert, GrafanaApi, GrafanaApiError, RemoteFolder,
    RemotePlaylist,
};
use crate::crd::DashboardFolder;

/// Admin user and password read from the instance's credentials secret
#[derive(Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Grafana REST client bound to one instance
#[derive(Debug, Clone)]
pub struct GrafanaRestClient {
    http_client: Client,
    base_url: String,
    credentials: AdminCredentials,
}

/// Body of `POST /api/folders`
#[derive(Debug, Serialize)]
struct CreateFolderRequest<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<&'a str>,
}

/// Body of `POST /api/dashboards/db`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveDashboardRequest<'a> {
    dashboard: &'a Value,
    folder_id: i64,
    overwrite: bool,
    message: &'a str,
}

/// Response of `GET /api/dashboards/uid/{uid}`
#[derive(Debug, Deserialize)]
struct DashboardLookupResponse {
    dashboard: Value,
}

impl GrafanaRestClient {
    /// `timeout` of `None` means requests never time out
    pub fn new(
        base_url: &str,
        credentials: AdminCredentials,
        timeout: Option<Duration>,
        insecure_skip_verify: bool,
    ) -> Result<Self, GrafanaApiError> {
        let mut builder = Client::builder().danger_accept_invalid_certs(insecure_skip_verify);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build().map_err(GrafanaApiError::Client)?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// URL of `segments` below the base URL; each segment is percent-encoded,
    /// so a UID containing `/` or `?` stays one path segment.
    fn resource_url(&self, segments: &[&str]) -> Result<String, GrafanaApiError> {
        let invalid = |reason: String| GrafanaApiError::Unexpected {
            url: self.base_url.clone(),
            reason,
        };
        let mut url =
            Url::parse(&self.base_url).map_err(|e| invalid(format!("invalid base URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| invalid("base URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.into())
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http_client
            .request(method, url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password))
            .header("Accept", "application/json")
    }

    async fn find_folder(&self, folder: &DashboardFolder) -> Result<Option<RemoteFolder>, GrafanaApiError> {
        let url = self.url("/api/folders");
        let response = execute("list_folders", self.request(Method::GET, &url), &url).await?;
        let folders: Vec<RemoteFolder> = decode(response, &url).await?;

        let found = match (&folder.uid, &folder.name) {
            (Some(uid), _) => folders.into_iter().find(|f| &f.uid == uid),
            (None, Some(title)) => folders.into_iter().find(|f| &f.title == title),
            (None, None) => None,
        };
        Ok(found)
    }
}

#[async_trait]
impl GrafanaApi for GrafanaRestClient {
    async fn ensure_folder(&self, folder: &DashboardFolder) -> Result<RemoteFolder, GrafanaApiError> {
        let span = info_span!(
            "grafana.folder.ensure",
            folder.name = folder.name.as_deref().unwrap_or_default(),
            folder.uid = folder.uid.as_deref().unwrap_or_default()
        );
        async move {
            if let Some(existing) = self.find_folder(folder).await? {
                debug!(folder.id = existing.id, "Folder already exists");
                return Ok(existing);
            }

            let title = folder
                .name
                .as_deref()
                .or(folder.uid.as_deref())
                .unwrap_or("General");
            let url = self.url("/api/folders");
            let body = CreateFolderRequest {
                title,
                uid: folder.uid.as_deref(),
            };
            let response = execute(
                "create_folder",
                self.request(Method::POST, &url).json(&body),
                &url,
            )
            .await?;
            let created: RemoteFolder = decode(response, &url).await?;
            info!(folder.id = created.id, folder.uid = %created.uid, "Created folder");
            Ok(created)
        }
        .instrument(span)
        .await
    }

    async fn dashboard_version(&self, uid: &str) -> Result<Option<i64>, GrafanaApiError> {
        let url = self.resource_url(&["api", "dashboards", "uid", uid])?;
        let response = match execute("get_dashboard", self.request(Method::GET, &url), &url).await {
            Ok(response) => response,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        let lookup: DashboardLookupResponse = decode(response, &url).await?;
        Ok(Some(
            lookup
                .dashboard
                .get("version")
                .and_then(Value::as_i64)
                .unwrap_or_default(),
        ))
    }

    async fn upsert_dashboard(&self, request: &DashboardUpsert) -> Result<DashboardRef, GrafanaApiError> {
        let span = info_span!("grafana.dashboard.upsert", folder.id = request.folder_id);
        async move {
            let url = self.url("/api/dashboards/db");
            let body = SaveDashboardRequest {
                dashboard: &request.model,
                folder_id: request.folder_id,
                overwrite: true,
                message: &request.message,
            };
            let response = execute(
                "upsert_dashboard",
                self.request(Method::POST, &url).json(&body),
                &url,
            )
            .await?;
            let saved: DashboardRef = decode(response, &url).await?;
            info!(dashboard.uid = %saved.uid, dashboard.version = saved.version, "Saved dashboard");
            Ok(saved)
        }
        .instrument(span)
        .await
    }

    async fn delete_dashboard(&self, uid: &str) -> Result<(), GrafanaApiError> {
        let url = self.resource_url(&["api", "dashboards", "uid", uid])?;
        match execute("delete_dashboard", self.request(Method::DELETE, &url), &url).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(dashboard.uid = uid, "Dashboard already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn playlist(&self, uid: &str) -> Result<Option<RemotePlaylist>, GrafanaApiError> {
        let url = self.resource_url(&["api", "playlists", uid])?;
        match execute("get_playlist", self.request(Method::GET, &url), &url).await {
            Ok(response) => decode(response, &url).await.map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_playlist(&self, playlist: &RemotePlaylist) -> Result<RemotePlaylist, GrafanaApiError> {
        let url = self.url("/api/playlists");
        let response = execute(
            "create_playlist",
            self.request(Method::POST, &url).json(playlist),
            &url,
        )
        .await?;
        let created: RemotePlaylist = decode(response, &url).await?;
        info!(playlist.uid = %created.uid, "Created playlist");
        Ok(created)
    }

    async fn update_playlist(&self, playlist: &RemotePlaylist) -> Result<(), GrafanaApiError> {
        let url = self.resource_url(&["api", "playlists", &playlist.uid])?;
        execute(
            "update_playlist",
            self.request(Method::PUT, &url).json(playlist),
            &url,
        )
        .await?;
        info!(playlist.uid = %playlist.uid, "Updated playlist");
        Ok(())
    }

    async fn delete_playlist(&self, uid: &str) -> Result<(), GrafanaApiError> {
        let url = self.resource_url(&["api", "playlists", uid])?;
        match execute("delete_playlist", self.request(Method::DELETE, &url), &url).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(playlist.uid = uid, "Playlist already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
