//! Katello / foreman-tasks HTTP client
//!
//! Implements [`ContentApi`] over the server's v2 REST API with HTTP basic
//! authentication. Each trait call is exactly one HTTP request.

use async_trait::async_trait;
use cvmanager_core::{
    ContentApi, ContentViewId, CvmError, EnvironmentId, IncrementalUpdate, Page, Query,
    ResourceKind, TaskId, TaskRef, VersionId,
};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::ClientError;

const ACCEPT: &str = "application/json;version=2";

/// Path segment of a resource collection under `/katello/api`.
pub fn resource_path(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Repositories => "repositories",
        ResourceKind::ContentViews => "content_views",
        ResourceKind::LifecycleEnvironments => "environments",
    }
}

/// HTTP implementation of the Content Management API.
pub struct SatelliteClient {
    config: ClientConfig,
    base: String,
    http_client: Client,
}

impl SatelliteClient {
    /// Create a client; fails on an unparseable URL or TLS setup problems.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let url = Url::parse(&config.base_url).map_err(|e| ClientError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;

        let mut builder = Client::builder()
            .user_agent(concat!("cvmanager/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!config.verify_tls);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(SatelliteClient {
            base: url.as_str().trim_end_matches('/').to_string(),
            config,
            http_client,
        })
    }

    /// Create client from environment variables
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn katello(&self, path: &str) -> String {
        format!("{}/katello/api/{}", self.base, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.config.username, Some(&self.config.password))
            .header(reqwest::header::ACCEPT, ACCEPT)
    }

    async fn get(&self, url: String, query: &[(String, String)]) -> Result<Value, ClientError> {
        debug!(%url, ?query, "GET");
        let request = self.authed(self.http_client.get(&url).query(query));
        let response = request.send().await.map_err(|e| ClientError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        read_json("GET", url, response).await
    }

    async fn post<B: Serialize + ?Sized>(&self, url: String, body: &B) -> Result<Value, ClientError> {
        debug!(%url, "POST");
        let request = self.authed(self.http_client.post(&url).json(body));
        let response = request.send().await.map_err(|e| ClientError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        read_json("POST", url, response).await
    }

    async fn post_task<B: Serialize + ?Sized>(
        &self,
        url: String,
        body: &B,
    ) -> cvmanager_core::Result<TaskRef> {
        let raw = self.post(url.clone(), body).await?;
        serde_json::from_value(raw).map_err(|e| CvmError::decode(format!("task from {url}"), e))
    }
}

async fn read_json(method: &'static str, url: String, response: Response) -> Result<Value, ClientError> {
    let status = response.status();
    let text = response.text().await.map_err(|e| ClientError::Request {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if !status.is_success() {
        return Err(ClientError::Status {
            method,
            url,
            status: status.as_u16(),
            body: truncate(&text, 500),
        });
    }

    serde_json::from_str(&text).map_err(|e| ClientError::InvalidJson {
        url,
        reason: e.to_string(),
    })
}

fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

fn index_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![
        ("organization_id".to_string(), query.organization_id.to_string()),
        ("full_results".to_string(), "true".to_string()),
        ("page".to_string(), query.page.to_string()),
    ];
    if let Some(per_page) = query.per_page {
        params.push(("per_page".to_string(), per_page.to_string()));
    }
    params.extend(query.filters.iter().map(|(k, v)| (k.clone(), v.clone())));
    params
}

#[async_trait]
impl ContentApi for SatelliteClient {
    async fn index(&self, kind: ResourceKind, query: &Query) -> cvmanager_core::Result<Page<Value>> {
        let url = self.katello(resource_path(kind));
        let raw = self.get(url, &index_params(query)).await?;
        serde_json::from_value(raw).map_err(|e| CvmError::decode(format!("{kind} index page"), e))
    }

    async fn show(
        &self,
        kind: ResourceKind,
        organization_id: u64,
        id: u64,
    ) -> cvmanager_core::Result<Value> {
        let url = self.katello(&format!("{}/{}", resource_path(kind), id));
        let params = [("organization_id".to_string(), organization_id.to_string())];
        Ok(self.get(url, &params).await?)
    }

    async fn incremental_update(
        &self,
        request: &IncrementalUpdate,
    ) -> cvmanager_core::Result<TaskRef> {
        let url = self.katello("content_view_versions/incremental_update");
        self.post_task(url, request).await
    }

    async fn publish(
        &self,
        content_view: ContentViewId,
        description: &str,
    ) -> cvmanager_core::Result<TaskRef> {
        let url = self.katello(&format!("content_views/{content_view}/publish"));
        self.post_task(url, &json!({ "description": description }))
            .await
    }

    async fn promote(
        &self,
        version: VersionId,
        environment: EnvironmentId,
        force: bool,
        description: &str,
    ) -> cvmanager_core::Result<TaskRef> {
        let url = self.katello(&format!("content_view_versions/{version}/promote"));
        let body = json!({
            "environment_ids": [environment],
            "force": force,
            "description": description,
        });
        self.post_task(url, &body).await
    }

    async fn task(&self, id: &TaskId) -> cvmanager_core::Result<Value> {
        let url = format!("{}/foreman_tasks/api/tasks/{}", self.base, id);
        Ok(self.get(url, &[]).await?)
    }
}
