//! Per-run context.
//!
//! A [`Session`] bundles the API handle with the run options. It is built
//! once by the caller and passed by reference into every component, so no
//! component reads ambient state.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::ContentApi;
use crate::error::{CvmError, Result};
use crate::model::{ContentView, ContentViewId, ResourceKind, Task, TaskId};
use crate::waiter::WaitPolicy;

/// Delay inserted between consecutive scheduled requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(10);

/// Options that stay fixed for the whole run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Organization every lookup is scoped to
    pub organization_id: u64,
    /// Description attached to publish/promote/update requests
    pub description: String,
    /// Log what would be submitted without submitting anything
    pub noop: bool,
    pub wait: WaitPolicy,
    /// Server-load throttle between scheduled requests
    pub request_delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            organization_id: 1,
            description: "autopublish".to_string(),
            noop: false,
            wait: WaitPolicy::default(),
            request_delay: DEFAULT_REQUEST_DELAY,
        }
    }
}

impl RunOptions {
    pub fn with_organization(mut self, organization_id: u64) -> Self {
        self.organization_id = organization_id;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }
}

/// API handle plus run options.
#[derive(Clone)]
pub struct Session {
    api: Arc<dyn ContentApi>,
    options: RunOptions,
}

impl Session {
    pub fn new(api: Arc<dyn ContentApi>, options: RunOptions) -> Self {
        Session { api, options }
    }

    pub fn api(&self) -> &dyn ContentApi {
        self.api.as_ref()
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn organization_id(&self) -> u64 {
        self.options.organization_id
    }

    /// Fetch and decode one content view.
    pub async fn content_view(&self, id: ContentViewId) -> Result<ContentView> {
        let raw = self
            .api
            .show(ResourceKind::ContentViews, self.organization_id(), id.0)
            .await?;
        decode(&format!("content view {id}"), raw)
    }

    /// Poll and decode one task.
    pub async fn task(&self, id: &TaskId) -> Result<Task> {
        let raw = self.api.task(id).await?;
        decode(&format!("task {id}"), raw)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Decode a raw response value into a typed record.
pub fn decode<T: DeserializeOwned>(what: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| CvmError::decode(what, e))
}
