//! The Content Management API boundary.
//!
//! `ContentApi` is the only way the core talks to the server. The HTTP
//! implementation lives in the `satellite-api` crate; an in-memory fake is
//! provided in [`crate::fakes`] for tests.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::model::{
    ContentViewId, EnvironmentId, IncrementalUpdate, Page, Query, ResourceKind, TaskId, TaskRef,
    VersionId,
};

/// Resource/action operations of the content management server.
///
/// Guarantees expected from implementations:
/// - Every call is a single request; no retries.
/// - Any transport failure or non-success status is returned as an error.
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// List one page of a resource collection.
    async fn index(&self, kind: ResourceKind, query: &Query) -> Result<Page<Value>>;

    /// Fetch the full representation of one resource.
    async fn show(&self, kind: ResourceKind, organization_id: u64, id: u64) -> Result<Value>;

    /// Start an incremental update.
    async fn incremental_update(&self, request: &IncrementalUpdate) -> Result<TaskRef>;

    /// Start a publish of a new version of a content view.
    async fn publish(&self, content_view: ContentViewId, description: &str) -> Result<TaskRef>;

    /// Start a promotion of a version into an environment.
    async fn promote(
        &self,
        version: VersionId,
        environment: EnvironmentId,
        force: bool,
        description: &str,
    ) -> Result<TaskRef>;

    /// Poll a task.
    async fn task(&self, id: &TaskId) -> Result<Value>;
}
