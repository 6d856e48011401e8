//! In-memory fake of the Content Management API (testing only)
//!
//! `MemoryContentApi` serves index/show calls from a record catalog with a
//! configurable page size, hands out task ids for every submission and
//! reports each task as pending for a scripted number of polls. Every call
//! is logged with the (tokio) instant it was made.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::api::ContentApi;
use crate::error::{CvmError, Result};
use crate::model::{
    ContentViewId, EnvironmentId, IncrementalUpdate, Page, Query, ResourceKind, TaskId, TaskRef,
    VersionId,
};

/// A call received by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    Index {
        kind: ResourceKind,
        page: u32,
        per_page: Option<u32>,
        filters: BTreeMap<String, String>,
    },
    Show {
        kind: ResourceKind,
        id: u64,
    },
    IncrementalUpdate(IncrementalUpdate),
    Publish {
        content_view: ContentViewId,
        description: String,
    },
    Promote {
        version: VersionId,
        environment: EnvironmentId,
        force: bool,
    },
    Task(TaskId),
}

#[derive(Debug)]
struct TaskScript {
    /// `None` keeps the task pending forever
    pending_polls: Option<u32>,
    result: String,
}

#[derive(Debug)]
struct FakeState {
    page_size: u32,
    task_polls: u32,
    task_result: String,
    unreachable: bool,
    records: HashMap<ResourceKind, Vec<Value>>,
    tasks: HashMap<TaskId, TaskScript>,
    next_task: u64,
    calls: Vec<(Instant, ApiCall)>,
}

/// In-memory `ContentApi`.
#[derive(Debug)]
pub struct MemoryContentApi {
    state: Mutex<FakeState>,
}

impl Default for MemoryContentApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryContentApi {
    pub fn new() -> Self {
        MemoryContentApi {
            state: Mutex::new(FakeState {
                page_size: 20,
                task_polls: 1,
                task_result: "success".to_string(),
                unreachable: false,
                records: HashMap::new(),
                tasks: HashMap::new(),
                next_task: 1,
                calls: Vec::new(),
            }),
        }
    }

    /// Default page size reported by index calls.
    pub fn with_page_size(self, page_size: u32) -> Self {
        self.state.lock().unwrap().page_size = page_size;
        self
    }

    /// Number of polls a newly submitted task reports as pending.
    pub fn with_task_polls(self, polls: u32) -> Self {
        self.state.lock().unwrap().task_polls = polls;
        self
    }

    /// Result reported by newly submitted tasks once they finish.
    pub fn with_task_result(self, result: &str) -> Self {
        self.state.lock().unwrap().task_result = result.to_string();
        self
    }

    /// Add a record to a resource collection.
    pub fn insert(&self, kind: ResourceKind, record: Value) {
        let mut state = self.state.lock().unwrap();
        state.records.entry(kind).or_default().push(record);
    }

    /// Register an existing task; `None` keeps it pending forever.
    pub fn add_task(&self, id: &str, pending_polls: Option<u32>) {
        self.add_task_with_result(id, pending_polls, "success");
    }

    pub fn add_task_with_result(&self, id: &str, pending_polls: Option<u32>, result: &str) {
        let mut state = self.state.lock().unwrap();
        state.tasks.insert(
            TaskId::new(id),
            TaskScript {
                pending_polls,
                result: result.to_string(),
            },
        );
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unwrap().unreachable = unreachable;
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        let state = self.state.lock().unwrap();
        state.calls.iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, ApiCall)> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: ApiCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((Instant::now(), call));
        if state.unreachable {
            return Err(CvmError::Transport("connection refused".to_string()));
        }
        Ok(())
    }

    fn submit(&self) -> TaskRef {
        let mut state = self.state.lock().unwrap();
        let id = TaskId::new(format!("task-{}", state.next_task));
        state.next_task += 1;
        let script = TaskScript {
            pending_polls: Some(state.task_polls),
            result: state.task_result.clone(),
        };
        state.tasks.insert(id.clone(), script);
        TaskRef { id }
    }
}

fn field_matches(record: &Value, key: &str, expected: &str) -> bool {
    match record.get(key) {
        None => true,
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
    }
}

#[async_trait]
impl ContentApi for MemoryContentApi {
    async fn index(&self, kind: ResourceKind, query: &Query) -> Result<Page<Value>> {
        self.record(ApiCall::Index {
            kind,
            page: query.page,
            per_page: query.per_page,
            filters: query.filters.clone(),
        })?;

        let state = self.state.lock().unwrap();
        let matching: Vec<&Value> = state
            .records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| {
                        query
                            .filters
                            .iter()
                            .all(|(k, v)| field_matches(r, k, v))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let per_page = query.per_page.unwrap_or(state.page_size);
        let start = (query.page.saturating_sub(1) as usize).saturating_mul(per_page as usize);
        let results = matching
            .iter()
            .skip(start)
            .take(per_page as usize)
            .map(|v| (*v).clone())
            .collect();

        Ok(Page {
            results,
            page: query.page,
            per_page,
            total: matching.len() as u64,
        })
    }

    async fn show(&self, kind: ResourceKind, _organization_id: u64, id: u64) -> Result<Value> {
        self.record(ApiCall::Show { kind, id })?;

        let state = self.state.lock().unwrap();
        state
            .records
            .get(&kind)
            .and_then(|records| records.iter().find(|r| r.get("id") == Some(&json!(id))))
            .cloned()
            .ok_or_else(|| CvmError::Transport(format!("404 Not Found: {kind} {id}")))
    }

    async fn incremental_update(&self, request: &IncrementalUpdate) -> Result<TaskRef> {
        self.record(ApiCall::IncrementalUpdate(request.clone()))?;
        Ok(self.submit())
    }

    async fn publish(&self, content_view: ContentViewId, description: &str) -> Result<TaskRef> {
        self.record(ApiCall::Publish {
            content_view,
            description: description.to_string(),
        })?;
        Ok(self.submit())
    }

    async fn promote(
        &self,
        version: VersionId,
        environment: EnvironmentId,
        force: bool,
        _description: &str,
    ) -> Result<TaskRef> {
        self.record(ApiCall::Promote {
            version,
            environment,
            force,
        })?;
        Ok(self.submit())
    }

    async fn task(&self, id: &TaskId) -> Result<Value> {
        self.record(ApiCall::Task(id.clone()))?;

        let mut state = self.state.lock().unwrap();
        let script = state
            .tasks
            .get_mut(id)
            .ok_or_else(|| CvmError::Transport(format!("404 Not Found: task {id}")))?;

        let pending = match script.pending_polls.as_mut() {
            None => true,
            Some(0) => false,
            Some(n) => {
                *n -= 1;
                true
            }
        };
        let (state_name, result) = if pending {
            ("running", "pending")
        } else {
            ("stopped", script.result.as_str())
        };

        Ok(json!({
            "id": id,
            "pending": pending,
            "state": state_name,
            "result": result,
        }))
    }
}
