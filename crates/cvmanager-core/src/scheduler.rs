//! Sequential submission of server-side operations.
//!
//! [`UpdateScheduler`] submits one request at a time and blocks on the task
//! waiter before the next one. Consecutive requests of a sequence are
//! separated by the session's request delay to keep server load down.

use std::fmt;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{CvmError, Result};
use crate::model::{
    ContentItems, ContentView, ContentViewId, EnvironmentId, IncrementalUpdate, TaskId, TaskRef,
    VersionId,
};
use crate::session::Session;
use crate::version::Resolution;
use crate::waiter::TaskWaiter;

/// What a scheduled request does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Operation {
    IncrementalUpdate {
        version: VersionId,
        environment: EnvironmentId,
    },
    Publish {
        content_view: ContentViewId,
    },
    Promote {
        version: VersionId,
        environment: EnvironmentId,
    },
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::IncrementalUpdate {
                version,
                environment,
            } => write!(
                f,
                "incremental update of version {version} in environment {environment}"
            ),
            Operation::Publish { content_view } => {
                write!(f, "publish of content view {content_view}")
            }
            Operation::Promote {
                version,
                environment,
            } => write!(f, "promotion of version {version} to environment {environment}"),
        }
    }
}

/// How far a scheduled request got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Task submitted and finished successfully
    Completed,
    /// Task finished with a result other than `success`
    Failed,
    /// Task submitted, waiting disabled
    Submitted,
    /// Noop run, nothing submitted
    Skipped,
}

/// Record of one scheduled request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub operation: Operation,
    pub task: Option<TaskId>,
    pub status: OutcomeStatus,
    /// Server-reported task result when it was not `success`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Submits operations one by one through a session.
pub struct UpdateScheduler<'a> {
    session: &'a Session,
}

impl<'a> UpdateScheduler<'a> {
    pub fn new(session: &'a Session) -> Self {
        UpdateScheduler { session }
    }

    /// Submit one incremental update per resolution, in order.
    ///
    /// Each request waits for its task before the next is submitted, with
    /// the request delay in between.
    pub async fn incremental_updates(
        &self,
        targets: &[Resolution],
        content: &ContentItems,
    ) -> Result<Vec<UpdateOutcome>> {
        if content.is_empty() {
            return Err(CvmError::InvalidInput(
                "no packages or errata to add".to_string(),
            ));
        }

        let description = &self.session.options().description;
        let mut outcomes = Vec::with_capacity(targets.len());
        for (i, target) in targets.iter().enumerate() {
            if i > 0 {
                self.throttle().await;
            }
            info!(
                content_view = %target.content_view_name,
                version = %target.version,
                environment = %target.environment_id,
                "adding content to version"
            );
            let request = IncrementalUpdate::single(
                target.version_id,
                target.environment_id,
                content.clone(),
                description.as_str(),
            );
            let operation = Operation::IncrementalUpdate {
                version: target.version_id,
                environment: target.environment_id,
            };
            let api = self.session.api();
            let outcome = self
                .execute(operation, async { api.incremental_update(&request).await })
                .await?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Publish a new version of `cv`.
    pub async fn publish(&self, cv: &ContentView) -> Result<UpdateOutcome> {
        info!(content_view = %cv.name, "publishing content view");
        let description = self.session.options().description.as_str();
        let api = self.session.api();
        self.execute(
            Operation::Publish {
                content_view: cv.id,
            },
            async { api.publish(cv.id, description).await },
        )
        .await
    }

    /// Promote `version` into `environment`.
    pub async fn promote(
        &self,
        version: VersionId,
        environment: EnvironmentId,
        force: bool,
    ) -> Result<UpdateOutcome> {
        info!(version = %version, environment = %environment, force, "promoting version");
        let description = self.session.options().description.as_str();
        let api = self.session.api();
        self.execute(
            Operation::Promote {
                version,
                environment,
            },
            async { api.promote(version, environment, force, description).await },
        )
        .await
    }

    async fn execute<F>(&self, operation: Operation, submit: F) -> Result<UpdateOutcome>
    where
        F: Future<Output = Result<TaskRef>>,
    {
        let started_at = Utc::now();
        if self.session.options().noop {
            info!("noop: would submit {operation}");
            return Ok(UpdateOutcome {
                operation,
                task: None,
                status: OutcomeStatus::Skipped,
                result: None,
                started_at,
                finished_at: Utc::now(),
            });
        }

        let task = submit.await?.id;
        debug!(task = %task, "submitted {operation}");

        let report = TaskWaiter::new(self.session)
            .wait([task.clone()])
            .await?;
        let result = report.failure(&task).map(str::to_string);
        let status = match (&result, report.is_finished()) {
            (Some(_), _) => OutcomeStatus::Failed,
            (None, true) => OutcomeStatus::Completed,
            (None, false) => OutcomeStatus::Submitted,
        };

        Ok(UpdateOutcome {
            operation,
            task: Some(task),
            status,
            result,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn throttle(&self) {
        if self.session.options().noop {
            return;
        }
        let delay = self.session.options().request_delay;
        debug!("sleeping {}s before next request", delay.as_secs());
        sleep(delay).await;
    }
}
