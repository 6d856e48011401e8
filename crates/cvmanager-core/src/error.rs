//! Error taxonomy for cvmanager.

use crate::model::{ContentViewId, EnvironmentId, ResourceKind, TaskId};

/// Errors produced while resolving content view versions or driving tasks.
#[derive(Debug, thiserror::Error)]
pub enum CvmError {
    /// A name lookup matched nothing
    #[error("couldn't find any {kind} with name: {name}")]
    NotFound { kind: ResourceKind, name: String },

    /// A name lookup matched more than one resource
    #[error("too many {kind} named {name} ({count} matches), specify further")]
    AmbiguousName {
        kind: ResourceKind,
        name: String,
        count: usize,
    },

    /// The API could not be reached or answered with a failure status
    #[error("transport error: {0}")]
    Transport(String),

    /// A response did not match the expected record shape
    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// A version string is not a number
    #[error("content view {content_view} has unparseable version {version:?}")]
    InvalidVersion {
        content_view: ContentViewId,
        version: String,
    },

    /// Two versions with the same number claim the same environment
    #[error(
        "content view {content_view} has more than one version {version} in environment {environment}"
    )]
    AmbiguousVersion {
        content_view: ContentViewId,
        environment: EnvironmentId,
        version: String,
    },

    /// A composite view (transitively) contains itself
    #[error("composite content view cycle through content view {0}")]
    CompositeCycle(ContentViewId),

    /// The wait deadline passed with tasks still pending
    #[error("gave up after {elapsed_secs}s waiting for tasks: {}", join_tasks(.pending))]
    WaitTimedOut {
        pending: Vec<TaskId>,
        elapsed_secs: u64,
    },

    /// The wait was interrupted
    #[error("wait cancelled with tasks still pending: {}", join_tasks(.pending))]
    WaitCancelled { pending: Vec<TaskId> },

    /// Caller supplied unusable input
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CvmError {
    /// Build a decode error for a serde failure on `what`.
    pub fn decode(what: impl Into<String>, err: serde_json::Error) -> Self {
        CvmError::Decode {
            what: what.into(),
            message: err.to_string(),
        }
    }
}

fn join_tasks(tasks: &[TaskId]) -> String {
    tasks
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type for cvmanager operations.
pub type Result<T> = std::result::Result<T, CvmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_kind_and_name() {
        let err = CvmError::NotFound {
            kind: ResourceKind::Repositories,
            name: "repo-puppet-deps-rpms".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("repositories"));
        assert!(msg.contains("repo-puppet-deps-rpms"));
    }

    #[test]
    fn test_ambiguous_name_asks_to_narrow() {
        let err = CvmError::AmbiguousName {
            kind: ResourceKind::ContentViews,
            name: "cv-base".to_string(),
            count: 2,
        };
        assert!(err.to_string().contains("specify further"));
    }

    #[test]
    fn test_wait_errors_list_pending_tasks() {
        let err = CvmError::WaitTimedOut {
            pending: vec![TaskId::new("a1"), TaskId::new("b2")],
            elapsed_secs: 600,
        };
        let msg = err.to_string();
        assert!(msg.contains("a1, b2"));
        assert!(msg.contains("600s"));

        let err = CvmError::WaitCancelled {
            pending: vec![TaskId::new("c3")],
        };
        assert!(err.to_string().contains("c3"));
    }
}
