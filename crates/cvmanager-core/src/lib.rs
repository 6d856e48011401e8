//! cvmanager core library
//!
//! Resolves which content view version sits in each lifecycle environment
//! and drives publish, promote and incremental-update tasks to completion.
//!
//! ## Flow
//!
//! names → [`resolver`] → ids → [`version`] → resolutions →
//! [`scheduler`] → tasks → [`waiter`]

pub mod api;
pub mod error;
pub mod fakes;
pub mod lister;
pub mod model;
pub mod plan;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod telemetry;
pub mod version;
pub mod waiter;

pub use api::ContentApi;
pub use error::{CvmError, Result};
pub use lister::list_all;
pub use model::{
    ContentItems, ContentView, ContentViewId, ContentViewVersion, EnvironmentId, EnvironmentRef,
    IncrementalUpdate, LifecycleEnvironment, NamedResource, Page, Query, RepositoryId,
    ResourceId, ResourceKind, Task, TaskId, TaskRef, VersionEnvironments, VersionId,
};
pub use plan::UpdatePlan;
pub use resolver::{environment_names, LIBRARY};
pub use scheduler::{Operation, OutcomeStatus, UpdateOutcome, UpdateScheduler};
pub use session::{RunOptions, Session, DEFAULT_REQUEST_DELAY};
pub use telemetry::init_tracing;
pub use version::{ambiguous_environments, resolve_environments, resolve_targets, Resolution};
pub use waiter::{Backoff, TaskWaiter, WaitPolicy, WaitReport, WaitState};

/// cvmanager version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
