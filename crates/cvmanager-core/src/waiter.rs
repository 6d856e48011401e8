//! Task completion tracking.
//!
//! [`TaskWaiter`] polls a working set of task ids until none is pending.
//! The sleep between polls grows linearly (10s, 20s, ... capped at 60s).
//! Once the cap is reached and a poll round leaves the working set
//! unchanged, the "waiting" line is silenced until the set changes again.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::error::{CvmError, Result};
use crate::model::TaskId;
use crate::session::Session;

pub const BACKOFF_STEP: Duration = Duration::from_secs(10);
pub const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// How (and whether) started tasks are waited for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPolicy {
    /// When false, waiting returns the tasks untouched (fire-and-forget)
    pub enabled: bool,
    pub step: Duration,
    pub cap: Duration,
    /// No deadline when `None`
    pub timeout: Option<Duration>,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        WaitPolicy {
            enabled: false,
            step: BACKOFF_STEP,
            cap: BACKOFF_CAP,
            timeout: None,
        }
    }
}

impl WaitPolicy {
    /// Waiting enabled, default backoff, no deadline.
    pub fn blocking() -> Self {
        WaitPolicy {
            enabled: true,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Linear backoff capped at a maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    step: Duration,
    cap: Duration,
}

impl Backoff {
    pub fn new(step: Duration, cap: Duration) -> Self {
        Backoff {
            current: Duration::ZERO,
            step,
            cap,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn at_cap(&self) -> bool {
        self.current >= self.cap
    }
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.current = (self.current + self.step).min(self.cap);
        Some(self.current)
    }
}

/// Working set plus silence flag of one wait loop.
#[derive(Debug, Clone)]
pub struct WaitState {
    pending: BTreeSet<TaskId>,
    backoff: Backoff,
    silence: bool,
}

impl WaitState {
    pub fn new(tasks: impl IntoIterator<Item = TaskId>, policy: &WaitPolicy) -> Self {
        WaitState {
            pending: tasks.into_iter().collect(),
            backoff: Backoff::new(policy.step, policy.cap),
            silence: false,
        }
    }

    pub fn pending(&self) -> &BTreeSet<TaskId> {
        &self.pending
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.silence
    }

    /// Advance the backoff and return how long to sleep before polling.
    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next().unwrap_or(self.backoff.cap)
    }

    /// Record the tasks still pending after a poll round.
    ///
    /// Returns `true` when this round switched output to silent.
    pub fn observe(&mut self, still_pending: BTreeSet<TaskId>) -> bool {
        let unchanged = still_pending == self.pending;
        self.pending = still_pending;
        let was_silent = self.silence;
        self.silence = self.backoff.at_cap() && unchanged;
        self.silence && !was_silent
    }
}

/// What a wait left behind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitReport {
    /// Tasks still running; only non-empty when waiting is disabled
    pub pending: BTreeSet<TaskId>,
    /// Finished tasks whose result was not `success`, with that result
    pub failed: BTreeMap<TaskId, String>,
}

impl WaitReport {
    pub fn is_finished(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn failure(&self, task: &TaskId) -> Option<&str> {
        self.failed.get(task).map(String::as_str)
    }
}

/// Polls tasks of a session until they finish.
pub struct TaskWaiter<'a> {
    session: &'a Session,
}

impl<'a> TaskWaiter<'a> {
    pub fn new(session: &'a Session) -> Self {
        TaskWaiter { session }
    }

    /// Wait until every task has left the pending state.
    ///
    /// The report lists no pending task once everything finished, or the
    /// input unchanged when waiting is disabled.
    pub async fn wait(&self, tasks: impl IntoIterator<Item = TaskId>) -> Result<WaitReport> {
        self.wait_until(tasks, std::future::pending::<()>()).await
    }

    /// Like [`TaskWaiter::wait`], but gives up with
    /// [`CvmError::WaitCancelled`] as soon as `cancel` completes.
    pub async fn wait_until<F>(
        &self,
        tasks: impl IntoIterator<Item = TaskId>,
        cancel: F,
    ) -> Result<WaitReport>
    where
        F: Future<Output = ()>,
    {
        let policy = &self.session.options().wait;
        let mut state = WaitState::new(tasks, policy);
        if !policy.enabled {
            return Ok(WaitReport {
                pending: state.pending,
                failed: BTreeMap::new(),
            });
        }

        tokio::pin!(cancel);
        let started = Instant::now();
        let mut failed = BTreeMap::new();

        while !state.is_idle() {
            let mut delay = state.next_delay();
            if !state.is_silent() {
                info!(
                    "waiting {}s for pending tasks: {}",
                    delay.as_secs(),
                    join(state.pending())
                );
            }
            if let Some(timeout) = policy.timeout {
                delay = delay.min(timeout.saturating_sub(started.elapsed()));
            }

            tokio::select! {
                _ = sleep(delay) => {}
                _ = &mut cancel => {
                    return Err(CvmError::WaitCancelled {
                        pending: state.pending.into_iter().collect(),
                    });
                }
            }

            let still_pending = self.poll(state.pending(), &mut failed).await?;
            if state.observe(still_pending) {
                info!("silencing output until there's a task status change...");
            }

            if let Some(timeout) = policy.timeout {
                if !state.is_idle() && started.elapsed() >= timeout {
                    return Err(CvmError::WaitTimedOut {
                        pending: state.pending.into_iter().collect(),
                        elapsed_secs: started.elapsed().as_secs(),
                    });
                }
            }
        }

        Ok(WaitReport {
            pending: state.pending,
            failed,
        })
    }

    async fn poll(
        &self,
        pending: &BTreeSet<TaskId>,
        failed: &mut BTreeMap<TaskId, String>,
    ) -> Result<BTreeSet<TaskId>> {
        let mut still_pending = BTreeSet::new();
        for id in pending {
            let task = self.session.task(id).await?;
            if task.pending {
                still_pending.insert(id.clone());
            } else if task.finished_unsuccessfully() {
                let result = task.result.unwrap_or_default();
                warn!(task = %id, result = %result, "task finished without success");
                failed.insert(id.clone(), result);
            } else {
                debug!(task = %id, "task finished");
            }
        }
        Ok(still_pending)
    }
}

fn join(tasks: &BTreeSet<TaskId>) -> String {
    tasks
        .iter()
        .map(TaskId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{ApiCall, MemoryContentApi};
    use crate::session::RunOptions;
    use std::sync::Arc;

    fn ids(names: &[&str]) -> BTreeSet<TaskId> {
        names.iter().map(|n| TaskId::new(*n)).collect()
    }

    fn waiting_session(api: Arc<MemoryContentApi>, policy: WaitPolicy) -> Session {
        Session::new(api, RunOptions::default().with_wait(policy))
    }

    #[test]
    fn test_backoff_sequence() {
        let delays: Vec<u64> = Backoff::new(BACKOFF_STEP, BACKOFF_CAP)
            .take(9)
            .map(|d| d.as_secs())
            .collect();
        assert_eq!(delays, vec![10, 20, 30, 40, 50, 60, 60, 60, 60]);
    }

    #[test]
    fn test_silence_needs_cap_and_unchanged_set() {
        let policy = WaitPolicy::blocking();
        let mut state = WaitState::new(ids(&["a", "b"]), &policy);

        // below the cap an unchanged set does not silence
        for _ in 0..5 {
            state.next_delay();
            assert!(!state.observe(ids(&["a", "b"])));
            assert!(!state.is_silent());
        }

        state.next_delay();
        assert!(state.observe(ids(&["b", "a"])));
        assert!(state.is_silent());

        // staying silent is not a new transition
        state.next_delay();
        assert!(!state.observe(ids(&["a", "b"])));
        assert!(state.is_silent());

        state.next_delay();
        assert!(!state.observe(ids(&["b"])));
        assert!(!state.is_silent());

        state.next_delay();
        assert!(state.observe(ids(&["b"])));

        state.next_delay();
        state.observe(BTreeSet::new());
        assert!(!state.is_silent());
        assert!(state.is_idle());
    }

    #[tokio::test]
    async fn test_disabled_wait_returns_tasks_untouched() {
        let api = Arc::new(MemoryContentApi::new());
        let session = waiting_session(api.clone(), WaitPolicy::default());

        let left = TaskWaiter::new(&session)
            .wait(ids(&["x", "y"]))
            .await
            .unwrap();
        assert_eq!(left.pending, ids(&["x", "y"]));
        assert!(left.failed.is_empty());
        assert!(api.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_intervals_follow_backoff() {
        let api = Arc::new(MemoryContentApi::new());
        api.add_task("slow", Some(8));
        let session = waiting_session(api.clone(), WaitPolicy::blocking());

        let start = Instant::now();
        let left = TaskWaiter::new(&session).wait(ids(&["slow"])).await.unwrap();
        assert!(left.is_finished());

        let offsets: Vec<u64> = api
            .timed_calls()
            .into_iter()
            .map(|(at, _)| (at - start).as_secs())
            .collect();
        let mut previous = 0;
        let intervals: Vec<u64> = offsets
            .iter()
            .map(|&t| {
                let gap = t - previous;
                previous = t;
                gap
            })
            .collect();
        assert_eq!(intervals, vec![10, 20, 30, 40, 50, 60, 60, 60, 60]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tasks_leave_the_working_set() {
        let api = Arc::new(MemoryContentApi::new());
        api.add_task("quick", Some(0));
        api.add_task_with_result("slow", Some(2), "warning");
        let session = waiting_session(api.clone(), WaitPolicy::blocking());

        let report = TaskWaiter::new(&session)
            .wait(ids(&["quick", "slow"]))
            .await
            .unwrap();
        assert!(report.is_finished());
        assert_eq!(report.failure(&TaskId::new("slow")), Some("warning"));
        assert_eq!(report.failure(&TaskId::new("quick")), None);

        let polled: Vec<String> = api
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ApiCall::Task(id) => Some(id.as_str().to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(polled, vec!["quick", "slow", "slow", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_pending_tasks() {
        let api = Arc::new(MemoryContentApi::new());
        api.add_task("stuck", None);
        let policy = WaitPolicy::blocking().with_timeout(Some(Duration::from_secs(100)));
        let session = waiting_session(api, policy);

        let err = TaskWaiter::new(&session)
            .wait(ids(&["stuck"]))
            .await
            .unwrap_err();
        match err {
            CvmError::WaitTimedOut {
                pending,
                elapsed_secs,
            } => {
                assert_eq!(pending, vec![TaskId::new("stuck")]);
                assert_eq!(elapsed_secs, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_sleep() {
        let api = Arc::new(MemoryContentApi::new());
        api.add_task("stuck", None);
        let session = waiting_session(api.clone(), WaitPolicy::blocking());

        let err = TaskWaiter::new(&session)
            .wait_until(ids(&["stuck"]), sleep(Duration::from_secs(25)))
            .await
            .unwrap_err();
        assert!(matches!(err, CvmError::WaitCancelled { .. }));
        // polled once at 10s, cancelled during the 20s sleep
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_error_aborts_wait() {
        let api = Arc::new(MemoryContentApi::new());
        api.add_task("t", Some(3));
        api.set_unreachable(true);
        let session = waiting_session(api, WaitPolicy::blocking());

        let err = TaskWaiter::new(&session).wait(ids(&["t"])).await.unwrap_err();
        assert!(matches!(err, CvmError::Transport(_)));
    }
}
