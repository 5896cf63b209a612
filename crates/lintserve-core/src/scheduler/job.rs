//! Job handles for pooled analysis runs.
//!
//! A [`Job`] is the shared state of one submitted unit of work. The pool's
//! worker, the [`SlotTracker`](super::SlotTracker) and the submitter all
//! hold clones of it. The result travels separately, through the one-shot
//! promise inside [`JobHandle`], so the tracker only ever sees liveness
//! and cancellation.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::TrackedJob;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const FINISHED: u8 = 2;
const CANCELLED: u8 = 3;

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Queued on the pool, not started yet
    Pending,
    /// A worker is executing it
    Running,
    /// Work returned (with a value, a cancellation or a failure)
    Finished,
    /// Cancelled before a worker picked it up; it will never run
    Cancelled,
}

/// Cooperative cancellation flag handed to running work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    requested: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct JobInner {
    id: u64,
    state: AtomicU8,
    token: CancelToken,
    preempt_requested: AtomicBool,
}

/// Shared state of one scheduled execution.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct Job {
    inner: Arc<JobInner>,
}

impl Job {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(JobInner {
                id: NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed),
                state: AtomicU8::new(PENDING),
                token: CancelToken::new(),
                preempt_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Process-unique id, useful in logs.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn state(&self) -> JobState {
        match self.inner.state.load(Ordering::SeqCst) {
            PENDING => JobState::Pending,
            RUNNING => JobState::Running,
            FINISHED => JobState::Finished,
            _ => JobState::Cancelled,
        }
    }

    /// Not yet resolved: pending or running.
    pub fn is_running(&self) -> bool {
        matches!(self.state(), JobState::Pending | JobState::Running)
    }

    /// Whether anyone has asked this job to stop, by cancelling or
    /// preempting it.
    pub fn cancel_requested(&self) -> bool {
        self.inner.token.is_cancelled() || self.inner.preempt_requested.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    ///
    /// The request is always recorded (and forwarded to running work via
    /// its [`CancelToken`]). Returns `true` only when the job is
    /// guaranteed not to produce a result: it was still pending, or it was
    /// already cancelled. A running or finished job refuses.
    pub fn cancel(&self) -> bool {
        self.inner.token.cancel();
        match self.inner.state.compare_exchange(
            PENDING,
            CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => true,
            Err(current) => current == CANCELLED,
        }
    }

    /// Withdraw the job if it has not started.
    ///
    /// Unlike [`cancel`](Self::cancel) this never reaches running work: a
    /// running job keeps going and the preemption is refused. The request
    /// is still recorded.
    pub fn preempt(&self) -> bool {
        self.inner.preempt_requested.store(true, Ordering::SeqCst);
        match self.inner.state.compare_exchange(
            PENDING,
            CANCELLED,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                self.inner.token.cancel();
                true
            }
            Err(current) => current == CANCELLED,
        }
    }

    pub(crate) fn token(&self) -> CancelToken {
        self.inner.token.clone()
    }

    /// Claim the job for execution. Fails if it was cancelled while queued.
    pub(crate) fn try_start(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn mark_finished(&self) {
        self.inner.state.store(FINISHED, Ordering::SeqCst);
    }
}

impl TrackedJob for Job {
    fn is_active(&self) -> bool {
        self.is_running()
    }

    fn kill(&self) -> bool {
        self.preempt()
    }
}

/// Tagged completion value of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<T> {
    /// The work ran to completion and produced a value
    Completed(T),
    /// Cancelled before it ran, or stopped after observing its cancel token
    Cancelled,
    /// The work panicked or its worker disappeared
    Failed(String),
}

impl<T> JobOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            JobOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

/// Handle returned for an accepted submission.
///
/// Owns the receiving side of the completion promise; the outcome can be
/// awaited from async code or waited on from a plain thread.
pub struct JobHandle<T> {
    job: Job,
    outcome: oneshot::Receiver<JobOutcome<T>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(job: Job, outcome: oneshot::Receiver<JobOutcome<T>>) -> Self {
        Self { job, outcome }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Resolve the outcome asynchronously.
    pub async fn outcome(self) -> JobOutcome<T> {
        self.outcome
            .await
            .unwrap_or_else(|_| JobOutcome::Failed("worker dropped the job".to_string()))
    }

    /// Block the current thread until the job resolves.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> JobOutcome<T> {
        self.outcome
            .blocking_recv()
            .unwrap_or_else(|_| JobOutcome::Failed("worker dropped the job".to_string()))
    }
}

impl<T> fmt::Debug for JobHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle").field("job", &self.job).finish()
    }
}
