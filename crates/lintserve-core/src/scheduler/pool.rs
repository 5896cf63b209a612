//! Fixed-size worker pool gated by a [`SlotTracker`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::job::{CancelToken, Job, JobHandle, JobOutcome};
use super::tracker::SlotTracker;
use crate::error::{CoreError, CoreResult};

/// Result of [`BoundedJobPool::submit`].
#[derive(Debug)]
pub enum Submission<T> {
    Accepted(JobHandle<T>),
    /// No slot was available (or could be forced free); nothing was queued.
    Rejected,
}

impl<T> Submission<T> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Submission::Rejected)
    }

    pub fn accepted(self) -> Option<JobHandle<T>> {
        match self {
            Submission::Accepted(handle) => Some(handle),
            Submission::Rejected => None,
        }
    }
}

/// Number of submitted jobs whose worker closure has not returned yet.
#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn enter(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Admission-controlled worker pool.
///
/// Owned by the control loop. `submit` never blocks: it either queues the
/// work and hands back a [`JobHandle`] or returns [`Submission::Rejected`].
#[derive(Debug)]
pub struct BoundedJobPool {
    workers: Option<rayon::ThreadPool>,
    tracker: SlotTracker<Job>,
    in_flight: Arc<InFlight>,
}

impl BoundedJobPool {
    /// # Errors
    ///
    /// Fails on `max_jobs == 0`, `max_workers == 0` or when the worker
    /// threads cannot be spawned.
    pub fn new(max_jobs: usize, max_workers: usize) -> CoreResult<Self> {
        let tracker = SlotTracker::new(max_jobs)?;
        if max_workers < 1 {
            return Err(CoreError::InvalidWorkers(max_workers));
        }
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("lintserve-worker-{i}"))
            .build()
            .map_err(CoreError::WorkerPool)?;

        debug!(max_jobs, max_workers, "worker pool started");
        Ok(Self {
            workers: Some(workers),
            tracker,
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Queue `work` if a slot is free, preempting the oldest jobs when
    /// `force` is set.
    ///
    /// The closure runs on a pool thread and must own everything it
    /// touches. It receives the job's [`CancelToken`]; if cancellation was
    /// requested by the time it returns, the outcome is
    /// [`JobOutcome::Cancelled`]. A panic becomes [`JobOutcome::Failed`].
    pub fn submit<T, F>(&mut self, work: F, force: bool) -> Submission<T>
    where
        F: FnOnce(&CancelToken) -> T + Send + 'static,
        T: Send + 'static,
    {
        let Some(workers) = self.workers.as_ref() else {
            debug!("submission after shutdown rejected");
            return Submission::Rejected;
        };

        if !self.tracker.prepare_slot(force) {
            debug!(force, "no free slot, submission rejected");
            return Submission::Rejected;
        }

        let job = Job::new();
        let (tx, rx) = oneshot::channel();
        let worker_job = job.clone();
        let in_flight = Arc::clone(&self.in_flight);

        in_flight.enter();
        workers.spawn(move || {
            let outcome = run_job(&worker_job, work);
            // receiver may be gone; nobody is listening then
            let _ = tx.send(outcome);
            in_flight.leave();
        });

        self.tracker.register(job.clone());
        Submission::Accepted(JobHandle::new(job, rx))
    }

    /// Number of jobs currently holding a slot.
    pub fn live_jobs(&mut self) -> usize {
        self.tracker.count()
    }

    pub fn capacity(&self) -> usize {
        self.tracker.capacity()
    }

    pub fn is_shut_down(&self) -> bool {
        self.workers.is_none()
    }

    /// Stop accepting work and release the worker threads.
    ///
    /// With `wait`, blocks until every submitted job has resolved. Without
    /// it, returns at once; queued and running jobs still run to completion
    /// in the background and their handles still resolve. Calling this
    /// again is a no-op.
    pub fn shutdown(&mut self, wait: bool) {
        let Some(workers) = self.workers.take() else {
            return;
        };
        drop(workers);

        if wait {
            info!("waiting for in-flight analysis jobs");
            self.in_flight.wait_idle();
        }
        info!(wait, "worker pool shut down");
    }
}

fn run_job<T, F>(job: &Job, work: F) -> JobOutcome<T>
where
    F: FnOnce(&CancelToken) -> T,
{
    if !job.try_start() {
        return JobOutcome::Cancelled;
    }

    let token = job.token();
    let result = panic::catch_unwind(AssertUnwindSafe(|| work(&token)));
    job.mark_finished();

    match result {
        Ok(_) if token.is_cancelled() => JobOutcome::Cancelled,
        Ok(value) => JobOutcome::Completed(value),
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(job = job.id(), %reason, "job panicked");
            JobOutcome::Failed(reason)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_string()
    }
}
