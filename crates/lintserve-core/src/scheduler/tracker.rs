//! Slot accounting for concurrent jobs.
//!
//! The tracker is a lazy counter: it only reconciles its live set when
//! asked a question about it. It lives on the control loop and is never
//! shared between threads.

use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// The tracker's entire view of a job.
pub trait TrackedJob {
    /// Whether the job still occupies a slot.
    fn is_active(&self) -> bool;

    /// Ask the job to die. Returns whether the job accepted.
    fn kill(&self) -> bool;
}

/// Counts live jobs against a fixed capacity and preempts the oldest ones
/// on demand.
#[derive(Debug)]
pub struct SlotTracker<J> {
    capacity: usize,
    // oldest first
    jobs: Vec<J>,
}

impl<J: TrackedJob> SlotTracker<J> {
    /// # Errors
    ///
    /// Returns `CoreError::InvalidCapacity` when `capacity` is zero.
    pub fn new(capacity: usize) -> CoreResult<Self> {
        if capacity < 1 {
            return Err(CoreError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            jobs: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every job that no longer runs.
    pub fn refresh(&mut self) {
        self.jobs.retain(|job| job.is_active());
    }

    /// Number of live jobs.
    pub fn count(&mut self) -> usize {
        self.refresh();
        self.jobs.len()
    }

    pub fn has_free_slot(&mut self) -> bool {
        self.count() < self.capacity
    }

    /// Try to make room for exactly one more job by killing the oldest
    /// live jobs.
    ///
    /// Stops at the first job that refuses; jobs killed before it stay
    /// killed and the call reports failure.
    pub fn force_free_slot(&mut self) -> bool {
        if self.has_free_slot() {
            return true;
        }

        let overflow = 1 + self.jobs.len() - self.capacity;
        debug!(overflow, live = self.jobs.len(), "preempting oldest jobs");
        for job in self.jobs.iter().take(overflow) {
            if !job.kill() {
                debug!("preemption refused");
                return false;
            }
        }
        true
    }

    /// Check (and with `force`, make) room for one job.
    ///
    /// Without `force` a full tracker answers `false` and touches nothing.
    pub fn prepare_slot(&mut self, force: bool) -> bool {
        if self.has_free_slot() {
            return true;
        }
        if force {
            self.force_free_slot()
        } else {
            false
        }
    }

    /// Append a job to the live set.
    ///
    /// No capacity check happens here: call [`prepare_slot`](Self::prepare_slot)
    /// first.
    pub fn register(&mut self, job: J) {
        self.jobs.push(job);
    }

    #[cfg(test)]
    pub(crate) fn jobs(&self) -> &[J] {
        &self.jobs
    }
}
