//! Admission control for analysis jobs.
//!
//! [`SlotTracker`] decides whether a job may start, [`BoundedJobPool`]
//! runs accepted jobs on a fixed set of worker threads, and [`Job`] /
//! [`JobHandle`] connect the two with the submitter.

mod job;
mod pool;
mod tracker;

pub use job::{CancelToken, Job, JobHandle, JobOutcome, JobState};
pub use pool::{BoundedJobPool, Submission};
pub use tracker::{SlotTracker, TrackedJob};
