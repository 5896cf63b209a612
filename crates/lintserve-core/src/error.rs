//! Error types shared by the scheduler, document and analysis layers.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised by lintserve-core.
///
/// Scheduler rejections are not errors (see [`crate::scheduler::Submission`])
/// and patch failures have their own type ([`crate::patch::PatchError`]).
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("slot capacity must be at least 1, got {0}")]
    InvalidCapacity(usize),

    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkers(usize),

    #[error("Failed to start worker pool")]
    WorkerPool(#[source] rayon::ThreadPoolBuildError),

    #[error("document path must be absolute: {path}")]
    RelativePath { path: PathBuf },

    #[error("document path names a directory: {path}")]
    DirectoryPath { path: PathBuf },

    #[error("Failed to read file: {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Not a regular file: {path}")]
    FileNotRegular { path: PathBuf },

    #[error("File too large: {path} ({size} bytes, limit {limit} bytes)")]
    FileTooBig { path: PathBuf, size: u64, limit: u64 },

    #[error("Failed to start analysis engine `{program}`")]
    EngineSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("analysis was cancelled")]
    EngineCancelled,

    #[error("Malformed analysis result")]
    EngineOutput(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl CoreError {
    /// True when the error means the file simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::FileRead { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }
}
