//! # lintserve-core
//!
//! Protocol-independent core of the lintserve language server.
//!
//! Provides:
//! - Admission control for analysis jobs (slot tracking, preemption, a
//!   bounded worker pool)
//! - Versioned document proxies and the path-keyed registry
//! - The analysis gateway around the external engine
//! - Translation of engine results into diagnostics and patches
//! - Strict unified-diff application and whole-document fix edits

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod file_utils;
pub mod fixes;
pub mod fs;
pub mod gateway;
pub mod patch;
pub mod position;
pub(crate) mod regex_util;
pub mod scheduler;

pub use config::{EngineConfig, ServerConfig};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use document::{ChangeRecord, DocumentProxy, DocumentRegistry, UNVERSIONED};
pub use error::{CoreError, CoreResult};
pub use fixes::{FixReport, TextEdit};
pub use fs::{FileSystem, MockFileSystem, RealFileSystem};
pub use gateway::{AnalysisEngine, AnalysisGateway, AnalysisRequest, CommandEngine, EngineOutput};
pub use patch::{Hunk, HunkLine, LineEnding, Patch, PatchError};
pub use position::{Position, Range};
pub use scheduler::{BoundedJobPool, CancelToken, JobHandle, JobOutcome, Submission};
