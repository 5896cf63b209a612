//! Guarded file reading for document content.
//!
//! Documents are loaded from disk when an editor has not sent their text
//! yet and when fixes are computed. Only regular files under a size limit
//! are read. Symlinks are followed.

use crate::error::{CoreError, CoreResult};
use std::fs;
use std::path::Path;

/// Default maximum file size (8 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 8 * 1_048_576;

/// Read a file with the default size limit.
///
/// # Errors
///
/// Returns `CoreError::FileNotRegular` if the path is not a regular file,
/// `CoreError::FileTooBig` if it exceeds the limit and
/// `CoreError::FileRead` for other I/O errors (including a missing file,
/// see [`CoreError::is_not_found`]).
pub fn safe_read_file(path: &Path) -> CoreResult<String> {
    safe_read_file_with_limit(path, DEFAULT_MAX_FILE_SIZE)
}

/// Read a file with a custom size limit.
///
/// Files of exactly `max_size` bytes are accepted.
pub fn safe_read_file_with_limit(path: &Path, max_size: u64) -> CoreResult<String> {
    let metadata = fs::metadata(path).map_err(|e| CoreError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    if !metadata.is_file() {
        return Err(CoreError::FileNotRegular {
            path: path.to_path_buf(),
        });
    }

    let size = metadata.len();
    if size > max_size {
        return Err(CoreError::FileTooBig {
            path: path.to_path_buf(),
            size,
            limit: max_size,
        });
    }

    fs::read_to_string(path).map_err(|e| CoreError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}
