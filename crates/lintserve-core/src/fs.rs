//! FileSystem abstraction for testability
//!
//! Document resolution and fix computation read files from disk. They do
//! so through the [`FileSystem`] trait so registry and fix logic can be
//! unit tested against [`MockFileSystem`] instead of temp files.
//!
//! Production code uses [`RealFileSystem`], which delegates to `std::fs`
//! and the guarded reads in [`crate::file_utils`].
//!
//! ## Example
//!
//! ```rust
//! use lintserve_core::fs::{FileSystem, MockFileSystem};
//! use std::path::Path;
//!
//! let mock_fs = MockFileSystem::new();
//! mock_fs.add_file("/work/app.py", "x = 1\n");
//! assert!(mock_fs.is_file(Path::new("/work/app.py")));
//! assert_eq!(mock_fs.read_to_string(Path::new("/work/app.py")).unwrap(), "x = 1\n");
//! ```

use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Trait for abstracting file system reads.
///
/// Must be `Send + Sync`: the analysis gateway holds one and runs on
/// worker threads.
pub trait FileSystem: Send + Sync + std::fmt::Debug {
    /// Check if a path is a file
    fn is_file(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Read file contents to string
    fn read_to_string(&self, path: &Path) -> CoreResult<String>;
}

/// Real file system implementation that delegates to `std::fs` and `file_utils`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn read_to_string(&self, path: &Path) -> CoreResult<String> {
        crate::file_utils::safe_read_file(path)
    }
}

#[derive(Debug, Clone)]
enum MockEntry {
    File { content: String },
    Directory,
}

/// Mock file system for testing.
///
/// In-memory HashMap-based storage behind a `RwLock`.
#[derive(Debug, Default)]
pub struct MockFileSystem {
    entries: RwLock<HashMap<PathBuf, MockEntry>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file with the given content, replacing any previous entry.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = normalize_mock_path(path.as_ref());
        let mut entries = self.entries.write().expect("MockFileSystem lock poisoned");
        entries.insert(
            path,
            MockEntry::File {
                content: content.into(),
            },
        );
    }

    /// Add a directory
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = normalize_mock_path(path.as_ref());
        let mut entries = self.entries.write().expect("MockFileSystem lock poisoned");
        entries.insert(path, MockEntry::Directory);
    }

    /// Remove an entry, if present.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = normalize_mock_path(path.as_ref());
        let mut entries = self.entries.write().expect("MockFileSystem lock poisoned");
        entries.remove(&path);
    }

    fn get_entry(&self, path: &Path) -> Option<MockEntry> {
        let path = normalize_mock_path(path);
        let entries = self.entries.read().expect("MockFileSystem lock poisoned");
        entries.get(&path).cloned()
    }
}

fn normalize_mock_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    PathBuf::from(path_str.replace('\\', "/"))
}

impl FileSystem for MockFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        matches!(self.get_entry(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.get_entry(path), Some(MockEntry::Directory))
    }

    fn read_to_string(&self, path: &Path) -> CoreResult<String> {
        match self.get_entry(path) {
            Some(MockEntry::File { content }) => Ok(content),
            Some(MockEntry::Directory) => Err(CoreError::FileNotRegular {
                path: path.to_path_buf(),
            }),
            None => Err(CoreError::FileRead {
                path: path.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotFound, "file not found"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mock_fs_add_and_read_file() {
        let fs = MockFileSystem::new();
        fs.add_file("/work/a.py", "a = 1");

        assert!(fs.is_file(Path::new("/work/a.py")));
        assert!(!fs.is_dir(Path::new("/work/a.py")));
        assert_eq!(fs.read_to_string(Path::new("/work/a.py")).unwrap(), "a = 1");
    }

    #[test]
    fn test_mock_fs_missing_file_is_not_found() {
        let fs = MockFileSystem::new();
        let err = fs.read_to_string(Path::new("/nowhere.py")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_mock_fs_directory_is_not_readable() {
        let fs = MockFileSystem::new();
        fs.add_dir("/work");

        assert!(fs.is_dir(Path::new("/work")));
        assert!(matches!(
            fs.read_to_string(Path::new("/work")),
            Err(CoreError::FileNotRegular { .. })
        ));
    }

    #[test]
    fn test_mock_fs_remove() {
        let fs = MockFileSystem::new();
        fs.add_file("/work/a.py", "");
        fs.remove("/work/a.py");
        assert!(!fs.is_file(Path::new("/work/a.py")));
        assert!(fs.read_to_string(Path::new("/work/a.py")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_mock_fs_normalizes_backslashes() {
        let fs = MockFileSystem::new();
        fs.add_file("C:\\work\\a.py", "x");
        assert!(fs.is_file(Path::new("C:/work/a.py")));
    }

    #[test]
    fn test_real_fs_reads_through_file_utils() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("b.py");
        std::fs::write(&path, "b = 2\n").unwrap();

        let fs = RealFileSystem;
        assert!(fs.is_file(&path));
        assert!(fs.is_dir(temp.path()));
        assert_eq!(fs.read_to_string(&path).unwrap(), "b = 2\n");
    }
}
