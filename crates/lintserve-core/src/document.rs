//! Versioned mirrors of editor-open files.
//!
//! The analysis engine reads files from disk, but the editor knows about
//! unsaved text and versions. A [`DocumentProxy`] keeps the editor's view of
//! one file; the [`DocumentRegistry`] maps absolute paths to proxies and
//! falls back to disk for files the editor never sent.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::fs::FileSystem;
use crate::position::Range;

/// Version of a proxy that has never received editor content.
///
/// Lower than any version an editor sends.
pub const UNVERSIONED: i32 = -1;

/// One raw content change as received from the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub range: Option<Range>,
    pub range_length: Option<u32>,
    pub text: String,
}

impl ChangeRecord {
    pub fn full(text: impl Into<String>) -> Self {
        Self {
            range: None,
            range_length: None,
            text: text.into(),
        }
    }

    /// A change without range information replaces the whole document.
    pub fn is_full_replacement(&self) -> bool {
        self.range.is_none() && self.range_length.is_none()
    }
}

/// In-memory, versioned view of one file.
#[derive(Debug, Clone)]
pub struct DocumentProxy {
    path: PathBuf,
    version: i32,
    content: String,
    workspace: Option<PathBuf>,
    changes: Vec<ChangeRecord>,
}

impl DocumentProxy {
    /// Create an empty, unversioned proxy.
    ///
    /// The file may not exist yet, so the path is only checked
    /// syntactically: it must be absolute and must not end in a separator.
    ///
    /// # Errors
    ///
    /// `CoreError::RelativePath` or `CoreError::DirectoryPath`.
    pub fn new(path: impl Into<PathBuf>, workspace: Option<PathBuf>) -> CoreResult<Self> {
        Self::with_content(path, workspace, String::new())
    }

    fn with_content(
        path: impl Into<PathBuf>,
        workspace: Option<PathBuf>,
        content: String,
    ) -> CoreResult<Self> {
        let path = path.into();
        if !path.is_absolute() {
            return Err(CoreError::RelativePath { path });
        }
        let raw = path.as_os_str().to_string_lossy();
        if raw.ends_with(MAIN_SEPARATOR) || raw.ends_with('/') {
            return Err(CoreError::DirectoryPath { path });
        }

        debug!(path = %path.display(), "document proxy created");
        Ok(Self {
            path,
            version: UNVERSIONED,
            content,
            workspace,
            changes: Vec::new(),
        })
    }

    /// Load a proxy with the file's current on-disk content.
    ///
    /// The version stays [`UNVERSIONED`] so the first editor update wins.
    pub fn from_disk(
        path: impl Into<PathBuf>,
        workspace: Option<PathBuf>,
        fs: &dyn FileSystem,
    ) -> CoreResult<Self> {
        let path = path.into();
        if fs.is_dir(&path) {
            return Err(CoreError::DirectoryPath { path });
        }
        let content = fs.read_to_string(&path)?;
        Self::with_content(path, workspace, content)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }

    pub fn changes(&self) -> &[ChangeRecord] {
        &self.changes
    }

    /// Replace the whole content if `version` is newer than the current one.
    ///
    /// Returns whether the replacement happened.
    pub fn replace(&mut self, content: impl Into<String>, version: i32) -> bool {
        if version > self.version {
            self.content = content.into();
            self.version = version;
            return true;
        }
        false
    }

    /// Record incremental changes.
    ///
    /// Range-based edits are logged but not applied to the content; only
    /// whole-document replacement changes what the proxy holds.
    pub fn update(&mut self, changes: impl IntoIterator<Item = ChangeRecord>) {
        debug!(path = %self.path.display(), "document proxy change recorded");
        self.changes.extend(changes);
    }

    /// Drop the in-memory content.
    pub fn close(&mut self) {
        self.content.clear();
    }
}

impl fmt::Display for DocumentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<DocumentProxy {}, {}>", self.path.display(), self.version)
    }
}

/// Path-keyed store of open documents.
#[derive(Debug)]
pub struct DocumentRegistry {
    documents: HashMap<PathBuf, DocumentProxy>,
    fs: Arc<dyn FileSystem>,
}

impl DocumentRegistry {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            documents: HashMap::new(),
            fs,
        }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.documents.contains_key(path)
    }

    /// Insert `proxy`. An existing entry for the same path is only
    /// overwritten when `replace` is set; otherwise nothing changes and the
    /// call returns `false`.
    pub fn add(&mut self, proxy: DocumentProxy, replace: bool) -> bool {
        if self.documents.contains_key(proxy.path()) && !replace {
            return false;
        }
        self.documents.insert(proxy.path().to_path_buf(), proxy);
        true
    }

    /// Remove and close the proxy for `path`.
    pub fn remove(&mut self, path: &Path) -> Option<DocumentProxy> {
        let mut proxy = self.documents.remove(path)?;
        proxy.close();
        Some(proxy)
    }

    pub fn get(&self, path: &Path) -> Option<&DocumentProxy> {
        self.documents.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut DocumentProxy> {
        self.documents.get_mut(path)
    }

    /// Find the proxy for `path`, loading it from disk if needed.
    ///
    /// With `hard_sync` the file must exist on disk; a missing file yields
    /// `None` and registers nothing. Without it a missing file becomes an
    /// empty, unversioned placeholder. Any other failure (relative path,
    /// unreadable file) yields `None`.
    pub fn resolve(
        &mut self,
        path: &Path,
        workspace: Option<&Path>,
        hard_sync: bool,
    ) -> Option<&mut DocumentProxy> {
        if !self.documents.contains_key(path) {
            let proxy = self.load(path, workspace, hard_sync)?;
            self.documents.insert(path.to_path_buf(), proxy);
        }
        self.documents.get_mut(path)
    }

    fn load(
        &self,
        path: &Path,
        workspace: Option<&Path>,
        hard_sync: bool,
    ) -> Option<DocumentProxy> {
        let workspace = workspace.map(Path::to_path_buf);
        match DocumentProxy::from_disk(path, workspace.clone(), self.fs.as_ref()) {
            Ok(proxy) => Some(proxy),
            Err(e) if e.is_not_found() && !hard_sync => {
                DocumentProxy::new(path, workspace).ok()
            }
            Err(e) if e.is_not_found() => {
                debug!(path = %path.display(), "not on disk, hard sync refused");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot resolve document");
                None
            }
        }
    }
}
