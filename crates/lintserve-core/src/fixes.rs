//! Turning proposed patches into a single whole-document edit.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::diagnostics::Diagnostics;
use crate::document::DocumentProxy;
use crate::error::CoreResult;
use crate::fs::FileSystem;
use crate::position::Range;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextEdit {
    pub range: Range,
    pub new_text: String,
}

/// Outcome of applying every fix aimed at one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixReport {
    /// Always exactly one edit replacing the whole original text.
    pub edits: Vec<TextEdit>,
    pub applied: usize,
    /// Patches that conflicted or could not be parsed.
    pub skipped: usize,
}

impl FixReport {
    pub fn has_changes(&self) -> bool {
        self.applied > 0
    }
}

impl Diagnostics {
    /// Apply the fixes that target `document` to its on-disk content.
    ///
    /// Fixes run newest first. A fix that fails is skipped and counted; the
    /// rest still apply on top of what came before.
    ///
    /// # Errors
    ///
    /// Fails only if the document cannot be read from disk.
    pub fn fixes_to_text_edits(
        &self,
        document: &DocumentProxy,
        fs: &dyn FileSystem,
    ) -> CoreResult<FixReport> {
        let original = fs.read_to_string(document.path())?;
        let mut text = original.clone();
        let mut applied = 0;
        let mut skipped = 0;

        for (path, patch) in self.fixes().iter().rev() {
            if path != document.path() {
                continue;
            }
            match patch.apply(&text, None) {
                Ok(patched) => {
                    text = patched;
                    applied += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping fix");
                    skipped += 1;
                }
            }
        }

        debug!(
            path = %document.path().display(),
            applied,
            skipped,
            "fixes resolved to text edit"
        );
        Ok(FixReport {
            edits: vec![TextEdit {
                range: Range::spanning(&original),
                new_text: text,
            }],
            applied,
            skipped,
        })
    }
}
