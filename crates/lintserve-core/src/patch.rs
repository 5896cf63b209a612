//! Unified-diff parsing and strict application.
//!
//! Hunks are applied at exactly the position their header names. Every
//! context and removed line is checked before anything is written, so a
//! patch either applies completely or fails with [`PatchError::Conflict`]
//! and leaves the caller's text alone. There is no fuzz factor.
//!
//! Line endings: the output uses the original text's first line break
//! (`\r\n` or `\n`) and keeps whether the original ended in one. Diff lines
//! have any trailing `\r` stripped before comparison.

use std::borrow::Cow;
use std::iter::{Enumerate, Peekable};
use std::str::Lines;

use regex::Regex;
use thiserror::Error;

use crate::regex_util::static_regex;

static_regex!(
    fn hunk_header,
    r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@"
);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// `line` is 1-based in the text being patched; `found` is `None` past
    /// its end.
    #[error("patch conflict at line {line}: expected {expected:?}, found {found:?}")]
    Conflict {
        line: usize,
        expected: String,
        found: Option<String>,
    },

    /// `line` is 1-based in the diff text.
    #[error("malformed patch at diff line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    /// The style of the first line break in `text`, `Lf` if there is none.
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(i) if text[..i].ends_with('\r') => LineEnding::CrLf,
            _ => LineEnding::Lf,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Join `lines` with `ending` between them. No terminator is appended.
pub fn join_lines<S: AsRef<str>>(lines: &[S], ending: LineEnding) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            out.push_str(ending.as_str());
        }
        out.push_str(line.as_ref());
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HunkLine {
    Context(String),
    Remove(String),
    Add(String),
}

impl HunkLine {
    /// Text this line expects to find in the original, if any.
    fn old_text(&self) -> Option<&str> {
        match self {
            HunkLine::Context(text) | HunkLine::Remove(text) => Some(text),
            HunkLine::Add(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// The unchanged lines surrounding the edit.
    pub fn context(&self) -> Vec<&str> {
        self.lines
            .iter()
            .filter_map(|line| match line {
                HunkLine::Context(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn old_lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().filter_map(HunkLine::old_text)
    }

    /// 0-based index of the first original line this hunk covers. A pure
    /// insertion names the line it follows, so it lands after it.
    fn anchor(&self) -> usize {
        if self.old_len == 0 {
            self.old_start
        } else {
            self.old_start.saturating_sub(1)
        }
    }
}

/// One diff's worth of proposed changes to a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    text: String,
}

impl Patch {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Lazily parse the diff. Each call starts over from the raw text.
    ///
    /// The iterator stops after the first error.
    pub fn hunks(&self) -> Hunks<'_> {
        Hunks {
            lines: self.text.lines().enumerate().peekable(),
            failed: false,
        }
    }

    pub fn parse_hunks(&self) -> Result<Vec<Hunk>, PatchError> {
        self.hunks().collect()
    }

    /// Apply the patch to `original`.
    ///
    /// `preparsed` skips parsing when the caller already holds the hunks.
    ///
    /// # Errors
    ///
    /// `PatchError::Malformed` if the diff cannot be parsed,
    /// `PatchError::Conflict` if a hunk does not match the text at its
    /// position or hunks overlap.
    pub fn apply(&self, original: &str, preparsed: Option<&[Hunk]>) -> Result<String, PatchError> {
        let hunks: Cow<'_, [Hunk]> = match preparsed {
            Some(hunks) => Cow::Borrowed(hunks),
            None => Cow::Owned(self.parse_hunks()?),
        };
        if hunks.is_empty() {
            return Ok(original.to_string());
        }

        let source: Vec<&str> = original.lines().collect();
        verify(&hunks, &source)?;

        let mut output: Vec<&str> = Vec::with_capacity(source.len());
        let mut cursor = 0;
        for hunk in hunks.iter() {
            let anchor = hunk.anchor();
            output.extend_from_slice(&source[cursor..anchor]);
            for line in &hunk.lines {
                match line {
                    HunkLine::Context(text) | HunkLine::Add(text) => output.push(text),
                    HunkLine::Remove(_) => {}
                }
            }
            cursor = anchor + hunk.old_lines().count();
        }
        output.extend_from_slice(&source[cursor..]);

        if output.is_empty() {
            return Ok(String::new());
        }
        let ending = LineEnding::detect(original);
        let mut text = join_lines(&output, ending);
        if original.is_empty() || original.ends_with('\n') {
            text.push_str(ending.as_str());
        }
        Ok(text)
    }
}

/// Check every hunk against `source` without building anything.
fn verify(hunks: &[Hunk], source: &[&str]) -> Result<(), PatchError> {
    let mut cursor = 0;
    for hunk in hunks {
        let anchor = hunk.anchor();
        if anchor < cursor {
            return Err(PatchError::Conflict {
                line: hunk.old_start,
                expected: format!("a hunk starting after line {cursor}"),
                found: source.get(anchor).map(|s| s.to_string()),
            });
        }

        let mut index = anchor;
        for expected in hunk.old_lines() {
            let found = source.get(index).copied();
            if found != Some(expected) {
                return Err(PatchError::Conflict {
                    line: index + 1,
                    expected: expected.to_string(),
                    found: found.map(str::to_string),
                });
            }
            index += 1;
        }

        if anchor > source.len() {
            return Err(PatchError::Conflict {
                line: anchor,
                expected: "an existing line".to_string(),
                found: None,
            });
        }
        cursor = index;
    }
    Ok(())
}

/// Restartable hunk parser returned by [`Patch::hunks`].
#[derive(Debug)]
pub struct Hunks<'a> {
    lines: Peekable<Enumerate<Lines<'a>>>,
    failed: bool,
}

impl Hunks<'_> {
    fn fail(&mut self, line: usize, reason: impl Into<String>) -> Option<Result<Hunk, PatchError>> {
        self.failed = true;
        Some(Err(PatchError::Malformed {
            line,
            reason: reason.into(),
        }))
    }
}

impl Iterator for Hunks<'_> {
    type Item = Result<Hunk, PatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        // file headers and anything else outside a hunk are skipped
        let (header_index, header) = loop {
            let (index, line) = self.lines.next()?;
            if line.starts_with("@@") {
                break (index, line.trim_end_matches('\r'));
            }
        };
        let header_line = header_index + 1;

        let Some(caps) = hunk_header().captures(header) else {
            return self.fail(header_line, format!("invalid hunk header {header:?}"));
        };
        let number = |i: usize| -> Option<usize> {
            match caps.get(i) {
                Some(m) => m.as_str().parse().ok(),
                None => Some(1),
            }
        };
        let (Some(old_start), Some(old_len), Some(new_start), Some(new_len)) =
            (number(1), number(2), number(3), number(4))
        else {
            return self.fail(header_line, "hunk header number out of range");
        };
        if old_start == 0 && old_len > 0 {
            return self.fail(header_line, "hunk removes lines before line 1");
        }

        let mut lines = Vec::new();
        let (mut old_seen, mut new_seen) = (0, 0);
        while old_seen < old_len || new_seen < new_len {
            let Some(&(index, raw)) = self.lines.peek() else {
                return self.fail(header_line, "hunk ends before its declared length");
            };
            let raw = raw.trim_end_matches('\r');
            let parsed = match raw.chars().next() {
                Some(' ') => HunkLine::Context(raw[1..].to_string()),
                // some tools strip the space from empty context lines
                None => HunkLine::Context(String::new()),
                Some('-') => HunkLine::Remove(raw[1..].to_string()),
                Some('+') => HunkLine::Add(raw[1..].to_string()),
                Some('\\') => {
                    self.lines.next();
                    continue;
                }
                Some(_) if raw.starts_with("@@") => {
                    return self.fail(header_line, "hunk ends before its declared length");
                }
                Some(_) => {
                    return self.fail(index + 1, format!("unexpected line {raw:?} inside hunk"));
                }
            };
            match parsed {
                HunkLine::Context(_) => {
                    old_seen += 1;
                    new_seen += 1;
                }
                HunkLine::Remove(_) => old_seen += 1,
                HunkLine::Add(_) => new_seen += 1,
            }
            if old_seen > old_len || new_seen > new_len {
                return self.fail(index + 1, "hunk is longer than its header declares");
            }
            lines.push(parsed);
            self.lines.next();
        }

        // a trailing marker belongs to this hunk
        while let Some(&(_, raw)) = self.lines.peek() {
            if !raw.starts_with('\\') {
                break;
            }
            self.lines.next();
        }

        Some(Ok(Hunk {
            old_start,
            old_len,
            new_start,
            new_len,
            lines,
        }))
    }
}
