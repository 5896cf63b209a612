//! Protocol-shaped positions and ranges.
//!
//! Lines and characters are 0-indexed. Characters count UTF-16 code units,
//! the protocol's default position encoding, so a position computed here
//! lines up with what an editor displays for non-ASCII text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// The range covering all of `content`, from the origin to
    /// [`end_position`].
    pub fn spanning(content: &str) -> Self {
        Self {
            start: Position::default(),
            end: end_position(content),
        }
    }
}

/// Position just past the last character of `content`.
///
/// A trailing newline moves the end onto the following, empty line. The
/// `\r` of a `\r\n` pair is reset by its `\n`, so CRLF text ends where
/// LF text does.
pub fn end_position(content: &str) -> Position {
    let mut line = 0u32;
    let mut character = 0u32;

    for c in content.chars() {
        match c {
            '\n' => {
                line += 1;
                character = 0;
            }
            _ => character += c.len_utf16() as u32,
        }
    }

    Position { line, character }
}
