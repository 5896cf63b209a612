//! Messages handled by the control loop.
//!
//! Every protocol method the server reacts to is converted into one
//! [`Command`] by the backend. The control loop matches on the variant, so
//! the method → handler table is checked by the compiler instead of being
//! looked up by name at runtime.

use std::path::PathBuf;

use lintserve_core::{ChangeRecord, Diagnostics, FixReport, JobOutcome, TextEdit};
use tokio::sync::oneshot;
use tower_lsp::lsp_types::{Diagnostic, MessageType, Url};

/// Protocol methods with a [`Command`] counterpart.
pub const METHODS: &[&str] = &[
    "initialize",
    "shutdown",
    "exit",
    "textDocument/didOpen",
    "textDocument/didChange",
    "textDocument/didSave",
    "textDocument/didClose",
    "textDocument/formatting",
];

/// Reply channel of a formatting request. `None` means "no edits".
pub type FormattingReply = oneshot::Sender<Option<Vec<TextEdit>>>;

/// What an analysis job hands back to the control loop.
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub diagnostics: Diagnostics,
    /// Present for runs submitted by a formatting request.
    pub fixes: Option<FixReport>,
}

#[derive(Debug)]
pub enum Command {
    Initialize {
        root: Option<PathBuf>,
    },
    Shutdown,
    DidOpen {
        path: PathBuf,
        text: String,
        version: i32,
    },
    DidChange {
        path: PathBuf,
        version: i32,
        changes: Vec<ChangeRecord>,
    },
    DidSave {
        path: PathBuf,
    },
    DidClose {
        path: PathBuf,
    },
    Formatting {
        path: PathBuf,
        reply: FormattingReply,
    },
    /// Internal: a submitted analysis resolved.
    AnalysisFinished {
        path: PathBuf,
        ticket: u64,
        outcome: JobOutcome<AnalysisReport>,
    },
    /// The protocol session ended. The reply carries whether `shutdown`
    /// was received first.
    Exit {
        reply: oneshot::Sender<bool>,
    },
}

impl Command {
    pub fn method(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::Shutdown => "shutdown",
            Command::DidOpen { .. } => "textDocument/didOpen",
            Command::DidChange { .. } => "textDocument/didChange",
            Command::DidSave { .. } => "textDocument/didSave",
            Command::DidClose { .. } => "textDocument/didClose",
            Command::Formatting { .. } => "textDocument/formatting",
            Command::AnalysisFinished { .. } => "$/lintserve/analysisFinished",
            Command::Exit { .. } => "exit",
        }
    }
}

/// Messages for the client, drained by the publisher task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    PublishDiagnostics {
        uri: Url,
        diagnostics: Vec<Diagnostic>,
    },
    LogMessage {
        typ: MessageType,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn protocol_commands() -> Vec<Command> {
        let path = PathBuf::from("/work/a.py");
        vec![
            Command::Initialize { root: None },
            Command::Shutdown,
            Command::Exit {
                reply: oneshot::channel().0,
            },
            Command::DidOpen {
                path: path.clone(),
                text: String::new(),
                version: 1,
            },
            Command::DidChange {
                path: path.clone(),
                version: 2,
                changes: vec![],
            },
            Command::DidSave { path: path.clone() },
            Command::DidClose { path: path.clone() },
            Command::Formatting {
                path,
                reply: oneshot::channel().0,
            },
        ]
    }

    #[test]
    fn test_every_protocol_command_is_in_method_table() {
        let commands = protocol_commands();
        assert_eq!(commands.len(), METHODS.len());
        for command in &commands {
            assert!(
                METHODS.contains(&command.method()),
                "{} missing from METHODS",
                command.method()
            );
        }
    }

    #[test]
    fn test_method_table_has_no_duplicates() {
        let unique: HashSet<_> = METHODS.iter().collect();
        assert_eq!(unique.len(), METHODS.len());
    }

    #[test]
    fn test_internal_command_not_a_protocol_method() {
        let finished = Command::AnalysisFinished {
            path: PathBuf::from("/work/a.py"),
            ticket: 1,
            outcome: JobOutcome::Cancelled,
        };
        assert!(!METHODS.contains(&finished.method()));
    }
}
