//! LSP backend for lintserve.
//!
//! The backend is a thin translation layer: every notification or request
//! becomes a [`Command`] for the control loop. It holds no document state of
//! its own.

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use lintserve_core::ChangeRecord;

use crate::command::Command;
use crate::diagnostic_mapper::{from_lsp_range, to_lsp_text_edits};
use crate::uri::{uri_to_path, workspace_root};

/// LSP backend that forwards protocol traffic to the control loop.
pub struct Backend {
    client: Client,
    commands: UnboundedSender<Command>,
}

impl Backend {
    pub fn new(client: Client, commands: UnboundedSender<Command>) -> Self {
        Self { client, commands }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            tracing::warn!("control loop is gone, dropping message");
        }
    }

    /// Local path of a document URI, or a warning to the client.
    async fn document_path(&self, uri: &Url) -> Option<std::path::PathBuf> {
        let path = uri_to_path(uri);
        if path.is_none() {
            self.client
                .log_message(
                    MessageType::WARNING,
                    format!("Ignoring non-file URI: {}", uri),
                )
                .await;
        }
        path
    }
}

fn to_change_record(change: TextDocumentContentChangeEvent) -> ChangeRecord {
    ChangeRecord {
        range: change.range.map(from_lsp_range),
        range_length: change.range_length,
        text: change.text,
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        self.send(Command::Initialize {
            root: workspace_root(&params),
        });

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                document_formatting_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "lintserve".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.client
            .log_message(MessageType::INFO, "lintserve initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown);
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        let Some(path) = self.document_path(&document.uri).await else {
            return;
        };
        self.send(Command::DidOpen {
            path,
            text: document.text,
            version: document.version,
        });
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(path) = self.document_path(&params.text_document.uri).await else {
            return;
        };
        self.send(Command::DidChange {
            path,
            version: params.text_document.version,
            changes: params
                .content_changes
                .into_iter()
                .map(to_change_record)
                .collect(),
        });
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(path) = self.document_path(&params.text_document.uri).await else {
            return;
        };
        self.send(Command::DidSave { path });
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(path) = self.document_path(&params.text_document.uri).await else {
            return;
        };
        self.send(Command::DidClose { path });
    }

    async fn formatting(&self, params: DocumentFormattingParams) -> Result<Option<Vec<TextEdit>>> {
        let Some(path) = self.document_path(&params.text_document.uri).await else {
            return Ok(None);
        };

        let (reply, response) = oneshot::channel();
        self.send(Command::Formatting { path, reply });

        // a dropped sender means the loop went away mid-request
        let edits = response.await.ok().flatten();
        Ok(edits.map(|edits| to_lsp_text_edits(&edits)))
    }
}
