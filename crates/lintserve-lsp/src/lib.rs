//! # lintserve-lsp
//!
//! Language Server Protocol front end for lintserve.
//!
//! Runs an external analyser on documents as they are opened and saved,
//! publishes its findings as diagnostics and offers the analyser's
//! suggested patches through `textDocument/formatting`.
//!
//! ## Usage
//!
//! ```bash
//! lintserve --mode stdio
//! lintserve --mode tcp --addr 2087
//! ```

mod backend;
mod command;
mod control;
mod diagnostic_mapper;
mod uri;

pub use backend::Backend;
pub use control::ServerOptions;

use anyhow::Context;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::oneshot;
use tower_lsp::{Client, LspService, Server};
use tracing::info;

use crate::command::{Command, Outbound};
use crate::control::Controller;

/// Serve one protocol session over the given streams.
///
/// Returns whether the client sent `shutdown` before the session ended.
///
/// # Errors
///
/// Returns an error if the server options are invalid.
pub async fn serve<I, O>(input: I, output: O, options: ServerOptions) -> anyhow::Result<bool>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();

    let controller = Controller::new(options, commands.clone(), outbound)?;
    let control = tokio::spawn(controller.run(command_rx));

    let backend_commands = commands.clone();
    let (service, socket) = LspService::new(move |client| {
        tokio::spawn(publish(client.clone(), outbound_rx));
        Backend::new(client, backend_commands)
    });
    Server::new(input, output, socket).serve(service).await;

    let (reply, shutdown) = oneshot::channel();
    if commands.send(Command::Exit { reply }).is_err() {
        return Ok(false);
    }
    let shutdown = shutdown.await.unwrap_or(false);
    control.await.context("control loop panicked")?;
    Ok(shutdown)
}

/// Serve one session over stdin/stdout.
///
/// # Errors
///
/// Returns an error if the server options are invalid.
pub async fn serve_stdio(options: ServerOptions) -> anyhow::Result<bool> {
    serve(tokio::io::stdin(), tokio::io::stdout(), options).await
}

/// Accept TCP clients on `0.0.0.0:port`, one session at a time.
///
/// Every connection gets a fresh server instance. Only returns on error.
///
/// # Errors
///
/// Returns an error if the port cannot be bound, a connection cannot be
/// accepted or the server options are invalid.
pub async fn serve_tcp(port: u16, options: ServerOptions) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind 0.0.0.0:{}", port))?;
    info!(port, "listening for clients");

    loop {
        let (stream, peer) = listener.accept().await?;
        info!(%peer, "client connected");
        let (read, write) = tokio::io::split(stream);
        let shutdown = serve(read, write, options.clone()).await?;
        info!(%peer, shutdown, "client disconnected");
    }
}

async fn publish(client: Client, mut outbound: UnboundedReceiver<Outbound>) {
    while let Some(message) = outbound.recv().await {
        match message {
            Outbound::PublishDiagnostics { uri, diagnostics } => {
                client.publish_diagnostics(uri, diagnostics, None).await;
            }
            Outbound::LogMessage { typ, message } => {
                client.log_message(typ, message).await;
            }
        }
    }
}
