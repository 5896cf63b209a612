//! The single control loop.
//!
//! [`Controller`] owns the document registry, the job pool and the
//! analysis gateway. Protocol handlers and job completions reach it as
//! [`Command`]s over one channel, so all state changes and every
//! completion handler run one at a time on the same task.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lintserve_core::config::load_workspace_engine;
use lintserve_core::scheduler::Job;
use lintserve_core::{
    AnalysisEngine, AnalysisGateway, AnalysisRequest, BoundedJobPool, ChangeRecord, CommandEngine,
    Diagnostics, DocumentProxy, DocumentRegistry, FileSystem, JobOutcome, RealFileSystem,
    ServerConfig, Submission,
};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tower_lsp::lsp_types::MessageType;
use tracing::{debug, info, warn};

use crate::command::{AnalysisReport, Command, FormattingReply, Outbound};
use crate::diagnostic_mapper::to_lsp_diagnostics;
use crate::uri::path_to_uri;

/// Everything a server instance is built from.
#[derive(Clone)]
pub struct ServerOptions {
    pub config: ServerConfig,
    pub fs: Arc<dyn FileSystem>,
    /// Replaces the configured command engine. Workspace engine settings
    /// are ignored while set.
    pub engine: Option<Arc<dyn AnalysisEngine>>,
}

impl ServerOptions {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            fs: Arc::new(RealFileSystem),
            engine: None,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn AnalysisEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }
}

impl std::fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerOptions")
            .field("config", &self.config)
            .field("fs", &self.fs)
            .field("custom_engine", &self.engine.is_some())
            .finish()
    }
}

pub struct Controller {
    documents: DocumentRegistry,
    pool: BoundedJobPool,
    gateway: Arc<AnalysisGateway>,
    source: String,
    custom_engine: bool,
    fs: Arc<dyn FileSystem>,
    root: Option<PathBuf>,
    shutdown_requested: bool,
    // newest submission per path; older completions are not published
    tickets: HashMap<PathBuf, u64>,
    next_ticket: u64,
    pending_formats: HashMap<u64, FormattingReply>,
    // diagnostics-only runs, cancelled once a newer run for the path starts
    analyses: HashMap<u64, Job>,
    // files loaded from disk for formatting only, with in-flight request count
    transient: HashMap<PathBuf, usize>,
    loopback: UnboundedSender<Command>,
    outbound: UnboundedSender<Outbound>,
}

impl Controller {
    /// # Errors
    ///
    /// Fails when the configured concurrency limits are invalid.
    pub fn new(
        options: ServerOptions,
        loopback: UnboundedSender<Command>,
        outbound: UnboundedSender<Outbound>,
    ) -> anyhow::Result<Self> {
        let ServerOptions { config, fs, engine } = options;
        config.validate()?;
        let pool = BoundedJobPool::new(config.max_jobs, config.max_workers)?;

        let custom_engine = engine.is_some();
        let engine = engine
            .unwrap_or_else(|| Arc::new(CommandEngine::from_config(&config.engine)));

        Ok(Self {
            documents: DocumentRegistry::new(Arc::clone(&fs)),
            pool,
            gateway: Arc::new(AnalysisGateway::new(engine, Arc::clone(&fs))),
            source: config.engine.source,
            custom_engine,
            fs,
            root: None,
            shutdown_requested: false,
            tickets: HashMap::new(),
            next_ticket: 0,
            pending_formats: HashMap::new(),
            analyses: HashMap::new(),
            transient: HashMap::new(),
            loopback,
            outbound,
        })
    }

    /// Process commands until [`Command::Exit`] arrives or every sender is
    /// gone. Returns whether `shutdown` was received.
    pub async fn run(mut self, mut commands: UnboundedReceiver<Command>) -> bool {
        while let Some(command) = commands.recv().await {
            debug!(method = command.method(), "control loop");
            match command {
                Command::Exit { reply } => {
                    let shutdown = self.close().await;
                    let _ = reply.send(shutdown);
                    return shutdown;
                }
                command => self.handle(command),
            }
        }
        self.close().await
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Initialize { root } => self.initialize(root),
            Command::Shutdown => {
                info!("shutdown requested");
                self.shutdown_requested = true;
            }
            Command::DidOpen {
                path,
                text,
                version,
            } => self.did_open(path, text, version),
            Command::DidChange {
                path,
                version,
                changes,
            } => self.did_change(&path, version, changes),
            Command::DidSave { path } => {
                if self.documents.contains(&path) {
                    self.submit_analysis(&path, true, None);
                } else {
                    debug!(path = %path.display(), "save for unopened document ignored");
                }
            }
            Command::DidClose { path } => {
                // running analyses are left alone; their results are dropped
                self.transient.remove(&path);
                if self.documents.remove(&path).is_some() {
                    self.tickets.remove(&path);
                }
            }
            Command::Formatting { path, reply } => self.formatting(&path, reply),
            Command::AnalysisFinished {
                path,
                ticket,
                outcome,
            } => self.analysis_finished(path, ticket, outcome),
            Command::Exit { .. } => {}
        }
    }

    fn initialize(&mut self, root: Option<PathBuf>) {
        info!(root = ?root, "initialize");
        self.root = root;

        let Some(root) = self.root.as_deref() else {
            return;
        };
        if self.custom_engine {
            return;
        }
        match load_workspace_engine(root, self.fs.as_ref()) {
            Ok(Some(engine)) => {
                info!(program = %engine.program, "using workspace engine configuration");
                let command = Arc::new(CommandEngine::from_config(&engine));
                self.gateway = Arc::new(AnalysisGateway::new(command, Arc::clone(&self.fs)));
                self.source = engine.source;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "ignoring workspace configuration");
                self.log(
                    MessageType::WARNING,
                    format!("Failed to load workspace configuration: {}", e),
                );
            }
        }
    }

    fn did_open(&mut self, path: PathBuf, text: String, version: i32) {
        let mut proxy = match DocumentProxy::new(&path, self.root.clone()) {
            Ok(proxy) => proxy,
            Err(e) => {
                warn!(error = %e, "cannot track document");
                return;
            }
        };
        proxy.replace(text, version);
        self.transient.remove(&path);
        self.documents.add(proxy, true);
        self.submit_analysis(&path, true, None);
    }

    fn did_change(&mut self, path: &Path, version: i32, changes: Vec<ChangeRecord>) {
        let Some(proxy) = self.documents.get_mut(path) else {
            debug!(path = %path.display(), "change for unopened document ignored");
            return;
        };

        match changes.first() {
            Some(change) if change.is_full_replacement() => {
                if proxy.replace(change.text.clone(), version) {
                    debug!(path = %path.display(), version, "document replaced");
                }
            }
            Some(_) => proxy.update(changes),
            None => {}
        }
    }

    fn formatting(&mut self, path: &Path, reply: FormattingReply) {
        let opened = self.documents.contains(path);
        let root = self.root.clone();
        if self.documents.resolve(path, root.as_deref(), true).is_none() {
            let _ = reply.send(None);
            return;
        }
        if !opened || self.transient.contains_key(path) {
            *self.transient.entry(path.to_path_buf()).or_default() += 1;
        }
        if !self.submit_analysis(path, true, Some(reply)) {
            self.release_transient(path);
        }
    }

    /// Forget a formatting-only file once its last request is answered.
    fn release_transient(&mut self, path: &Path) {
        let Some(pending) = self.transient.get_mut(path) else {
            return;
        };
        *pending -= 1;
        if *pending == 0 {
            self.transient.remove(path);
            self.documents.remove(path);
            self.tickets.remove(path);
        }
    }

    /// Returns whether the pool accepted the analysis.
    fn submit_analysis(&mut self, path: &Path, force: bool, reply: Option<FormattingReply>) -> bool {
        let Some(proxy) = self.documents.get(path) else {
            if let Some(reply) = reply {
                let _ = reply.send(None);
            }
            return false;
        };

        let request = AnalysisRequest::for_document(proxy);
        let snapshot = reply.is_some().then(|| proxy.clone());
        let gateway = Arc::clone(&self.gateway);
        let fs = Arc::clone(&self.fs);
        let source = self.source.clone();

        let work = move |token: &lintserve_core::CancelToken| {
            let result = gateway.analyze(&request, token);
            let diagnostics = Diagnostics::from_engine_result(&result, &source).unwrap_or_else(|e| {
                warn!(path = %request.path.display(), error = %e, "discarding engine result");
                Diagnostics::default()
            });
            let fixes = snapshot.and_then(|document| {
                match diagnostics.fixes_to_text_edits(&document, fs.as_ref()) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!(path = %request.path.display(), error = %e, "cannot compute fixes");
                        None
                    }
                }
            });
            AnalysisReport { diagnostics, fixes }
        };

        let handle = match self.pool.submit(work, force) {
            Submission::Accepted(handle) => handle,
            Submission::Rejected => {
                debug!(path = %path.display(), "analysis not scheduled");
                if let Some(reply) = reply {
                    let _ = reply.send(None);
                }
                return false;
            }
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        if let Some(previous) = self.tickets.insert(path.to_path_buf(), ticket) {
            if let Some(job) = self.analyses.remove(&previous) {
                debug!(path = %path.display(), ticket = previous, "cancelling superseded analysis");
                job.cancel();
            }
        }
        match reply {
            Some(reply) => {
                self.pending_formats.insert(ticket, reply);
            }
            None => {
                self.analyses.insert(ticket, handle.job().clone());
            }
        }

        let loopback = self.loopback.clone();
        let path = path.to_path_buf();
        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            let _ = loopback.send(Command::AnalysisFinished {
                path,
                ticket,
                outcome,
            });
        });
        true
    }

    fn analysis_finished(&mut self, path: PathBuf, ticket: u64, outcome: JobOutcome<AnalysisReport>) {
        self.analyses.remove(&ticket);
        let reply = self.pending_formats.remove(&ticket);
        let formatting = reply.is_some();
        self.deliver(&path, ticket, outcome, reply);
        if formatting {
            self.release_transient(&path);
        }
    }

    fn deliver(
        &self,
        path: &Path,
        ticket: u64,
        outcome: JobOutcome<AnalysisReport>,
        reply: Option<FormattingReply>,
    ) {
        let report = match outcome {
            JobOutcome::Completed(report) => report,
            JobOutcome::Cancelled => {
                debug!(path = %path.display(), ticket, "analysis cancelled");
                if let Some(reply) = reply {
                    let _ = reply.send(None);
                }
                return;
            }
            JobOutcome::Failed(reason) => {
                debug!(path = %path.display(), ticket, %reason, "analysis failed");
                if let Some(reply) = reply {
                    let _ = reply.send(None);
                }
                return;
            }
        };

        if !self.documents.contains(path) {
            debug!(path = %path.display(), "document closed, result dropped");
            if let Some(reply) = reply {
                let _ = reply.send(None);
            }
            return;
        }

        if let Some(reply) = reply {
            let _ = reply.send(report.fixes.map(|fixes| fixes.edits));
        }

        if self.tickets.get(path) != Some(&ticket) {
            debug!(path = %path.display(), ticket, "superseded result dropped");
            return;
        }
        self.publish(path, &report.diagnostics);
    }

    fn publish(&self, path: &Path, diagnostics: &Diagnostics) {
        let Some(uri) = path_to_uri(path) else {
            warn!(path = %path.display(), "no URI for path");
            return;
        };
        info!(count = diagnostics.diagnostics().len(), "publishing diagnostics");
        let _ = self.outbound.send(Outbound::PublishDiagnostics {
            uri,
            diagnostics: to_lsp_diagnostics(diagnostics.diagnostics()),
        });
    }

    fn log(&self, typ: MessageType, message: String) {
        let _ = self.outbound.send(Outbound::LogMessage { typ, message });
    }

    /// Release the pool, waiting for in-flight jobs.
    async fn close(self) -> bool {
        let shutdown = self.shutdown_requested;
        let mut pool = self.pool;
        if let Err(e) = tokio::task::spawn_blocking(move || pool.shutdown(true)).await {
            warn!(error = %e, "worker pool shutdown failed");
        }
        shutdown
    }
}
