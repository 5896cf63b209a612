//! lintserve - language server for external linters

use std::path::PathBuf;
use std::process;

use clap::{Parser, ValueEnum};
use lintserve_core::ServerConfig;
use lintserve_lsp::ServerOptions;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lintserve")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Language server that runs an external linter",
    long_about = "Runs an external analyser on opened and saved documents, publishes its findings as diagnostics and applies its suggested fixes on formatting requests."
)]
struct Cli {
    /// How clients connect
    #[arg(long, value_enum, default_value_t = Mode::Stdio)]
    mode: Mode,

    /// TCP port to listen on in tcp mode
    #[arg(long, default_value_t = 2087)]
    addr: u16,

    /// Maximum number of tracked analysis jobs
    #[arg(long)]
    max_jobs: Option<usize>,

    /// Number of analysis worker threads
    #[arg(long)]
    max_workers: Option<usize>,

    /// Config file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Stdio,
    Tcp,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match run(&cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };
    process::exit(code);
}

/// Logs go to stderr; stdout carries the protocol stream.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn build_config(cli: &Cli) -> anyhow::Result<ServerConfig> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };

    // CLI flags override file values
    if let Some(max_jobs) = cli.max_jobs {
        config.max_jobs = max_jobs;
    }
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: &Cli) -> anyhow::Result<i32> {
    let config = build_config(cli)?;
    info!(
        max_jobs = config.max_jobs,
        max_workers = config.max_workers,
        engine = %config.engine.program,
        "starting lintserve"
    );
    let options = ServerOptions::new(config);

    match cli.mode {
        Mode::Stdio => {
            let shutdown = lintserve_lsp::serve_stdio(options).await?;
            Ok(if shutdown { 0 } else { 1 })
        }
        Mode::Tcp => {
            lintserve_lsp::serve_tcp(cli.addr, options).await?;
            Ok(0)
        }
    }
}
