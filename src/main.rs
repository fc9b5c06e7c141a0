//! Drop Uploader - sends files from a drop folder to an ingestion web service
//!
//! Scans a folder for files of one type, uploads each one as a multipart
//! form and moves it to a done or error folder, once or in a loop.

use anyhow::{Context, Result};
use chrono::Local;
use clap::CommandFactory;
use drop_uploader::{Cli, Config, HttpUploader, Processor, TraceLevel};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_normalized();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "Drop Uploader starting");

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) if e.shows_help() => {
            info!(error = %e, "Showing help");
            let _ = Cli::command().print_help();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Uploader failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Prepare folders, wire Ctrl-C to cancellation and run the loop
async fn run(config: Config) -> Result<()> {
    let config = config.prepare_folders();
    let uploader = HttpUploader::new(&config).context("Failed to create HTTP client")?;

    let processor = Processor::new(config, uploader);
    let config = processor.config();
    info!(
        folder = %config.root.display(),
        recursive = config.recursive,
        extension = %config.extension,
        mode = ?config.mode,
        url = %config.upload_url,
        "Starting"
    );

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let run = processor.run(&cancel).await;
    info!(passes = run.passes, "{}", run.totals.summary());

    Ok(())
}

/// Turn Ctrl-C into cancellation instead of terminating the process
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Unable to listen for Ctrl-C");
                return;
            }
            info!("Interrupt received, stopping after the current pass");
            cancel.cancel();
        }
    });
}

/// Log file path inside `log_dir`, named by start time
fn log_file_path(log_dir: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    log_dir.join(format!("Uploader_{}.log", timestamp))
}

/// Setup logging: stderr always, plus a log file when `--log-dir` is given
fn setup_logging(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(TraceLevel::log_level(cli.trace).into())
        .from_env_lossy();

    let console = fmt::layer().with_writer(std::io::stderr);

    let Some(log_dir) = &cli.log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let log_path = log_file_path(log_dir);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter).with(console);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .init();
    }

    Ok(Some(guard))
}
