//! MPDB Ingest - membrane protein dataset curation

use clap::Parser;
use mpdb_common::logging::{init_logging, LogConfig, LogLevel};
use mpdb_ingest::{commands, Cli};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("mpdb-ingest")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    let guard = match init_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled: {e}");
            None
        }
    };

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current stage");
            on_signal.cancel();
        }
    });

    if let Err(e) = commands::execute(cli.command, cancel).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        drop(guard);
        process::exit(1);
    }
}
