//! Process-wide `tracing` setup for the command-line entry point.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to open log file '{path}': {reason}")]
    LogFile { path: String, reason: String },

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Open `path` for appending, creating it (but not its directories) if missing
pub fn open_log_file(path: &Path) -> Result<File, LoggingError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggingError::LogFile {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}

/// Install a global subscriber writing to stdout and to `log_file`.
///
/// The level filter comes from `RUST_LOG`, falling back to `info`.
pub fn init_logging(log_file: &Path) -> Result<(), LoggingError> {
    let file = open_log_file(log_file)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_LEVEL))
        .map_err(|e| LoggingError::Filter(e.to_string()))?;

    let stdout_layer = fmt::layer().with_target(true);
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(Mutex::new(file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::info!(log_file = %log_file.display(), "Logging initialized");
    Ok(())
}
