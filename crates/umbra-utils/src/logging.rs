//! # Logging Utilities
//!
//! Logging bootstrap for Umbra using `tracing`.
//!
//! The bridge itself only emits `tracing` events. Binaries (and host plugins
//! that embed the bridge) call one of the initializers below exactly once to
//! decide where those events go:
//!
//! - Console output in a human-readable or JSON format
//! - An optional log file next to the console output
//! - A file-only mode for hosts that own stdout (GUI debuggers, plugins)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use umbra_utils::init_logging;
//!
//! init_logging().expect("Failed to initialize logging");
//! tracing::info!(pid = 10, "bridge attached");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g. `RUST_LOG=umbra_core=debug`)
//! - `UMBRA_LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `UMBRA_LOG_FILE`: Optional path of a daily-rolling log file

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::{env, io};

use chrono::Utc;
use tracing::Level;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    Pretty,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "text" => Ok(LogFormat::Pretty),
            "json" | "prod" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(s.to_string())),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level (default)
    Info,
    /// Debug level, one line per native call
    Debug,
    /// Trace level, includes ignored events
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(s.to_string())),
        }
    }
}

/// Initialize logging from the environment
///
/// Reads `UMBRA_LOG_FORMAT`, `UMBRA_LOG_FILE` and `RUST_LOG`. An unparseable
/// `UMBRA_LOG_FORMAT` falls back to [`LogFormat::Pretty`].
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging() -> Result<(), LoggingError>
{
    let format = env::var("UMBRA_LOG_FORMAT")
        .ok()
        .and_then(|s| LogFormat::from_str(&s).ok())
        .unwrap_or(LogFormat::Pretty);

    let log_file = env::var("UMBRA_LOG_FILE").ok().map(PathBuf::from);
    init_console(format, Level::INFO, log_file)
}

/// Initialize logging with an explicit level and format
///
/// `RUST_LOG` still wins when it is set, so module-specific filters keep
/// working.
///
/// ## Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    let log_file = env::var("UMBRA_LOG_FILE").ok().map(PathBuf::from);
    init_console(format, level.into(), log_file)
}

/// Initialize file-only logging inside `dir`
///
/// Used when the embedding debugger owns stdout. The file is named
/// `YYYY-MM-DD-umbra.log`; `dir` is created if missing.
///
/// ## Errors
///
/// Returns an error if the directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging_to_file(dir: &Path, level: Option<LogLevel>) -> Result<PathBuf, LoggingError>
{
    std::fs::create_dir_all(dir)?;
    let today = Utc::now().format("%Y-%m-%d");
    let log_file = dir.join(format!("{today}-umbra.log"));

    // An explicit level beats RUST_LOG here: the caller asked for it.
    let env_filter = match level {
        Some(level) => EnvFilter::new(Level::from(level).to_string()),
        None => build_filter(Level::INFO),
    };

    let file_appender = tracing_appender::rolling::never(dir, log_file.file_name().unwrap_or_default());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    // The writer thread must outlive every span; there is no teardown hook.
    std::mem::forget(guard);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_target(true)
        .with_thread_ids(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_ansi(false)
        .with_filter(env_filter);

    Registry::default()
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::InitializationFailed(e.to_string()))?;
    Ok(log_file)
}

fn build_filter(default_level: Level) -> EnvFilter
{
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level.to_string()))
}

fn init_console(format: LogFormat, default_level: Level, log_file: Option<PathBuf>) -> Result<(), LoggingError>
{
    let file_writer = log_file.map(|path| {
        let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let appender = tracing_appender::rolling::daily(dir, path.file_name().unwrap_or_default());
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        std::mem::forget(guard);
        non_blocking
    });

    let result = match format {
        LogFormat::Pretty => {
            let console_layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(true)
                .with_writer(io::stderr)
                .with_filter(build_filter(default_level));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .with_filter(build_filter(default_level))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
        LogFormat::Json => {
            let console_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_current_span(true)
                .with_span_list(true)
                .with_writer(io::stderr)
                .with_filter(build_filter(default_level));
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_current_span(true)
                    .with_filter(build_filter(default_level))
            });
            Registry::default().with(console_layer).with(file_layer).try_init()
        }
    };

    result.map_err(|e| LoggingError::InitializationFailed(e.to_string()))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Unknown log format: {0}. Use 'pretty' or 'json'")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Unknown log level: {0}. Use 'error', 'warn', 'info', 'debug', or 'trace'")]
    InvalidLevel(String),

    /// A global subscriber was already installed
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}
