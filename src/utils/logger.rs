//! Logging initialization and configuration.
//!
//! stdout carries the hook decision, so diagnostics go to stderr and,
//! when a log directory is available, to a daily-rotated file.
//!
//! # Configuration
//!
//! The log level can be controlled via the `RUST_LOG` environment variable:
//! - `RUST_LOG=debug` - Show rule hits and path resolution
//! - `RUST_LOG=info` - Show info and higher level logs
//! - `RUST_LOG=warn` - Show blocks and configuration problems (default)
//! - `RUST_LOG=error` - Show audit failures only

use std::fs;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Overrides the diagnostic log directory.
pub const LOG_DIR_ENV: &str = "RUSTY_GUARD_LOG_DIR";

/// `$RUSTY_GUARD_LOG_DIR`, else `~/.config/rusty-guard/logs`.
pub fn default_log_dir() -> Option<PathBuf> {
    std::env::var_os(LOG_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(".config").join("rusty-guard").join("logs"))
        })
}

/// Initialize the logging system.
///
/// Files are named `rusty-guard.<date>.log` and rotate daily. The returned
/// guard must live until exit so buffered lines are flushed. Failing to set
/// up the file layer only costs the file output.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (file_writer, guard) = match log_dir.map(file_appender) {
        Some(Ok(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Some(Err(e)) => {
            eprintln!("Warning: Failed to open log directory: {e:#}");
            (None, None)
        }
        None => (None, None),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let file_layer = file_writer.map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false) // No ANSI colors in log files
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
    });

    // Default to "warn": every hook invocation is a fresh process.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("Warning: Logging already initialized: {e}");
    }

    guard
}

fn file_appender(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    use anyhow::Context as _;

    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("rusty-guard")
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create log file in {}", dir.display()))
}
