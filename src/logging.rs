//! Tracing setup: append-only log file plus stderr.

use std::fs::OpenOptions;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ConfigError;

/// Initialize the global subscriber.
///
/// The returned guard flushes the file writer when dropped; hold it until the
/// run ends, including the error path.
pub fn init(log_file: &Path) -> Result<WorkerGuard, ConfigError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|source| ConfigError::LogFile {
            path: log_file.to_path_buf(),
            source,
        })?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Subscriber(e.to_string()))?;

    Ok(guard)
}
