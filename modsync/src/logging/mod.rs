//! Tracing initialization: console output plus a daily-rolling file.

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{SyncError, SyncResult};

/// Install the global subscriber: human-readable console output on
/// stderr plus a daily-rolling file under `<data_dir>/logs/`.
///
/// `RUST_LOG` overrides the default level (`debug` with `verbose`,
/// `info` otherwise). Returns the appender guard; dropping it flushes
/// and stops the background writer, so hold it for the life of the
/// process.
pub fn init(data_dir: &Path, verbose: bool) -> SyncResult<WorkerGuard> {
    let logs_dir = data_dir.join("logs");
    fs::create_dir_all(&logs_dir).map_err(|e| SyncError::CreateDirFailed {
        path: logs_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&logs_dir, "modsync.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);
    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("logging already initialized: {e}")))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_log_directory() {
        let temp = TempDir::new().unwrap();

        // Another test in the process may already own the global
        // subscriber; the directory must exist either way.
        let _ = init(temp.path(), false);

        assert!(temp.path().join("logs").exists());
    }
}
