//! Log setup: daily rolling files under `~/.courier/logs`, stderr fallback.

use courier_core::StorageConfig;
use fs_err as fs;
use std::env;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "COURIER_LOG";
const DEBUG_ENV: &str = "COURIER_DEBUG_LOG";
const LOG_FILE_PREFIX: &str = "courier.log";

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Installs the global subscriber. Hold the returned guard for the process
/// lifetime so buffered lines are flushed on exit.
pub fn init(storage: &StorageConfig) -> Option<WorkerGuard> {
    let dir = storage.logs_dir();
    if let Err(err) = fs::create_dir_all(&dir) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .try_init();
        tracing::warn!(error = %err, "Log directory unavailable; logging to stderr");
        return None;
    }

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    if installed.is_err() {
        return None;
    }
    Some(guard)
}
