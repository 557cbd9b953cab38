//! Logging utilities for TubeFetch
//! Sets up the log sink and handles log file cleanup for 7-day retention

use log::{info, warn};
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_RETENTION_DAYS: u64 = 7;
const LOG_FILE_PREFIX: &str = "tubefetch";

/// Installs stderr + daily file output. `log` records are bridged into the
/// subscriber, so call sites keep using the `log` macros.
///
/// The returned guard flushes the file writer on drop; hold it for the
/// lifetime of the process.
pub fn init_logging(logs_dir: &Path) -> Option<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fs::create_dir_all(logs_dir)
        .ok()
        .and_then(|_| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(logs_dir)
                .ok()
        })
        .map(tracing_appender::non_blocking);

    let (file_writer, guard) = match file_layer {
        Some((writer, guard)) => (Some(writer), Some(guard)),
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .compact(),
    );

    let result = match file_writer {
        Some(writer) => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false)
                    .compact(),
            )
            .try_init(),
        None => registry.try_init(),
    };

    if result.is_err() {
        warn!("Logger already initialized");
    }

    guard
}

/// Stderr-only output, used by the installer helper.
pub fn init_console_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init();
}

pub fn cleanup_old_logs(logs_dir: &Path) {
    cleanup_logs_older_than(
        logs_dir,
        Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60),
        SystemTime::now(),
    );
}

fn cleanup_logs_older_than(logs_dir: &Path, retention: Duration, now: SystemTime) -> usize {
    if !logs_dir.exists() {
        return 0;
    }

    let mut removed = 0;
    if let Ok(entries) = fs::read_dir(logs_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "log") {
                let expired = fs::metadata(&path)
                    .and_then(|meta| meta.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .map_or(false, |age| age > retention);

                if expired && fs::remove_file(&path).is_ok() {
                    info!("Cleaned up old log: {:?}", path.file_name());
                    removed += 1;
                }
            }
        }
    }
    removed
}
