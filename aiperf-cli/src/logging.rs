//! Logging bring-up: env-filtered stderr plus a rolling file under the
//! artifact directory.

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use aiperf_common::config::UserConfig;
use aiperf_common::constants::{LOG_FILE, LOG_FOLDER};

/// Initialize tracing. The returned guard must live for the whole run so
/// buffered log lines are flushed at exit.
pub fn init_logging(config: &UserConfig, log_level: &str) -> anyhow::Result<WorkerGuard> {
    let logs_dir = config.output.artifact_directory.join(LOG_FOLDER);
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("creating log directory {}", logs_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&logs_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
