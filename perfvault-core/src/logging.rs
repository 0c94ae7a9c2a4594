//! Logging infrastructure for perfvault
//!
//! Logs go to the XDG state directory, one file per day named
//! `perfvault.YYYY-MM-DD.log`. Older files beyond `logging.max_files` are
//! pruned by the appender.

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "perfvault";
const LOG_SUFFIX: &str = "log";

/// Initialize the logging system
///
/// `RUST_LOG` overrides the configured level when set.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    let log_dir = Config::state_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix(LOG_SUFFIX)
        .max_log_files(config.max_files.max(1))
        .build(&log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!(
        file = %log_file_path(chrono::Utc::now().date_naive()).display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Route store logs to the test harness output; safe to call repeatedly.
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Flushes pending log lines when dropped. Hold it for the life of the process.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// The file the daily appender writes to on `date`.
pub fn log_file_path(date: NaiveDate) -> PathBuf {
    Config::state_dir().join(format!(
        "{LOG_PREFIX}.{}.{LOG_SUFFIX}",
        date.format("%Y-%m-%d")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_is_dated() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let path = log_file_path(date);
        assert!(path.ends_with("perfvault.2024-03-05.log"), "{}", path.display());
        assert!(path.starts_with(Config::state_dir()));
    }
}
