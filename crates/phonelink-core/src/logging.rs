//! Logging configuration using tracing

use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding the filter directives.
pub const LOG_ENV_VAR: &str = "PHONELINK_LOG";

const DEFAULT_FILTER: &str = "phonelink=info,warn";
const LOG_FILE_NAME: &str = "phonelink.log";
const TIMER_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Initialize file logging
///
/// Logs are written to `~/.local/share/phonelink/logs/` (or the platform's
/// local data directory), rotated daily. The level is controlled by the
/// `PHONELINK_LOG` environment variable.
///
/// # Examples
/// ```bash
/// PHONELINK_LOG=debug phonelink monitor
/// PHONELINK_LOG=phonelink_client=trace phonelink monitor
/// ```
pub fn init() -> Result<()> {
    let log_dir = get_log_directory();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(TIMER_FORMAT.to_string())),
        )
        .init();

    tracing::info!("phonelink starting, log directory: {}", log_dir.display());
    Ok(())
}

/// Initialize logging to stderr, for short-lived CLI commands
pub fn init_stderr() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_timer(fmt::time::ChronoLocal::new(TIMER_FORMAT.to_string())),
        )
        .init();
}

/// Filter from `PHONELINK_LOG`, falling back to the default directives
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn get_log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("phonelink").join("logs")
}

/// Path of the log file (the appender adds a date suffix when rotating)
pub fn get_current_log_file() -> PathBuf {
    get_log_directory().join(LOG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_log_file_lives_under_phonelink_dir() {
        let path = get_current_log_file();
        assert!(path.ends_with("phonelink/logs/phonelink.log"));
    }

    #[test]
    #[serial]
    fn test_env_filter_reads_variable() {
        std::env::set_var(LOG_ENV_VAR, "debug");
        let filter = env_filter();
        std::env::remove_var(LOG_ENV_VAR);
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    #[serial]
    fn test_env_filter_default() {
        std::env::remove_var(LOG_ENV_VAR);
        let filter = env_filter();
        assert!(filter.to_string().contains("phonelink=info"));
    }
}
