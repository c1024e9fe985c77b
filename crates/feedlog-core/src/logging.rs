//! Tracing setup for host applications.
//!
//! Use `RUST_LOG` to control the level (e.g. `RUST_LOG=feedlog_core=debug`).
//! On devices without a visible stderr, pass a log directory to get a
//! daily-rolling log file instead.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "warn";

/// Log file name prefix; the appender adds the date
const LOG_FILE_PREFIX: &str = "feedlog.log";

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber.
///
/// Returns the file writer's guard when logging to `log_dir`; keep it
/// alive for as long as logs should be flushed.
pub fn init(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(env_filter())
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(env_filter())
                .try_init()
                .context("Failed to install tracing subscriber")?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_an_error_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let first = init(Some(dir.path()));
        let second = init(None);
        // Another test may have installed a subscriber first; either way
        // at most one init wins and nothing panics.
        assert!(first.is_err() || second.is_err());
        tracing::warn!("logging initialised");
    }
}
