//! Log file setup. The terminal belongs to the TUI, so everything goes to
//! a daily rolling file instead of stderr.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

pub const LOG_FILE_PREFIX: &str = "ragbot.log";

/// Install the global subscriber. Keep the returned guard alive until
/// exit or buffered lines are lost.
///
/// `RUST_LOG` overrides the default `info` level.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false).with_target(false))
        .try_init()
        .map_err(|e| crate::error::ChatError::Config(format!("logging already initialised: {}", e)))?;

    Ok(guard)
}

/// Like [`init`], but a log directory that cannot be created or a
/// subscriber that cannot be installed only costs the log file. The
/// warning goes to stderr, which is still the plain terminal at this point.
pub fn init_or_warn(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let dir = log_dir?;
    match init(&dir) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: logging disabled, cannot write to {}: {}", dir.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_dir_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let log_dir = blocker.join("logs");

        assert!(init(&log_dir).is_err());
        assert!(init_or_warn(Some(log_dir)).is_none());
    }

    #[test]
    fn test_no_log_dir_means_no_logging() {
        assert!(init_or_warn(None).is_none());
    }
}
