//! Tracing setup.
//!
//! Events go to the console and, without ANSI colours, to a daily
//! `<logs>/domaincrab.YYYY-MM-DD.log` which the per-domain log viewer reads back. Only the newest
//! [`MAX_LOG_FILES`] files are kept. Timestamps are printed in the user's timezone; the
//! [`TimezoneHandle`] lets a settings change switch it without rebuilding the subscriber.

use crate::config::{LOG_FILE_PREFIX, LOG_FILE_SUFFIX, MAX_LOG_FILES};
use crate::error::Error;
use chrono::Utc;
use chrono_tz::Tz;
use is_terminal::IsTerminal;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "domaincrab=info";

/// The timezone log timestamps are rendered in.
#[derive(Debug, Clone)]
pub struct TimezoneHandle(Arc<RwLock<Tz>>);

impl TimezoneHandle {
    pub fn new(tz: Tz) -> Self {
        Self(Arc::new(RwLock::new(tz)))
    }

    pub fn get(&self) -> Tz {
        *self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, tz: Tz) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = tz;
    }
}

impl FormatTime for TimezoneHandle {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            Utc::now()
                .with_timezone(&self.get())
                .format("%Y-%m-%d %H:%M:%S %Z")
        )
    }
}

/// Keeps the file writer flushing. Dropping it flushes and stops the background writer.
pub struct Logging {
    pub timezone: TimezoneHandle,
    _file_guard: WorkerGuard,
}

/// The rotating application log writer.
///
/// # Errors
///
/// Returns [`Error::LogFile`] if the logs directory can't be written.
pub fn file_appender(logs_dir: &Path) -> Result<RollingFileAppender, Error> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(logs_dir)?)
}

/// Install the global subscriber. `RUST_LOG` overrides the default `domaincrab=info` filter.
///
/// # Errors
///
/// Returns [`Error::LogFile`] if the log file can't be opened and [`Error::Logging`] if a global
/// subscriber is already installed.
pub fn init(logs_dir: &Path, tz: Tz) -> Result<Logging, Error> {
    let timezone = TimezoneHandle::new(tz);
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender(logs_dir)?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timezone.clone())
                .with_ansi(std::io::stdout().is_terminal()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(timezone.clone())
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .try_init()?;

    Ok(Logging {
        timezone,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Paths;
    use std::io::Write;
    use tempfile::TempDir;

    fn timestamp(handle: &TimezoneHandle) -> String {
        let mut out = String::new();
        handle.format_time(&mut Writer::new(&mut out)).unwrap();
        out
    }

    #[test]
    fn timestamps_follow_the_handle() {
        let handle = TimezoneHandle::new(Tz::UTC);
        assert!(timestamp(&handle).ends_with("UTC"));

        let shared = handle.clone();
        shared.set(chrono_tz::Asia::Tokyo);
        assert_eq!(handle.get(), chrono_tz::Asia::Tokyo);
        assert!(timestamp(&handle).ends_with("JST"));
    }

    #[test]
    fn appender_writes_the_dated_log_file() {
        let dir = TempDir::new().unwrap();
        let paths = Paths {
            config_dir: dir.path().join("config"),
            certs_dir: dir.path().join("certs"),
            logs_dir: dir.path().to_path_buf(),
        };
        let mut appender = file_appender(&paths.logs_dir).unwrap();
        writeln!(appender, "INFO [a.example.com] hello").unwrap();
        appender.flush().unwrap();

        assert_eq!(
            std::fs::read_to_string(paths.log_file()).unwrap(),
            "INFO [a.example.com] hello\n"
        );
    }
}
