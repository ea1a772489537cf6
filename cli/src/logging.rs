use std::path::PathBuf;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{runtime_dir, LogLevel};

const LOG_PREFIX: &str = "pidwatt";
const KEEP_LOG_FILES: usize = 7;

static INIT: OnceLock<()> = OnceLock::new();

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    File,
    Stderr,
    Both,
}

impl LogMode {
    fn writes_file(self) -> bool {
        matches!(self, LogMode::File | LogMode::Both)
    }

    fn writes_stderr(self) -> bool {
        matches!(self, LogMode::Stderr | LogMode::Both)
    }
}

/// Keeps the non-blocking file writer alive; drop it to flush.
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Install the global subscriber. Only the first call has any effect.
pub fn init(level: LogLevel, mode: LogMode, cli_override: Option<LogLevel>) -> LogGuard {
    let mut guard = None;

    INIT.get_or_init(|| {
        let Some(level) = cli_override.unwrap_or(level).as_tracing_level() else {
            return;
        };

        let file = if mode.writes_file() {
            file_writer()
        } else {
            None
        };
        let file_layer = file.map(|(writer, worker)| {
            guard = Some(worker);
            fmt::layer()
                .with_writer(writer)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
        });

        let stderr_layer = mode.writes_stderr().then(|| {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_timer(UtcTime::rfc_3339())
                .with_ansi(true)
                .with_target(true)
        });

        let installed = tracing_subscriber::registry()
            .with(build_env_filter(level))
            .with(file_layer)
            .with(stderr_layer)
            .try_init();
        if let Err(e) = installed {
            eprintln!("Warning: logging not initialised: {}", e);
        }
    });

    LogGuard { _guard: guard }
}

fn build_env_filter(level: Level) -> EnvFilter {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // sysinfo is chatty about unreadable /proc entries at debug level.
    match "sysinfo=warn".parse::<Directive>() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    }
}

/// Daily-rotated `pidwatt.<date>.log` in the runtime dir.
fn file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let dir = log_dir();

    if let Err(e) = std::fs::create_dir_all(&dir) {
        eprintln!("Warning: Failed to create log directory {:?}: {}", dir, e);
        return None;
    }

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .max_log_files(KEEP_LOG_FILES)
        .build(&dir)
        .map_err(|e| eprintln!("Warning: Failed to open log file in {:?}: {}", dir, e))
        .ok()?;

    Some(tracing_appender::non_blocking(appender))
}

/// Directory holding the rotated log files.
pub fn log_dir() -> PathBuf {
    runtime_dir()
}
