//! Process-wide tracing setup and the five textual log families
//! (system/receive/transfer/input/output) realized as named `tracing`
//! targets rather than bespoke fifo writers. Grounded on
//! `main.rs::init_tracing_if_requested`'s non-blocking file appender.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const SYSTEM_LOG: &str = "system_log";
pub const RECEIVE_LOG: &str = "receive_log";
pub const TRANSFER_LOG: &str = "transfer_log";
pub const INPUT_LOG: &str = "input_log";
pub const OUTPUT_LOG: &str = "output_log";

/// Initialize the global subscriber writing to `<work_dir>/log/debug.log`.
/// The returned guard must be kept alive for the process lifetime (the
/// corpus leaks it via `Box::leak`; callers here are expected to hold it in
/// their own `main` rather than leak, since the daemon entry points are
/// long-running and own their own shutdown path).
pub fn init_tracing(work_dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    let log_dir = work_dir.join("log");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::never(&log_dir, "debug.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();

    Ok(guard)
}

/// Severity codes used in the `DD HH:MM:SS S ` line prefix of the text log
/// families; `Offline` overrides to `O` for offline-suppressed directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Fatal,
    Debug,
    Config,
    Offline,
}

impl Severity {
    pub fn code(self) -> char {
        match self {
            Severity::Info => 'I',
            Severity::Warn => 'W',
            Severity::Error => 'E',
            Severity::Fatal => 'F',
            Severity::Debug => 'D',
            Severity::Config => 'C',
            Severity::Offline => 'O',
        }
    }
}

/// Emit a framed line to one of the five text log families. `target`
/// selects which family (so subscribers/appenders can filter or split by
/// `tracing`'s target mechanism); `severity` drives the level and the
/// single-char code embedded in the message.
pub fn log_line(target: &'static str, severity: Severity, message: &str) {
    let now = chrono::Local::now();
    let framed = format!("{} {} {}", now.format("%d %H:%M:%S"), severity.code(), message);
    match severity {
        Severity::Fatal | Severity::Error => tracing::error!(target: target, "{framed}"),
        Severity::Warn | Severity::Offline => tracing::warn!(target: target, "{framed}"),
        Severity::Debug => tracing::debug!(target: target, "{framed}"),
        Severity::Info | Severity::Config => tracing::info!(target: target, "{framed}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_codes_match_historical_letters() {
        assert_eq!(Severity::Info.code(), 'I');
        assert_eq!(Severity::Warn.code(), 'W');
        assert_eq!(Severity::Error.code(), 'E');
        assert_eq!(Severity::Fatal.code(), 'F');
        assert_eq!(Severity::Debug.code(), 'D');
        assert_eq!(Severity::Config.code(), 'C');
        assert_eq!(Severity::Offline.code(), 'O');
    }
}
