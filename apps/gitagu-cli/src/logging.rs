//! Logging initialization and log file management.
//!
//! Tracing goes to stderr (human-readable) and, for analysis commands, to a
//! JSON log file at `<log-dir>/<owner>-<repo>/<timestamp>.log`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Maximum age of log files before cleanup, in days.
const LOG_RETENTION_DAYS: u64 = 3;

/// Where tracing output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTargets<'a> {
    /// Subdirectory of the log dir for a file layer, e.g. `octo-demo`.
    pub file_target: Option<&'a str>,
    /// Whether to write to stderr; off while the terminal view owns the screen.
    pub stderr: bool,
}

/// Initialize the global tracing subscriber.
///
/// Returns the [`WorkerGuard`] of the file writer, which must be held until
/// exit so buffered lines are flushed.
///
/// # Errors
///
/// Returns an error if the log directory or file cannot be created.
pub fn init_tracing(log_dir: &Path, targets: LogTargets<'_>) -> Result<Option<WorkerGuard>> {
    let (subscriber, guard) = build_tracing(log_dir, targets)?;
    subscriber.init();
    Ok(guard)
}

fn build_tracing(
    log_dir: &Path,
    targets: LogTargets<'_>,
) -> Result<(impl tracing::Subscriber + Send + Sync, Option<WorkerGuard>)> {
    let (file_writer, guard) = match targets.file_target {
        Some(target) => {
            let (writer, guard) = open_log_writer(log_dir, target)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let stderr_layer = targets.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_filter(EnvFilter::from_default_env())
    });
    let file_layer = file_writer.map(|writer| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(file_filter())
    });

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);
    Ok((subscriber, guard))
}

/// The file keeps engine debug output unless `RUST_LOG` says otherwise.
fn file_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gitagu_core=debug"))
}

/// Create `<log-dir>/<target>/<timestamp>.log` and wrap it in a non-blocking writer.
fn open_log_writer(log_dir: &Path, target: &str) -> Result<(NonBlocking, WorkerGuard)> {
    let log_path = build_log_path(log_dir, target, SystemTime::now());
    let parent = log_path
        .parent()
        .with_context(|| format!("log path has no parent: {}", log_path.display()))?;

    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
    let file = fs::File::create(&log_path)
        .with_context(|| format!("failed to create log file: {}", log_path.display()))?;

    Ok(tracing_appender::non_blocking(file))
}

/// Remove log files older than three days below `log_dir`.
///
/// Best effort: failures are reported with `eprintln!` because tracing is
/// not initialized yet, and never abort the command.
pub fn cleanup_old_logs(log_dir: &Path) {
    if !log_dir.is_dir() {
        return;
    }
    let cutoff = SystemTime::now() - Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);
    remove_old_log_files(log_dir, cutoff);
    remove_empty_dirs(log_dir);
}

/// Directory name for a repository's logs: `owner-repo`.
pub fn log_target(owner: &str, repo: &str) -> String {
    format!("{owner}-{repo}")
}

fn build_log_path(log_dir: &Path, target: &str, now: SystemTime) -> PathBuf {
    log_dir
        .join(target)
        .join(format!("{}.log", utc_timestamp(now)))
}

/// `YYYYMMDD_HHMMSS` in UTC.
fn utc_timestamp(time: SystemTime) -> String {
    let secs = time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
    let (year, month, day) = civil_date(secs / 86_400);
    let rem = secs % 86_400;
    format!(
        "{year:04}{month:02}{day:02}_{:02}{:02}{:02}",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

/// Gregorian date for a day count since the Unix epoch (Hinnant's civil_from_days).
fn civil_date(days: u64) -> (u64, u64, u64) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe as i64 + era * 400 + i64::from(month <= 2);
    (year as u64, month, day)
}

fn remove_old_log_files(dir: &Path, cutoff: SystemTime) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            eprintln!("warning: failed to read log directory {}: {e}", dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            remove_old_log_files(&path, cutoff);
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }
        match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) if modified < cutoff => {
                if let Err(e) = fs::remove_file(&path) {
                    eprintln!("warning: failed to remove old log file {}: {e}", path.display());
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("warning: failed to stat {}: {e}", path.display()),
        }
    }
}

/// Remove empty subdirectories of `dir`, keeping `dir` itself.
fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for path in entries.flatten().map(|e| e.path()) {
        if path.is_dir() {
            remove_empty_dirs(&path);
            // fails while non-empty
            let _ = fs::remove_dir(&path);
        }
    }
}
