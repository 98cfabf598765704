//! Log file rollover and tracing setup
//!
//! Every run appends to one log file. At startup a file older than the
//! rollover age is renamed to `<stem>_<YYYYMMDD-HHMMSS>.<ext>` so the run
//! starts a fresh one.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Path the log file is rotated to, stamped with `at`.
pub fn rotated_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "zonemove".to_string());
    let stamp = at.format("%Y%m%d-%H%M%S");
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, stamp, ext.to_string_lossy()),
        None => format!("{}_{}", stem, stamp),
    };
    path.with_file_name(name)
}

/// Age of the file at `path`, by creation time where the filesystem
/// records it and modification time otherwise.
fn file_age(path: &Path, now: SystemTime) -> io::Result<Duration> {
    let metadata = fs::metadata(path)?;
    let born = metadata.created().or_else(|_| metadata.modified())?;
    Ok(now.duration_since(born).unwrap_or_default())
}

/// Renames `path` away if it is older than `max_age`.
///
/// Returns the new name when the file was rotated.
pub fn rollover(path: &Path, max_age: Duration, now: SystemTime) -> io::Result<Option<PathBuf>> {
    let age = match file_age(path, now) {
        Ok(age) => age,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if age <= max_age {
        return Ok(None);
    }

    let target = rotated_path(path, DateTime::<Local>::from(now));
    fs::rename(path, &target)?;
    Ok(Some(target))
}

/// Rotates the log file if needed and installs the global subscriber:
/// stdout plus the log file, both filtered by `level`.
///
/// Returns the rotated file name, if any, so the caller can log it once
/// tracing is up.
pub fn init(log_path: &Path, rollover_days: u32, level: &str) -> Result<Option<PathBuf>> {
    let max_age = Duration::from_secs(u64::from(rollover_days) * SECS_PER_DAY);
    let rotated = rollover(log_path, max_age, SystemTime::now())
        .with_context(|| format!("rotating log file {}", log_path.display()))?;

    if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening log file {}", log_path.display()))?;

    let filter = EnvFilter::try_new(level)
        .with_context(|| format!("invalid log level '{}'", level))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(true))
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .context("installing tracing subscriber")?;

    Ok(rotated)
}
