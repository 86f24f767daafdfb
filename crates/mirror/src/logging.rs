//! Tracing subscriber setup: console plus a per-run log file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crates whose events are enabled by default.
const WORKSPACE_TARGETS: [&str; 4] = [
    "galsync_core",
    "galsync_client",
    "galsync_sync",
    "galsync_mirror",
];

/// Filter directive enabling `level` for every workspace crate.
pub fn default_filter(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// `{YYYY-mm-dd_HH-MM-SS}.log` for the run started at `started`.
pub fn log_file_name(started: DateTime<Local>) -> String {
    format!("{}.log", started.format("%Y-%m-%d_%H-%M-%S"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`.  Returns the path of the
/// log file created under `log_dir`, which must exist.
pub fn init(log_dir: &Path, level: Level) -> std::io::Result<PathBuf> {
    let path = log_dir.join(log_file_name(Local::now()));
    let file = File::create(&path)?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(path)
}
