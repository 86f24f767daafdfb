//! Filesystem helpers for mirrored artifacts.
//!
//! Payloads are written to a temporary file in the destination
//! directory and renamed into place, so an interrupted run never leaves
//! a truncated file under its final name.

use std::fs::{File, FileTimes};
use std::io::{self, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// Write `contents` to `path` via a sibling temp file and an atomic rename.
pub fn atomic_write(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".galsync-")
        .suffix(".part")
        .tempfile_in(parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Whether `name` can be used as a file name stem inside a directory
/// without escaping it.
pub fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.chars().any(|c| c == '/' || c == '\\' || c == '\0')
}

/// Set the access and modification times of an existing file.
pub fn set_file_times(
    path: &Path,
    accessed: DateTime<Utc>,
    modified: DateTime<Utc>,
) -> io::Result<()> {
    let times = FileTimes::new()
        .set_accessed(SystemTime::from(accessed))
        .set_modified(SystemTime::from(modified));
    File::options().write(true).open(path)?.set_times(times)
}
