//! Durable record helpers shared by the queue and the context store
//!
//! A durable record is written to a temp file in the destination directory
//! and renamed over its final name. Readers see either the old record, the
//! new one, or nothing; never a partial file. A crash mid-write leaves an
//! orphaned temp file that directory scans ignore.

use repogent_core::Result;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Extension of committed records
pub(crate) const RECORD_EXTENSION: &str = "json";

const TEMP_PREFIX: &str = ".tmp-";
const TEMP_SUFFIX: &str = ".partial";

/// Write `bytes` to `path` atomically via a temp file in `dir`
///
/// On any failure the temp file is removed when the handle drops.
pub(crate) fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;

    tmp.write_all(bytes)?;
    tmp.flush()?;
    if let Err(e) = tmp.as_file().sync_all() {
        warn!(error = %e, "Failed to sync temp file to disk");
    }

    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "Atomic write completed");
    Ok(())
}

/// Committed record files in `dir`, in directory order
pub(crate) fn list_records(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut records = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if is_record(&path) {
            records.push(path);
        }
    }
    Ok(records)
}

fn is_record(path: &Path) -> bool {
    let is_temp = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(TEMP_PREFIX));
    !is_temp && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION)
}

/// Modification time, `None` if the file vanished or has no mtime
pub(crate) fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Remove a file, treating a concurrent removal as success
///
/// Returns `false` when another process got there first.
pub(crate) fn remove_record(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete temp files older than `max_age` left behind by crashed writers
///
/// Younger temp files may belong to a writer that is still running.
pub(crate) fn purge_orphans(dir: &Path, max_age: Duration) -> Result<usize> {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        let is_temp = path.file_name().and_then(|n| n.to_str()).is_some_and(|n| {
            n.starts_with(TEMP_PREFIX) && n.ends_with(TEMP_SUFFIX)
        });
        if !is_temp {
            continue;
        }

        let age = modified(&path)
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match remove_record(&path) {
            Ok(true) => {
                debug!(path = %path.display(), "Removed interrupted write");
                removed += 1;
            }
            Ok(false) => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove orphaned temp file"),
        }
    }

    Ok(removed)
}
