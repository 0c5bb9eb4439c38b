// ABOUTME: Age-based retention sweeper for the local artifact directory.
// ABOUTME: Deletes files older than a threshold regardless of whether a queue record still points at them.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use thiserror::Error;

/// Default retention for captured artifacts.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Errors that abort a sweep. Per-file failures are logged and skipped instead.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub deleted: usize,
}

/// Delete files under `root` last modified more than `max_age` ago.
pub fn sweep(root: &Path, max_age: Duration) -> Result<SweepReport, SweepError> {
    sweep_at(root, max_age, SystemTime::now())
}

/// Same as [`sweep`] with an explicit notion of "now".
///
/// A missing root is an empty sweep. Directories are walked recursively
/// but never removed.
pub fn sweep_at(
    root: &Path,
    max_age: Duration,
    now: SystemTime,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    if !root.exists() {
        return Ok(report);
    }

    let cutoff = now.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
    let entries = fs::read_dir(root).map_err(|source| SweepError::Io {
        path: root.display().to_string(),
        source,
    })?;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot stat entry");
                continue;
            }
        };

        if file_type.is_dir() {
            match sweep_at(&path, max_age, now) {
                Ok(nested) => {
                    report.scanned += nested.scanned;
                    report.deleted += nested.deleted;
                }
                Err(e) => tracing::warn!(error = %e, "skipping unreadable subdirectory"),
            }
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        report.scanned += 1;
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "no modification time");
                continue;
            }
        };

        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "swept expired artifact");
                    report.deleted += 1;
                }
                // Already gone: someone else deleted it first.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to sweep file"),
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn write_aged(path: &Path, age: Duration) {
        fs::write(path, b"artifact").unwrap();
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn deletes_only_files_older_than_threshold() {
        let dir = TempDir::new().unwrap();
        let old = dir.path().join("old.jpg");
        let fresh = dir.path().join("fresh.jpg");
        write_aged(&old, 4 * DAY);
        write_aged(&fresh, DAY);

        let report = sweep(dir.path(), DEFAULT_MAX_AGE).unwrap();

        assert_eq!(report, SweepReport { scanned: 2, deleted: 1 });
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn walks_subdirectories_but_keeps_them() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("photos").join("2025");
        fs::create_dir_all(&nested).unwrap();
        let old = nested.join("a.jpg");
        write_aged(&old, 10 * DAY);

        let report = sweep(dir.path(), DEFAULT_MAX_AGE).unwrap();

        assert_eq!(report.deleted, 1);
        assert!(!old.exists());
        assert!(nested.is_dir());
    }

    #[test]
    fn missing_root_is_empty_sweep() {
        let dir = TempDir::new().unwrap();
        let report = sweep(&dir.path().join("nope"), DEFAULT_MAX_AGE).unwrap();
        assert_eq!(report, SweepReport::default());
    }

    #[test]
    fn explicit_now_moves_the_cutoff() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        write_aged(&file, Duration::ZERO);

        let report = sweep_at(dir.path(), DAY, SystemTime::now()).unwrap();
        assert_eq!(report.deleted, 0);

        let later = SystemTime::now() + 2 * DAY;
        let report = sweep_at(dir.path(), DAY, later).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!file.exists());
    }

    #[test]
    fn default_retention_is_three_days() {
        assert_eq!(DEFAULT_MAX_AGE, 3 * DAY);
    }
}
