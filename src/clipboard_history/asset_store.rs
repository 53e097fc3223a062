//! Loose-file storage for heavy clipboard payloads (RTF, HTML, PNG).
//!
//! Files are named `<uuid>.<ext>` inside one managed directory. Every
//! deletion is checked to stay inside that directory, both lexically and
//! after symlink resolution.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::AssetKind;
use crate::error::AssetError;

/// Outcome of one orphan reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    pub scanned: usize,
    pub deleted: usize,
    pub bytes_freed: u64,
    /// Orphans left alone because they were written too recently
    pub skipped_recent: usize,
    /// The directory had not changed since the last complete pass
    pub skipped_unchanged: bool,
}

#[derive(Debug)]
struct AssetStoreInner {
    /// Canonical managed directory; `None` when it could not be created
    dir: Option<PathBuf>,
    /// Directory as configured, before canonicalization
    configured_dir: PathBuf,
    orphan_min_age: Duration,
    last_scanned_mtime: Mutex<Option<SystemTime>>,
}

/// Cheap to clone; background workers each take their own handle.
#[derive(Debug, Clone)]
pub struct AssetStore {
    inner: Arc<AssetStoreInner>,
}

impl AssetStore {
    /// Create (once) the managed directory.
    ///
    /// A directory that cannot be created leaves the store degraded: saves
    /// return `None` and records are kept without their assets.
    pub fn open(dir: impl Into<PathBuf>, orphan_min_age: Duration) -> Self {
        let configured_dir = dir.into();
        let dir = match fs::create_dir_all(&configured_dir) {
            Ok(()) => Some(
                fs::canonicalize(&configured_dir).unwrap_or_else(|_| configured_dir.clone()),
            ),
            Err(e) => {
                warn!(
                    path = %configured_dir.display(),
                    error = %e,
                    "Failed to create asset directory, rich text and images will not be kept"
                );
                None
            }
        };

        Self {
            inner: Arc::new(AssetStoreInner {
                dir,
                configured_dir,
                orphan_min_age,
                last_scanned_mtime: Mutex::new(None),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.dir.is_some()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.inner.dir.as_deref()
    }

    /// Write `bytes` to a fresh file. Failures are logged and yield `None`.
    pub fn save(&self, bytes: &[u8], kind: AssetKind) -> Option<PathBuf> {
        let dir = match &self.inner.dir {
            Some(dir) => dir,
            None => {
                debug!(kind = kind.extension(), "Asset directory unavailable, dropping payload");
                return None;
            }
        };

        let path = dir.join(format!("{}.{}", Uuid::new_v4().simple(), kind.extension()));
        match fs::write(&path, bytes) {
            Ok(()) => {
                debug!(path = %path.display(), size = bytes.len(), "Saved asset");
                Some(path)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to save asset");
                None
            }
        }
    }

    /// Read an asset back. Missing, unreadable or out-of-bounds paths give `None`.
    pub fn load(&self, path: &Path) -> Option<Vec<u8>> {
        let resolved = match self.resolve_contained(path) {
            Ok(resolved) => resolved,
            Err(AssetError::Missing(_)) => {
                debug!(path = %path.display(), "Asset file is missing");
                return None;
            }
            Err(e @ AssetError::OutsideDirectory(_)) => {
                error!(error = %e, "Refusing to read asset outside managed directory");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to resolve asset path");
                return None;
            }
        };

        match fs::read(&resolved) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(path = %resolved.display(), error = %e, "Failed to read asset");
                None
            }
        }
    }

    /// Best-effort removal. Returns true if a file was deleted.
    pub fn delete(&self, path: &Path) -> bool {
        let resolved = match self.resolve_contained(path) {
            Ok(resolved) => resolved,
            Err(AssetError::Missing(_)) => {
                debug!(path = %path.display(), "Asset already gone");
                return false;
            }
            Err(e @ AssetError::OutsideDirectory(_)) => {
                error!(error = %e, "Refusing to delete asset outside managed directory");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Cannot delete asset");
                return false;
            }
        };

        match fs::remove_file(&resolved) {
            Ok(()) => {
                debug!(path = %resolved.display(), "Deleted asset");
                true
            }
            Err(e) => {
                warn!(path = %resolved.display(), error = %e, "Failed to delete asset");
                false
            }
        }
    }

    /// Resolve `path` to a canonical file that lives directly in the managed directory.
    pub fn resolve_contained(&self, path: &Path) -> Result<PathBuf, AssetError> {
        let dir = self.inner.dir.as_ref().ok_or(AssetError::Unavailable)?;

        let lexically_inside = path.is_absolute()
            && !path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::CurDir))
            && (path.starts_with(dir) || path.starts_with(&self.inner.configured_dir));
        if !lexically_inside {
            return Err(AssetError::OutsideDirectory(path.to_path_buf()));
        }

        let resolved = fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::Missing(path.to_path_buf()),
            _ => AssetError::Io {
                path: path.to_path_buf(),
                source: e,
            },
        })?;

        if resolved.parent() != Some(dir.as_path()) {
            return Err(AssetError::OutsideDirectory(path.to_path_buf()));
        }
        Ok(resolved)
    }

    /// Delete every regular file in the directory whose name is not referenced
    /// by `valid_paths`.
    ///
    /// Skips the scan entirely while the directory mtime matches the last
    /// complete pass. Files younger than the configured minimum age are kept
    /// so a save that has not reached the history yet is never collected.
    pub fn reconcile_orphans(&self, valid_paths: &HashSet<PathBuf>) -> Result<GcReport, AssetError> {
        let dir = self.inner.dir.as_ref().ok_or(AssetError::Unavailable)?;
        let io_err = |source: std::io::Error| AssetError::Io {
            path: dir.clone(),
            source,
        };

        let dir_mtime = fs::metadata(dir).and_then(|m| m.modified()).map_err(io_err)?;
        if *self.inner.last_scanned_mtime.lock() == Some(dir_mtime) {
            debug!("Asset directory unchanged since last pass, skipping scan");
            return Ok(GcReport {
                skipped_unchanged: true,
                ..GcReport::default()
            });
        }

        let valid_names: HashSet<OsString> = valid_paths
            .iter()
            .filter(|p| p.starts_with(dir) || p.starts_with(&self.inner.configured_dir))
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect();

        let now = SystemTime::now();
        let mut report = GcReport::default();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Failed to read asset directory entry");
                    continue;
                }
            };
            // symlink_metadata so links are never followed
            let metadata = match fs::symlink_metadata(entry.path()) {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            report.scanned += 1;

            if valid_names.contains(&entry.file_name()) {
                continue;
            }

            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < self.inner.orphan_min_age {
                report.skipped_recent += 1;
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    report.deleted += 1;
                    report.bytes_freed += metadata.len();
                }
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to delete orphaned asset");
                }
            }
        }

        if report.skipped_recent == 0 {
            *self.inner.last_scanned_mtime.lock() =
                fs::metadata(dir).and_then(|m| m.modified()).ok();
        }

        if report.deleted > 0 {
            info!(
                deleted = report.deleted,
                bytes_freed = report.bytes_freed,
                scanned = report.scanned,
                "Removed orphaned clipboard assets"
            );
        } else {
            debug!(scanned = report.scanned, "No orphaned clipboard assets");
        }
        Ok(report)
    }
}
