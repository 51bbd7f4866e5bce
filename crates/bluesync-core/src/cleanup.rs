//! Tree cleanup and track deletion.
//!
//! After tracks are moved or deleted, folders without any music file are
//! removed, deepest first, so a parent that only held an emptied child is
//! removed in the same pass. Failures on single folders are collected and
//! reported once.
//!
//! # Example
//!
//! ```rust,ignore
//! use bluesync_core::cleanup::cleanup_empty_folders;
//!
//! let report = cleanup_empty_folders(root);
//! if let Some(warning) = report.warning() {
//!     eprintln!("{warning}");
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::context::{OperationContext, Progress};
use crate::error::{Error, FileSystemError};
use crate::paths;

/// Warning shown when some folders could not be removed.
pub const CLEANUP_WARNING: &str =
    "Could not remove obsolete folders. You may have to delete some folders manually.";

/// Result of a cleanup pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Folders that were removed.
    pub removed: Vec<PathBuf>,
    /// Folders that could not be removed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
}

impl CleanupReport {
    /// Check if every obsolete folder was removed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Aggregated user-facing warning, if any folder could not be removed.
    #[must_use]
    pub fn warning(&self) -> Option<&'static str> {
        if self.failed.is_empty() {
            None
        } else {
            Some(CLEANUP_WARNING)
        }
    }

    /// Get a summary string of the cleanup result.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Removed {} empty folders ({} failed)",
            self.removed.len(),
            self.failed.len()
        )
    }
}

/// Check if a directory holds a music file at any depth.
fn contains_music(dir: &Path) -> bool {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .any(|entry| entry.file_type().is_file() && paths::is_music_file(entry.path()))
}

/// Remove every folder below `root` that holds no music file.
///
/// The root itself is never removed.
pub fn cleanup_empty_folders(root: &Path) -> CleanupReport {
    debug!("Cleaning up empty folders below {}", root.display());

    let mut dirs: Vec<(usize, PathBuf)> = WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| (entry.depth(), entry.into_path()))
        .collect();
    dirs.sort_by_key(|(depth, _)| std::cmp::Reverse(*depth));

    let mut report = CleanupReport::default();
    for (_, dir) in dirs {
        if !dir.is_dir() || contains_music(&dir) {
            continue;
        }

        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                debug!("Removed empty folder: {}", dir.display());
                report.removed.push(dir);
            }
            Err(e) => {
                warn!("Failed to remove folder {}: {}", dir.display(), e);
                report.failed.push((dir, e.to_string()));
            }
        }
    }

    if report.is_success() {
        info!("{}", report.summary());
    } else {
        warn!("{}", report.summary());
    }
    report
}

/// Result of deleting tracks.
#[derive(Debug, Default)]
pub struct DeleteReport {
    /// Relative entries of the deleted tracks, for playlist synchronisation.
    pub deleted: Vec<String>,
    /// The failure that stopped the run, if any.
    pub failure: Option<Error>,
    /// Whether the run stopped because of cancellation.
    pub cancelled: bool,
    /// Result of the cleanup pass, if it ran.
    pub cleanup: Option<CleanupReport>,
}

impl DeleteReport {
    /// Check if every requested track was deleted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none() && !self.cancelled
    }

    /// Get a summary string of the delete result.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut summary = format!("Deleted {} tracks", self.deleted.len());
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        if let Some(failure) = &self.failure {
            summary.push_str(&format!(", stopped: {failure}"));
        }
        summary
    }
}

/// Delete tracks, then remove folders left without music.
///
/// Cancellation is checked before every file; a failure stops the run. In
/// both cases the tracks deleted so far are reported so playlists can drop
/// them. Cleanup only runs when every track was deleted.
pub fn delete_tracks(root: &Path, tracks: &[PathBuf], ctx: &OperationContext) -> DeleteReport {
    info!("Deleting {} tracks below {}", tracks.len(), root.display());
    let mut report = DeleteReport::default();

    for (index, track) in tracks.iter().enumerate() {
        if ctx.is_cancelled() {
            info!("Delete cancelled after {} tracks", report.deleted.len());
            report.cancelled = true;
            break;
        }

        ctx.report(Progress::fraction(
            index,
            tracks.len(),
            format!("Deleting {}...", track.display()),
        ));

        let entry = match paths::relative_path(root, track) {
            Ok(entry) => entry,
            Err(e) => {
                report.failure = Some(e);
                break;
            }
        };

        if let Err(e) = fs::remove_file(track) {
            warn!("Failed to delete {}: {}", track.display(), e);
            report.failure = Some(Error::FileSystem(FileSystemError::DeleteFailed {
                path: track.clone(),
                reason: e.to_string(),
            }));
            break;
        }
        debug!("Deleted track: {}", track.display());
        report.deleted.push(entry);
    }

    if report.is_success() {
        ctx.report(Progress::indeterminate("Cleanup folders..."));
        let cleanup = cleanup_empty_folders(root);
        if let Some(warning) = cleanup.warning() {
            ctx.report_error(warning);
        }
        report.cleanup = Some(cleanup);
    } else if let Some(failure) = &report.failure {
        ctx.report_error(&failure.to_string());
    }

    ctx.idle();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create dir");
        }
        fs::write(path, b"audio").expect("Failed to write file");
    }

    #[test]
    fn test_cleanup_removes_nested_empty_folders() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        touch(&root.join("keep").join("01.mp3"));
        touch(&root.join("parent").join("child").join("cover.jpg"));
        fs::create_dir_all(root.join("empty")).expect("Failed to create dir");

        let report = cleanup_empty_folders(root);

        assert!(report.is_success());
        assert!(root.join("keep").join("01.mp3").exists());
        assert!(!root.join("parent").exists());
        assert!(!root.join("empty").exists());
        assert!(root.exists());
        assert!(report.warning().is_none());
    }

    #[test]
    fn test_cleanup_keeps_folder_with_music_deep_below() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        touch(&root.join("a").join("b").join("c").join("01.MP3"));
        fs::create_dir_all(root.join("a").join("empty")).expect("Failed to create dir");

        let report = cleanup_empty_folders(root);

        assert!(root.join("a").join("b").join("c").join("01.MP3").exists());
        assert!(!root.join("a").join("empty").exists());
        assert_eq!(report.removed.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_cleanup_collects_failures_and_continues() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let locked = root.join("locked");
        let child = locked.join("child");
        fs::create_dir_all(&child).expect("Failed to create dir");
        fs::create_dir_all(root.join("empty")).expect("Failed to create dir");
        touch(&root.join("keep").join("01.mp3"));

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555))
            .expect("Failed to lock folder");
        // Privileged users can still delete below a read-only folder.
        let writable = locked.join("writable");
        if fs::create_dir(&writable).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))
                .expect("Failed to unlock folder");
            return;
        }

        let report = cleanup_empty_folders(root);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))
            .expect("Failed to unlock folder");

        assert!(!report.is_success());
        assert!(report.failed.iter().any(|(path, _)| path == &child));
        assert_eq!(report.warning(), Some(CLEANUP_WARNING));
        assert!(child.exists());
        assert!(!root.join("empty").exists());
        assert!(root.join("keep").join("01.mp3").exists());
    }

    #[test]
    fn test_delete_tracks_reports_relative_entries_and_cleans_up() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let a = root.join("001").join("001.mp3");
        let b = root.join("002").join("001.mp3");
        touch(&a);
        touch(&b);

        let report = delete_tracks(root, &[a.clone()], &OperationContext::new());

        assert!(report.is_success());
        assert_eq!(report.deleted, ["001\\001.mp3"]);
        assert!(!root.join("001").exists());
        assert!(b.exists());
    }

    #[test]
    fn test_delete_tracks_cancelled_before_start() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let a = root.join("001").join("001.mp3");
        touch(&a);

        let ctx = OperationContext::new();
        ctx.cancel();
        let report = delete_tracks(root, &[a.clone()], &ctx);

        assert!(report.cancelled);
        assert!(report.deleted.is_empty());
        assert!(report.cleanup.is_none());
        assert!(a.exists());
    }

    #[test]
    fn test_delete_missing_track_stops_run() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let root = dir.path();
        let present = root.join("001").join("002.mp3");
        touch(&present);

        let report = delete_tracks(
            root,
            &[root.join("001").join("001.mp3"), present.clone()],
            &OperationContext::new(),
        );

        assert!(!report.is_success());
        assert!(report.failure.is_some());
        assert!(report.deleted.is_empty());
        assert!(present.exists());
    }
}
