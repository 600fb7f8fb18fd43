//! Recordings listing and retention. The storage directory is the catalog: every
//! fact about a recording comes from its file name.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, error, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use crate::camera_config::CameraId;
use crate::common::file_utils;
use crate::errors::AppError;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingEntry {
    pub filename: String,
    pub camera_id: CameraId,
    pub timestamp: NaiveDateTime,
    pub filepath: PathBuf,
}

/// Which file time a retention sweep measures age from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgeBasis {
    /// Creation time, or modification time where the filesystem does not record creation.
    #[default]
    Created,
    Modified,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct RecordingCatalog {
    storage_dir: PathBuf,
    extension: String,
    age_basis: AgeBasis,
}

impl RecordingCatalog {
    pub fn new(storage_dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        RecordingCatalog {
            storage_dir: storage_dir.into(),
            extension: extension.into(),
            age_basis: AgeBasis::default(),
        }
    }

    pub fn with_age_basis(mut self, age_basis: AgeBasis) -> Self {
        self.age_basis = age_basis;
        self
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Recordings matching the optional filters, newest first. Files that do not follow
    /// the naming convention are skipped.
    pub fn list(
        &self,
        camera_id: Option<CameraId>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<RecordingEntry>, AppError> {
        let list_start = Instant::now();
        if !self.storage_dir.exists() {
            debug!(
                "Storage directory {} does not exist yet; no recordings.",
                self.storage_dir.display()
            );
            return Ok(Vec::new());
        }

        let mut recordings = Vec::new();
        for dir_entry in fs::read_dir(&self.storage_dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let Some(filename) = dir_entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let parsed = file_utils::parse_recording_file_name(&filename, &self.extension);
            let Some((file_camera_id, timestamp)) = parsed else {
                continue;
            };
            if camera_id.is_some_and(|id| id != file_camera_id) {
                continue;
            }
            if date.is_some_and(|d| d != timestamp.date()) {
                continue;
            }
            recordings.push(RecordingEntry {
                filepath: dir_entry.path(),
                filename,
                camera_id: file_camera_id,
                timestamp,
            });
        }

        recordings.sort_by(|a, b| {
            b.timestamp.cmp(&a.timestamp).then_with(|| b.camera_id.cmp(&a.camera_id))
        });
        debug!(
            "Listed {} recording(s) (camera: {:?}, date: {:?}) in {:?}",
            recordings.len(), camera_id, date, list_start.elapsed()
        );
        Ok(recordings)
    }

    /// Deletes recordings whose age in whole days is strictly greater than
    /// `retention_days`. A failed deletion is logged and counted; the sweep goes on.
    pub fn cleanup_older_than(
        &self,
        retention_days: u32,
        now: SystemTime,
    ) -> Result<CleanupReport, AppError> {
        self.sweep(retention_days, now, |path| fs::remove_file(path))
    }

    fn sweep<F>(
        &self,
        retention_days: u32,
        now: SystemTime,
        mut remove: F,
    ) -> Result<CleanupReport, AppError>
    where
        F: FnMut(&Path) -> std::io::Result<()>,
    {
        let sweep_start = Instant::now();
        let mut report = CleanupReport::default();
        if !self.storage_dir.exists() {
            return Ok(report);
        }

        for dir_entry in fs::read_dir(&self.storage_dir)? {
            let dir_entry = match dir_entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(
                        "Skipping unreadable directory entry in {}: {}",
                        self.storage_dir.display(),
                        e
                    );
                    report.failed += 1;
                    continue;
                }
            };
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            match dir_entry.file_type() {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Could not read file type of {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            }
            let file_time = match self.file_time(&path) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Could not read file times of {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };
            let age = now.duration_since(file_time).unwrap_or(Duration::ZERO);
            let age_days = age.as_secs() / SECS_PER_DAY;
            if age_days <= u64::from(retention_days) {
                continue;
            }
            match remove(&path) {
                Ok(()) => {
                    report.deleted += 1;
                    info!(
                        "🗑️ Deleted old recording: {} ({} days old)",
                        path.display(),
                        age_days
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    error!("❌ Failed to delete old recording {}: {}", path.display(), e);
                }
            }
        }

        info!(
            "🧹 Cleanup complete in {:?}. Deleted {} old recording(s), {} failure(s).",
            sweep_start.elapsed(), report.deleted, report.failed
        );
        Ok(report)
    }

    fn file_time(&self, path: &Path) -> std::io::Result<SystemTime> {
        let metadata = fs::metadata(path)?;
        match self.age_basis {
            AgeBasis::Created => metadata.created().or_else(|_| metadata.modified()),
            AgeBasis::Modified => metadata.modified(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    fn set_age(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * SECS_PER_DAY + 60);
        File::options().write(true).open(path).unwrap().set_modified(when).unwrap();
    }

    fn seeded() -> (tempfile::TempDir, RecordingCatalog) {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "camera_1_20240101_080000.mjpeg",
            "camera_1_20240102_090000.mjpeg",
            "camera_2_20240101_100000.mjpeg",
            "camera_2_20240102_070000.mjpeg",
            // Not recordings as far as the catalog is concerned:
            "camera_1_20240102.mjpeg",
            "camera_1_20240102_090000.mp4",
            "readme.txt",
        ] {
            touch(dir.path(), name);
        }
        let catalog = RecordingCatalog::new(dir.path(), "mjpeg");
        (dir, catalog)
    }

    #[test]
    fn unfiltered_listing_is_newest_first() {
        let (_dir, catalog) = seeded();
        let all = catalog.list(None, None).unwrap();
        let names: Vec<_> = all.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "camera_1_20240102_090000.mjpeg",
                "camera_2_20240102_070000.mjpeg",
                "camera_2_20240101_100000.mjpeg",
                "camera_1_20240101_080000.mjpeg",
            ]
        );
    }

    #[test]
    fn filters_by_camera_and_date() {
        let (_dir, catalog) = seeded();
        let cam1 = catalog.list(Some(1), None).unwrap();
        assert_eq!(cam1.len(), 2);
        assert!(cam1.iter().all(|r| r.camera_id == 1));

        let jan2 = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let day = catalog.list(None, Some(jan2)).unwrap();
        assert_eq!(day.len(), 2);
        assert!(day.iter().all(|r| r.timestamp.date() == jan2));

        let both = catalog.list(Some(2), Some(jan2)).unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].filename, "camera_2_20240102_070000.mjpeg");
        assert_eq!(both[0].filepath, catalog.storage_dir().join("camera_2_20240102_070000.mjpeg"));
    }

    #[test]
    fn missing_directory_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = RecordingCatalog::new(dir.path().join("absent"), "mjpeg");
        assert!(catalog.list(None, None).unwrap().is_empty());
        let report = catalog.cleanup_older_than(7, SystemTime::now()).unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[test]
    fn cleanup_deletes_only_files_past_retention() {
        let dir = tempfile::tempdir().unwrap();
        let old_a = touch(dir.path(), "camera_1_20240101_080000.mjpeg");
        let old_b = touch(dir.path(), "camera_2_20240101_080000.mjpeg");
        let edge = touch(dir.path(), "camera_1_20240105_080000.mjpeg");
        let fresh = touch(dir.path(), "camera_1_20240110_080000.mjpeg");
        let other = touch(dir.path(), "notes.txt");
        set_age(&old_a, 8);
        set_age(&old_b, 30);
        set_age(&edge, 7);
        set_age(&fresh, 1);
        set_age(&other, 90);

        let catalog = RecordingCatalog::new(dir.path(), "mjpeg").with_age_basis(AgeBasis::Modified);
        let report = catalog.cleanup_older_than(7, SystemTime::now()).unwrap();
        assert_eq!(report, CleanupReport { deleted: 2, failed: 0 });
        assert!(!old_a.exists());
        assert!(!old_b.exists());
        assert!(edge.exists(), "exactly 7 days old is within the window");
        assert!(fresh.exists());
        assert!(other.exists(), "non-recording files are never touched");
    }

    #[test]
    fn cleanup_with_creation_basis_keeps_new_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = touch(dir.path(), "camera_3_20240101_080000.mjpeg");
        let catalog = RecordingCatalog::new(dir.path(), "mjpeg");
        assert_eq!(catalog.cleanup_older_than(7, SystemTime::now()).unwrap().deleted, 0);
        let later = SystemTime::now() + Duration::from_secs(9 * SECS_PER_DAY);
        assert_eq!(catalog.cleanup_older_than(7, later).unwrap().deleted, 1);
        assert!(!path.exists());
    }

    #[test]
    fn directories_named_like_recordings_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let real = touch(dir.path(), "camera_1_20240101_080000.mjpeg");
        let fake = dir.path().join("camera_3_20240103_080000.mjpeg");
        fs::create_dir(&fake).unwrap();
        set_age(&real, 30);

        let catalog = RecordingCatalog::new(dir.path(), "mjpeg").with_age_basis(AgeBasis::Modified);
        let all = catalog.list(None, None).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].filepath, real);

        let later = SystemTime::now() + Duration::from_secs(30 * SECS_PER_DAY);
        let report = catalog.cleanup_older_than(7, later).unwrap();
        assert_eq!(report, CleanupReport { deleted: 1, failed: 0 });
        assert!(fake.is_dir());
    }

    #[test]
    fn sweep_goes_on_after_a_failed_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let stuck = touch(dir.path(), "camera_1_20240101_080000.mjpeg");
        let old = touch(dir.path(), "camera_2_20240101_080000.mjpeg");
        set_age(&stuck, 30);
        set_age(&old, 30);

        let catalog = RecordingCatalog::new(dir.path(), "mjpeg").with_age_basis(AgeBasis::Modified);
        let report = catalog
            .sweep(7, SystemTime::now(), |path| {
                if path == stuck.as_path() {
                    Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"))
                } else {
                    fs::remove_file(path)
                }
            })
            .unwrap();

        assert_eq!(report, CleanupReport { deleted: 1, failed: 1 });
        assert!(stuck.exists());
        assert!(!old.exists());
    }
}
