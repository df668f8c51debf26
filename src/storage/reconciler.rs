//! Reconciliation pass over the data directory
//!
//! Walks the whole tree and resolves every tombstone it meets:
//! - no paired object: the tombstone is an orphan and is removed
//! - object not newer than the tombstone: both are removed
//! - object newer than the tombstone: it was written again, only the tombstone goes
//!
//! The first error that is not a missing file aborts the pass.

use crate::storage::tombstone::{supersedes, Tombstones};
use crate::storage::StoreError;
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What happened to a single tombstone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    Resurrected,
    Orphaned,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Confirmed => "confirmed",
            Resolution::Resurrected => "resurrected",
            Resolution::Orphaned => "orphaned",
        }
    }
}

/// Counts of tombstones resolved by one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub confirmed: u64,
    pub resurrected: u64,
    pub orphaned: u64,
}

impl PassSummary {
    fn record(&mut self, resolution: Resolution) {
        match resolution {
            Resolution::Confirmed => self.confirmed += 1,
            Resolution::Resurrected => self.resurrected += 1,
            Resolution::Orphaned => self.orphaned += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.confirmed + self.resurrected + self.orphaned
    }
}

/// Resolves tombstones under a root directory
#[derive(Debug, Clone)]
pub struct Reconciler {
    root: PathBuf,
    tombstones: Tombstones,
}

fn remove(path: &Path) -> io::Result<()> {
    info!("Remove {}", path.display());
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl Reconciler {
    pub fn new(root: impl Into<PathBuf>, tombstones: Tombstones) -> Self {
        Self {
            root: root.into(),
            tombstones,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs one full pass, stopping at the first unrecoverable error
    pub fn run_pass(&self) -> Result<PassSummary, StoreError> {
        let mut summary = PassSummary::default();
        for entry in WalkDir::new(&self.root) {
            let entry = entry?;
            if entry.file_type().is_dir() || !self.tombstones.is_tombstone(entry.path()) {
                continue;
            }
            if let Some(resolution) = self.resolve(entry.path())? {
                summary.record(resolution);
            }
        }
        Ok(summary)
    }

    /// Resolves the tombstone at `marker`. Returns `None` if the tombstone
    /// disappeared before it could be inspected.
    pub fn resolve(&self, marker: &Path) -> Result<Option<Resolution>, StoreError> {
        let guarded = match self.tombstones.guarded_path(marker) {
            Some(guarded) => guarded,
            None => return Ok(None),
        };
        let deleted_at = match fs::metadata(marker) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let resolution = match fs::metadata(&guarded) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Resolution::Orphaned,
            Err(e) => return Err(e.into()),
            // Directories are never tombstoned as a unit
            Ok(meta) if meta.is_dir() => Resolution::Orphaned,
            Ok(meta) => {
                if supersedes(meta.modified()?, deleted_at) {
                    Resolution::Resurrected
                } else {
                    remove(&guarded)?;
                    Resolution::Confirmed
                }
            }
        };
        remove(marker)?;
        debug!("Tombstone {} resolved as {}", marker.display(), resolution.as_str());
        Ok(Some(resolution))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[test]
    fn test_confirmed_deletion_removes_both() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("a");
        fs::write(&object, b"x").unwrap();
        tombstones.mark_deleted(&object).unwrap();
        set_mtime(&object, SystemTime::now() - Duration::from_secs(10));

        let summary = Reconciler::new(dir.path(), tombstones.clone()).run_pass().unwrap();

        assert_eq!(summary, PassSummary { confirmed: 1, resurrected: 0, orphaned: 0 });
        assert!(!object.exists());
        assert!(!tombstones.path_for(&object).exists());
    }

    #[test]
    fn test_equal_timestamps_confirm_deletion() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("a");
        fs::write(&object, b"x").unwrap();
        tombstones.mark_deleted(&object).unwrap();
        let t = SystemTime::now() - Duration::from_secs(10);
        set_mtime(&object, t);
        set_mtime(&tombstones.path_for(&object), t);

        let summary = Reconciler::new(dir.path(), tombstones).run_pass().unwrap();
        assert_eq!(summary.confirmed, 1);
        assert!(!object.exists());
    }

    #[test]
    fn test_resurrection_keeps_object() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("sub/a");
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(&object, b"old").unwrap();
        tombstones.mark_deleted(&object).unwrap();
        set_mtime(&tombstones.path_for(&object), SystemTime::now() - Duration::from_secs(10));
        fs::write(&object, b"new").unwrap();
        set_mtime(&object, SystemTime::now());

        let summary = Reconciler::new(dir.path(), tombstones.clone()).run_pass().unwrap();

        assert_eq!(summary.resurrected, 1);
        assert_eq!(fs::read(&object).unwrap(), b"new");
        assert!(!tombstones.path_for(&object).exists());
    }

    #[test]
    fn test_orphan_tombstone_is_purged() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let marker = dir.path().join("ghost.gone");
        File::create(&marker).unwrap();

        let summary = Reconciler::new(dir.path(), tombstones).run_pass().unwrap();
        assert_eq!(summary.orphaned, 1);
        assert!(!marker.exists());
    }

    #[test]
    fn test_tombstone_next_to_directory_leaves_directory() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        fs::create_dir(dir.path().join("d")).unwrap();
        fs::write(dir.path().join("d/inner"), b"x").unwrap();
        File::create(dir.path().join("d.gone")).unwrap();

        let summary = Reconciler::new(dir.path(), tombstones).run_pass().unwrap();
        assert_eq!(summary.orphaned, 1);
        assert!(dir.path().join("d/inner").exists());
        assert!(!dir.path().join("d.gone").exists());
    }

    #[test]
    fn test_untouched_objects_survive() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("plain"), b"x").unwrap();

        let summary = Reconciler::new(dir.path(), Tombstones::new(".gone")).run_pass().unwrap();
        assert_eq!(summary.total(), 0);
        assert!(dir.path().join("plain").exists());
    }

    #[test]
    fn test_missing_root_aborts_pass() {
        let dir = tempdir().unwrap();
        let reconciler = Reconciler::new(dir.path().join("absent"), Tombstones::new(".gone"));
        assert!(matches!(reconciler.run_pass(), Err(StoreError::Walk(_))));
    }
}
