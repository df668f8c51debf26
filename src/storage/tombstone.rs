//! Tombstone markers and the visibility rule built on them
//!
//! A tombstone is an empty file named `<object><suffix>` next to the object it
//! guards. Its modification time records when the delete was requested. An
//! object stays visible only if it was modified strictly after that moment.

use log::warn;
use std::ffi::{OsStr, OsString};
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Returns true if an object modified at `object` survives a tombstone
/// written at `tombstone`. Equal timestamps resolve toward deletion.
pub fn supersedes(object: SystemTime, tombstone: SystemTime) -> bool {
    object > tombstone
}

/// Creates and inspects tombstone markers for a fixed suffix
#[derive(Debug, Clone)]
pub struct Tombstones {
    suffix: String,
}

impl Tombstones {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Path of the tombstone guarding `object`
    pub fn path_for(&self, object: &Path) -> PathBuf {
        let mut name = OsString::from(object.as_os_str());
        name.push(&self.suffix);
        PathBuf::from(name)
    }

    /// Whether a bare file name is a tombstone name
    pub fn is_tombstone_name(&self, name: &str) -> bool {
        self.strip(name).is_some()
    }

    /// Whether the final component of `path` is a tombstone name
    pub fn is_tombstone(&self, path: &Path) -> bool {
        path.file_name().and_then(|n| self.strip_os(n)).is_some()
    }

    /// Strips the suffix from a tombstone name, returning the guarded name
    pub fn strip<'a>(&self, name: &'a str) -> Option<&'a str> {
        name.strip_suffix(self.suffix.as_str())
    }

    /// Strips the suffix from a raw file name. Names need not be UTF-8,
    /// since recursive deletes mark whatever the walk finds.
    #[cfg(unix)]
    pub fn strip_os<'a>(&self, name: &'a OsStr) -> Option<&'a OsStr> {
        use std::os::unix::ffi::OsStrExt;
        name.as_bytes()
            .strip_suffix(self.suffix.as_bytes())
            .map(OsStr::from_bytes)
    }

    #[cfg(not(unix))]
    pub fn strip_os<'a>(&self, name: &'a OsStr) -> Option<&'a OsStr> {
        name.to_str().and_then(|n| self.strip(n)).map(OsStr::new)
    }

    /// Path of the object guarded by the tombstone at `tombstone`
    pub fn guarded_path(&self, tombstone: &Path) -> Option<PathBuf> {
        let guarded = self.strip_os(tombstone.file_name()?)?;
        Some(tombstone.with_file_name(guarded))
    }

    /// Creates or refreshes the tombstone for `object`, stamped with the current time
    pub fn mark_deleted(&self, object: &Path) -> io::Result<()> {
        let marker = self.path_for(object);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&marker)?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }

    /// Whether `object` exists and is not hidden by its tombstone
    pub fn is_visible(&self, object: &Path) -> bool {
        let object_meta = match fs::metadata(object) {
            Ok(meta) => meta,
            Err(_) => return false,
        };
        if object_meta.is_dir() {
            return true;
        }

        let marker = self.path_for(object);
        let tombstone_meta = match fs::metadata(&marker) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => {
                warn!("Failed to stat tombstone {}: {}", marker.display(), e);
                return false;
            }
        };
        if !tombstone_meta.is_file() {
            return true;
        }

        match (object_meta.modified(), tombstone_meta.modified()) {
            (Ok(object_time), Ok(tombstone_time)) => supersedes(object_time, tombstone_time),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Modification time unavailable for {}: {}", object.display(), e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::Duration;
    use tempfile::tempdir;

    fn set_mtime(path: &Path, time: SystemTime) {
        File::options().write(true).open(path).unwrap().set_modified(time).unwrap();
    }

    #[test]
    fn test_names_and_paths() {
        let tombstones = Tombstones::new(".gone");
        let object = Path::new("/data/foo/bar.txt");

        assert_eq!(tombstones.path_for(object), PathBuf::from("/data/foo/bar.txt.gone"));
        assert!(tombstones.is_tombstone(Path::new("/data/foo/bar.txt.gone")));
        assert!(!tombstones.is_tombstone(object));
        assert_eq!(tombstones.strip("bar.txt.gone"), Some("bar.txt"));
        assert_eq!(tombstones.strip("bar.txt"), None);
        assert_eq!(
            tombstones.guarded_path(Path::new("/data/foo/bar.txt.gone")),
            Some(PathBuf::from("/data/foo/bar.txt"))
        );
    }

    #[test]
    fn test_visibility_follows_timestamps() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("a");
        fs::write(&object, b"x").unwrap();

        assert!(tombstones.is_visible(&object));

        tombstones.mark_deleted(&object).unwrap();
        let marker = tombstones.path_for(&object);
        let base = SystemTime::now() - Duration::from_secs(60);

        set_mtime(&marker, base);
        set_mtime(&object, base);
        assert!(!tombstones.is_visible(&object), "tie must hide the object");

        set_mtime(&object, base - Duration::from_secs(1));
        assert!(!tombstones.is_visible(&object));

        set_mtime(&object, base + Duration::from_secs(1));
        assert!(tombstones.is_visible(&object));
    }

    #[test]
    fn test_missing_object_and_directories() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");

        assert!(!tombstones.is_visible(&dir.path().join("missing")));
        assert!(tombstones.is_visible(dir.path()));
    }

    #[test]
    fn test_directory_is_not_a_tombstone() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("a");
        fs::write(&object, b"x").unwrap();
        set_mtime(&object, SystemTime::now() - Duration::from_secs(60));
        fs::create_dir(tombstones.path_for(&object)).unwrap();

        assert!(tombstones.is_visible(&object));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_recognised() {
        use std::os::unix::ffi::OsStrExt;

        let tombstones = Tombstones::new(".gone");
        let object = Path::new("/data").join(OsStr::from_bytes(b"\xffname"));
        let marker = tombstones.path_for(&object);

        assert!(tombstones.is_tombstone(&marker));
        assert!(!tombstones.is_tombstone(&object));
        assert_eq!(tombstones.guarded_path(&marker), Some(object));
    }

    #[test]
    fn test_mark_deleted_refreshes_timestamp() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        let object = dir.path().join("a");
        fs::write(&object, b"x").unwrap();

        tombstones.mark_deleted(&object).unwrap();
        let marker = tombstones.path_for(&object);
        let old = SystemTime::now() - Duration::from_secs(3600);
        set_mtime(&marker, old);

        tombstones.mark_deleted(&object).unwrap();
        let refreshed = fs::metadata(&marker).unwrap().modified().unwrap();
        assert!(refreshed > old);
        assert_eq!(fs::metadata(&marker).unwrap().len(), 0);
    }

    #[test]
    fn test_mark_deleted_fails_without_parent() {
        let dir = tempdir().unwrap();
        let tombstones = Tombstones::new(".gone");
        assert!(tombstones.mark_deleted(&dir.path().join("no/such/dir/a")).is_err());
    }
}
