//! Local filesystem object store

use crate::storage::listing::DirectoryLister;
use crate::storage::tombstone::Tombstones;
use crate::storage::{ReadOutcome, Storage, StoreError};
use log::{debug, info};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

/// Object store rooted at a local directory
pub struct LocalStore {
    root: PathBuf,
    tombstones: Tombstones,
    lister: DirectoryLister,
}

impl LocalStore {
    /// Opens the store, creating the root directory if it does not exist
    pub fn open(root: impl Into<PathBuf>, tombstones: Tombstones) -> io::Result<Self> {
        let root = root.into();
        if !root.exists() {
            fs::create_dir_all(&root)?;
            info!("Created data directory: {}", root.display());
        }
        Ok(Self {
            root,
            lister: DirectoryLister::new(tombstones.clone()),
            tombstones,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    /// Maps a request path onto the data directory. `..` segments are rejected.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, StoreError> {
        let mut resolved = self.root.clone();
        for segment in request_path.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(StoreError::bad_request("Path must not contain '..'")),
                name => resolved.push(name),
            }
        }
        Ok(resolved)
    }

    /// Whether any segment below the root carries the tombstone suffix
    fn is_reserved(&self, full: &Path) -> bool {
        full.strip_prefix(&self.root).map_or(false, |relative| {
            relative
                .components()
                .any(|c| self.tombstones.is_tombstone(Path::new(c.as_os_str())))
        })
    }

    fn resolve_writable(&self, request_path: &str) -> Result<PathBuf, StoreError> {
        let full = self.resolve(request_path)?;
        if self.is_reserved(&full) {
            return Err(StoreError::bad_request(format!(
                "Path segments must not end with reserved suffix {}",
                self.tombstones.suffix()
            )));
        }
        Ok(full)
    }

    /// Tombstones every object below `dir`, returning how many were marked
    fn mark_tree_deleted(&self, dir: &Path) -> Result<usize, StoreError> {
        let mut marked = 0;
        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_dir() || self.tombstones.is_tombstone(entry.path()) {
                continue;
            }
            self.tombstones.mark_deleted(entry.path())?;
            marked += 1;
        }
        Ok(marked)
    }
}

impl Storage for LocalStore {
    fn read(&self, path: &str) -> Result<ReadOutcome, StoreError> {
        let full = self.resolve(path)?;
        if self.is_reserved(&full) {
            return Err(StoreError::NotFound);
        }

        let meta = fs::metadata(&full).map_err(|_| StoreError::NotFound)?;
        if meta.is_dir() {
            return Ok(ReadOutcome::Listing(self.lister.list(&full)?));
        }
        if !self.tombstones.is_visible(&full) {
            debug!("Object {} is hidden by its tombstone", full.display());
            return Err(StoreError::NotFound);
        }

        let content = match fs::read(&full) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
        Ok(ReadOutcome::Object { content, modified })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve_writable(path)?;
        if full.is_dir() {
            return Err(StoreError::bad_request("Cannot overwrite directory"));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&full)?;
        file.write_all(data)?;
        file.set_modified(SystemTime::now())?;

        info!("Wrote {} bytes to {}", data.len(), full.display());
        Ok(())
    }

    fn delete(&self, path: &str, recursive: bool) -> Result<(), StoreError> {
        let full = self.resolve_writable(path)?;
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            // A path below a regular file fails with NotADirectory
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                debug!("Delete of missing path {} is a no-op", full.display());
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if !meta.is_dir() {
            self.tombstones.mark_deleted(&full)?;
            info!("Marked {} as deleted", full.display());
            return Ok(());
        }
        if !recursive {
            return Err(StoreError::bad_request("Cannot remove directory; forgot recursive=true?"));
        }

        let marked = self.mark_tree_deleted(&full)?;
        info!("Marked {} objects under {} as deleted", marked, full.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DEFAULT_TOMBSTONE_SUFFIX;
    use tempfile::{tempdir, TempDir};

    fn open_store() -> (TempDir, LocalStore) {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path(), Tombstones::new(DEFAULT_TOMBSTONE_SUFFIX)).unwrap();
        (dir, store)
    }

    #[test]
    fn test_open_creates_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("nested/data");
        let store = LocalStore::open(&root, Tombstones::new(".x")).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[test]
    fn test_resolve() {
        let (dir, store) = open_store();
        assert_eq!(store.resolve("/foo/bar.txt").unwrap(), dir.path().join("foo/bar.txt"));
        assert_eq!(store.resolve("foo//./bar").unwrap(), dir.path().join("foo/bar"));
        assert_eq!(store.resolve("/").unwrap(), dir.path().to_path_buf());
        assert!(matches!(store.resolve("/foo/../../etc"), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_write_then_read() {
        let (_dir, store) = open_store();
        store.write("/foo/bar.txt", b"hello").unwrap();

        match store.read("/foo/bar.txt").unwrap() {
            ReadOutcome::Object { content, .. } => assert_eq!(content, b"hello"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_write_replaces_content() {
        let (_dir, store) = open_store();
        store.write("/a", b"a much longer body").unwrap();
        store.write("/a", b"short").unwrap();

        match store.read("/a").unwrap() {
            ReadOutcome::Object { content, .. } => assert_eq!(content, b"short"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_write_over_directory_is_rejected() {
        let (dir, store) = open_store();
        fs::create_dir(dir.path().join("d")).unwrap();

        assert!(matches!(store.write("/d", b"x"), Err(StoreError::BadRequest(_))));
        assert!(matches!(store.write("/", b"x"), Err(StoreError::BadRequest(_))));
    }

    #[test]
    fn test_write_under_file_is_io_error() {
        let (_dir, store) = open_store();
        store.write("/file", b"x").unwrap();
        assert!(matches!(store.write("/file/child", b"y"), Err(StoreError::Io(_))));
    }

    #[test]
    fn test_reserved_suffix_is_rejected() {
        let (_dir, store) = open_store();
        let reserved = format!("/a{}", DEFAULT_TOMBSTONE_SUFFIX);

        assert!(matches!(store.write(&reserved, b"x"), Err(StoreError::BadRequest(_))));
        assert!(matches!(store.delete(&reserved, false), Err(StoreError::BadRequest(_))));

        store.write("/a", b"x").unwrap();
        store.delete("/a", false).unwrap();
        assert!(matches!(store.read(&reserved), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_reserved_suffix_in_inner_segment_is_rejected() {
        let (dir, store) = open_store();
        store.write("/foo", b"keep").unwrap();
        let inner = format!("/foo{}/inner", DEFAULT_TOMBSTONE_SUFFIX);

        assert!(matches!(store.write(&inner, b"x"), Err(StoreError::BadRequest(_))));
        assert!(matches!(store.delete(&inner, true), Err(StoreError::BadRequest(_))));
        assert!(matches!(store.read(&inner), Err(StoreError::NotFound)));
        assert!(!dir.path().join(format!("foo{}", DEFAULT_TOMBSTONE_SUFFIX)).exists());
        assert!(matches!(store.read("/foo"), Ok(ReadOutcome::Object { .. })));
    }

    #[test]
    fn test_directory_named_like_tombstone_does_not_hide_object() {
        let (dir, store) = open_store();
        store.write("/foo", b"keep").unwrap();
        fs::create_dir_all(dir.path().join(format!("foo{}/inner", DEFAULT_TOMBSTONE_SUFFIX))).unwrap();

        assert!(matches!(store.read("/foo"), Ok(ReadOutcome::Object { .. })));
        match store.read("/").unwrap() {
            ReadOutcome::Listing(names) => assert_eq!(names, vec!["foo".to_string()]),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let (_dir, store) = open_store();
        assert!(matches!(store.read("/nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn test_delete_missing_is_noop() {
        let (_dir, store) = open_store();
        store.delete("/nope", false).unwrap();
        store.delete("/nope/deeper", true).unwrap();
    }

    #[test]
    fn test_delete_below_file_is_noop() {
        let (dir, store) = open_store();
        store.write("/file", b"x").unwrap();

        store.delete("/file/child", false).unwrap();
        store.delete("/file/child/deeper", true).unwrap();
        assert!(matches!(store.read("/file"), Ok(ReadOutcome::Object { .. })));
        assert!(!store.tombstones().path_for(&dir.path().join("file")).exists());
    }

    #[test]
    fn test_delete_leaf_keeps_bytes_on_disk() {
        let (dir, store) = open_store();
        store.write("/foo/bar.txt", b"hello").unwrap();
        store.delete("/foo/bar.txt", false).unwrap();

        assert!(matches!(store.read("/foo/bar.txt"), Err(StoreError::NotFound)));
        let object = dir.path().join("foo/bar.txt");
        assert_eq!(fs::read(&object).unwrap(), b"hello");
        assert!(store.tombstones().path_for(&object).exists());
    }

    #[test]
    fn test_read_directory_lists_entries() {
        let (_dir, store) = open_store();
        store.write("/d/a", b"1").unwrap();
        store.write("/d/sub/b", b"2").unwrap();

        match store.read("/d").unwrap() {
            ReadOutcome::Listing(mut names) => {
                names.sort();
                assert_eq!(names, vec!["a".to_string(), "sub/".to_string()]);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
