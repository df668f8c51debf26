//! Directory listing with the tombstone overlay applied

use crate::storage::tombstone::{supersedes, Tombstones};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Produces the visible entries of a single directory
#[derive(Debug, Clone)]
pub struct DirectoryLister {
    tombstones: Tombstones,
}

struct RawEntry {
    name: String,
    is_dir: bool,
    modified: Option<SystemTime>,
}

impl DirectoryLister {
    pub fn new(tombstones: Tombstones) -> Self {
        Self { tombstones }
    }

    /// Lists `dir` in enumeration order. Directories carry a trailing `/`;
    /// files hidden by a tombstone and the tombstones themselves are omitted.
    pub fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut raw = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(name) => {
                    warn!("Skipping non UTF-8 entry {:?} in {}", name, dir.display());
                    continue;
                }
            };
            let meta = match entry.metadata() {
                Ok(meta) => meta,
                // Removed between readdir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            raw.push(RawEntry {
                name,
                is_dir: meta.is_dir(),
                modified: meta.modified().ok(),
            });
        }

        let mut deleted_at: HashMap<&str, Option<SystemTime>> = HashMap::new();
        for entry in raw.iter().filter(|e| !e.is_dir) {
            if let Some(base) = self.tombstones.strip(&entry.name) {
                deleted_at.insert(base, entry.modified);
            }
        }

        let mut names = Vec::with_capacity(raw.len());
        for entry in &raw {
            if self.tombstones.is_tombstone_name(&entry.name) {
                continue;
            }
            if entry.is_dir {
                names.push(format!("{}/", entry.name));
                continue;
            }
            let visible = match deleted_at.get(entry.name.as_str()) {
                None => true,
                Some(tombstone) => match (entry.modified, tombstone) {
                    (Some(object), Some(tombstone)) => supersedes(object, *tombstone),
                    _ => false,
                },
            };
            if visible {
                names.push(entry.name.clone());
            }
        }
        Ok(names)
    }
}

/// Renders a listing as the newline-delimited wire body
pub fn render(names: &[String]) -> String {
    let mut body = String::with_capacity(names.iter().map(|n| n.len() + 1).sum());
    for name in names {
        body.push_str(name);
        body.push('\n');
    }
    body
}
