//! Directory walking shared by the bag reader and the builder.

use bagsmith_common::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// A symbolic link. Links are reported, never descended into.
    Symlink,
}

/// One entry below the walked root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Path relative to the root, with forward slashes.
    pub rel: String,
    pub path: PathBuf,
    pub kind: EntryKind,
    /// File size. For a link, the size of the file it points to, or 0.
    pub size: u64,
}

impl Entry {
    /// True for entries at the top of the walked root.
    pub fn is_top_level(&self) -> bool {
        !self.rel.contains('/')
    }

    /// Whether the entry reads as a file: a file, or a link to one.
    pub fn is_file_like(&self) -> bool {
        match self.kind {
            EntryKind::File => true,
            EntryKind::Dir => false,
            EntryKind::Symlink => fs::metadata(&self.path).is_ok_and(|m| m.is_file()),
        }
    }
}

/// Every entry below `root`, sorted by path. Symbolic links are not followed.
pub fn walk(root: &Path) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            Error::io_at(path, e.into())
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        let file_type = entry.file_type();
        let (kind, size) = if file_type.is_symlink() {
            let size = fs::metadata(entry.path())
                .ok()
                .filter(|m| m.is_file())
                .map_or(0, |m| m.len());
            (EntryKind::Symlink, size)
        } else if file_type.is_dir() {
            (EntryKind::Dir, 0)
        } else {
            let size = entry
                .metadata()
                .map_err(|e| Error::io_at(entry.path(), e.into()))?
                .len();
            (EntryKind::File, size)
        };
        entries.push(Entry {
            rel,
            path: entry.into_path(),
            kind,
            size,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_walk_sorted_relative_paths() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data/sub")).unwrap();
        fs::write(dir.path().join("data/sub/b.txt"), "bb").unwrap();
        fs::write(dir.path().join("data/a.txt"), "a").unwrap();
        fs::write(dir.path().join("bagit.txt"), "").unwrap();

        let entries = walk(dir.path()).unwrap();
        let rels: Vec<&str> = entries.iter().map(|e| e.rel.as_str()).collect();
        assert_eq!(rels, vec!["bagit.txt", "data", "data/a.txt", "data/sub", "data/sub/b.txt"]);
        let b = entries.iter().find(|e| e.rel == "data/sub/b.txt").unwrap();
        assert_eq!((b.kind, b.size), (EntryKind::File, 2));
        assert!(entries.iter().find(|e| e.rel == "data").unwrap().is_top_level());
        assert!(!b.is_top_level());
    }

    #[cfg(unix)]
    #[test]
    fn test_links_are_not_followed() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data")).unwrap();
        fs::write(dir.path().join("data/a.txt"), "abc").unwrap();
        std::os::unix::fs::symlink(dir.path().join("data"), dir.path().join("data/loop")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("data/a.txt"), dir.path().join("data/alias"))
            .unwrap();

        let entries = walk(dir.path()).unwrap();
        assert_eq!(entries.len(), 4);
        let alias = entries.iter().find(|e| e.rel == "data/alias").unwrap();
        assert_eq!((alias.kind, alias.size), (EntryKind::Symlink, 3));
        assert!(alias.is_file_like());
        let cycle = entries.iter().find(|e| e.rel == "data/loop").unwrap();
        assert_eq!((cycle.kind, cycle.size), (EntryKind::Symlink, 0));
        assert!(!cycle.is_file_like());
    }
}
