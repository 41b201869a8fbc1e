// src/recipe/kitchen/staging.rs

//! Staging directory checks and the manifest of a staged install tree
//!
//! A cook only stages into a directory that is absent or empty, and a failed
//! cook removes whatever its `stage` commands had written, so a staging
//! directory holds either one complete install or nothing.
//!
//! After the `stage` commands run, the kitchen records what landed in the
//! staging directory: one entry per file, directory and symlink, visited in
//! sorted order. The tree digest covers paths, kinds, modes, sizes and
//! contents but not timestamps, so two cooks of byte-identical inputs produce
//! the same digest.

use crate::error::{Error, Result};
use crate::hash::{self, Hasher, Sha256Digest};
use std::fmt;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Kind of a staged entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dir => "dir",
            Self::Symlink => "symlink",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    /// Path relative to the staging directory
    pub path: PathBuf,
    pub kind: EntryKind,
    /// Permission bits
    pub mode: u32,
    /// Size in bytes (files only)
    pub size: u64,
    /// Content digest (files only)
    pub sha256: Option<Sha256Digest>,
    /// Link target (symlinks only)
    pub target: Option<PathBuf>,
}

/// Sorted manifest of a staging directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTree {
    pub entries: Vec<StagedEntry>,
    /// Digest over every entry record
    pub digest: Sha256Digest,
}

impl StagedTree {
    /// Walk a staging directory and record its contents
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!(
                "Staging directory does not exist: {}",
                root.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::IoError(format!("Failed to walk {}: {}", root.display(), e))
            })?;
            let path = entry.path();
            let rel = path.strip_prefix(root).map_err(|e| {
                Error::IoError(format!("Entry {} outside staging root: {}", path.display(), e))
            })?;
            let metadata = fs::symlink_metadata(path)?;
            let mode = metadata.permissions().mode() & 0o7777;

            let file_type = metadata.file_type();
            let staged = if file_type.is_symlink() {
                StagedEntry {
                    path: rel.to_path_buf(),
                    kind: EntryKind::Symlink,
                    mode,
                    size: 0,
                    sha256: None,
                    target: Some(fs::read_link(path)?),
                }
            } else if file_type.is_dir() {
                StagedEntry {
                    path: rel.to_path_buf(),
                    kind: EntryKind::Dir,
                    mode,
                    size: 0,
                    sha256: None,
                    target: None,
                }
            } else {
                StagedEntry {
                    path: rel.to_path_buf(),
                    kind: EntryKind::File,
                    mode,
                    size: metadata.len(),
                    sha256: Some(hash::hash_file(path)?),
                    target: None,
                }
            };
            entries.push(staged);
        }

        let digest = tree_digest(&entries);
        Ok(Self { entries, digest })
    }

    /// Number of regular files
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| e.kind == EntryKind::File).count()
    }

    /// Total size of regular files in bytes
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Look up an entry by its relative path
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&StagedEntry> {
        let path = path.as_ref();
        self.entries.iter().find(|e| e.path == path)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Check that a staging directory is absent or empty
///
/// Returns whether the directory already exists.
pub fn check_staging_dir(dir: &Path) -> Result<bool> {
    match fs::read_dir(dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(Error::ConfigError(format!(
                    "Staging directory {} is not empty",
                    dir.display()
                )));
            }
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::IoError(format!(
            "Failed to read staging directory {}: {}",
            dir.display(),
            e
        ))),
    }
}

/// Throw away a partial install, leaving the directory as it was found
pub fn discard_staging(dir: &Path, existed: bool) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    if existed {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn tree_digest(entries: &[StagedEntry]) -> Sha256Digest {
    let mut hasher = Hasher::new();
    for entry in entries {
        let detail = match entry.kind {
            EntryKind::File => entry.sha256.as_ref().map(|d| d.to_string()).unwrap_or_default(),
            EntryKind::Symlink => entry
                .target
                .as_ref()
                .map(|t| t.to_string_lossy().into_owned())
                .unwrap_or_default(),
            EntryKind::Dir => String::new(),
        };
        let record = format!(
            "{} {:o} {} {}\0{}\n",
            entry.kind,
            entry.mode,
            entry.size,
            entry.path.to_string_lossy(),
            detail
        );
        hasher.update(record.as_bytes());
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn populate(root: &Path) {
        fs::create_dir_all(root.join("lib/pkgconfig")).unwrap();
        fs::create_dir_all(root.join("include")).unwrap();
        fs::write(root.join("include/gmp.h"), "/* gmp */\n").unwrap();
        fs::write(root.join("lib/libgmp.so.10.5.0"), b"\x7fELF").unwrap();
        symlink("libgmp.so.10.5.0", root.join("lib/libgmp.so")).unwrap();
    }

    #[test]
    fn test_scan_records_entries_sorted() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());

        let tree = StagedTree::scan(dir.path()).unwrap();
        let paths: Vec<String> = tree
            .entries
            .iter()
            .map(|e| e.path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            paths,
            vec![
                "include",
                "include/gmp.h",
                "lib",
                "lib/libgmp.so",
                "lib/libgmp.so.10.5.0",
                "lib/pkgconfig",
            ]
        );

        assert_eq!(tree.file_count(), 2);
        assert_eq!(tree.total_size(), 10 + 4);

        let link = tree.get("lib/libgmp.so").unwrap();
        assert_eq!(link.kind, EntryKind::Symlink);
        assert_eq!(link.target.as_deref(), Some(Path::new("libgmp.so.10.5.0")));

        let header = tree.get("include/gmp.h").unwrap();
        assert_eq!(header.sha256, Some(hash::sha256_bytes(b"/* gmp */\n")));
    }

    #[test]
    fn test_identical_trees_have_equal_digests() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        populate(a.path());
        populate(b.path());

        assert_eq!(
            StagedTree::scan(a.path()).unwrap().digest,
            StagedTree::scan(b.path()).unwrap().digest
        );
    }

    #[test]
    fn test_content_change_changes_digest() {
        let dir = TempDir::new().unwrap();
        populate(dir.path());
        let before = StagedTree::scan(dir.path()).unwrap();

        fs::write(dir.path().join("include/gmp.h"), "/* gmq */\n").unwrap();
        let after = StagedTree::scan(dir.path()).unwrap();

        assert_ne!(before.digest, after.digest);
    }

    #[test]
    fn test_scan_missing_dir() {
        let dir = TempDir::new().unwrap();
        let err = StagedTree::scan(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_check_staging_dir() {
        let dir = TempDir::new().unwrap();
        let staging = dir.path().join("staging");
        assert!(!check_staging_dir(&staging).unwrap());

        fs::create_dir(&staging).unwrap();
        assert!(check_staging_dir(&staging).unwrap());

        fs::write(staging.join("stale"), "old").unwrap();
        let err = check_staging_dir(&staging).unwrap_err();
        assert!(matches!(err, Error::ConfigError(ref msg) if msg.contains("not empty")));
    }

    #[test]
    fn test_discard_staging() {
        let dir = TempDir::new().unwrap();
        let created = dir.path().join("created");
        populate(&created);
        discard_staging(&created, false).unwrap();
        assert!(!created.exists());

        let existing = dir.path().join("existing");
        populate(&existing);
        discard_staging(&existing, true).unwrap();
        assert!(existing.is_dir());
        assert_eq!(fs::read_dir(&existing).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_tree() {
        let dir = TempDir::new().unwrap();
        let tree = StagedTree::scan(dir.path()).unwrap();
        assert!(tree.is_empty());
        assert_eq!(tree.digest, hash::sha256_bytes(b""));
    }
}
