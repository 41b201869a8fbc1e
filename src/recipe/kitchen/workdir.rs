// src/recipe/kitchen/workdir.rs

//! Per-recipe work directories
//!
//! A recipe always cooks in `<work_root>/<name>-<version>`, so `%(srcdir)s`,
//! `%(workdir)s` and `HOME` are the same on every cook and a build that
//! embeds its own paths still stages identical bytes.
//!
//! # Lock Strategy
//!
//! `<work_root>/<name>-<version>.lock` is held with `flock(LOCK_EX)` for the
//! whole cook. A second cook of the same recipe under the same work root is
//! refused instead of sharing the tree. The lock file itself is left in
//! place; only the lock matters.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A locked, freshly created work directory
///
/// Removed on drop unless [`keep`](WorkDir::keep) was called.
#[derive(Debug)]
pub struct WorkDir {
    path: PathBuf,
    /// The lock file handle (kept open to maintain lock)
    #[allow(dead_code)]
    lock: File,
    keep: bool,
}

impl WorkDir {
    /// Where a recipe's work directory lives under `work_root`
    pub fn path_for(work_root: &Path, name: &str, version: &str) -> PathBuf {
        work_root.join(format!("{}-{}", name, version))
    }

    /// Lock and recreate the work directory for one recipe
    ///
    /// Anything left from an earlier cook (a kept build directory, or one a
    /// crash left behind) is removed first.
    pub fn acquire(work_root: &Path, name: &str, version: &str) -> Result<Self> {
        fs::create_dir_all(work_root)?;

        let dir_name = format!("{}-{}", name, version);
        let lock_path = work_root.join(format!("{}.lock", dir_name));
        let lock = File::create(&lock_path).map_err(|e| {
            Error::IoError(format!("Failed to create {}: {}", lock_path.display(), e))
        })?;

        match lock.try_lock_exclusive() {
            Ok(()) => debug!("Acquired work directory lock at {}", lock_path.display()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                return Err(Error::ConfigError(format!(
                    "{} is already being cooked in {}",
                    dir_name,
                    work_root.display()
                )));
            }
            Err(e) => {
                return Err(Error::IoError(format!(
                    "Failed to lock {}: {}",
                    lock_path.display(),
                    e
                )));
            }
        }

        let path = Self::path_for(work_root, name, version);
        if path.exists() {
            info!("Removing previous work directory {}", path.display());
            fs::remove_dir_all(&path)?;
        }
        fs::create_dir(&path)?;

        Ok(Self {
            path,
            lock,
            keep: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Leave the directory in place after the cook and return its path
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        self.path.clone()
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            debug!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_is_stable() {
        let root = TempDir::new().unwrap();
        let first = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();
        let path = first.path().to_path_buf();
        assert_eq!(path, WorkDir::path_for(root.path(), "gmp", "6.3.0"));
        assert!(path.ends_with("gmp-6.3.0"));
        drop(first);
        assert!(!path.exists());

        let second = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();
        assert_eq!(second.path(), path);
    }

    #[test]
    fn test_second_cook_is_refused() {
        let root = TempDir::new().unwrap();
        let held = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();

        let err = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap_err();
        assert!(matches!(err, Error::ConfigError(ref msg) if msg.contains("already being cooked")));

        // Other recipes are unaffected
        WorkDir::acquire(root.path(), "mpfr", "4.2.1").unwrap();

        drop(held);
        WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();
    }

    #[test]
    fn test_kept_directory_is_recreated() {
        let root = TempDir::new().unwrap();
        let kept = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();
        fs::write(kept.path().join("stale.o"), b"x").unwrap();
        let path = kept.keep();
        assert!(path.join("stale.o").exists());

        let fresh = WorkDir::acquire(root.path(), "gmp", "6.3.0").unwrap();
        assert!(!fresh.path().join("stale.o").exists());
    }
}
