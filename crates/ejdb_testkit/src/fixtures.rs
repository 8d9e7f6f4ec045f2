//! Test fixtures.
//!
//! Provides temporary directories for database files.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A temporary directory removed on drop.
pub struct TestDir {
    dir: TempDir,
}

impl TestDir {
    /// Creates a fresh temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the default database path inside the directory.
    pub fn db_path(&self) -> PathBuf {
        self.path().join("test.ejdb")
    }

    /// Returns a named database path inside the directory.
    pub fn join(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dir_is_removed_on_drop() {
        let dir = TestDir::new();
        let path = dir.path().to_path_buf();
        assert!(path.is_dir());
        assert_eq!(dir.db_path().parent(), Some(path.as_path()));
        drop(dir);
        assert!(!path.exists());
    }
}
