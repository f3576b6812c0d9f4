//! Cross-process run lock next to the store file.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;

use super::csv_store::sibling_path;

/// Exclusive lock held for the whole run; released on drop.
///
/// A crashed run leaves the lock file behind. Remove it by hand once the
/// store has been checked for a send that was never recorded.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock for the store at `store_path`.
    pub fn acquire(store_path: &Path) -> Result<Self, StoreError> {
        let path = sibling_path(store_path, ".lock");
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::Locked { path });
            }
            Err(e) => return Err(e.into()),
        };
        writeln!(file, "{}", std::process::id())?;
        tracing::debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_rejected_until_release() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("leads.csv");

        let first = RunLock::acquire(&store).unwrap();
        assert!(first.path().exists());
        let err = RunLock::acquire(&store).unwrap_err();
        assert!(matches!(err, StoreError::Locked { .. }));

        drop(first);
        assert!(!dir.path().join("leads.csv.lock").exists());
        assert!(RunLock::acquire(&store).is_ok());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let store = dir.path().join("nope").join("leads.csv");
        let err = RunLock::acquire(&store).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
