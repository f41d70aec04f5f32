//! Advisory inter-process locks backed by `flock(2)`.
//!
//! The lock lives as long as the returned [`FileLock`]; dropping it closes the
//! descriptor, which releases the lock. Locks are per open file description,
//! so a second `acquire` from the same process on the same path also blocks.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    _file: File,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is held.
    pub fn acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;
        fs2::FileExt::lock_exclusive(&file)?;
        trace!(path = %path.display(), "Lock acquired");
        Ok(Self { path, _file: file })
    }

    /// Take the exclusive lock on `path` or fail with `WouldBlock`.
    pub fn try_acquire(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_lock_file(&path)?;
        fs2::FileExt::try_lock_exclusive(&file).map_err(|e| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} is locked by another process: {e}", path.display()),
            )
        })?;
        trace!(path = %path.display(), "Lock acquired");
        Ok(Self { path, _file: file })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::FileLock;

    #[test]
    fn second_holder_is_refused_until_release() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("atlas.lock");

        let first = FileLock::try_acquire(&path).expect("first");
        let err = FileLock::try_acquire(&path).expect_err("second must fail");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        drop(first);
        let again = FileLock::try_acquire(&path).expect("after release");
        assert_eq!(again.path(), path.as_path());
    }

    #[test]
    fn creates_missing_parent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("q.lock");
        let _lock = FileLock::acquire(&path).expect("acquire");
        assert!(path.exists());
    }
}
