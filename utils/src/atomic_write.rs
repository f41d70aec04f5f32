//! Atomic file write helpers.
//!
//! Uses a temp file + rename pattern. The temp file is always created in the
//! destination's parent directory: rename is only atomic within one filesystem,
//! so callers must never hand in a destination on a different mount than its
//! scratch space.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use atlas_types::SCRATCH_PREFIX;
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct AtomicWriteOptions {
    /// File sync policy for the temp file before persisting.
    pub file_sync: FileSyncPolicy,
    /// Parent directory sync policy after the file has been persisted.
    pub parent_dir_sync: ParentDirSyncPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSyncPolicy {
    SyncAll,
    SkipSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDirSyncPolicy {
    SyncBestEffort,
    SkipSync,
}

impl Default for AtomicWriteOptions {
    fn default() -> Self {
        Self {
            file_sync: FileSyncPolicy::SyncAll,
            parent_dir_sync: ParentDirSyncPolicy::SyncBestEffort,
        }
    }
}

impl AtomicWriteOptions {
    /// No fsync at all. Only for tests and throwaway scratch data.
    #[must_use]
    pub fn unsynced() -> Self {
        Self {
            file_sync: FileSyncPolicy::SkipSync,
            parent_dir_sync: ParentDirSyncPolicy::SkipSync,
        }
    }
}

pub(crate) fn parent_or_cwd(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

pub fn atomic_write_with_options(
    path: impl AsRef<Path>,
    bytes: &[u8],
    options: AtomicWriteOptions,
) -> io::Result<()> {
    let path = path.as_ref();
    let parent = parent_or_cwd(path);

    let mut tmp = NamedTempFile::with_prefix_in(SCRATCH_PREFIX, parent)?;
    tmp.write_all(bytes)?;
    if matches!(options.file_sync, FileSyncPolicy::SyncAll) {
        tmp.as_file().sync_all()?;
    }

    tmp.persist(path).map_err(|err| err.error)?;

    if matches!(options.parent_dir_sync, ParentDirSyncPolicy::SyncBestEffort) {
        best_effort_sync_parent_dir(parent);
    }

    Ok(())
}

/// Copy `src` to `dest` so that `dest` is either absent/old or complete.
pub fn atomic_copy(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> io::Result<u64> {
    let (src, dest) = (src.as_ref(), dest.as_ref());
    let parent = parent_or_cwd(dest);

    let mut tmp = NamedTempFile::with_prefix_in(SCRATCH_PREFIX, parent)?;
    let copied = io::copy(&mut File::open(src)?, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|err| err.error)?;
    best_effort_sync_parent_dir(parent);

    debug!(src = %src.display(), dest = %dest.display(), bytes = copied, "Atomic copy");
    Ok(copied)
}

/// Rename a fully written file into place and make the rename durable.
///
/// Both paths must be on the same filesystem.
pub fn commit_file(src: impl AsRef<Path>, dest: impl AsRef<Path>) -> io::Result<()> {
    let (src, dest) = (src.as_ref(), dest.as_ref());
    File::open(src)?.sync_all()?;
    fs::rename(src, dest)?;
    best_effort_sync_parent_dir(parent_or_cwd(dest));
    Ok(())
}

pub(crate) fn best_effort_sync_parent_dir(parent: &Path) {
    #[cfg(unix)]
    {
        if let Err(e) = File::open(parent).and_then(|d| d.sync_all()) {
            debug!(path = %parent.display(), "Parent directory sync_all failed (best-effort): {e}");
        }
    }

    #[cfg(not(unix))]
    {
        let _ = parent;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{AtomicWriteOptions, atomic_copy, atomic_write_with_options, commit_file};

    #[test]
    fn atomic_write_overwrites_existing_without_leaving_scratch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("world.h5");

        atomic_write_with_options(&path, b"one", AtomicWriteOptions::unsynced()).expect("one");
        atomic_write_with_options(&path, b"two", AtomicWriteOptions::unsynced()).expect("two");

        assert_eq!(fs::read_to_string(&path).expect("read"), "two");
        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec!["world.h5"]);
    }

    #[test]
    fn atomic_copy_duplicates_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("a.h5");
        let dest = dir.path().join("b.h5");
        fs::write(&src, b"snapshot").expect("write");

        assert_eq!(atomic_copy(&src, &dest).expect("copy"), 8);
        assert_eq!(fs::read(&dest).expect("read"), b"snapshot");
        assert!(src.exists());
    }

    #[test]
    fn commit_file_moves_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src = dir.path().join("temp.out.h5");
        let dest = dir.path().join("out.h5");
        fs::write(&src, b"x").expect("write");

        commit_file(&src, &dest).expect("commit");
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).expect("read"), b"x");
    }
}
