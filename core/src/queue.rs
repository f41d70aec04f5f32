//! Crash-safe work queues backed by a directory of numbered files.
//!
//! Items are whole snapshot files named `{id}.h5`. Every hand-off is a rename
//! on one filesystem, so an item is either fully in the queue or not at all.
//! Pushes (and whole-queue replacements) serialize on a sibling lock file
//! `<queue>.lock`; listing and popping take no lock and assume one consumer.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use atlas_types::ItemId;
use atlas_utils::{DirRecovery, FileLock, commit_file, recover_dir, replace_dir};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct DurableQueue {
    dir: PathBuf,
    lock_path: PathBuf,
}

impl DurableQueue {
    /// Open the queue at `dir`, first settling any replacement a crashed
    /// process left behind, and creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        let lock_path = lock_path_for(&dir);
        let queue = Self { dir, lock_path };
        queue.recover()?;
        Ok(queue)
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current items ordered by id. Recomputed on every call.
    pub fn list(&self) -> io::Result<Vec<PathBuf>> {
        Ok(self.entries()?.into_iter().map(|(_, path)| path).collect())
    }

    pub fn len(&self) -> io::Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> io::Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    fn entries(&self) -> io::Result<Vec<(ItemId, PathBuf)>> {
        let read = match fs::read_dir(&self.dir) {
            Ok(read) => read,
            // Between the two renames of a replacement the queue is briefly absent.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut items = Vec::new();
        for entry in read {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if let Ok(id) = ItemId::from_file_name(name) {
                items.push((id, entry.path()));
            }
        }
        items.sort_unstable_by_key(|(id, _)| *id);
        Ok(items)
    }

    /// Claim the first item by renaming it to `destination`.
    ///
    /// Returns `false` when the queue is empty.
    pub fn pop_into(&self, destination: &Path) -> io::Result<bool> {
        for path in self.list()? {
            match fs::rename(&path, destination) {
                Ok(()) => {
                    debug!(from = %path.display(), to = %destination.display(), "Popped queue item");
                    return Ok(true);
                }
                // Replaced under us; try the next one.
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    /// Move `source` into the queue under the lowest free id.
    pub fn push(&self, source: &Path) -> io::Result<ItemId> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let id = ItemId::lowest_free(self.entries()?.into_iter().map(|(id, _)| id));
        let destination = self.dir.join(id.file_name());
        commit_file(source, &destination)?;
        debug!(queue = %self.dir.display(), %id, "Pushed queue item");
        Ok(id)
    }

    /// Remove every listed item.
    pub fn clear(&self) -> io::Result<()> {
        for path in self.list()? {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Atomically swap the whole queue for the items `build` writes into an
    /// empty staging directory. Pushes are excluded for the duration.
    pub fn replace_with<E, F>(&self, build: F) -> Result<(), E>
    where
        F: FnOnce(&Path) -> Result<(), E>,
        E: From<io::Error>,
    {
        let _lock = FileLock::acquire(&self.lock_path)?;
        replace_dir(&self.dir, build)
    }

    /// Finish or undo a replacement interrupted by a crash.
    pub fn recover(&self) -> io::Result<DirRecovery> {
        let _lock = FileLock::acquire(&self.lock_path)?;
        let outcome = recover_dir(&self.dir)?;
        if outcome != DirRecovery::Clean {
            warn!(queue = %self.dir.display(), ?outcome, "Recovered queue");
        }
        fs::create_dir_all(&self.dir)?;
        Ok(outcome)
    }
}

fn lock_path_for(dir: &Path) -> PathBuf {
    let mut name = dir
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".lock");
    dir.with_file_name(name)
}
