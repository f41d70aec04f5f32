//! Crash-safe replacement of a whole directory.
//!
//! A replacement goes through three sibling paths:
//!
//! ```text
//! temp.<name>      staging: built from scratch, incomplete until step 2
//! temp.old.<name>  retired: the previous contents, deleted after commit
//! <name>           live
//! ```
//!
//! 1. build into staging (any crash here leaves live untouched)
//! 2. rename live -> retired
//! 3. rename staging -> live (commit point)
//! 4. delete retired
//!
//! [`recover_dir`] inspects whichever of these survived a crash and rolls the
//! replacement forward or back so that live is entirely old or entirely new.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use atlas_types::SCRATCH_PREFIX;
use tracing::{debug, warn};

use crate::atomic_write::{best_effort_sync_parent_dir, parent_or_cwd};

/// Sibling paths used while replacing `live`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirReplacement {
    pub live: PathBuf,
    pub staging: PathBuf,
    pub retired: PathBuf,
}

impl DirReplacement {
    #[must_use]
    pub fn for_dir(live: impl AsRef<Path>) -> Self {
        let live = live.as_ref().to_path_buf();
        let parent = parent_or_cwd(&live).to_path_buf();
        let name = live
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            staging: parent.join(format!("{SCRATCH_PREFIX}{name}")),
            retired: parent.join(format!("{SCRATCH_PREFIX}old.{name}")),
            live,
        }
    }
}

/// Replace `live` with a directory produced by `build`.
///
/// `build` receives an empty staging directory on the same filesystem as
/// `live`. If it fails, the staging directory is removed and `live` is left
/// as it was. The caller is responsible for excluding concurrent writers.
pub fn replace_dir<E, F>(live: impl AsRef<Path>, build: F) -> Result<(), E>
where
    F: FnOnce(&Path) -> Result<(), E>,
    E: From<io::Error>,
{
    let paths = DirReplacement::for_dir(live);

    if paths.staging.exists() {
        fs::remove_dir_all(&paths.staging)?;
    }
    fs::create_dir_all(&paths.staging)?;

    if let Err(err) = build(&paths.staging) {
        if let Err(cleanup) = fs::remove_dir_all(&paths.staging) {
            warn!(path = %paths.staging.display(), "Failed to remove staging dir: {cleanup}");
        }
        return Err(err);
    }
    sync_dir_entries(&paths.staging);

    if paths.retired.exists() {
        fs::remove_dir_all(&paths.retired)?;
    }
    if paths.live.exists() {
        fs::rename(&paths.live, &paths.retired)?;
    }
    fs::rename(&paths.staging, &paths.live)?;
    best_effort_sync_parent_dir(parent_or_cwd(&paths.live));

    if paths.retired.exists() {
        fs::remove_dir_all(&paths.retired)?;
    }
    debug!(path = %paths.live.display(), "Directory replaced");
    Ok(())
}

/// Outcome of inspecting a directory for an interrupted replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirRecovery {
    /// Nothing was in flight.
    Clean,
    /// A staging directory was incomplete and has been discarded.
    RolledBack,
    /// The staging directory had already replaced the old one logically; it is now live.
    RolledForward,
    /// Only the retired copy survived; it has been restored.
    Restored,
}

/// Finish or undo an interrupted [`replace_dir`].
pub fn recover_dir(live: impl AsRef<Path>) -> io::Result<DirRecovery> {
    let paths = DirReplacement::for_dir(live);
    let mut outcome = DirRecovery::Clean;

    if !paths.live.exists() {
        if paths.staging.exists() {
            // Live is only ever moved aside after staging is complete.
            fs::rename(&paths.staging, &paths.live)?;
            warn!(path = %paths.live.display(), "Committed interrupted directory replacement");
            outcome = DirRecovery::RolledForward;
        } else if paths.retired.exists() {
            fs::rename(&paths.retired, &paths.live)?;
            warn!(path = %paths.live.display(), "Restored retired directory");
            outcome = DirRecovery::Restored;
        }
    }

    if paths.staging.exists() {
        fs::remove_dir_all(&paths.staging)?;
        warn!(path = %paths.staging.display(), "Discarded incomplete staging directory");
        outcome = DirRecovery::RolledBack;
    }
    if paths.retired.exists() {
        fs::remove_dir_all(&paths.retired)?;
        debug!(path = %paths.retired.display(), "Removed retired directory");
    }

    Ok(outcome)
}

fn sync_dir_entries(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if let Err(e) = fs::File::open(entry.path()).and_then(|f| f.sync_all()) {
            debug!(path = %entry.path().display(), "sync_all failed (best-effort): {e}");
        }
    }
    best_effort_sync_parent_dir(dir);
}
