use std::path::{Path, PathBuf};

use atlas_types::{ITEM_EXTENSION, SCRATCH_PREFIX, Theory};

use crate::ConfigError;

/// Paths of one theory's atlas directory.
///
/// ```text
/// <root>/<theory>/
///   world.h5             authoritative snapshot
///   world.normal.h5      last fully inferred snapshot
///   region.queue/{N}.h5  pending regions
///   survey.queue/{N}.h5  pending surveys
///   regions/             one-shot trim output
///   atlas.log
///   atlas.lock           session lock (init, explore, make, test, clean)
///   cartographer.lock    held by the single atlas worker
///   surveyor.lock        held by the single survey worker
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasLayout {
    dir: PathBuf,
}

impl AtlasLayout {
    #[must_use]
    pub fn new(root: &Path, theory: &Theory) -> Self {
        Self {
            dir: root.join(theory.as_str()),
        }
    }

    /// Layout rooted directly at `dir`, used for scratch test directories.
    #[must_use]
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn world(&self) -> PathBuf {
        self.dir.join(format!("world.{ITEM_EXTENSION}"))
    }

    #[must_use]
    pub fn normal_world(&self) -> PathBuf {
        self.dir.join(format!("world.normal.{ITEM_EXTENSION}"))
    }

    #[must_use]
    pub fn region_queue(&self) -> PathBuf {
        self.dir.join("region.queue")
    }

    #[must_use]
    pub fn survey_queue(&self) -> PathBuf {
        self.dir.join("survey.queue")
    }

    #[must_use]
    pub fn regions_dir(&self) -> PathBuf {
        self.dir.join("regions")
    }

    /// One-shot region of `size` items under [`AtlasLayout::regions_dir`].
    #[must_use]
    pub fn region(&self, size: usize) -> PathBuf {
        self.regions_dir()
            .join(format!("region.{size}.{ITEM_EXTENSION}"))
    }

    #[must_use]
    pub fn log_file(&self) -> PathBuf {
        self.dir.join("atlas.log")
    }

    #[must_use]
    pub fn session_lock(&self) -> PathBuf {
        self.dir.join("atlas.lock")
    }

    #[must_use]
    pub fn cartographer_lock(&self) -> PathBuf {
        self.dir.join("cartographer.lock")
    }

    #[must_use]
    pub fn surveyor_lock(&self) -> PathBuf {
        self.dir.join("surveyor.lock")
    }

    /// Scratch file inside the atlas directory, on the same filesystem as
    /// every queue so it can be renamed into one.
    #[must_use]
    pub fn scratch(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{SCRATCH_PREFIX}{name}.{ITEM_EXTENSION}"))
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    pub fn require_initialized(&self) -> Result<(), ConfigError> {
        if self.dir.is_dir() && self.world().is_file() {
            Ok(())
        } else {
            Err(ConfigError::NotInitialized {
                path: self.dir.clone(),
            })
        }
    }

    pub fn require_uninitialized(&self) -> Result<(), ConfigError> {
        if self.dir.exists() {
            Err(ConfigError::AlreadyInitialized {
                path: self.dir.clone(),
            })
        } else {
            Ok(())
        }
    }
}
