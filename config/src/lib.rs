//! Configuration for Atlas.
//!
//! Raw TOML ([`ConfigFile`]) is validated once into [`AtlasSettings`]; the
//! worker sizes of an exploration session are validated into an
//! [`ExplorePlan`] against the theory's minimum size before any process is
//! spawned.

mod explore;
mod file;
mod layout;
mod settings;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use explore::{
    DEFAULT_MAX_SIZE, DEFAULT_REGION_QUEUE_SIZE, DEFAULT_STEP_SIZE, ExploreConfig, ExplorePlan,
};
pub use file::{
    AtlasSection, CONFIG_ENV, ConfigFile, EngineKind, EngineSection, LogSection, TheorySection,
    config_path,
};
pub use layout::AtlasLayout;
pub use settings::{
    AtlasSettings, DEFAULT_MIN_SIZE, DEFAULT_POLL_UNIT, DEFAULT_ROOT, EngineSettings, LogSettings,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid {field}: {reason}")]
    Invalid { field: String, reason: String },
    #[error(
        "region size {max_size} - {step_size} is below the theory minimum {min_size}"
    )]
    RegionTooSmall {
        max_size: usize,
        step_size: usize,
        min_size: usize,
    },
    #[error("atlas {path:?} has already been initialized")]
    AlreadyInitialized { path: PathBuf },
    #[error("atlas {path:?} is not initialized; run `atlas init` first")]
    NotInitialized { path: PathBuf },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl AtlasSettings {
    /// Load and validate `path` (or the default location when `None`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => config_path(),
        };
        match path {
            Some(path) => Self::try_from(ConfigFile::load(&path)?),
            None => Ok(Self::default()),
        }
    }
}
