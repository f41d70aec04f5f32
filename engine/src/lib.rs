//! The atlas engine contract and its implementations.
//!
//! Orchestration code never looks inside a snapshot file. Everything that
//! understands snapshot contents goes through two traits:
//!
//! - [`AtlasEngine`]: stateless operations over files (init, survey, count)
//!   and [`AtlasEngine::connect`], which opens a live world.
//! - [`WorldHandle`]: exclusive ownership of one mutable world (trim, infer,
//!   validate, dump, aggregate).
//!
//! Two engines are provided:
//!
//! - [`BuiltinEngine`]: an in-process reference engine whose snapshots are
//!   JSON sets of item numbers. Deterministic, used by tests and smoke runs.
//! - [`CommandEngine`]: runs an external engine program once per operation,
//!   optionally under a runner prefix (e.g. a profiler).
//!
//! [`ConfiguredEngine`] picks one of them from [`atlas_config::EngineSettings`].

mod builtin;
mod command;
mod configured;
mod error;

use std::path::{Path, PathBuf};

use atlas_types::Theory;

pub use builtin::{BuiltinEngine, BuiltinWorld};
pub use command::{CommandEngine, CommandWorld};
pub use configured::{ConfiguredEngine, ConfiguredWorld};
pub use error::EngineError;

/// File-level engine operations.
pub trait AtlasEngine {
    type Handle: WorldHandle;

    /// Write a fresh minimal world of `size` items to `world`.
    fn init(&self, theory: &Theory, world: &Path, size: usize) -> Result<(), EngineError>;

    /// Open the world at `world` for exclusive mutation.
    fn connect(&self, theory: &Theory, world: &Path) -> Result<Self::Handle, EngineError>;

    /// Expand `region` into a snapshot of `target_size` items at `survey`.
    /// Pure over files: `region` is not modified.
    fn survey(
        &self,
        theory: &Theory,
        region: &Path,
        survey: &Path,
        target_size: usize,
    ) -> Result<(), EngineError>;

    fn item_count(&self, path: &Path) -> Result<usize, EngineError>;
}

/// A live, exclusively owned world model.
pub trait WorldHandle {
    /// Write `outputs.len()` regions of `size` items each.
    fn trim(&mut self, size: usize, outputs: &[PathBuf]) -> Result<(), EngineError>;

    /// One inference pass at `priority`; true iff anything was learned.
    fn infer(&mut self, priority: u8) -> Result<bool, EngineError>;

    /// Fails with [`EngineError::Invalid`] when the model is inconsistent.
    fn validate(&mut self) -> Result<(), EngineError>;

    /// Atomically materialize the current model at `path`.
    fn dump(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Merge the snapshot at `path`. Merging content that is already
    /// subsumed must leave the model unchanged.
    fn aggregate(&mut self, path: &Path) -> Result<(), EngineError>;

    fn item_count(&mut self) -> Result<usize, EngineError>;
}
