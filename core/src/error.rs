use std::io;
use std::path::PathBuf;

use atlas_engine::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("filesystem error: {0}")]
    Io(#[from] io::Error),
    #[error("another {role} is already running on {path:?}: {source}")]
    Busy {
        role: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}
