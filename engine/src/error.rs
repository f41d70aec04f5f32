use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed snapshot {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("snapshot {path:?} belongs to theory {found}, expected {expected}")]
    TheoryMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("world failed validation: {0}")]
    Invalid(String),
    #[error("failed to launch `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("`{command}` exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("unexpected output from `{command}`: {output:?}")]
    Protocol { command: String, output: String },
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Model corruption, as opposed to an environmental failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Invalid(_) | Self::TheoryMismatch { .. })
    }
}
