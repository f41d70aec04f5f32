//! Fail-fast supervision of worker processes.
//!
//! [`Orchestrator`] owns a set of [`ForkedProcess`] children and waits on all
//! of them. The first child to exit non-zero aborts the whole set: every
//! remaining child is killed with its process group and the failure is
//! returned. There is no restart policy.

mod forked;
mod orchestrator;
mod process;

use std::io;

use thiserror::Error;

pub use forked::ForkedProcess;
pub use orchestrator::{Orchestrator, Shutdown};
pub use process::{ChildGuard, set_new_session};

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("failed to wait on `{command}`: {source}")]
    Wait { command: String, source: io::Error },
    #[error("`{command}` failed: {status}")]
    ChildFailed {
        command: String,
        code: Option<i32>,
        status: String,
    },
    #[error("failed to listen for shutdown signal: {0}")]
    Signal(#[source] io::Error),
}

impl SupervisorError {
    /// Exit code to propagate from a failed child, if it had one.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ChildFailed { code, .. } => *code,
            _ => None,
        }
    }
}
