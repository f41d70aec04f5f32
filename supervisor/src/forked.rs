use std::ffi::{OsStr, OsString};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::SupervisorError;
use crate::process::{ChildGuard, set_new_session};

/// One supervised worker process.
///
/// The child runs in its own session and is killed together with its process
/// group when this value is dropped before it exits.
#[derive(Debug)]
pub struct ForkedProcess {
    command: String,
    guard: ChildGuard,
}

impl ForkedProcess {
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self, SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        let program = program.as_ref();
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let command = render(program, &args);

        let mut cmd = Command::new(program);
        cmd.args(&args).stdin(Stdio::null());
        set_new_session(&mut cmd);
        let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            command: command.clone(),
            source,
        })?;
        info!(command = %command, pid = ?child.id(), "Spawned worker");
        Ok(Self {
            command,
            guard: ChildGuard::new(child),
        })
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Wait for exit. A non-zero status is an error carrying the command line.
    pub async fn wait(mut self) -> Result<(), SupervisorError> {
        let Some(child) = self.guard.child_mut() else {
            return Ok(());
        };
        let status = child.wait().await.map_err(|source| SupervisorError::Wait {
            command: self.command.clone(),
            source,
        })?;
        self.guard.disarm();
        if status.success() {
            debug!(command = %self.command, "Worker exited");
            Ok(())
        } else {
            Err(SupervisorError::ChildFailed {
                command: self.command,
                code: status.code(),
                status: status.to_string(),
            })
        }
    }
}

fn render(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(OsStr::to_string_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}
