use std::ffi::{OsStr, OsString};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{info, warn};

use crate::{ForkedProcess, SupervisorError};

/// How a supervised session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Every child exited zero.
    Completed,
    /// Interrupted; the remaining children were killed.
    Interrupted,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    children: Vec<ForkedProcess>,
}

impl Orchestrator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start one child. If this fails, children already launched are killed
    /// when the orchestrator is dropped.
    pub fn launch<I, S>(&mut self, program: impl AsRef<OsStr>, args: I) -> Result<(), SupervisorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.children.push(ForkedProcess::spawn(program, args)?);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Wait on every child, failing fast on the first non-zero exit.
    pub async fn wait(self) -> Result<Shutdown, SupervisorError> {
        self.wait_until(async {
            tokio::signal::ctrl_c().await.map_err(SupervisorError::Signal)
        })
        .await
    }

    /// Like [`Orchestrator::wait`], but stops early once `shutdown` resolves.
    pub async fn wait_until<F>(self, shutdown: F) -> Result<Shutdown, SupervisorError>
    where
        F: Future<Output = Result<(), SupervisorError>>,
    {
        let mut pending: FuturesUnordered<_> =
            self.children.into_iter().map(ForkedProcess::wait).collect();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some(Ok(())) => {}
                    Some(Err(err)) => {
                        warn!(remaining = pending.len(), "Worker failed; stopping the rest");
                        return Err(err);
                    }
                    None => return Ok(Shutdown::Completed),
                },
                signal = &mut shutdown => {
                    signal?;
                    info!(remaining = pending.len(), "Shutdown requested; stopping workers");
                    return Ok(Shutdown::Interrupted);
                }
            }
        }
    }
}
