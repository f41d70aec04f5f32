use std::thread;
use std::time::Duration;

use tracing::trace;

/// Shortest idle wait, in units.
pub const MIN_SLEEP: u32 = 1;
/// Longest idle wait, in units.
pub const MAX_SLEEP: u32 = 600;

/// Exponential backoff for idle polling.
///
/// Every [`Sleeper::sleep`] waits the current duration and then doubles it,
/// up to [`MAX_SLEEP`] units. [`Sleeper::reset`] returns to [`MIN_SLEEP`].
#[derive(Debug, Clone)]
pub struct Sleeper {
    unit: Duration,
    factor: u32,
}

impl Sleeper {
    #[must_use]
    pub fn new(unit: Duration) -> Self {
        Self {
            unit,
            factor: MIN_SLEEP,
        }
    }

    pub fn reset(&mut self) {
        self.factor = MIN_SLEEP;
    }

    /// Current wait as a multiple of the unit.
    #[must_use]
    pub fn factor(&self) -> u32 {
        self.factor
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.unit * self.factor
    }

    pub fn sleep(&mut self) {
        let duration = self.duration();
        trace!(?duration, "Idle");
        thread::sleep(duration);
        self.factor = self.factor.saturating_mul(2).min(MAX_SLEEP);
    }
}

impl Default for Sleeper {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
