//! Per-session inference progress of the atlas worker.

use std::fmt;

/// How much inference effort remains untried since the last world mutation.
///
/// `Priority(0)` and `Priority(1)` are the two effort levels, tried in order.
/// `Normal` means neither level can make further progress until the world
/// changes again. Only [`InferenceState::advance`] moves forward, and only
/// [`InferenceState::reset`] moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum InferenceState {
    #[default]
    Fresh,
    Exhausted0,
    Normal,
}

impl InferenceState {
    /// Inference priority to attempt next, or `None` once normal.
    #[must_use]
    pub const fn priority(self) -> Option<u8> {
        match self {
            Self::Fresh => Some(0),
            Self::Exhausted0 => Some(1),
            Self::Normal => None,
        }
    }

    #[must_use]
    pub const fn is_normal(self) -> bool {
        matches!(self, Self::Normal)
    }

    /// Step to the next effort level after a pass that made no progress.
    #[must_use]
    pub const fn advance(self) -> Self {
        match self {
            Self::Fresh => Self::Exhausted0,
            Self::Exhausted0 | Self::Normal => Self::Normal,
        }
    }

    /// Any world growth invalidates earlier convergence.
    #[must_use]
    pub const fn reset() -> Self {
        Self::Fresh
    }

    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Fresh => 0,
            Self::Exhausted0 => 1,
            Self::Normal => 2,
        }
    }
}

impl fmt::Display for InferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("normal"),
            other => write!(f, "{}", other.as_u8()),
        }
    }
}
