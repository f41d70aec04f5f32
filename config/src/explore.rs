use crate::ConfigError;

pub const DEFAULT_MAX_SIZE: usize = 8191;
pub const DEFAULT_STEP_SIZE: usize = 512;
pub const DEFAULT_REGION_QUEUE_SIZE: usize = 4;

/// Requested exploration sizes, as given on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExploreConfig {
    /// Size each survey grows to; regions are this minus `step_size`.
    pub max_size: usize,
    pub step_size: usize,
    pub region_queue_size: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            step_size: DEFAULT_STEP_SIZE,
            region_queue_size: DEFAULT_REGION_QUEUE_SIZE,
        }
    }
}

/// Sizes both workers run with. Only constructible through
/// [`ExploreConfig::plan`], so a plan always satisfies the theory minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExplorePlan {
    region_size: usize,
    step_size: usize,
    region_queue_size: usize,
}

impl ExploreConfig {
    pub fn plan(self, min_size: usize) -> Result<ExplorePlan, ConfigError> {
        if self.step_size == 0 {
            return Err(ConfigError::invalid("step_size", "must be > 0"));
        }
        if self.region_queue_size == 0 {
            return Err(ConfigError::invalid("region_queue_size", "must be > 0"));
        }
        let region_size = self
            .max_size
            .checked_sub(self.step_size)
            .filter(|&size| size >= min_size)
            .ok_or(ConfigError::RegionTooSmall {
                max_size: self.max_size,
                step_size: self.step_size,
                min_size,
            })?;
        Ok(ExplorePlan {
            region_size,
            step_size: self.step_size,
            region_queue_size: self.region_queue_size,
        })
    }
}

impl ExplorePlan {
    #[must_use]
    pub fn region_size(self) -> usize {
        self.region_size
    }

    #[must_use]
    pub fn step_size(self) -> usize {
        self.step_size
    }

    #[must_use]
    pub fn region_queue_size(self) -> usize {
        self.region_queue_size
    }
}
