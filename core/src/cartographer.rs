//! The atlas worker: sole owner of a theory's live world.
//!
//! Each [`AtlasWorker::step`] attempts one action, in priority order:
//!
//! 1. top up the region queue by trimming the world
//! 2. run one inference pass at the current priority
//! 3. merge every pending survey back into the world
//!
//! A step that did anything reports progress; the run loop resets its backoff
//! after a productive step and sleeps after an idle one.

use std::convert::Infallible;
use std::fs;
use std::path::PathBuf;

use atlas_config::AtlasLayout;
use atlas_engine::{AtlasEngine, WorldHandle};
use atlas_types::{InferenceState, ItemId, Theory};
use atlas_utils::FileLock;
use tracing::{debug, info};

use crate::{DurableQueue, Sleeper, WorkerError};

/// Region production settings of an [`AtlasWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartographerConfig {
    pub region_size: usize,
    pub region_queue_size: usize,
}

#[derive(Debug)]
pub struct AtlasWorker<H> {
    theory: Theory,
    layout: AtlasLayout,
    config: CartographerConfig,
    world: H,
    regions: DurableQueue,
    surveys: DurableQueue,
    state: InferenceState,
    sleeper: Sleeper,
    _role: FileLock,
}

impl<H: WorldHandle> AtlasWorker<H> {
    /// Take the cartographer role for `theory`, open both queues, and
    /// connect to the persisted world.
    pub fn start<E>(
        engine: &E,
        theory: Theory,
        layout: AtlasLayout,
        config: CartographerConfig,
        sleeper: Sleeper,
    ) -> Result<Self, WorkerError>
    where
        E: AtlasEngine<Handle = H>,
    {
        let role_path = layout.cartographer_lock();
        let role = FileLock::try_acquire(&role_path).map_err(|source| WorkerError::Busy {
            role: "cartographer",
            path: role_path,
            source,
        })?;

        let regions = DurableQueue::open(layout.region_queue())?;
        let surveys = DurableQueue::open(layout.survey_queue())?;

        let world = engine.connect(&theory, &layout.world())?;
        info!(
            theory = %theory,
            region_size = config.region_size,
            region_queue_size = config.region_queue_size,
            "Cartographer started"
        );
        Ok(Self {
            theory,
            layout,
            config,
            world,
            regions,
            surveys,
            state: InferenceState::default(),
            sleeper,
            _role: role,
        })
    }

    #[must_use]
    pub fn state(&self) -> InferenceState {
        self.state
    }

    #[must_use]
    pub fn world(&self) -> &H {
        &self.world
    }

    #[must_use]
    pub fn regions(&self) -> &DurableQueue {
        &self.regions
    }

    #[must_use]
    pub fn surveys(&self) -> &DurableQueue {
        &self.surveys
    }

    /// Work forever. Only returns on error.
    pub fn run(&mut self) -> Result<Infallible, WorkerError> {
        loop {
            if self.step()? {
                self.sleeper.reset();
            } else {
                self.sleeper.sleep();
            }
        }
    }

    /// Attempt exactly one action; true iff it made progress.
    pub fn step(&mut self) -> Result<bool, WorkerError> {
        Ok(self.try_trim()? || self.try_normalize()? || self.try_aggregate()?)
    }

    /// Fill the region queue up to its target length.
    pub fn try_trim(&mut self) -> Result<bool, WorkerError> {
        let queued = self.regions.len()?;
        let Some(deficit) = self
            .config
            .region_queue_size
            .checked_sub(queued)
            .filter(|&d| d > 0)
        else {
            return Ok(false);
        };
        debug!(deficit, "Trimming regions");
        let outputs: Vec<PathBuf> = (0..deficit)
            .map(|i| self.layout.scratch(&format!("trim.{i}")))
            .collect();
        self.world.trim(self.config.region_size, &outputs)?;
        for output in &outputs {
            self.regions.push(output)?;
        }
        Ok(true)
    }

    /// One inference pass at the current priority.
    pub fn try_normalize(&mut self) -> Result<bool, WorkerError> {
        let Some(priority) = self.state.priority() else {
            return Ok(false);
        };
        if self.world.infer(priority)? {
            self.world.validate()?;
            self.world.dump(&self.layout.world())?;
            self.rebuild_regions()?;
            self.state = InferenceState::reset();
            debug!(priority, "Inference made progress");
        } else {
            self.state = self.state.advance();
            if self.state.is_normal() {
                self.world.dump(&self.layout.normal_world())?;
                info!(theory = %self.theory, "World is normal");
            }
        }
        Ok(true)
    }

    /// Merge every pending survey, then rebuild the region queue once.
    pub fn try_aggregate(&mut self) -> Result<bool, WorkerError> {
        let surveys = self.surveys.list()?;
        if surveys.is_empty() {
            return Ok(false);
        }
        for survey in &surveys {
            self.world.aggregate(survey)?;
            self.state = InferenceState::reset();
            self.world.validate()?;
            self.world.dump(&self.layout.world())?;
            let item_count = self.world.item_count()?;
            info!(theory = %self.theory, item_count, "Aggregated survey");
            fs::remove_file(survey)?;
        }
        self.rebuild_regions()?;
        Ok(true)
    }

    /// Replace the region queue with regions trimmed from the current world.
    fn rebuild_regions(&mut self) -> Result<(), WorkerError> {
        let world = &mut self.world;
        let CartographerConfig {
            region_size,
            region_queue_size,
        } = self.config;
        self.regions.replace_with(|staging| {
            let outputs: Vec<PathBuf> = (0..region_queue_size as u64)
                .map(|i| staging.join(ItemId::new(i).file_name()))
                .collect();
            world.trim(region_size, &outputs)?;
            Ok::<(), WorkerError>(())
        })?;
        debug!(count = region_queue_size, "Rebuilt region queue");
        Ok(())
    }
}
