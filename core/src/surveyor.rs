use std::convert::Infallible;
use std::fs;

use atlas_config::AtlasLayout;
use atlas_engine::AtlasEngine;
use atlas_types::Theory;
use atlas_utils::FileLock;
use tracing::{debug, info, warn};

use crate::{DurableQueue, Sleeper, WorkerError};

/// Expands regions into surveys, one at a time.
#[derive(Debug)]
pub struct SurveyWorker<E> {
    engine: E,
    theory: Theory,
    layout: AtlasLayout,
    step_size: usize,
    regions: DurableQueue,
    surveys: DurableQueue,
    sleeper: Sleeper,
    _role: FileLock,
}

impl<E: AtlasEngine> SurveyWorker<E> {
    pub fn start(
        engine: E,
        theory: Theory,
        layout: AtlasLayout,
        step_size: usize,
        sleeper: Sleeper,
    ) -> Result<Self, WorkerError> {
        let role_path = layout.surveyor_lock();
        let role = FileLock::try_acquire(&role_path).map_err(|source| WorkerError::Busy {
            role: "surveyor",
            path: role_path,
            source,
        })?;
        let regions = DurableQueue::open(layout.region_queue())?;
        let surveys = DurableQueue::open(layout.survey_queue())?;
        info!(theory = %theory, step_size, "Surveyor started");
        Ok(Self {
            engine,
            theory,
            layout,
            step_size,
            regions,
            surveys,
            sleeper,
            _role: role,
        })
    }

    #[must_use]
    pub fn regions(&self) -> &DurableQueue {
        &self.regions
    }

    #[must_use]
    pub fn surveys(&self) -> &DurableQueue {
        &self.surveys
    }

    pub fn run(&mut self) -> Result<Infallible, WorkerError> {
        loop {
            if self.step()? {
                self.sleeper.reset();
            } else {
                self.sleeper.sleep();
            }
        }
    }

    /// Survey one region; false when none was available.
    ///
    /// Work left by a surveyor that died is finished before anything new is
    /// popped: a survey whose region was already released is pushed as is,
    /// and a claimed region is surveyed again.
    pub fn step(&mut self) -> Result<bool, WorkerError> {
        let region = self.layout.scratch("region");
        let survey = self.layout.scratch("survey");
        if !region.exists() && survey.exists() {
            let id = self.surveys.push(&survey)?;
            warn!(theory = %self.theory, %id, "Pushed survey left by an interrupted run");
            return Ok(true);
        }
        if region.exists() {
            warn!(path = %region.display(), "Resuming interrupted survey");
        } else if !self.regions.pop_into(&region)? {
            return Ok(false);
        }

        let item_count = self.engine.item_count(&region)?;
        let target = item_count + self.step_size;
        debug!(item_count, target, "Surveying region");
        self.engine.survey(&self.theory, &region, &survey, target)?;
        fs::remove_file(&region)?;
        let id = self.surveys.push(&survey)?;
        info!(theory = %self.theory, %id, item_count = target, "Pushed survey");
        Ok(true)
    }
}
