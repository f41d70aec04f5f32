use std::path::{Path, PathBuf};

use atlas_config::EngineSettings;
use atlas_types::Theory;

use crate::{
    AtlasEngine, BuiltinEngine, BuiltinWorld, CommandEngine, CommandWorld, EngineError,
    WorldHandle,
};

/// The engine selected by configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredEngine {
    Builtin(BuiltinEngine),
    Command(CommandEngine),
}

impl ConfiguredEngine {
    #[must_use]
    pub fn from_settings(settings: &EngineSettings) -> Self {
        match settings {
            EngineSettings::Builtin => Self::Builtin(BuiltinEngine::new()),
            EngineSettings::Command { program, runner } => {
                Self::Command(CommandEngine::new(program.clone(), runner.clone()))
            }
        }
    }
}

#[derive(Debug)]
pub enum ConfiguredWorld {
    Builtin(BuiltinWorld),
    Command(CommandWorld),
}

impl AtlasEngine for ConfiguredEngine {
    type Handle = ConfiguredWorld;

    fn init(&self, theory: &Theory, world: &Path, size: usize) -> Result<(), EngineError> {
        match self {
            Self::Builtin(engine) => engine.init(theory, world, size),
            Self::Command(engine) => engine.init(theory, world, size),
        }
    }

    fn connect(&self, theory: &Theory, world: &Path) -> Result<ConfiguredWorld, EngineError> {
        match self {
            Self::Builtin(engine) => engine.connect(theory, world).map(ConfiguredWorld::Builtin),
            Self::Command(engine) => engine.connect(theory, world).map(ConfiguredWorld::Command),
        }
    }

    fn survey(
        &self,
        theory: &Theory,
        region: &Path,
        survey: &Path,
        target_size: usize,
    ) -> Result<(), EngineError> {
        match self {
            Self::Builtin(engine) => engine.survey(theory, region, survey, target_size),
            Self::Command(engine) => engine.survey(theory, region, survey, target_size),
        }
    }

    fn item_count(&self, path: &Path) -> Result<usize, EngineError> {
        match self {
            Self::Builtin(engine) => engine.item_count(path),
            Self::Command(engine) => engine.item_count(path),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $world:ident => $call:expr) => {
        match $self {
            ConfiguredWorld::Builtin($world) => $call,
            ConfiguredWorld::Command($world) => $call,
        }
    };
}

impl WorldHandle for ConfiguredWorld {
    fn trim(&mut self, size: usize, outputs: &[PathBuf]) -> Result<(), EngineError> {
        delegate!(self, world => world.trim(size, outputs))
    }

    fn infer(&mut self, priority: u8) -> Result<bool, EngineError> {
        delegate!(self, world => world.infer(priority))
    }

    fn validate(&mut self) -> Result<(), EngineError> {
        delegate!(self, world => world.validate())
    }

    fn dump(&mut self, path: &Path) -> Result<(), EngineError> {
        delegate!(self, world => world.dump(path))
    }

    fn aggregate(&mut self, path: &Path) -> Result<(), EngineError> {
        delegate!(self, world => world.aggregate(path))
    }

    fn item_count(&mut self) -> Result<usize, EngineError> {
        delegate!(self, world => world.item_count())
    }
}
