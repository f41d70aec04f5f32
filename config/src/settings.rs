use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use atlas_types::Theory;

use crate::file::{ConfigFile, EngineKind};
use crate::{AtlasLayout, ConfigError};

pub const DEFAULT_ROOT: &str = "atlas";
pub const DEFAULT_POLL_UNIT: Duration = Duration::from_secs(1);
pub const DEFAULT_MIN_SIZE: usize = 511;

/// Validated configuration. Built once per process from a [`ConfigFile`].
#[derive(Debug, Clone)]
pub struct AtlasSettings {
    pub root: PathBuf,
    pub poll_unit: Duration,
    pub log: LogSettings,
    pub engine: EngineSettings,
    default_min_size: usize,
    min_sizes: BTreeMap<Theory, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSettings {
    Builtin,
    Command {
        program: String,
        /// Already split on whitespace; empty when no runner is configured.
        runner: Vec<String>,
    },
}

impl Default for AtlasSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            poll_unit: DEFAULT_POLL_UNIT,
            log: LogSettings::default(),
            engine: EngineSettings::Builtin,
            default_min_size: DEFAULT_MIN_SIZE,
            min_sizes: BTreeMap::new(),
        }
    }
}

impl TryFrom<ConfigFile> for AtlasSettings {
    type Error = ConfigError;

    fn try_from(file: ConfigFile) -> Result<Self, Self::Error> {
        let mut settings = Self::default();

        if let Some(atlas) = file.atlas {
            if let Some(root) = atlas.root {
                settings.root = root;
            }
            if let Some(ms) = atlas.poll_unit_ms {
                if ms == 0 {
                    return Err(ConfigError::invalid("atlas.poll_unit_ms", "must be > 0"));
                }
                settings.poll_unit = Duration::from_millis(ms);
            }
            if let Some(min) = atlas.default_min_size {
                if min == 0 {
                    return Err(ConfigError::invalid("atlas.default_min_size", "must be > 0"));
                }
                settings.default_min_size = min;
            }
        }

        if let Some(log) = file.log {
            settings.log = LogSettings {
                level: log.level.filter(|l| !l.trim().is_empty()),
                file: log.file,
            };
        }

        if let Some(engine) = file.engine {
            settings.engine = match engine.kind {
                EngineKind::Builtin => EngineSettings::Builtin,
                EngineKind::Command => {
                    let program = engine
                        .program
                        .filter(|p| !p.trim().is_empty())
                        .ok_or_else(|| {
                            ConfigError::invalid("engine.program", "required when kind = \"command\"")
                        })?;
                    let runner = engine
                        .runner
                        .map(|r| r.split_whitespace().map(str::to_string).collect())
                        .unwrap_or_default();
                    EngineSettings::Command { program, runner }
                }
            };
        }

        for (name, section) in file.theories {
            let theory = Theory::new(name.clone())
                .map_err(|err| ConfigError::invalid(format!("theories.{name}"), err.to_string()))?;
            if let Some(min) = section.min_size {
                if min == 0 {
                    return Err(ConfigError::invalid(
                        format!("theories.{name}.min_size"),
                        "must be > 0",
                    ));
                }
                settings.min_sizes.insert(theory, min);
            }
        }

        Ok(settings)
    }
}

impl AtlasSettings {
    /// Smallest world the theory's engine can represent.
    #[must_use]
    pub fn min_size(&self, theory: &Theory) -> usize {
        self.min_sizes
            .get(theory)
            .copied()
            .unwrap_or(self.default_min_size)
    }

    #[must_use]
    pub fn with_min_size(mut self, theory: Theory, min_size: usize) -> Self {
        self.min_sizes.insert(theory, min_size);
        self
    }

    #[must_use]
    pub fn layout(&self, theory: &Theory) -> AtlasLayout {
        AtlasLayout::new(&self.root, theory)
    }
}
