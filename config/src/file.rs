use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::Deserialize;

use crate::ConfigError;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "ATLAS_CONFIG";

/// Raw contents of `~/.atlas/config.toml`. Every section is optional.
///
/// ```toml
/// [atlas]
/// root = "atlas"
/// poll_unit_ms = 1000
///
/// [log]
/// level = "info"
/// file = "/var/log/atlas.log"
///
/// [engine]
/// kind = "command"
/// program = "atlas-engine"
/// runner = "valgrind --tool=callgrind"
///
/// [theories.skj]
/// min_size = 1535
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub atlas: Option<AtlasSection>,
    pub log: Option<LogSection>,
    pub engine: Option<EngineSection>,
    #[serde(default)]
    pub theories: BTreeMap<String, TheorySection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AtlasSection {
    /// Directory holding one subdirectory per theory. Default: `atlas`.
    pub root: Option<PathBuf>,
    /// Backoff time unit in milliseconds. Default: 1000.
    pub poll_unit_ms: Option<u64>,
    /// Minimum size used for theories without their own entry. Default: 511.
    pub default_min_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogSection {
    /// `EnvFilter` directive, e.g. `info` or `atlas_core=debug`.
    pub level: Option<String>,
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process reference engine over JSON item sets.
    #[default]
    Builtin,
    /// External engine program, one invocation per operation.
    Command,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    #[serde(default)]
    pub kind: EngineKind,
    pub program: Option<String>,
    /// Command prefix for every engine invocation, e.g. a profiler.
    pub runner: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TheorySection {
    pub min_size: Option<usize>,
}

/// Default location: `$ATLAS_CONFIG`, else `~/.atlas/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".atlas").join("config.toml"))
}

impl ConfigFile {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        Self::parse(&content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
