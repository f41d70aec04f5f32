//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use atlas_config::AtlasLayout;
use atlas_types::Theory;
use tempfile::TempDir;

pub const THEORY: &str = "sk";
pub const MIN_SIZE: usize = 3;

pub fn theory() -> Theory {
    Theory::new(THEORY).unwrap()
}

/// A scratch atlas root with its own config file, so tests never touch the
/// user's `~/.atlas`.
pub struct TestAtlas {
    pub dir: TempDir,
    pub config: PathBuf,
}

impl TestAtlas {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("config.toml");
        let root = dir.path().join("atlas");
        fs::write(
            &config,
            format!(
                "[atlas]\nroot = {root:?}\npoll_unit_ms = 1\n\n[theories.{THEORY}]\nmin_size = {MIN_SIZE}\n",
                root = root.to_string_lossy()
            ),
        )
        .expect("write config");
        Self { dir, config }
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("atlas")
    }

    pub fn layout(&self) -> AtlasLayout {
        AtlasLayout::new(&self.root(), &theory())
    }

    pub fn log_file(&self) -> PathBuf {
        self.dir.path().join("test.log")
    }

    /// `atlas --config <config> --log-file <log> <args...>`
    pub fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_atlas"));
        cmd.arg("--config")
            .arg(&self.config)
            .arg("--log-file")
            .arg(self.log_file())
            .args(args)
            .env_remove("ATLAS_CONFIG")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn run<I, S>(&self, args: I) -> Output
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        self.command(args).output().expect("run atlas")
    }

    pub fn log(&self) -> String {
        fs::read_to_string(self.log_file()).unwrap_or_default()
    }
}

/// Items of a builtin-engine snapshot.
pub fn items(path: &Path) -> Vec<u64> {
    let bytes = fs::read(path).expect("read snapshot");
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("snapshot json");
    value["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|v| v.as_u64().expect("item"))
        .collect()
}

pub fn write_world(layout: &AtlasLayout, items: &[u64]) {
    fs::create_dir_all(layout.dir()).expect("mkdir");
    let body = serde_json::json!({ "theory": THEORY, "items": items });
    fs::write(layout.world(), body.to_string()).expect("write world");
}
