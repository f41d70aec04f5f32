//! Reference engine over sets of item numbers.
//!
//! A snapshot is a JSON object `{"theory": "...", "items": [1, 2, ...]}` with
//! items sorted ascending, so equal models always serialize to equal bytes.
//!
//! Model rules:
//! - items are positive integers; a world is never empty
//! - inference at priority `p` adds, one item per pass, the smallest missing
//!   multiple `x * (p + 2)` of a present item `x` that does not exceed the
//!   current maximum (so inference never grows the maximum and converges)
//! - surveys append consecutive items above the region's maximum
//! - aggregation is set union

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use atlas_types::Theory;
use atlas_utils::{AtomicWriteOptions, atomic_write_with_options};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{AtlasEngine, EngineError, WorldHandle};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Snapshot {
    theory: String,
    items: BTreeSet<u64>,
}

impl Snapshot {
    fn load(path: &Path) -> Result<Self, EngineError> {
        let bytes = fs::read(path).map_err(|e| EngineError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|source| EngineError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn load_for(theory: &Theory, path: &Path) -> Result<Self, EngineError> {
        let snapshot = Self::load(path)?;
        if snapshot.theory != theory.as_str() {
            return Err(EngineError::TheoryMismatch {
                path: path.to_path_buf(),
                expected: theory.to_string(),
                found: snapshot.theory,
            });
        }
        Ok(snapshot)
    }

    fn store(&self, path: &Path, options: AtomicWriteOptions) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(self).map_err(|source| EngineError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;
        atomic_write_with_options(path, &bytes, options).map_err(|e| EngineError::io(path, e))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinEngine {
    write_options: AtomicWriteOptions,
}

impl BuiltinEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip fsync on every write. For tests.
    #[must_use]
    pub fn unsynced() -> Self {
        Self {
            write_options: AtomicWriteOptions::unsynced(),
        }
    }
}

impl AtlasEngine for BuiltinEngine {
    type Handle = BuiltinWorld;

    fn init(&self, theory: &Theory, world: &Path, size: usize) -> Result<(), EngineError> {
        let snapshot = Snapshot {
            theory: theory.to_string(),
            items: (1..=size as u64).collect(),
        };
        snapshot.store(world, self.write_options)
    }

    fn connect(&self, theory: &Theory, world: &Path) -> Result<BuiltinWorld, EngineError> {
        let snapshot = Snapshot::load_for(theory, world)?;
        debug!(path = %world.display(), item_count = snapshot.items.len(), "Connected to world");
        Ok(BuiltinWorld {
            snapshot,
            write_options: self.write_options,
        })
    }

    fn survey(
        &self,
        theory: &Theory,
        region: &Path,
        survey: &Path,
        target_size: usize,
    ) -> Result<(), EngineError> {
        let mut snapshot = Snapshot::load_for(theory, region)?;
        let mut next = snapshot.items.last().copied().unwrap_or(0) + 1;
        while snapshot.items.len() < target_size {
            snapshot.items.insert(next);
            next += 1;
        }
        snapshot.store(survey, self.write_options)
    }

    fn item_count(&self, path: &Path) -> Result<usize, EngineError> {
        Snapshot::load(path).map(|s| s.items.len())
    }
}

/// Live world of the [`BuiltinEngine`].
#[derive(Debug)]
pub struct BuiltinWorld {
    snapshot: Snapshot,
    write_options: AtomicWriteOptions,
}

impl BuiltinWorld {
    fn theory(&self) -> Result<Theory, EngineError> {
        Theory::new(self.snapshot.theory.clone())
            .map_err(|e| EngineError::Invalid(format!("bad theory name: {e}")))
    }
}

impl WorldHandle for BuiltinWorld {
    fn trim(&mut self, size: usize, outputs: &[PathBuf]) -> Result<(), EngineError> {
        let items: Vec<u64> = self.snapshot.items.iter().copied().collect();
        let n = items.len();
        for (i, output) in outputs.iter().enumerate() {
            let region: BTreeSet<u64> = if size >= n {
                items.iter().copied().collect()
            } else {
                let start = i.wrapping_mul(size) % n;
                (0..size).map(|k| items[(start + k) % n]).collect()
            };
            Snapshot {
                theory: self.snapshot.theory.clone(),
                items: region,
            }
            .store(output, self.write_options)?;
        }
        Ok(())
    }

    fn infer(&mut self, priority: u8) -> Result<bool, EngineError> {
        let factor = u64::from(priority) + 2;
        let Some(&max) = self.snapshot.items.last() else {
            return Ok(false);
        };
        let derived = self.snapshot.items.iter().find_map(|&x| {
            let y = x.checked_mul(factor)?;
            (y <= max && !self.snapshot.items.contains(&y)).then_some(y)
        });
        match derived {
            Some(y) => {
                self.snapshot.items.insert(y);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn validate(&mut self) -> Result<(), EngineError> {
        self.theory()?;
        if self.snapshot.items.is_empty() {
            return Err(EngineError::Invalid("world is empty".into()));
        }
        if self.snapshot.items.contains(&0) {
            return Err(EngineError::Invalid("item 0 is not a valid item".into()));
        }
        Ok(())
    }

    fn dump(&mut self, path: &Path) -> Result<(), EngineError> {
        self.snapshot.store(path, self.write_options)
    }

    fn aggregate(&mut self, path: &Path) -> Result<(), EngineError> {
        let theory = self.theory()?;
        let other = Snapshot::load_for(&theory, path)?;
        self.snapshot.items.extend(other.items);
        Ok(())
    }

    fn item_count(&mut self) -> Result<usize, EngineError> {
        Ok(self.snapshot.items.len())
    }
}
