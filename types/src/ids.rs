use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Extension shared by every snapshot file (world, region, survey).
pub const ITEM_EXTENSION: &str = "h5";

/// Prefix for scratch files and directories. Never a queue item.
pub const SCRATCH_PREFIX: &str = "temp.";

/// Slot number of a work item inside a queue directory.
///
/// Rendered on disk as `{id}.h5`. Ids need not be contiguous; pushes pick the
/// lowest id that is free at push time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemNameError {
    #[error("queue item name must start with a digit (got {0:?})")]
    NotNumeric(String),
    #[error("queue item name must end in .h5 (got {0:?})")]
    WrongExtension(String),
}

impl ItemId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn file_name(self) -> String {
        format!("{}.{ITEM_EXTENSION}", self.0)
    }

    /// Parse a directory entry name; anything that is not `{digits}.h5` is
    /// scratch and must be ignored by queue listings.
    pub fn from_file_name(name: &str) -> Result<Self, ItemNameError> {
        let Some(stem) = name.strip_suffix(ITEM_EXTENSION).and_then(|s| s.strip_suffix('.'))
        else {
            return Err(ItemNameError::WrongExtension(name.to_string()));
        };
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ItemNameError::NotNumeric(name.to_string()));
        }
        stem.parse::<u64>()
            .map(Self)
            .map_err(|_err| ItemNameError::NotNumeric(name.to_string()))
    }

    /// Lowest id not present in `taken`.
    #[must_use]
    pub fn lowest_free(taken: impl IntoIterator<Item = ItemId>) -> Self {
        let mut taken: Vec<u64> = taken.into_iter().map(ItemId::value).collect();
        taken.sort_unstable();
        taken.dedup();
        let mut candidate = 0;
        for id in taken {
            if id != candidate {
                break;
            }
            candidate += 1;
        }
        Self(candidate)
    }
}

impl FromStr for ItemId {
    type Err = ItemNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_file_name(s)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
