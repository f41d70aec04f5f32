use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the formal theory an atlas is built for.
///
/// Used as a directory name, so it is restricted to ASCII alphanumerics,
/// `_` and `-`, and may not start with a digit or the scratch prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Theory(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TheoryError {
    #[error("theory name cannot be empty")]
    Empty,
    #[error("theory name must not start with a digit (got {0})")]
    LeadingDigit(String),
    #[error("theory name may only contain ASCII letters, digits, '_' and '-' (got {0})")]
    InvalidCharacter(String),
}

impl Theory {
    pub fn new(name: impl Into<String>) -> Result<Self, TheoryError> {
        let name = name.into();
        let Some(first) = name.chars().next() else {
            return Err(TheoryError::Empty);
        };
        if first.is_ascii_digit() {
            return Err(TheoryError::LeadingDigit(name));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(TheoryError::InvalidCharacter(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Theory {
    type Err = TheoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Theory {
    type Error = TheoryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Theory> for String {
    fn from(value: Theory) -> Self {
        value.0
    }
}

impl AsRef<str> for Theory {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Theory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
