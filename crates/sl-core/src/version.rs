//! Migration versions and the migration file-name grammar.
//!
//! The only accepted pattern is `V<digits>__<description>.sql`. The digits are
//! an unsigned ordinal (leading zeros are insignificant), so `V003__a.sql` and
//! `V3__b.sql` claim the same version.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A migration version ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from its ordinal
    pub fn new(ordinal: u64) -> Self {
        Self(ordinal)
    }

    /// The numeric ordinal
    pub fn ordinal(self) -> u64 {
        self.0
    }

    /// The version that immediately follows this one, if representable
    pub fn successor(self) -> Option<Version> {
        self.0.checked_add(1).map(Version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        let digits = s.strip_prefix('V').unwrap_or(s);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CoreError::InvalidVersion {
                value: s.to_string(),
                reason: "expected decimal digits".to_string(),
            });
        }
        digits
            .parse::<u64>()
            .map(Version)
            .map_err(|_| CoreError::InvalidVersion {
                value: s.to_string(),
                reason: "ordinal does not fit in 64 bits".to_string(),
            })
    }
}

impl From<u64> for Version {
    fn from(ordinal: u64) -> Self {
        Self(ordinal)
    }
}

/// A file name that follows the migration naming convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFileName {
    /// Version parsed from the `V<digits>` prefix
    pub version: Version,
    /// Description with `__` rendered as ` / ` and `_` as spaces
    pub description: String,
}

impl MigrationFileName {
    /// Parse a file name, returning the reason it was rejected on failure.
    pub fn parse(file_name: &str) -> Result<Self, String> {
        let stem = file_name
            .strip_suffix(".sql")
            .ok_or_else(|| "file name must end in '.sql'".to_string())?;
        let rest = stem
            .strip_prefix('V')
            .ok_or_else(|| "file name must start with 'V<version>__'".to_string())?;
        let (digits, description) = rest
            .split_once("__")
            .ok_or_else(|| "missing '__' separator after the version".to_string())?;

        let version: Version = digits.parse().map_err(|e: CoreError| match e {
            CoreError::InvalidVersion { reason, .. } => format!("version '{}': {}", digits, reason),
            other => other.to_string(),
        })?;

        let description = render_description(description);
        if description.is_empty() {
            return Err("description after '__' must not be empty".to_string());
        }

        Ok(Self {
            version,
            description,
        })
    }
}

fn render_description(raw: &str) -> String {
    raw.split("__")
        .map(|part| part.replace('_', " ").trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[cfg(test)]
#[path = "version_test.rs"]
mod tests;
