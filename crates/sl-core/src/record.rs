//! History records kept in the target database.
//!
//! The history table is append-only. The state of a version is derived by
//! folding its rows in `installed_rank` order, see [`effective_states`].

use crate::error::{CoreError, CoreResult};
use crate::version::Version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// What a history row records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    /// An attempt to apply the script
    Migrate,
    /// Repair: accept the current file checksum, or mark an unrecorded script as applied
    Realign,
    /// Repair: return a failed or unrecorded version to pending
    Reset,
}

impl RecordAction {
    /// Value stored in the `action` column
    pub fn as_str(self) -> &'static str {
        match self {
            RecordAction::Migrate => "migrate",
            RecordAction::Realign => "realign",
            RecordAction::Reset => "reset",
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordAction {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        match s {
            "migrate" => Ok(RecordAction::Migrate),
            "realign" => Ok(RecordAction::Realign),
            "reset" => Ok(RecordAction::Reset),
            other => Err(CoreError::UnknownAction {
                action: other.to_string(),
            }),
        }
    }
}

/// One row of the history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Attempt number, assigned by the store (0 until stored)
    pub installed_rank: i64,
    /// Migration version
    pub version: Version,
    /// Human-readable label from the file name
    pub description: String,
    /// File name of the script
    pub script: String,
    /// SHA-256 of the script content
    pub checksum: String,
    /// When the attempt finished
    pub applied_at: DateTime<Utc>,
    /// Whether the attempt succeeded
    pub success: bool,
    /// Execution time in milliseconds
    pub execution_millis: u64,
    /// What this row records
    pub action: RecordAction,
}

impl MigrationRecord {
    /// Build an unstored `migrate` record for an attempt that just finished
    pub fn attempt(
        version: Version,
        description: &str,
        script: &str,
        checksum: &str,
        success: bool,
        execution_millis: u64,
    ) -> Self {
        Self {
            installed_rank: 0,
            version,
            description: description.to_string(),
            script: script.to_string(),
            checksum: checksum.to_string(),
            applied_at: Utc::now(),
            success,
            execution_millis,
            action: RecordAction::Migrate,
        }
    }

    /// Build an unstored repair record
    pub fn repair(
        action: RecordAction,
        version: Version,
        description: &str,
        script: &str,
        checksum: &str,
    ) -> Self {
        Self {
            installed_rank: 0,
            version,
            description: description.to_string(),
            script: script.to_string(),
            checksum: checksum.to_string(),
            applied_at: Utc::now(),
            success: action == RecordAction::Realign,
            execution_millis: 0,
            action,
        }
    }
}

/// Marker written before a non-transactional script starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightMarker {
    pub version: Version,
    pub script: String,
    pub checksum: String,
    pub started_at: DateTime<Utc>,
}

/// The state of a version after folding its history rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectiveState {
    /// Applied; carries the row that made it so
    Applied(MigrationRecord),
    /// The latest attempt failed and has not been repaired
    Failed(MigrationRecord),
    /// Reset by a repair; the version is pending again
    Reset,
}

impl EffectiveState {
    /// True when the version counts as applied
    pub fn is_applied(&self) -> bool {
        matches!(self, EffectiveState::Applied(_))
    }
}

/// Fold history rows into the effective state of each version.
///
/// Rows are processed in `installed_rank` order regardless of input order.
pub fn effective_states(records: &[MigrationRecord]) -> BTreeMap<Version, EffectiveState> {
    let mut ordered: Vec<&MigrationRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.installed_rank);

    let mut states = BTreeMap::new();
    for record in ordered {
        let state = match (record.action, record.success) {
            (RecordAction::Migrate, true) | (RecordAction::Realign, _) => {
                EffectiveState::Applied(record.clone())
            }
            (RecordAction::Migrate, false) => EffectiveState::Failed(record.clone()),
            (RecordAction::Reset, _) => EffectiveState::Reset,
        };
        states.insert(record.version, state);
    }
    states
}

#[cfg(test)]
#[path = "record_test.rs"]
mod tests;
