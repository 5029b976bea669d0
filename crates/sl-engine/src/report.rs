//! Run reports: what a `migrate` run planned, executed and how each
//! statement fared. Serialized to `migrate_results.json` by the CLI.

use crate::error::MigrateError;
use crate::source::MigrationScript;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sl_core::Version;
use std::time::Instant;

/// Outcome of a single statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementStatus {
    Success,
    Failed,
    /// Not run because an earlier statement of the script failed
    Skipped,
}

/// One executed (or skipped) statement
#[derive(Debug, Clone, Serialize)]
pub struct StatementLog {
    pub index: usize,
    pub line: usize,
    pub duration_ms: u64,
    pub status: StatementStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a script within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStatus {
    /// Dry run: would be applied
    Planned,
    Applied,
    Failed,
    /// Not started (cancelled or an earlier script failed)
    Skipped,
}

/// Per-script section of the run report
#[derive(Debug, Clone, Serialize)]
pub struct ScriptReport {
    pub version: Version,
    pub description: String,
    pub script: String,
    pub checksum: String,
    pub status: ScriptStatus,
    pub transactional: bool,
    pub duration_ms: u64,
    pub statements: Vec<StatementLog>,
}

impl ScriptReport {
    /// Empty report for a script about to run
    pub fn new(script: &MigrationScript, status: ScriptStatus, transactional: bool) -> Self {
        Self {
            version: script.version,
            description: script.description.clone(),
            script: script.script.clone(),
            checksum: script.checksum.clone(),
            status,
            transactional,
            duration_ms: 0,
            statements: Vec::new(),
        }
    }
}

/// Error section of the run report
#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub code: String,
    pub message: String,
}

/// Report of one `migrate` run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    pub dry_run: bool,
    /// Selected target, `default` when none is given
    pub target: String,
    pub planned: usize,
    pub applied: usize,
    pub failed: usize,
    pub skipped: usize,
    pub scripts: Vec<ScriptReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReportError>,
    #[serde(skip)]
    clock: Option<Instant>,
}

impl RunReport {
    /// Start a report; the clock runs until [`RunReport::finish`]
    pub fn new(target: &str, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            elapsed_secs: 0.0,
            dry_run,
            target: target.to_string(),
            planned: 0,
            applied: 0,
            failed: 0,
            skipped: 0,
            scripts: Vec::new(),
            error: None,
            clock: Some(Instant::now()),
        }
    }

    /// Stop the clock, tally script outcomes and record the run's error
    pub fn finish(&mut self, error: Option<&MigrateError>) {
        if let Some(clock) = self.clock.take() {
            self.elapsed_secs = clock.elapsed().as_secs_f64();
        }
        let count = |status| self.scripts.iter().filter(|s| s.status == status).count();
        let (applied, failed, skipped) = (
            count(ScriptStatus::Applied),
            count(ScriptStatus::Failed),
            count(ScriptStatus::Skipped),
        );
        self.applied = applied;
        self.failed = failed;
        self.skipped = skipped;
        self.error = error.map(|e| ReportError {
            code: e.code().to_string(),
            message: e.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn script(version: u64) -> MigrationScript {
        MigrationScript {
            version: Version::new(version),
            description: "d".to_string(),
            script: format!("V{}__d.sql", version),
            path: PathBuf::from(format!("V{}__d.sql", version)),
            checksum: "c".to_string(),
            statements: Vec::new(),
        }
    }

    #[test]
    fn test_finish_tallies_outcomes() {
        let mut report = RunReport::new("duckdb", false);
        report.planned = 3;
        report
            .scripts
            .push(ScriptReport::new(&script(1), ScriptStatus::Applied, true));
        report
            .scripts
            .push(ScriptReport::new(&script(2), ScriptStatus::Failed, true));
        report
            .scripts
            .push(ScriptReport::new(&script(3), ScriptStatus::Skipped, true));

        let err = MigrateError::Cancelled { applied: 1 };
        report.finish(Some(&err));

        assert_eq!((report.applied, report.failed, report.skipped), (1, 1, 1));
        assert_eq!(report.error.as_ref().unwrap().code, "G012");
        assert!(report.elapsed_secs >= 0.0);
    }

    #[test]
    fn test_serializes_without_error_field_on_success() {
        let mut report = RunReport::new("duckdb", true);
        report.finish(None);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["dry_run"], true);
        assert!(json.get("clock").is_none());
    }
}
