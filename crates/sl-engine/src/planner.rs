//! Planning: compare discovered scripts with the recorded history.
//!
//! [`plan`] yields the scripts to apply, ascending by version, or the first
//! blocking problem. [`survey`] reports every version with its status and
//! collects all problems without failing, for `status`.

use crate::error::{MigrateError, MigrateResult};
use crate::source::MigrationScript;
use crate::store::HistorySnapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sl_core::{Config, DriftPolicy, EffectiveState, MigrationRecord, Version};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Policy knobs for planning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanOptions {
    /// Reject gaps between consecutive versions
    pub require_contiguous: bool,
    /// Apply pending versions lower than the highest applied one
    pub allow_out_of_order: bool,
    /// What to do when an applied script's checksum changed
    pub on_checksum_mismatch: DriftPolicy,
    /// Only plan versions up to and including this one
    pub target_version: Option<Version>,
}

impl PlanOptions {
    /// Options as configured for a project
    pub fn from_config(config: &Config) -> Self {
        Self {
            require_contiguous: config.require_contiguous,
            allow_out_of_order: config.allow_out_of_order,
            on_checksum_mismatch: config.on_checksum_mismatch,
            target_version: None,
        }
    }
}

/// Status of one version as reported by `status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionStatus {
    /// Applied and the file is unchanged
    Applied,
    /// Not applied yet (or reset by a repair)
    Pending,
    /// The latest attempt failed
    Failed,
    /// Applied, but the file changed since
    Drifted,
    /// Applied, but the file is gone
    Missing,
    /// Started without transaction and never recorded
    Unrecorded,
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VersionStatus::Applied => "applied",
            VersionStatus::Pending => "pending",
            VersionStatus::Failed => "failed",
            VersionStatus::Drifted => "drifted",
            VersionStatus::Missing => "missing",
            VersionStatus::Unrecorded => "unrecorded",
        };
        f.write_str(s)
    }
}

/// One line of the status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyRow {
    pub version: Version,
    pub description: String,
    pub script: String,
    pub status: VersionStatus,
    /// Rank of the history row that decided the status
    pub installed_rank: Option<i64>,
    /// When that row was written
    pub applied_at: Option<DateTime<Utc>>,
}

/// Status of every known version plus all detected problems
#[derive(Debug, Default)]
pub struct Survey {
    pub rows: Vec<SurveyRow>,
    pub issues: Vec<MigrateError>,
}

impl Survey {
    /// Highest version that counts as applied
    pub fn current_version(&self) -> Option<Version> {
        self.rows
            .iter()
            .filter(|r| {
                matches!(
                    r.status,
                    VersionStatus::Applied | VersionStatus::Drifted | VersionStatus::Missing
                )
            })
            .map(|r| r.version)
            .max()
    }

    /// Number of rows with a given status
    pub fn count(&self, status: VersionStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }
}

/// Scripts that still need to run, ascending by version.
///
/// Checks, in order: duplicate versions, unrecorded applications, previous
/// failures, checksum drift (unless the policy is `warn`), version gaps
/// (with `require_contiguous`), and out-of-order versions (unless allowed).
/// The first problem found is returned as the error.
pub fn plan(
    available: &[MigrationScript],
    snapshot: &HistorySnapshot,
    options: &PlanOptions,
) -> MigrateResult<Vec<MigrationScript>> {
    let states = snapshot.states();

    if let Some(first) = find_issues(available, snapshot, &states, options)
        .into_iter()
        .next()
    {
        return Err(first);
    }

    if options.on_checksum_mismatch == DriftPolicy::Warn {
        for (script, record) in drifted(available, &states) {
            log::warn!(
                "Applied version {} ({}) changed since it ran: recorded {}, file has {}",
                script.version,
                script.script,
                record.checksum,
                script.checksum
            );
        }
    }
    let available_versions: BTreeSet<Version> = available.iter().map(|s| s.version).collect();
    for (version, state) in &states {
        if let EffectiveState::Applied(record) = state {
            if !available_versions.contains(version) {
                log::warn!(
                    "Applied version {} ({}) has no migration file",
                    version,
                    record.script
                );
            }
        }
    }

    Ok(pending(available, &states)
        .filter(|s| match options.target_version {
            Some(target) => s.version <= target,
            None => true,
        })
        .cloned()
        .collect())
}

/// Per-version status and every problem, without failing
pub fn survey(
    available: &[MigrationScript],
    snapshot: &HistorySnapshot,
    options: &PlanOptions,
) -> Survey {
    let states = snapshot.states();
    let mut rows = Vec::new();

    for script in available {
        let (status, decided_by) = if snapshot.marker(script.version).is_some() {
            (VersionStatus::Unrecorded, None)
        } else {
            match states.get(&script.version) {
                Some(EffectiveState::Applied(record)) if record.checksum == script.checksum => {
                    (VersionStatus::Applied, Some(record))
                }
                Some(EffectiveState::Applied(record)) => (VersionStatus::Drifted, Some(record)),
                Some(EffectiveState::Failed(record)) => (VersionStatus::Failed, Some(record)),
                Some(EffectiveState::Reset) | None => (VersionStatus::Pending, None),
            }
        };
        rows.push(row(
            script.version,
            &script.description,
            &script.script,
            status,
            decided_by,
        ));
    }

    let available_versions: BTreeSet<Version> = available.iter().map(|s| s.version).collect();
    for (version, state) in &states {
        if available_versions.contains(version) || snapshot.marker(*version).is_some() {
            continue;
        }
        match state {
            EffectiveState::Applied(record) => rows.push(row(
                *version,
                &record.description,
                &record.script,
                VersionStatus::Missing,
                Some(record),
            )),
            EffectiveState::Failed(record) => rows.push(row(
                *version,
                &record.description,
                &record.script,
                VersionStatus::Failed,
                Some(record),
            )),
            EffectiveState::Reset => {}
        }
    }
    for marker in &snapshot.in_flight {
        if !available_versions.contains(&marker.version) {
            rows.push(SurveyRow {
                version: marker.version,
                description: String::new(),
                script: marker.script.clone(),
                status: VersionStatus::Unrecorded,
                installed_rank: None,
                applied_at: None,
            });
        }
    }

    rows.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.script.cmp(&b.script)));

    Survey {
        rows,
        issues: find_issues(available, snapshot, &states, options),
    }
}

fn row(
    version: Version,
    description: &str,
    script: &str,
    status: VersionStatus,
    decided_by: Option<&MigrationRecord>,
) -> SurveyRow {
    SurveyRow {
        version,
        description: description.to_string(),
        script: script.to_string(),
        status,
        installed_rank: decided_by.map(|r| r.installed_rank),
        applied_at: decided_by.map(|r| r.applied_at),
    }
}

/// Available scripts that are neither applied nor failed
fn pending<'a>(
    available: &'a [MigrationScript],
    states: &'a BTreeMap<Version, EffectiveState>,
) -> impl Iterator<Item = &'a MigrationScript> {
    available.iter().filter(move |s| {
        matches!(states.get(&s.version), None | Some(EffectiveState::Reset))
    })
}

/// Applied versions whose file checksum no longer matches
fn drifted<'a>(
    available: &'a [MigrationScript],
    states: &'a BTreeMap<Version, EffectiveState>,
) -> Vec<(&'a MigrationScript, &'a MigrationRecord)> {
    available
        .iter()
        .filter_map(|script| match states.get(&script.version) {
            Some(EffectiveState::Applied(record)) if record.checksum != script.checksum => {
                Some((script, record))
            }
            _ => None,
        })
        .collect()
}

fn find_issues(
    available: &[MigrationScript],
    snapshot: &HistorySnapshot,
    states: &BTreeMap<Version, EffectiveState>,
    options: &PlanOptions,
) -> Vec<MigrateError> {
    let mut issues = Vec::new();

    for pair in available.windows(2) {
        if pair[0].version == pair[1].version {
            issues.push(MigrateError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].path.clone(),
                second: pair[1].path.clone(),
            });
        }
    }

    for marker in &snapshot.in_flight {
        issues.push(MigrateError::UnrecordedApplication {
            version: marker.version,
            script: marker.script.clone(),
            started_at: marker.started_at,
        });
    }

    for state in states.values() {
        if let EffectiveState::Failed(record) = state {
            issues.push(MigrateError::PreviousFailure {
                version: record.version,
                script: record.script.clone(),
                failed_at: record.applied_at,
            });
        }
    }

    if options.on_checksum_mismatch == DriftPolicy::Fail {
        for (script, record) in drifted(available, states) {
            issues.push(MigrateError::ChecksumMismatch {
                version: script.version,
                script: script.script.clone(),
                recorded: record.checksum.clone(),
                current: script.checksum.clone(),
            });
        }
    }

    if options.require_contiguous {
        let mut known: BTreeMap<Version, String> = states
            .iter()
            .filter_map(|(v, s)| match s {
                EffectiveState::Applied(r) | EffectiveState::Failed(r) => {
                    Some((*v, r.script.clone()))
                }
                EffectiveState::Reset => None,
            })
            .collect();
        for script in available {
            known
                .entry(script.version)
                .or_insert_with(|| script.script.clone());
        }

        let versions: Vec<(&Version, &String)> = known.iter().collect();
        for pair in versions.windows(2) {
            let (prev, _) = pair[0];
            let (next, script) = pair[1];
            if let Some(expected) = prev.successor() {
                if *next != expected {
                    issues.push(MigrateError::VersionGap {
                        expected,
                        found: *next,
                        script: script.clone(),
                    });
                }
            }
        }
    }

    if !options.allow_out_of_order {
        let highest = states
            .iter()
            .filter(|(_, s)| s.is_applied())
            .map(|(v, _)| *v)
            .max();
        if let Some(highest) = highest {
            for script in pending(available, states) {
                if script.version < highest {
                    issues.push(MigrateError::OutOfOrder {
                        version: script.version,
                        script: script.script.clone(),
                        highest,
                    });
                }
            }
        }
    }

    issues
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
