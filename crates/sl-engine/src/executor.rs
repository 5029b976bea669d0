//! Script execution.
//!
//! Each script moves through `Pending -> Running -> Applied | Failed`.
//!
//! In transactional mode the statements and the history INSERT share one
//! transaction, so a failure leaves nothing behind but the failed-attempt
//! row written after the rollback.
//!
//! Without transactions an in-flight marker brackets the script. It is
//! cleared once the outcome is recorded, except when a statement after the
//! first one failed: then part of the script took effect, the marker stays,
//! and planning refuses to continue until an operator repairs the version.

use crate::error::{MigrateError, MigrateResult};
use crate::report::{ScriptReport, ScriptStatus, StatementLog, StatementStatus};
use crate::source::MigrationScript;
use crate::store::VersionStore;
use chrono::Utc;
use sl_core::{InFlightMarker, MigrationRecord, Version};
use std::fmt;
use std::time::Instant;

/// Lifecycle of a script within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptState {
    Pending,
    Running,
    Applied,
    Failed,
}

impl ScriptState {
    /// Move to `next`, rejecting anything but the forward edges
    pub fn transition(self, version: Version, next: ScriptState) -> MigrateResult<ScriptState> {
        match (self, next) {
            (ScriptState::Pending, ScriptState::Running)
            | (ScriptState::Running, ScriptState::Applied)
            | (ScriptState::Running, ScriptState::Failed) => Ok(next),
            _ => Err(MigrateError::InvalidTransition {
                version,
                from: self.to_string(),
                to: next.to_string(),
            }),
        }
    }
}

impl fmt::Display for ScriptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptState::Pending => "pending",
            ScriptState::Running => "running",
            ScriptState::Applied => "applied",
            ScriptState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A statement failure and where in the script it happened
struct StatementFailure {
    /// 0-based position in `MigrationScript::statements`
    position: usize,
    error: MigrateError,
}

/// Applies scripts against the store's database
pub struct Executor<'a> {
    store: &'a VersionStore,
    transactional: bool,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a VersionStore, transactional: bool) -> Self {
        Self {
            store,
            transactional,
        }
    }

    /// Whether scripts run inside a transaction
    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Apply one script and record the attempt.
    ///
    /// Statement outcomes are appended to `trace`. Returns the stored record
    /// on success.
    pub async fn apply(
        &self,
        script: &MigrationScript,
        trace: &mut ScriptReport,
    ) -> MigrateResult<MigrationRecord> {
        let mut state = ScriptState::Pending.transition(script.version, ScriptState::Running)?;
        log::info!(
            "Applying version {} ({}){}",
            script.version,
            script.script,
            if self.transactional {
                ""
            } else {
                " without transaction"
            }
        );

        let started = Instant::now();
        let outcome = if self.transactional {
            self.apply_transactional(script, trace, started).await
        } else {
            self.apply_guarded(script, trace, started).await
        };
        trace.duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(record) => {
                state = state.transition(script.version, ScriptState::Applied)?;
                trace.status = ScriptStatus::Applied;
                log::info!(
                    "Version {} {} in {}ms",
                    script.version,
                    state,
                    trace.duration_ms
                );
                Ok(record)
            }
            Err(e) => {
                state.transition(script.version, ScriptState::Failed)?;
                trace.status = ScriptStatus::Failed;
                Err(e)
            }
        }
    }

    async fn apply_transactional(
        &self,
        script: &MigrationScript,
        trace: &mut ScriptReport,
        started: Instant,
    ) -> MigrateResult<MigrationRecord> {
        let db = self.store.database();
        db.begin().await.map_err(|e| {
            MigrateError::store(format!("opening a transaction for version {}", script.version), e)
        })?;

        if let Err(failure) = self.run_statements(script, trace).await {
            if let Err(e) = db.rollback().await {
                log::error!("Rollback of version {} failed: {}", script.version, e);
            }
            self.record_failure(script, started).await;
            return Err(failure.error);
        }

        let record = attempt(script, true, started);
        let stored = match self.store.record_attempt(&record).await {
            Ok(stored) => stored,
            Err(e) => {
                if let Err(rollback) = db.rollback().await {
                    log::error!("Rollback of version {} failed: {}", script.version, rollback);
                }
                return Err(e);
            }
        };

        if let Err(e) = db.commit().await {
            self.record_failure(script, started).await;
            return Err(MigrateError::store(
                format!("committing version {}", script.version),
                e,
            ));
        }
        Ok(stored)
    }

    async fn apply_guarded(
        &self,
        script: &MigrationScript,
        trace: &mut ScriptReport,
        started: Instant,
    ) -> MigrateResult<MigrationRecord> {
        self.store
            .mark_in_flight(&InFlightMarker {
                version: script.version,
                script: script.script.clone(),
                checksum: script.checksum.clone(),
                started_at: Utc::now(),
            })
            .await?;

        if let Err(failure) = self.run_statements(script, trace).await {
            self.record_failure(script, started).await;
            if failure.position == 0 {
                self.store.clear_in_flight(script.version).await?;
            } else {
                log::warn!(
                    "Version {} stopped after {} statement(s) took effect without a transaction; repair it before the next run",
                    script.version,
                    failure.position
                );
            }
            return Err(failure.error);
        }

        let stored = self
            .store
            .record_attempt(&attempt(script, true, started))
            .await?;
        self.store.clear_in_flight(script.version).await?;
        Ok(stored)
    }

    async fn run_statements(
        &self,
        script: &MigrationScript,
        trace: &mut ScriptReport,
    ) -> Result<(), StatementFailure> {
        let db = self.store.database();
        let total = script.statements.len();

        for (position, statement) in script.statements.iter().enumerate() {
            log::info!(
                "Version {} statement {}/{} (line {})",
                script.version,
                statement.index,
                total,
                statement.line
            );
            let started = Instant::now();
            let result = db.execute_batch(&statement.text).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => trace.statements.push(StatementLog {
                    index: statement.index,
                    line: statement.line,
                    duration_ms,
                    status: StatementStatus::Success,
                    error: None,
                }),
                Err(e) => {
                    log::error!(
                        "Version {} statement {} (line {}) failed: {}",
                        script.version,
                        statement.index,
                        statement.line,
                        e
                    );
                    trace.statements.push(StatementLog {
                        index: statement.index,
                        line: statement.line,
                        duration_ms,
                        status: StatementStatus::Failed,
                        error: Some(e.to_string()),
                    });
                    trace
                        .statements
                        .extend(script.statements[position + 1..].iter().map(|s| {
                            StatementLog {
                                index: s.index,
                                line: s.line,
                                duration_ms: 0,
                                status: StatementStatus::Skipped,
                                error: None,
                            }
                        }));
                    return Err(StatementFailure {
                        position,
                        error: MigrateError::StatementExecutionFailure {
                            version: script.version,
                            script: script.script.clone(),
                            statement_index: statement.index,
                            line: statement.line,
                            message: e.to_string(),
                        },
                    });
                }
            }
        }
        Ok(())
    }

    /// Append a failed attempt; a store error here is logged, not raised
    async fn record_failure(&self, script: &MigrationScript, started: Instant) {
        if let Err(e) = self
            .store
            .record_attempt(&attempt(script, false, started))
            .await
        {
            log::error!(
                "Could not record the failed attempt of version {}: {}",
                script.version,
                e
            );
        }
    }
}

fn attempt(script: &MigrationScript, success: bool, started: Instant) -> MigrationRecord {
    MigrationRecord::attempt(
        script.version,
        &script.description,
        &script.script,
        &script.checksum,
        success,
        started.elapsed().as_millis() as u64,
    )
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
