//! Run orchestration: `migrate`, `status` and `repair`.
//!
//! A `migrate` run discovers scripts, bootstraps the history tables, takes
//! the run lock, plans against a fresh read of the history and applies the
//! plan one script at a time. The lock is released on every exit path.

use crate::error::{MigrateError, MigrateResult};
use crate::executor::Executor;
use crate::lock::RunLock;
use crate::planner::{self, PlanOptions, Survey};
use crate::report::{RunReport, ScriptReport, ScriptStatus};
use crate::source::{self, MigrationScript};
use crate::store::VersionStore;
use serde::Serialize;
use sl_core::{
    CoreError, EffectiveState, HistoryConfig, MigrationRecord, Project, RecordAction,
    TransactionMode, Version,
};
use sl_db::Database;
use sl_sql::{dialect_from_name, SqlDialect};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cooperative cancellation, honoured between scripts
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before the next script
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a [`Migrator`] needs besides the database
pub struct MigratorSettings {
    pub migration_paths: Vec<PathBuf>,
    pub exclude: Vec<glob::Pattern>,
    pub dialect: Box<dyn SqlDialect>,
    pub history: HistoryConfig,
    pub transactional: TransactionMode,
    pub lock_timeout: Duration,
    pub plan: PlanOptions,
}

impl MigratorSettings {
    /// Settings for a project, with the overrides of `target` applied
    pub fn from_project(project: &Project, target: Option<&str>) -> MigrateResult<Self> {
        let config = &project.config;
        let dialect = dialect_from_name(&config.dialect.to_string()).map_err(|e| {
            CoreError::ConfigInvalid {
                message: e.to_string(),
            }
        })?;

        Ok(Self {
            migration_paths: project.migration_dirs(),
            exclude: config.exclude_patterns(&project.root)?,
            dialect,
            history: config.get_history_config(target)?,
            transactional: config.transactional,
            lock_timeout: Duration::from_secs(config.lock_timeout_secs),
            plan: PlanOptions::from_config(config),
        })
    }
}

/// Options for a single `migrate` run
#[derive(Debug, Clone, Default)]
pub struct MigrateOptions {
    /// Plan only; nothing is executed or recorded
    pub dry_run: bool,
    /// Stop after this version
    pub target_version: Option<Version>,
}

/// Result of `status`
#[derive(Debug)]
pub struct StatusReport {
    /// Backend kind of the target, e.g. `duckdb`
    pub backend: &'static str,
    /// SQL dialect scripts are split with
    pub dialect: &'static str,
    /// Quoted name of the history table
    pub history_table: String,
    /// Whether scripts would run inside transactions
    pub transactional: bool,
    pub survey: Survey,
}

/// A repair operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairAction {
    /// Accept the current file as applied (drift, failure or unrecorded run)
    Realign(Version),
    /// Return a failed or unrecorded version to pending
    Reset(Version),
    /// Remove a stale run lock
    ReleaseLock,
}

#[derive(Debug, Clone, Copy)]
enum VersionRepair {
    Realign,
    Reset,
}

/// Result of `repair`
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub dry_run: bool,
    pub summary: String,
    /// The history row written (or that would be written)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<MigrationRecord>,
}

/// Drives migrations for one target database
pub struct Migrator {
    store: VersionStore,
    settings: MigratorSettings,
    cancel: CancellationToken,
}

impl Migrator {
    pub fn new(db: Arc<dyn Database>, settings: MigratorSettings) -> Self {
        Self {
            store: VersionStore::new(db, &settings.history),
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that cancels this migrator's runs between scripts
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Whether scripts run inside transactions on this target
    pub fn transactional(&self) -> bool {
        self.settings
            .transactional
            .resolve(self.store.database().supports_transactional_ddl())
    }

    /// Discover the migration scripts on disk
    pub fn discover(&self) -> MigrateResult<Vec<MigrationScript>> {
        source::discover(
            &self.settings.migration_paths,
            self.settings.dialect.as_ref(),
            &self.settings.exclude,
        )
    }

    /// Apply pending migrations. Returns how many were applied.
    ///
    /// `report` receives the plan, every statement outcome and the final
    /// error, whether or not the run succeeds.
    pub async fn migrate(
        &self,
        options: &MigrateOptions,
        report: &mut RunReport,
    ) -> MigrateResult<usize> {
        let result = self.run_migrate(options, report).await;
        report.finish(result.as_ref().err());
        result
    }

    async fn run_migrate(
        &self,
        options: &MigrateOptions,
        report: &mut RunReport,
    ) -> MigrateResult<usize> {
        let scripts = self.discover()?;
        self.store.ensure_table().await?;
        self.locked(self.apply_pending(&scripts, options, report))
            .await
    }

    async fn apply_pending(
        &self,
        scripts: &[MigrationScript],
        options: &MigrateOptions,
        report: &mut RunReport,
    ) -> MigrateResult<usize> {
        let snapshot = self.store.snapshot().await?;
        let plan_options = PlanOptions {
            target_version: options.target_version,
            ..self.settings.plan.clone()
        };
        let pending = planner::plan(scripts, &snapshot, &plan_options)?;
        report.planned = pending.len();
        let transactional = self.transactional();

        if pending.is_empty() {
            log::info!("Schema is up to date");
            return Ok(0);
        }
        if options.dry_run {
            for script in &pending {
                log::info!("Would apply version {} ({})", script.version, script.script);
                report
                    .scripts
                    .push(ScriptReport::new(script, ScriptStatus::Planned, transactional));
            }
            return Ok(0);
        }

        let executor = Executor::new(&self.store, transactional);
        let mut applied = 0;
        for (i, script) in pending.iter().enumerate() {
            if self.cancel.is_cancelled() {
                log::warn!("Cancelled before version {}", script.version);
                skip_rest(report, &pending[i..], transactional);
                return Err(MigrateError::Cancelled { applied });
            }

            let mut trace = ScriptReport::new(script, ScriptStatus::Skipped, transactional);
            let result = executor.apply(script, &mut trace).await;
            report.scripts.push(trace);
            if let Err(e) = result {
                skip_rest(report, &pending[i + 1..], transactional);
                return Err(e);
            }
            applied += 1;
        }

        log::info!("Applied {} migration(s)", applied);
        Ok(applied)
    }

    /// Per-version status and every problem planning would raise
    pub async fn status(&self) -> MigrateResult<StatusReport> {
        let scripts = self.discover()?;
        let snapshot = self.store.snapshot().await?;
        Ok(StatusReport {
            backend: self.store.database().db_type(),
            dialect: self.settings.dialect.name(),
            history_table: self.store.history_table(),
            transactional: self.transactional(),
            survey: planner::survey(&scripts, &snapshot, &self.settings.plan),
        })
    }

    /// Repair the history of a version, or clear a stale lock
    pub async fn repair(&self, action: RepairAction, dry_run: bool) -> MigrateResult<RepairOutcome> {
        match action {
            RepairAction::ReleaseLock => self.release_lock(dry_run).await,
            RepairAction::Realign(version) => {
                self.repair_locked(VersionRepair::Realign, version, dry_run)
                    .await
            }
            RepairAction::Reset(version) => {
                self.repair_locked(VersionRepair::Reset, version, dry_run)
                    .await
            }
        }
    }

    async fn repair_locked(
        &self,
        kind: VersionRepair,
        version: Version,
        dry_run: bool,
    ) -> MigrateResult<RepairOutcome> {
        let scripts = self.discover()?;
        self.store.ensure_table().await?;
        self.locked(self.repair_version(kind, version, &scripts, dry_run))
            .await
    }

    async fn release_lock(&self, dry_run: bool) -> MigrateResult<RepairOutcome> {
        let holder = if !self.store.exists().await? {
            None
        } else if dry_run {
            RunLock::holder(&self.store).await?
        } else {
            RunLock::force_release(&self.store).await?
        };

        let summary = match (&holder, dry_run) {
            (None, _) => "No migration lock is held".to_string(),
            (Some(h), true) => format!("Would release the migration lock held by {}", h),
            (Some(h), false) => format!("Released the migration lock held by {}", h),
        };
        log::info!("{}", summary);
        Ok(RepairOutcome {
            dry_run,
            summary,
            record: None,
        })
    }

    async fn repair_version(
        &self,
        kind: VersionRepair,
        version: Version,
        scripts: &[MigrationScript],
        dry_run: bool,
    ) -> MigrateResult<RepairOutcome> {
        let invalid = |reason: &str| MigrateError::InvalidRepair {
            version,
            reason: reason.to_string(),
        };

        let mut files = scripts.iter().filter(|s| s.version == version);
        let file = files.next();
        if files.next().is_some() {
            return Err(invalid("more than one migration file claims this version"));
        }

        let snapshot = self.store.snapshot().await?;
        let states = snapshot.states();
        let state = states.get(&version);
        let marker = snapshot.marker(version);

        let record = match kind {
            VersionRepair::Realign => {
                let file = file.ok_or_else(|| invalid("no migration file has this version"))?;
                match (state, marker) {
                    (_, Some(_)) | (Some(EffectiveState::Failed(_)), None) => {}
                    (Some(EffectiveState::Applied(r)), None) if r.checksum != file.checksum => {}
                    (Some(EffectiveState::Applied(_)), None) => {
                        return Err(invalid("already applied with the current checksum"))
                    }
                    (Some(EffectiveState::Reset) | None, None) => {
                        return Err(invalid("never applied; run `migrate` instead"))
                    }
                }
                MigrationRecord::repair(
                    RecordAction::Realign,
                    version,
                    &file.description,
                    &file.script,
                    &file.checksum,
                )
            }
            VersionRepair::Reset => {
                let resettable =
                    marker.is_some() || matches!(state, Some(EffectiveState::Failed(_)));
                if !resettable {
                    return Err(match state {
                        Some(EffectiveState::Applied(_)) => invalid(
                            "applied versions cannot be reset; write a new migration that reverses it",
                        ),
                        _ => invalid("nothing to reset; the version is already pending"),
                    });
                }

                let (description, script, checksum) = if let Some(f) = file {
                    (f.description.as_str(), f.script.as_str(), f.checksum.as_str())
                } else if let Some(EffectiveState::Applied(r) | EffectiveState::Failed(r)) = state {
                    (r.description.as_str(), r.script.as_str(), r.checksum.as_str())
                } else if let Some(m) = marker {
                    ("", m.script.as_str(), m.checksum.as_str())
                } else {
                    return Err(invalid("no file or history row describes this version"));
                };
                MigrationRecord::repair(RecordAction::Reset, version, description, script, checksum)
            }
        };

        let verb = if dry_run { "Would record" } else { "Recorded" };
        let summary = format!("{} {} of version {} ({})", verb, record.action, version, record.script);
        if dry_run {
            log::info!("{}", summary);
            return Ok(RepairOutcome {
                dry_run,
                summary,
                record: Some(record),
            });
        }

        let stored = self.store.record_attempt(&record).await?;
        if marker.is_some() {
            self.store.clear_in_flight(version).await?;
        }
        log::info!("{}", summary);
        Ok(RepairOutcome {
            dry_run,
            summary,
            record: Some(stored),
        })
    }

    /// Run `work` while holding the run lock, releasing it afterwards
    async fn locked<T>(&self, work: impl Future<Output = MigrateResult<T>>) -> MigrateResult<T> {
        let lock = RunLock::acquire(&self.store, self.settings.lock_timeout).await?;
        let result = work.await;
        match (result, lock.release().await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release)) => Err(release),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release)) => {
                log::error!("{}", release);
                Err(e)
            }
        }
    }
}

fn skip_rest(report: &mut RunReport, rest: &[MigrationScript], transactional: bool) {
    report.scripts.extend(
        rest.iter()
            .map(|s| ScriptReport::new(s, ScriptStatus::Skipped, transactional)),
    );
}

#[cfg(test)]
#[path = "runner_test.rs"]
mod tests;
