//! sl-engine - Migration engine for Sluice
//!
//! Discovers versioned SQL scripts (`V<n>__<description>.sql`), compares them
//! with the append-only history table in the target database, and applies the
//! pending ones in version order under a single-writer lock.
//!
//! The pieces, in data-flow order:
//!
//! - [`source`] finds and splits scripts
//! - [`store`] reads and appends history
//! - [`planner`] decides what runs, or why nothing may
//! - [`executor`] runs one script and records the attempt
//! - [`runner`] ties them together for `migrate`, `status` and `repair`

pub mod error;
pub mod executor;
pub mod lock;
pub mod planner;
pub mod report;
pub mod runner;
pub mod source;
pub mod store;

pub use error::{MigrateError, MigrateResult};
pub use executor::{Executor, ScriptState};
pub use lock::{open_exclusive, RunLock};
pub use planner::{plan, survey, PlanOptions, Survey, SurveyRow, VersionStatus};
pub use report::{RunReport, ScriptReport, ScriptStatus, StatementLog, StatementStatus};
pub use runner::{
    CancellationToken, MigrateOptions, Migrator, MigratorSettings, RepairAction, RepairOutcome,
    StatusReport,
};
pub use source::{discover, MigrationScript};
pub use store::{HistorySnapshot, VersionStore};
