//! sl-core - Core library for Sluice
//!
//! This crate provides shared types used across all Sluice components:
//! project configuration (`sluice.yml`), migration versions and the file-name
//! grammar, history records, checksums and SQL quoting helpers.

pub mod checksum;
pub mod config;
pub mod error;
pub mod project;
pub mod record;
pub mod sql_utils;
pub mod version;

pub use checksum::{compute_checksum, compute_script_checksum};
pub use config::{
    Config, DatabaseConfig, DbType, Dialect, DriftPolicy, HistoryConfig, TransactionMode,
};
pub use error::{CoreError, CoreResult};
pub use project::Project;
pub use record::{effective_states, EffectiveState, InFlightMarker, MigrationRecord, RecordAction};
pub use version::{MigrationFileName, Version};
