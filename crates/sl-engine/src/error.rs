//! Error types for sl-engine

use chrono::{DateTime, Utc};
use sl_core::{CoreError, Version};
use sl_db::DbError;
use std::path::PathBuf;
use thiserror::Error;

/// Migration engine errors
///
/// Every variant maps to a stable code and a distinct process exit status,
/// see [`MigrateError::exit_code`].
#[derive(Error, Debug)]
pub enum MigrateError {
    /// A `.sql` file does not follow `V<digits>__<description>.sql` (G001)
    #[error("[G001] Malformed migration file name '{}': {reason}", path.display())]
    MalformedName { path: PathBuf, reason: String },

    /// A script cannot be read or split into statements (G002)
    #[error("[G002] Malformed migration script '{}': {message}", path.display())]
    MalformedScript { path: PathBuf, message: String },

    /// Two scripts claim the same version (G003)
    #[error("[G003] Duplicate migration version {version}: '{}' and '{}'", first.display(), second.display())]
    DuplicateVersion {
        version: Version,
        first: PathBuf,
        second: PathBuf,
    },

    /// Versions are not contiguous while `require_contiguous` is set (G004)
    #[error("[G004] Version gap before {found} ({script}): expected version {expected}")]
    VersionGap {
        expected: Version,
        found: Version,
        script: String,
    },

    /// An applied script was edited after it ran (G005)
    #[error("[G005] Checksum mismatch for applied version {version} ({script}): recorded {recorded}, file has {current}. Restore the file or run `repair --realign {version}`")]
    ChecksumMismatch {
        version: Version,
        script: String,
        recorded: String,
        current: String,
    },

    /// Another runner holds the migration lock (G006)
    #[error("[G006] Migration lock {table} is held by {holder} (waited {waited_secs}s). If that runner crashed, run `repair --release-lock`")]
    LockUnavailable {
        table: String,
        holder: String,
        waited_secs: u64,
    },

    /// A statement of a script failed (G007)
    #[error("[G007] Version {version} ({script}) failed at statement {statement_index} (line {line}): {message}")]
    StatementExecutionFailure {
        version: Version,
        script: String,
        statement_index: usize,
        line: usize,
        message: String,
    },

    /// A non-transactional script was interrupted after statements ran (G008)
    #[error("[G008] Version {version} ({script}) was started at {started_at} and never recorded; it may be partially applied. Inspect the database, then run `repair --realign {version}` or `repair --reset {version}`")]
    UnrecordedApplication {
        version: Version,
        script: String,
        started_at: DateTime<Utc>,
    },

    /// The history store could not be read or written (G009)
    #[error("[G009] History store error while {context}: {source}")]
    StoreError {
        context: String,
        #[source]
        source: DbError,
    },

    /// The latest attempt of a version failed and was never repaired (G010)
    #[error("[G010] Version {version} ({script}) failed at {failed_at}. Fix the database state, then run `repair --reset {version}` (or `--realign` if it was completed by hand)")]
    PreviousFailure {
        version: Version,
        script: String,
        failed_at: DateTime<Utc>,
    },

    /// A pending version sorts below the highest applied version (G011)
    #[error("[G011] Pending version {version} ({script}) is lower than the highest applied version {highest}; set allow_out_of_order to apply it")]
    OutOfOrder {
        version: Version,
        script: String,
        highest: Version,
    },

    /// The run was cancelled between scripts (G012)
    #[error("[G012] Run cancelled after {applied} migration(s)")]
    Cancelled { applied: usize },

    /// A repair request does not fit the version's state (G013)
    #[error("[G013] Cannot repair version {version}: {reason}")]
    InvalidRepair { version: Version, reason: String },

    /// A script was moved through its lifecycle out of order (G014)
    #[error("[G014] Invalid state transition for version {version}: {from} -> {to}")]
    InvalidTransition {
        version: Version,
        from: String,
        to: String,
    },

    /// Config, project or IO error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for MigrateError
pub type MigrateResult<T> = Result<T, MigrateError>;

impl MigrateError {
    /// Wrap a database error raised by the history store
    pub(crate) fn store(context: impl Into<String>, source: DbError) -> Self {
        MigrateError::StoreError {
            context: context.into(),
            source,
        }
    }

    /// Stable error code, e.g. `G005`
    pub fn code(&self) -> &'static str {
        match self {
            MigrateError::MalformedName { .. } => "G001",
            MigrateError::MalformedScript { .. } => "G002",
            MigrateError::DuplicateVersion { .. } => "G003",
            MigrateError::VersionGap { .. } => "G004",
            MigrateError::ChecksumMismatch { .. } => "G005",
            MigrateError::LockUnavailable { .. } => "G006",
            MigrateError::StatementExecutionFailure { .. } => "G007",
            MigrateError::UnrecordedApplication { .. } => "G008",
            MigrateError::StoreError { .. } => "G009",
            MigrateError::PreviousFailure { .. } => "G010",
            MigrateError::OutOfOrder { .. } => "G011",
            MigrateError::Cancelled { .. } => "G012",
            MigrateError::InvalidRepair { .. } => "G013",
            MigrateError::InvalidTransition { .. } => "G014",
            MigrateError::Core(_) => "E000",
        }
    }

    /// Process exit status for this error kind
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrateError::MalformedName { .. } => 2,
            MigrateError::MalformedScript { .. } => 3,
            MigrateError::DuplicateVersion { .. } => 4,
            MigrateError::VersionGap { .. } => 5,
            MigrateError::ChecksumMismatch { .. } => 6,
            MigrateError::LockUnavailable { .. } => 7,
            MigrateError::StatementExecutionFailure { .. } => 8,
            MigrateError::UnrecordedApplication { .. } => 9,
            MigrateError::StoreError { .. } => 10,
            MigrateError::PreviousFailure { .. } => 11,
            MigrateError::OutOfOrder { .. } => 12,
            MigrateError::Cancelled { .. } => 13,
            MigrateError::InvalidRepair { .. }
            | MigrateError::InvalidTransition { .. }
            | MigrateError::Core(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_for_migration_errors() {
        let errors = [
            MigrateError::MalformedName {
                path: PathBuf::from("x.sql"),
                reason: "r".to_string(),
            },
            MigrateError::MalformedScript {
                path: PathBuf::from("V1__x.sql"),
                message: "m".to_string(),
            },
            MigrateError::DuplicateVersion {
                version: Version::new(3),
                first: PathBuf::from("a"),
                second: PathBuf::from("b"),
            },
            MigrateError::VersionGap {
                expected: Version::new(2),
                found: Version::new(4),
                script: "V4__d.sql".to_string(),
            },
            MigrateError::ChecksumMismatch {
                version: Version::new(1),
                script: "V1__a.sql".to_string(),
                recorded: "aa".to_string(),
                current: "bb".to_string(),
            },
            MigrateError::LockUnavailable {
                table: "lock".to_string(),
                holder: "other".to_string(),
                waited_secs: 0,
            },
            MigrateError::StatementExecutionFailure {
                version: Version::new(1),
                script: "V1__a.sql".to_string(),
                statement_index: 3,
                line: 9,
                message: "boom".to_string(),
            },
            MigrateError::UnrecordedApplication {
                version: Version::new(1),
                script: "V1__a.sql".to_string(),
                started_at: Utc::now(),
            },
            MigrateError::store("reading", DbError::ExecutionError("x".to_string())),
            MigrateError::PreviousFailure {
                version: Version::new(1),
                script: "V1__a.sql".to_string(),
                failed_at: Utc::now(),
            },
            MigrateError::OutOfOrder {
                version: Version::new(1),
                script: "V1__a.sql".to_string(),
                highest: Version::new(2),
            },
            MigrateError::Cancelled { applied: 1 },
        ];

        let codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        assert_eq!(codes, (2..=13).collect::<Vec<_>>());

        for (err, n) in errors.iter().zip(1..) {
            let code = format!("G{:03}", n);
            assert_eq!(err.code(), code);
            assert!(err.to_string().starts_with(&format!("[{}]", code)));
        }
    }

    #[test]
    fn test_core_errors_exit_with_one() {
        let err = MigrateError::from(CoreError::ConfigInvalid {
            message: "bad".to_string(),
        });
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("[E002]"));
    }

    #[test]
    fn test_statement_failure_message_names_location() {
        let err = MigrateError::StatementExecutionFailure {
            version: Version::new(4),
            script: "V4__grants.sql".to_string(),
            statement_index: 3,
            line: 12,
            message: "permission denied".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Version 4"));
        assert!(msg.contains("statement 3"));
        assert!(msg.contains("line 12"));
    }
}
