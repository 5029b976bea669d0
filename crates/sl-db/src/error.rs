//! Error types for sl-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Unique or primary key violation (D004)
    #[error("[D004] Constraint violated: {0}")]
    ConstraintViolation(String),

    /// Not implemented (D005)
    #[error("[D005] Feature not implemented for {backend}: {feature}")]
    NotImplemented { backend: String, feature: String },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Transaction misuse, e.g. COMMIT without BEGIN (D007)
    #[error("[D007] Transaction error: {0}")]
    TransactionError(String),

    /// Database file held open by another process (D008)
    #[error("[D008] Database file is locked by another process: {0}")]
    FileLocked(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error carries no structured kind, so classify on the message
        let msg = err.to_string();
        if msg.contains("Could not set lock on file") || msg.contains("Conflicting lock") {
            DbError::FileLocked(msg)
        } else if msg.contains("Constraint Error")
            || msg.contains("Duplicate key")
            || msg.contains("violates primary key")
            || msg.contains("violates unique constraint")
        {
            DbError::ConstraintViolation(msg)
        } else if msg.contains("Table with name")
            || msg.contains("View with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

impl DbError {
    /// True when the error means a unique or primary key already holds the row
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }

    /// True when another process holds the database file
    pub fn is_file_locked(&self) -> bool {
        matches!(self, DbError::FileLocked(_))
    }

    /// Process id of the file lock holder, when the backend names one.
    ///
    /// DuckDB reports it as `... Conflicting lock is held in <exe> (PID 4242)`.
    pub fn lock_holder_pid(&self) -> Option<u32> {
        let DbError::FileLocked(msg) = self else {
            return None;
        };
        let rest = &msg[msg.find("(PID ")? + "(PID ".len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}
