//! Error types for sl-sql

use thiserror::Error;

/// SQL splitting and analysis errors
#[derive(Error, Debug)]
pub enum SqlError {
    /// SQL parse error (S001)
    #[error("[S001] SQL parse error at line {line}, column {column}: {message}")]
    ParseError {
        message: String,
        line: usize,
        column: usize,
    },

    /// Quoted text or comment never closed (S002)
    #[error("[S002] Unterminated {kind} starting at line {line}")]
    Unterminated { kind: &'static str, line: usize },

    /// Unknown dialect name (S003)
    #[error("[S003] Unknown SQL dialect: {0}")]
    UnknownDialect(String),
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
