//! sl-sql - SQL layer for Sluice
//!
//! This crate splits migration scripts into individually executable statements
//! (respecting quoted strings, comments and dollar-quoted procedure bodies) and
//! provides a read-only lint for destructive statements, backed by sqlparser-rs.

pub mod dialect;
pub mod error;
pub mod risk;
pub mod splitter;

pub use dialect::{dialect_from_name, DuckDbDialect, SnowflakeDialect, SqlDialect};
pub use error::{SqlError, SqlResult};
pub use risk::{scan_statement, RiskFinding, RiskKind};
pub use splitter::{split_statements, SqlStatement};
