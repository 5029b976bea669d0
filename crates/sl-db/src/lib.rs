//! sl-db - Database abstraction layer for Sluice
//!
//! This crate provides the `Database` trait the migration engine drives,
//! a DuckDB implementation, and a Snowflake stub.

pub mod duckdb;
pub mod error;
pub mod snowflake;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use snowflake::SnowflakeBackend;
pub use traits::{Database, Row};
