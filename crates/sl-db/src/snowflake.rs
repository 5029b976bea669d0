//! Snowflake database backend stub

use crate::error::{DbError, DbResult};
use crate::traits::{Database, Row};
use async_trait::async_trait;

/// Snowflake database backend (stub implementation)
///
/// Snowflake commits DDL implicitly, so a real implementation must run
/// migrations in non-transactional mode.
pub struct SnowflakeBackend {
    _private: (),
}

fn not_implemented<T>(feature: &str) -> DbResult<T> {
    Err(DbError::NotImplemented {
        backend: "snowflake".to_string(),
        feature: feature.to_string(),
    })
}

impl SnowflakeBackend {
    /// Create a new Snowflake backend (not yet implemented)
    pub fn new(_connection_string: &str) -> DbResult<Self> {
        not_implemented("connection")
    }
}

#[async_trait]
impl Database for SnowflakeBackend {
    async fn execute(&self, _sql: &str) -> DbResult<usize> {
        not_implemented("execute")
    }

    async fn execute_batch(&self, _sql: &str) -> DbResult<()> {
        not_implemented("execute_batch")
    }

    async fn begin(&self) -> DbResult<()> {
        not_implemented("begin")
    }

    async fn commit(&self) -> DbResult<()> {
        not_implemented("commit")
    }

    async fn rollback(&self) -> DbResult<()> {
        not_implemented("rollback")
    }

    async fn relation_exists(&self, _name: &str) -> DbResult<bool> {
        not_implemented("relation_exists")
    }

    async fn query_rows(&self, _sql: &str) -> DbResult<Vec<Row>> {
        not_implemented("query_rows")
    }

    async fn create_schema_if_not_exists(&self, _schema: &str) -> DbResult<()> {
        not_implemented("create_schema_if_not_exists")
    }

    fn supports_transactional_ddl(&self) -> bool {
        false
    }

    fn db_type(&self) -> &'static str {
        "snowflake"
    }
}
