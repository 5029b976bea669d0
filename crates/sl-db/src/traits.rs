//! Database trait definition

use crate::error::DbResult;
use async_trait::async_trait;

/// One result row, every column rendered as text (`None` for SQL NULL)
pub type Row = Vec<Option<String>>;

/// Database abstraction the migration engine drives
///
/// Statements are submitted verbatim as text. Implementations must be
/// Send + Sync for async operation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute one statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple semicolon-separated statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Open a transaction on this connection
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> DbResult<()>;

    /// Check if a table or view exists (`name` may be schema-qualified)
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Run a query and return all rows.
    ///
    /// Columns are read as text, so callers cast non-text columns to
    /// VARCHAR in the query.
    async fn query_rows(&self, sql: &str) -> DbResult<Vec<Row>>;

    /// Create a schema if it does not exist
    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()>;

    /// Whether DDL statements can be rolled back inside a transaction
    fn supports_transactional_ddl(&self) -> bool;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
