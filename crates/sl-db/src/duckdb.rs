//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{Database, Row};
use async_trait::async_trait;
use duckdb::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// DuckDB database backend
///
/// A single connection guarded by a mutex. Transactions opened with
/// [`Database::begin`] span every call until `commit` or `rollback`.
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    in_transaction: AtomicBool,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Ok(Self::with_connection(conn))
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            let msg = e.to_string();
            match DbError::from(e) {
                locked @ DbError::FileLocked(_) => locked,
                _ => DbError::ConnectionError(format!("{}: {}", path.display(), msg)),
            }
        })?;
        Ok(Self::with_connection(conn))
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            in_transaction: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        conn.execute(sql, []).map_err(DbError::from)
    }

    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(DbError::from)
    }

    fn query_rows_sync(&self, sql: &str) -> DbResult<Vec<Row>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let statement: &duckdb::Statement<'_> = row.as_ref();
            let width = statement.column_count();
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(row.get::<_, Option<String>>(idx)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    fn relation_exists_sync(&self, name: &str) -> DbResult<bool> {
        let (schema, table) = match name.rfind('.') {
            Some(pos) => (&name[..pos], &name[pos + 1..]),
            None => ("main", name),
        };

        let sql = format!(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = '{}' AND table_name = '{}'",
            schema.replace('\'', "''"),
            table.replace('\'', "''")
        );

        let conn = self.lock()?;
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn end_transaction(&self, keyword: &str) -> DbResult<()> {
        if !self.in_transaction.swap(false, Ordering::SeqCst) {
            return Err(DbError::TransactionError(format!(
                "{} without an open transaction",
                keyword
            )));
        }
        self.execute_batch_sync(keyword)
    }
}

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn begin(&self) -> DbResult<()> {
        if self.in_transaction.swap(true, Ordering::SeqCst) {
            return Err(DbError::TransactionError(
                "BEGIN while a transaction is already open".to_string(),
            ));
        }
        if let Err(e) = self.execute_batch_sync("BEGIN TRANSACTION") {
            self.in_transaction.store(false, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    async fn commit(&self) -> DbResult<()> {
        self.end_transaction("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.end_transaction("ROLLBACK")
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        self.relation_exists_sync(name)
    }

    async fn query_rows(&self, sql: &str) -> DbResult<Vec<Row>> {
        self.query_rows_sync(sql)
    }

    async fn create_schema_if_not_exists(&self, schema: &str) -> DbResult<()> {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {}", schema);
        self.execute_sync(&sql)?;
        Ok(())
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
