//! The history store: an append-only table of migration attempts kept in the
//! target database, plus the in-flight marker table and the lock table.
//!
//! For a history table `h` the store owns three relations:
//!
//! | relation      | purpose                                           |
//! |---------------|---------------------------------------------------|
//! | `h`           | one row per attempt or repair, never updated      |
//! | `h_inflight`  | markers for non-transactional scripts in progress |
//! | `h_lock`      | at most one row: the runner holding the lock      |
//!
//! The current version is never cached; every call reads the database.

use crate::error::{MigrateError, MigrateResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use sl_core::sql_utils::{qualified_table, quote_ident, string_literal};
use sl_core::{
    effective_states, EffectiveState, HistoryConfig, InFlightMarker, MigrationRecord,
    RecordAction, Version,
};
use sl_db::{Database, Row};
use std::collections::BTreeMap;
use std::sync::Arc;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Everything the planner needs from the store, read in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySnapshot {
    /// All history rows, ascending by `installed_rank`
    pub records: Vec<MigrationRecord>,
    /// Surviving in-flight markers, ascending by version
    pub in_flight: Vec<InFlightMarker>,
}

impl HistorySnapshot {
    /// Effective state of each version that has history rows
    pub fn states(&self) -> BTreeMap<Version, EffectiveState> {
        effective_states(&self.records)
    }

    /// The in-flight marker for a version, if one survived
    pub fn marker(&self, version: Version) -> Option<&InFlightMarker> {
        self.in_flight.iter().find(|m| m.version == version)
    }
}

/// Reads and appends migration history in the target database
pub struct VersionStore {
    db: Arc<dyn Database>,
    schema: Option<String>,
    table: String,
}

impl VersionStore {
    /// Create a store for the configured history table
    pub fn new(db: Arc<dyn Database>, history: &HistoryConfig) -> Self {
        Self {
            db,
            schema: history.schema.clone(),
            table: history.table.clone(),
        }
    }

    /// The database this store writes to
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Quoted, schema-qualified name of the history table
    pub fn history_table(&self) -> String {
        qualified_table(self.schema.as_deref(), &self.table)
    }

    /// Quoted, schema-qualified name of the in-flight marker table
    pub fn in_flight_table(&self) -> String {
        qualified_table(self.schema.as_deref(), &format!("{}_inflight", self.table))
    }

    /// Quoted, schema-qualified name of the lock table
    pub fn lock_table(&self) -> String {
        qualified_table(self.schema.as_deref(), &format!("{}_lock", self.table))
    }

    /// Create the history, in-flight and lock tables when absent
    pub async fn ensure_table(&self) -> MigrateResult<()> {
        if let Some(schema) = &self.schema {
            self.db
                .create_schema_if_not_exists(&quote_ident(schema))
                .await
                .map_err(|e| MigrateError::store("creating the history schema", e))?;
        }

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {history} (
                installed_rank BIGINT PRIMARY KEY,
                version VARCHAR NOT NULL,
                description VARCHAR NOT NULL,
                script VARCHAR NOT NULL,
                checksum VARCHAR NOT NULL,
                applied_at TIMESTAMP NOT NULL,
                success BOOLEAN NOT NULL,
                execution_millis BIGINT NOT NULL,
                action VARCHAR NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {in_flight} (
                version VARCHAR PRIMARY KEY,
                script VARCHAR NOT NULL,
                checksum VARCHAR NOT NULL,
                started_at TIMESTAMP NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {lock} (
                lock_id INTEGER PRIMARY KEY,
                owner VARCHAR NOT NULL,
                acquired_at TIMESTAMP NOT NULL
            );",
            history = self.history_table(),
            in_flight = self.in_flight_table(),
            lock = self.lock_table(),
        );
        self.db
            .execute_batch(&ddl)
            .await
            .map_err(|e| MigrateError::store("creating the history tables", e))?;
        log::debug!("History table {} is ready", self.history_table());
        Ok(())
    }

    /// Whether the history table exists yet
    pub async fn exists(&self) -> MigrateResult<bool> {
        let name = match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.table),
            None => self.table.clone(),
        };
        self.db
            .relation_exists(&name)
            .await
            .map_err(|e| MigrateError::store("looking up the history table", e))
    }

    /// Append one record, assigning the next `installed_rank`.
    ///
    /// The rank is computed inside the INSERT itself, so the row lands
    /// atomically with its position in the audit order.
    pub async fn record_attempt(&self, record: &MigrationRecord) -> MigrateResult<MigrationRecord> {
        let table = self.history_table();
        let insert = format!(
            "INSERT INTO {table} (installed_rank, version, description, script, checksum, applied_at, success, execution_millis, action) \
             SELECT COALESCE(MAX(installed_rank), 0) + 1, {version}, {description}, {script}, {checksum}, \
             CAST({applied_at} AS TIMESTAMP), {success}, {millis}, {action} FROM {table}",
            table = table,
            version = string_literal(&record.version.to_string()),
            description = string_literal(&record.description),
            script = string_literal(&record.script),
            checksum = string_literal(&record.checksum),
            applied_at = string_literal(&format_timestamp(&record.applied_at)),
            success = record.success,
            millis = record.execution_millis,
            action = string_literal(record.action.as_str()),
        );
        self.db
            .execute(&insert)
            .await
            .map_err(|e| MigrateError::store(format!("recording version {}", record.version), e))?;

        let rows = self
            .db
            .query_rows(&format!(
                "SELECT CAST(MAX(installed_rank) AS VARCHAR) FROM {}",
                table
            ))
            .await
            .map_err(|e| MigrateError::store("reading the assigned rank", e))?;
        let rank = rows
            .first()
            .and_then(|row| row.first().cloned().flatten())
            .ok_or_else(|| corrupt("history table is empty after insert"))?;

        let mut stored = record.clone();
        stored.installed_rank = parse_field(&rank, "installed_rank")?;
        log::debug!(
            "Recorded {} of version {} (rank {}, success={})",
            stored.action,
            stored.version,
            stored.installed_rank,
            stored.success
        );
        Ok(stored)
    }

    /// All history rows, ascending by `installed_rank`
    pub async fn history(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let rows = self
            .db
            .query_rows(&format!(
                "SELECT CAST(installed_rank AS VARCHAR), version, description, script, checksum, \
                 CAST(applied_at AS VARCHAR), CAST(success AS VARCHAR), \
                 CAST(execution_millis AS VARCHAR), action \
                 FROM {} ORDER BY installed_rank",
                self.history_table()
            ))
            .await
            .map_err(|e| MigrateError::store("reading the history table", e))?;
        rows.iter().map(|row| parse_record(row)).collect()
    }

    /// The row that made each applied version applied, ascending by version
    pub async fn list_applied(&self) -> MigrateResult<Vec<MigrationRecord>> {
        let history = self.history().await?;
        Ok(effective_states(&history)
            .into_values()
            .filter_map(|state| match state {
                EffectiveState::Applied(record) => Some(record),
                _ => None,
            })
            .collect())
    }

    /// Whether a version currently counts as applied
    pub async fn is_applied(&self, version: Version) -> MigrateResult<bool> {
        let history = self.history().await?;
        Ok(effective_states(&history)
            .get(&version)
            .is_some_and(EffectiveState::is_applied))
    }

    /// Write the in-flight marker for a non-transactional script
    pub async fn mark_in_flight(&self, marker: &InFlightMarker) -> MigrateResult<()> {
        let sql = format!(
            "INSERT INTO {} (version, script, checksum, started_at) VALUES ({}, {}, {}, CAST({} AS TIMESTAMP))",
            self.in_flight_table(),
            string_literal(&marker.version.to_string()),
            string_literal(&marker.script),
            string_literal(&marker.checksum),
            string_literal(&format_timestamp(&marker.started_at)),
        );
        self.db
            .execute(&sql)
            .await
            .map_err(|e| MigrateError::store(format!("marking version {} in flight", marker.version), e))?;
        Ok(())
    }

    /// Remove the in-flight marker of a version, if any
    pub async fn clear_in_flight(&self, version: Version) -> MigrateResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE version = {}",
            self.in_flight_table(),
            string_literal(&version.to_string())
        );
        self.db
            .execute(&sql)
            .await
            .map_err(|e| MigrateError::store(format!("clearing the marker of version {}", version), e))?;
        Ok(())
    }

    /// Surviving in-flight markers, ascending by version
    pub async fn in_flight(&self) -> MigrateResult<Vec<InFlightMarker>> {
        let rows = self
            .db
            .query_rows(&format!(
                "SELECT version, script, checksum, CAST(started_at AS VARCHAR) FROM {}",
                self.in_flight_table()
            ))
            .await
            .map_err(|e| MigrateError::store("reading in-flight markers", e))?;

        let mut markers = rows
            .iter()
            .map(|row| {
                Ok(InFlightMarker {
                    version: parse_field(&required(row, 0, "version")?, "version")?,
                    script: required(row, 1, "script")?,
                    checksum: required(row, 2, "checksum")?,
                    started_at: parse_timestamp(&required(row, 3, "started_at")?)?,
                })
            })
            .collect::<MigrateResult<Vec<_>>>()?;
        markers.sort_by_key(|m| m.version);
        Ok(markers)
    }

    /// History rows and in-flight markers; empty when the tables do not exist yet
    pub async fn snapshot(&self) -> MigrateResult<HistorySnapshot> {
        if !self.exists().await? {
            return Ok(HistorySnapshot::default());
        }
        Ok(HistorySnapshot {
            records: self.history().await?,
            in_flight: self.in_flight().await?,
        })
    }
}

fn corrupt(message: impl Into<String>) -> MigrateError {
    MigrateError::store(
        "decoding the history table",
        sl_db::DbError::ExecutionError(message.into()),
    )
}

fn required(row: &Row, idx: usize, column: &str) -> MigrateResult<String> {
    row.get(idx)
        .cloned()
        .flatten()
        .ok_or_else(|| corrupt(format!("column '{}' is NULL", column)))
}

fn parse_field<T: std::str::FromStr>(value: &str, column: &str) -> MigrateResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| corrupt(format!("column '{}' has unexpected value '{}'", column, value)))
}

fn parse_record(row: &Row) -> MigrateResult<MigrationRecord> {
    let action: RecordAction = required(row, 8, "action")?.parse()?;
    Ok(MigrationRecord {
        installed_rank: parse_field(&required(row, 0, "installed_rank")?, "installed_rank")?,
        version: parse_field(&required(row, 1, "version")?, "version")?,
        description: required(row, 2, "description")?,
        script: required(row, 3, "script")?,
        checksum: required(row, 4, "checksum")?,
        applied_at: parse_timestamp(&required(row, 5, "applied_at")?)?,
        success: parse_field(&required(row, 6, "success")?, "success")?,
        execution_millis: parse_field(&required(row, 7, "execution_millis")?, "execution_millis")?,
        action,
    })
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(value: &str) -> MigrateResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| corrupt(format!("bad timestamp '{}': {}", value, e)))
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
