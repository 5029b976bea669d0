//! Single-writer lock for a migration target.
//!
//! The lock is a row in the store's lock table whose primary key admits only
//! one holder. Acquiring inserts the row; a primary key violation means
//! another runner holds it. The row is removed explicitly on release. A
//! runner that dies while holding it leaves the row behind, and only
//! [`RunLock::force_release`] (`repair --release-lock`) clears it.
//!
//! Embedded backends such as a DuckDB file admit one writing process, so a
//! second runner is already turned away when it opens the file.
//! [`open_exclusive`] waits for that file lock under the same timeout and
//! reports the same `LockUnavailable` error.

use crate::error::{MigrateError, MigrateResult};
use crate::store::VersionStore;
use chrono::Utc;
use sl_core::sql_utils::string_literal;
use sl_db::{Database, DbError, DbResult};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Interval between acquisition attempts
pub const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(250);

const LOCK_ID: i32 = 1;

/// A held migration lock. Call [`RunLock::release`] on every exit path.
pub struct RunLock {
    db: Arc<dyn Database>,
    table: String,
    owner: String,
    released: bool,
}

impl RunLock {
    /// Acquire the lock, retrying until `timeout` elapses.
    ///
    /// Fails with `LockUnavailable` naming the current holder.
    pub async fn acquire(store: &VersionStore, timeout: Duration) -> MigrateResult<RunLock> {
        let db = Arc::clone(store.database());
        let table = store.lock_table();
        let owner = format!("{} (pid {})", Uuid::new_v4(), std::process::id());
        let started = Instant::now();

        loop {
            let insert = format!(
                "INSERT INTO {} (lock_id, owner, acquired_at) VALUES ({}, {}, CAST({} AS TIMESTAMP))",
                table,
                LOCK_ID,
                string_literal(&owner),
                string_literal(&Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            );
            match db.execute(&insert).await {
                Ok(_) => {
                    log::debug!("Acquired migration lock {} as {}", table, owner);
                    return Ok(RunLock {
                        db,
                        table,
                        owner,
                        released: false,
                    });
                }
                Err(e) if e.is_constraint_violation() => {
                    if started.elapsed() >= timeout {
                        let holder = Self::holder(store)
                            .await?
                            .unwrap_or_else(|| "an unknown runner".to_string());
                        return Err(MigrateError::LockUnavailable {
                            table,
                            holder,
                            waited_secs: started.elapsed().as_secs(),
                        });
                    }
                    log::debug!("Migration lock {} is held, retrying", table);
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(MigrateError::store("acquiring the migration lock", e)),
            }
        }
    }

    /// Owner string written into the lock row
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Release the lock
    pub async fn release(mut self) -> MigrateResult<()> {
        self.released = true;
        let sql = format!(
            "DELETE FROM {} WHERE lock_id = {} AND owner = {}",
            self.table,
            LOCK_ID,
            string_literal(&self.owner)
        );
        let deleted = self
            .db
            .execute(&sql)
            .await
            .map_err(|e| MigrateError::store("releasing the migration lock", e))?;
        if deleted == 0 {
            log::warn!(
                "Migration lock {} was no longer held by {} at release",
                self.table,
                self.owner
            );
        } else {
            log::debug!("Released migration lock {}", self.table);
        }
        Ok(())
    }

    /// Current holder of the lock, as "<owner> since <timestamp>"
    pub async fn holder(store: &VersionStore) -> MigrateResult<Option<String>> {
        let rows = store
            .database()
            .query_rows(&format!(
                "SELECT owner, CAST(acquired_at AS VARCHAR) FROM {} WHERE lock_id = {}",
                store.lock_table(),
                LOCK_ID
            ))
            .await
            .map_err(|e| MigrateError::store("reading the migration lock", e))?;

        Ok(rows.into_iter().next().map(|row| {
            let mut cols = row.into_iter();
            let owner = cols.next().flatten().unwrap_or_default();
            match cols.next().flatten() {
                Some(since) => format!("{} since {}", owner, since),
                None => owner,
            }
        }))
    }

    /// Remove the lock row regardless of owner; returns the previous holder
    pub async fn force_release(store: &VersionStore) -> MigrateResult<Option<String>> {
        let holder = Self::holder(store).await?;
        store
            .database()
            .execute(&format!("DELETE FROM {}", store.lock_table()))
            .await
            .map_err(|e| MigrateError::store("clearing the migration lock", e))?;
        Ok(holder)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "Migration lock {} held by {} was dropped without release; run `repair --release-lock` if it persists",
                self.table,
                self.owner
            );
        }
    }
}

/// Open a target database, retrying while another process holds its file.
///
/// `open` is called every [`LOCK_RETRY_INTERVAL`] until it succeeds, fails
/// with anything other than a file lock, or `timeout` elapses.
pub async fn open_exclusive<F>(
    location: &str,
    timeout: Duration,
    mut open: F,
) -> MigrateResult<Arc<dyn Database>>
where
    F: FnMut() -> DbResult<Arc<dyn Database>>,
{
    let started = Instant::now();
    loop {
        match open() {
            Ok(db) => return Ok(db),
            Err(e) if e.is_file_locked() => {
                if started.elapsed() >= timeout {
                    return Err(file_lock_unavailable(location, &e, started.elapsed()));
                }
                log::debug!("Database {} is locked by another process, retrying", location);
                tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
            }
            Err(e) => {
                return Err(MigrateError::store(
                    format!("opening database {}", location),
                    e,
                ))
            }
        }
    }
}

fn file_lock_unavailable(location: &str, err: &DbError, waited: Duration) -> MigrateError {
    let holder = match err.lock_holder_pid() {
        Some(pid) => format!("process {}", pid),
        None => "another process".to_string(),
    };
    MigrateError::LockUnavailable {
        table: location.to_string(),
        holder,
        waited_secs: waited.as_secs(),
    }
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
