use super::*;
use sl_core::HistoryConfig;
use sl_db::DuckDbBackend;

async fn ready_store() -> VersionStore {
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let store = VersionStore::new(db, &HistoryConfig::default());
    store.ensure_table().await.unwrap();
    store
}

#[tokio::test]
async fn test_acquire_and_release() {
    let store = ready_store().await;
    let lock = RunLock::acquire(&store, Duration::ZERO).await.unwrap();
    let holder = RunLock::holder(&store).await.unwrap().unwrap();
    assert!(holder.starts_with(lock.owner()));

    lock.release().await.unwrap();
    assert!(RunLock::holder(&store).await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_acquire_reports_holder() {
    let store = ready_store().await;
    let first = RunLock::acquire(&store, Duration::ZERO).await.unwrap();

    let err = RunLock::acquire(&store, Duration::from_millis(300))
        .await
        .err()
        .unwrap();
    match err {
        MigrateError::LockUnavailable { holder, .. } => assert!(holder.contains(first.owner())),
        other => panic!("unexpected error: {other}"),
    }

    first.release().await.unwrap();
}

#[tokio::test]
async fn test_lock_can_be_taken_after_release() {
    let store = ready_store().await;
    RunLock::acquire(&store, Duration::ZERO)
        .await
        .unwrap()
        .release()
        .await
        .unwrap();
    let again = RunLock::acquire(&store, Duration::ZERO).await.unwrap();
    again.release().await.unwrap();
}

#[tokio::test]
async fn test_waiting_acquire_succeeds_once_released() {
    let store = Arc::new(ready_store().await);
    let first = RunLock::acquire(&store, Duration::ZERO).await.unwrap();

    let releaser = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        first.release().await.unwrap();
    };
    let waiter = RunLock::acquire(&store, Duration::from_secs(5));
    let ((), second) = tokio::join!(releaser, waiter);

    second.unwrap().release().await.unwrap();
}

#[tokio::test]
async fn test_force_release_clears_stale_lock() {
    let store = ready_store().await;
    let stale = RunLock::acquire(&store, Duration::ZERO).await.unwrap();
    let owner = stale.owner().to_string();
    drop(stale);

    let previous = RunLock::force_release(&store).await.unwrap().unwrap();
    assert!(previous.starts_with(&owner));
    assert!(RunLock::acquire(&store, Duration::ZERO).await.is_ok());
}

fn locked_by(pid: u32) -> DbError {
    DbError::FileLocked(format!(
        "IO Error: Could not set lock on file \"w.duckdb\": Conflicting lock is held in /usr/bin/sluice (PID {pid})"
    ))
}

#[tokio::test]
async fn test_open_exclusive_waits_for_file_lock() {
    let mut attempts = 0;
    let db = open_exclusive("w.duckdb", Duration::from_secs(5), || {
        attempts += 1;
        if attempts < 3 {
            Err(locked_by(4242))
        } else {
            Ok(Arc::new(DuckDbBackend::in_memory()?) as Arc<dyn Database>)
        }
    })
    .await
    .unwrap();
    assert_eq!(attempts, 3);
    assert_eq!(db.db_type(), "duckdb");
}

#[tokio::test]
async fn test_open_exclusive_times_out_naming_holder() {
    let err = open_exclusive("w.duckdb", Duration::ZERO, || Err(locked_by(4242)))
        .await
        .err()
        .unwrap();
    assert_eq!(err.code(), "G006");
    assert_eq!(err.exit_code(), 7);
    match err {
        MigrateError::LockUnavailable { table, holder, .. } => {
            assert_eq!(table, "w.duckdb");
            assert_eq!(holder, "process 4242");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_open_exclusive_other_failure_is_not_retried() {
    let mut attempts = 0;
    let err = open_exclusive("w.duckdb", Duration::from_secs(5), || {
        attempts += 1;
        Err(DbError::ConnectionError("permission denied".to_string()))
    })
    .await
    .err()
    .unwrap();
    assert_eq!(attempts, 1);
    assert_eq!(err.code(), "G009");
}
