//! End-to-end tests of the engine against real DuckDB databases.

use sl_core::{HistoryConfig, TransactionMode, Version};
use sl_db::{Database, DuckDbBackend};
use sl_engine::{
    MigrateError, MigrateOptions, Migrator, MigratorSettings, PlanOptions, RunReport,
    VersionStatus,
};
use sl_sql::SnowflakeDialect;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn settings(dirs: &[&Path]) -> MigratorSettings {
    MigratorSettings {
        migration_paths: dirs.iter().map(|d| d.to_path_buf()).collect(),
        exclude: Vec::new(),
        dialect: Box::new(SnowflakeDialect::new()),
        history: HistoryConfig {
            schema: Some("ops".to_string()),
            table: "schema_history".to_string(),
        },
        transactional: TransactionMode::Auto,
        lock_timeout: Duration::from_millis(500),
        plan: PlanOptions::default(),
    }
}

async fn migrate(m: &Migrator) -> Result<usize, MigrateError> {
    let mut report = RunReport::new("duckdb", false);
    m.migrate(&MigrateOptions::default(), &mut report).await
}

#[tokio::test]
async fn test_history_persists_across_runners() {
    let project = TempDir::new().unwrap();
    let migrations = project.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(migrations.join("V1__init.sql"), "CREATE TABLE t1 (id INT);").unwrap();
    let db_path = project.path().join("warehouse.duckdb");

    {
        let db: Arc<dyn Database> = Arc::new(DuckDbBackend::from_path(&db_path).unwrap());
        let m = Migrator::new(db, settings(&[&migrations]));
        assert_eq!(migrate(&m).await.unwrap(), 1);
    }

    fs::write(migrations.join("V2__more.sql"), "CREATE TABLE t2 (id INT);").unwrap();
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::from_path(&db_path).unwrap());
    let m = Migrator::new(db, settings(&[&migrations]));
    assert_eq!(migrate(&m).await.unwrap(), 1);

    let status = m.status().await.unwrap();
    assert_eq!(status.survey.current_version(), Some(Version::new(2)));
    assert_eq!(status.history_table, r#""ops"."schema_history""#);
}

#[tokio::test]
async fn test_versions_apply_in_order_across_roots() {
    let project = TempDir::new().unwrap();
    let core = project.path().join("core");
    let reporting = project.path().join("reporting");
    fs::create_dir_all(&core).unwrap();
    fs::create_dir_all(&reporting).unwrap();

    fs::write(core.join("V1__log_table.sql"), "CREATE TABLE log (step INT);").unwrap();
    fs::write(reporting.join("V2__step_two.sql"), "INSERT INTO log VALUES (2);").unwrap();
    fs::write(core.join("V3__step_three.sql"), "INSERT INTO log VALUES (3);").unwrap();
    fs::write(reporting.join("V10__step_ten.sql"), "INSERT INTO log VALUES (10);").unwrap();

    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let m = Migrator::new(Arc::clone(&db), settings(&[&reporting, &core]));
    assert_eq!(migrate(&m).await.unwrap(), 4);

    let rows = db
        .query_rows("SELECT CAST(rowid AS VARCHAR), CAST(step AS VARCHAR) FROM log ORDER BY rowid")
        .await
        .unwrap();
    let steps: Vec<String> = rows.into_iter().filter_map(|r| r[1].clone()).collect();
    assert_eq!(steps, vec!["2", "3", "10"]);
}

#[tokio::test]
async fn test_procedure_bodies_and_quoted_delimiters_survive() {
    let project = TempDir::new().unwrap();
    let migrations = project.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("V1__macros.sql"),
        "CREATE TABLE notes (body VARCHAR);\n\
         -- the next insert carries semicolons in every quoting style\n\
         INSERT INTO notes VALUES ('a;b'), ($$c;d$$), ($tag$e;f$tag$);\n\
         CREATE MACRO add_one(x) AS x + 1;\n",
    )
    .unwrap();

    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let m = Migrator::new(Arc::clone(&db), settings(&[&migrations]));
    assert_eq!(migrate(&m).await.unwrap(), 1);

    let rows = db
        .query_rows("SELECT body FROM notes ORDER BY body")
        .await
        .unwrap();
    let bodies: Vec<String> = rows.into_iter().filter_map(|r| r[0].clone()).collect();
    assert_eq!(bodies, vec!["a;b", "c;d", "e;f"]);

    let rows = db
        .query_rows("SELECT CAST(add_one(41) AS VARCHAR)")
        .await
        .unwrap();
    assert_eq!(rows[0][0].as_deref(), Some("42"));
}

#[tokio::test]
async fn test_concurrent_runners_one_gets_the_lock() {
    let project = TempDir::new().unwrap();
    let migrations = project.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(migrations.join("V1__init.sql"), "CREATE TABLE t (id INT);").unwrap();

    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    let holder = Migrator::new(Arc::clone(&db), settings(&[&migrations]));
    let waiter = Migrator::new(Arc::clone(&db), settings(&[&migrations]));

    holder.store().ensure_table().await.unwrap();
    let lock = sl_engine::RunLock::acquire(holder.store(), Duration::ZERO)
        .await
        .unwrap();

    let err = migrate(&waiter).await.unwrap_err();
    match &err {
        MigrateError::LockUnavailable { holder: who, .. } => assert!(who.contains(lock.owner())),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 7);

    lock.release().await.unwrap();
    assert_eq!(migrate(&waiter).await.unwrap(), 1);
    let status = holder.status().await.unwrap();
    assert_eq!(status.survey.count(VersionStatus::Applied), 1);
}
