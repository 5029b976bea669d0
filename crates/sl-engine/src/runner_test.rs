use super::*;
use sl_db::DuckDbBackend;
use sl_sql::DuckDbDialect;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn settings(dir: &Path, mode: TransactionMode) -> MigratorSettings {
    MigratorSettings {
        migration_paths: vec![dir.to_path_buf()],
        exclude: Vec::new(),
        dialect: Box::new(DuckDbDialect::new()),
        history: HistoryConfig::default(),
        transactional: mode,
        lock_timeout: Duration::ZERO,
        plan: PlanOptions::default(),
    }
}

fn migrator(dir: &Path, mode: TransactionMode) -> Migrator {
    let db: Arc<dyn Database> = Arc::new(DuckDbBackend::in_memory().unwrap());
    Migrator::new(db, settings(dir, mode))
}

fn write(dir: &Path, name: &str, sql: &str) {
    fs::write(dir.join(name), sql).unwrap();
}

fn basic_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__create_users.sql", "CREATE TABLE users (id INT);");
    write(tmp.path(), "V2__create_orders.sql", "CREATE TABLE orders (id INT, user_id INT);");
    write(tmp.path(), "V3__seed_users.sql", "INSERT INTO users VALUES (1);\nINSERT INTO users VALUES (2);");
    tmp
}

async fn run(m: &Migrator, options: &MigrateOptions) -> (MigrateResult<usize>, RunReport) {
    let mut report = RunReport::new("duckdb", options.dry_run);
    let result = m.migrate(options, &mut report).await;
    (result, report)
}

#[tokio::test]
async fn test_migrate_twice_applies_nothing_the_second_time() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);

    let (first, report) = run(&m, &MigrateOptions::default()).await;
    assert_eq!(first.unwrap(), 3);
    assert_eq!(report.applied, 3);
    assert!(report.error.is_none());

    let (second, report) = run(&m, &MigrateOptions::default()).await;
    assert_eq!(second.unwrap(), 0);
    assert_eq!(report.planned, 0);

    let rows = m
        .store()
        .database()
        .query_rows("SELECT CAST(COUNT(*) AS VARCHAR) FROM users")
        .await
        .unwrap();
    assert_eq!(rows[0][0].as_deref(), Some("2"));
}

#[tokio::test]
async fn test_dry_run_executes_nothing() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    let options = MigrateOptions {
        dry_run: true,
        ..MigrateOptions::default()
    };

    let (result, report) = run(&m, &options).await;
    assert_eq!(result.unwrap(), 0);
    assert_eq!(report.planned, 3);
    assert!(report
        .scripts
        .iter()
        .all(|s| s.status == ScriptStatus::Planned));
    assert!(!m.store().database().relation_exists("users").await.unwrap());
    assert!(m.store().history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_target_version_stops_early() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    let options = MigrateOptions {
        target_version: Some(Version::new(2)),
        ..MigrateOptions::default()
    };

    assert_eq!(run(&m, &options).await.0.unwrap(), 2);
    assert_eq!(run(&m, &MigrateOptions::default()).await.0.unwrap(), 1);
}

#[tokio::test]
async fn test_transactional_failure_then_previous_failure() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__ok.sql", "CREATE TABLE ok_t (id INT);");
    write(
        tmp.path(),
        "V2__broken.sql",
        "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\nINSERT INTO nope VALUES (1);\n",
    );
    write(tmp.path(), "V3__later.sql", "CREATE TABLE later (id INT);");
    let m = migrator(tmp.path(), TransactionMode::Auto);

    let (result, report) = run(&m, &MigrateOptions::default()).await;
    let err = result.unwrap_err();
    assert_eq!(err.code(), "G007");
    assert_eq!(err.exit_code(), 8);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.error.as_ref().unwrap().code, "G007");

    let db = m.store().database();
    assert!(db.relation_exists("ok_t").await.unwrap());
    assert!(!db.relation_exists("a").await.unwrap());
    assert!(!db.relation_exists("later").await.unwrap());

    let (again, _) = run(&m, &MigrateOptions::default()).await;
    assert!(matches!(again.unwrap_err(), MigrateError::PreviousFailure { .. }));
}

#[tokio::test]
async fn test_non_transactional_failure_needs_repair() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "V1__partial.sql",
        "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\nINSERT INTO nope VALUES (1);\n",
    );
    let m = migrator(tmp.path(), TransactionMode::Never);
    assert!(!m.transactional());

    run(&m, &MigrateOptions::default()).await.0.unwrap_err();
    assert!(m.store().database().relation_exists("a").await.unwrap());

    let (again, _) = run(&m, &MigrateOptions::default()).await;
    assert!(matches!(
        again.unwrap_err(),
        MigrateError::UnrecordedApplication { .. }
    ));

    // Operator cleans up by hand, fixes the script and resets the version
    m.store()
        .database()
        .execute_batch("DROP TABLE a; DROP TABLE b;")
        .await
        .unwrap();
    write(
        tmp.path(),
        "V1__partial.sql",
        "CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);\n",
    );
    let outcome = m
        .repair(RepairAction::Reset(Version::new(1)), false)
        .await
        .unwrap();
    assert_eq!(outcome.record.unwrap().action, RecordAction::Reset);
    assert!(m.store().in_flight().await.unwrap().is_empty());

    assert_eq!(run(&m, &MigrateOptions::default()).await.0.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_version_applies_nothing() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V003__a.sql", "CREATE TABLE a (id INT);");
    write(tmp.path(), "V3__b.sql", "CREATE TABLE b (id INT);");
    let m = migrator(tmp.path(), TransactionMode::Auto);

    let (result, _) = run(&m, &MigrateOptions::default()).await;
    assert_eq!(result.unwrap_err().exit_code(), 4);
    assert!(m.store().history().await.unwrap().is_empty());
    assert!(!m.store().database().relation_exists("a").await.unwrap());
}

#[tokio::test]
async fn test_edited_script_is_drift_until_realigned() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    run(&m, &MigrateOptions::default()).await.0.unwrap();

    write(tmp.path(), "V2__create_orders.sql", "CREATE TABLE orders (id BIGINT);");

    let status = m.status().await.unwrap();
    assert_eq!(status.survey.count(planner::VersionStatus::Drifted), 1);
    assert_eq!(status.survey.issues[0].code(), "G005");

    let (result, _) = run(&m, &MigrateOptions::default()).await;
    assert!(matches!(
        result.unwrap_err(),
        MigrateError::ChecksumMismatch { .. }
    ));

    m.repair(RepairAction::Realign(Version::new(2)), false)
        .await
        .unwrap();
    assert!(m.status().await.unwrap().survey.issues.is_empty());
    assert_eq!(run(&m, &MigrateOptions::default()).await.0.unwrap(), 0);
}

#[tokio::test]
async fn test_held_lock_is_reported() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    m.store().ensure_table().await.unwrap();
    let other = RunLock::acquire(m.store(), Duration::ZERO).await.unwrap();

    let (result, _) = run(&m, &MigrateOptions::default()).await;
    assert!(matches!(
        result.unwrap_err(),
        MigrateError::LockUnavailable { .. }
    ));
    assert!(m.store().history().await.unwrap().is_empty());

    other.release().await.unwrap();
    assert_eq!(run(&m, &MigrateOptions::default()).await.0.unwrap(), 3);
}

#[tokio::test]
async fn test_lock_is_released_after_failure() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__broken.sql", "INSERT INTO nope VALUES (1);");
    let m = migrator(tmp.path(), TransactionMode::Auto);

    run(&m, &MigrateOptions::default()).await.0.unwrap_err();
    assert!(RunLock::holder(m.store()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancellation_between_scripts() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    m.cancellation_token().cancel();

    let (result, report) = run(&m, &MigrateOptions::default()).await;
    assert!(matches!(
        result.unwrap_err(),
        MigrateError::Cancelled { applied: 0 }
    ));
    assert_eq!(report.skipped, 3);
    assert!(m.store().history().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_status_before_first_run() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);

    let status = m.status().await.unwrap();
    assert!(status.transactional);
    assert_eq!(status.survey.count(planner::VersionStatus::Pending), 3);
    assert_eq!(status.survey.current_version(), None);
    // status is read-only
    assert!(!m.store().exists().await.unwrap());
}

#[tokio::test]
async fn test_repair_release_lock() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);

    let outcome = m.repair(RepairAction::ReleaseLock, false).await.unwrap();
    assert_eq!(outcome.summary, "No migration lock is held");

    m.store().ensure_table().await.unwrap();
    let stale = RunLock::acquire(m.store(), Duration::ZERO).await.unwrap();
    let owner = stale.owner().to_string();
    drop(stale);

    let preview = m.repair(RepairAction::ReleaseLock, true).await.unwrap();
    assert!(preview.summary.starts_with("Would release"));
    assert!(RunLock::holder(m.store()).await.unwrap().is_some());

    let outcome = m.repair(RepairAction::ReleaseLock, false).await.unwrap();
    assert!(outcome.summary.contains(&owner));
    assert!(RunLock::holder(m.store()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_repair_rejects_invalid_requests() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    run(&m, &MigrateOptions {
        target_version: Some(Version::new(2)),
        ..MigrateOptions::default()
    })
    .await
    .0
    .unwrap();

    for action in [
        RepairAction::Reset(Version::new(1)),
        RepairAction::Realign(Version::new(1)),
        RepairAction::Realign(Version::new(3)),
        RepairAction::Reset(Version::new(3)),
        RepairAction::Realign(Version::new(9)),
    ] {
        let err = m.repair(action, false).await.unwrap_err();
        assert!(
            matches!(err, MigrateError::InvalidRepair { .. }),
            "{action:?}: {err}"
        );
    }
    assert!(RunLock::holder(m.store()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_repair_dry_run_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "V1__broken.sql", "INSERT INTO nope VALUES (1);");
    let m = migrator(tmp.path(), TransactionMode::Auto);
    run(&m, &MigrateOptions::default()).await.0.unwrap_err();

    let outcome = m
        .repair(RepairAction::Reset(Version::new(1)), true)
        .await
        .unwrap();
    assert!(outcome.dry_run);
    assert!(outcome.summary.starts_with("Would record reset"));
    assert_eq!(m.store().history().await.unwrap().len(), 1);
}

#[test]
fn test_settings_from_project() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("sluice.yml"),
        "name: wh\nmigration_paths: [db/migrations]\nexclude: [\"db/migrations/adhoc/**\"]\nlock_timeout_secs: 5\ntransactional: never\nrequire_contiguous: true\n",
    )
    .unwrap();
    let project = Project::load(tmp.path()).unwrap();

    let settings = MigratorSettings::from_project(&project, None).unwrap();
    assert_eq!(settings.migration_paths, vec![tmp.path().join("db/migrations")]);
    assert_eq!(settings.exclude.len(), 1);
    assert_eq!(settings.lock_timeout, Duration::from_secs(5));
    assert_eq!(settings.transactional, TransactionMode::Never);
    assert!(settings.plan.require_contiguous);
    assert_eq!(settings.dialect.name(), "duckdb");
    assert_eq!(settings.history.table, "sluice_schema_history");
}

#[tokio::test]
async fn test_status_names_backend_and_dialect() {
    let tmp = basic_project();
    let m = migrator(tmp.path(), TransactionMode::Auto);
    let status = m.status().await.unwrap();
    assert_eq!(status.backend, "duckdb");
    assert_eq!(status.dialect, "duckdb");
}
