//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use serde::Serialize;
use sl_core::{Config, DatabaseConfig, DbType, Project};
use sl_db::{Database, DbResult, DuckDbBackend, SnowflakeBackend};
use sl_engine::{open_exclusive, MigrateError, Migrator, MigratorSettings};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and cleanup happens properly.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Intentionally empty: ExitCode is a control-flow mechanism, not a
        // user-facing error. If anyhow's Display chain ever reaches this
        // (e.g. downcast_ref fails in main.rs), we don't want "exit code N"
        // leaking into stderr.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Report a migration error on stderr and turn it into its exit status.
pub(crate) fn fail(err: &MigrateError) -> anyhow::Error {
    eprintln!("Error: {}", err);
    ExitCode(err.exit_code()).into()
}

/// Load project from the global `--project-dir` / `--config` arguments
pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    Project::load_with_config(
        Path::new(&global.project_dir),
        global.config.as_deref().map(Path::new),
    )
    .context("Failed to load project")
}

/// Open the database connection described by `db_config`.
pub(crate) fn create_database_connection(
    db_config: &DatabaseConfig,
) -> DbResult<Arc<dyn Database>> {
    let db: Arc<dyn Database> = match db_config.db_type {
        DbType::DuckDb => Arc::new(DuckDbBackend::new(&db_config.path)?),
        DbType::Snowflake => Arc::new(SnowflakeBackend::new(&db_config.path)?),
    };
    Ok(db)
}

/// Load the project, connect to its target and build a [`Migrator`].
///
/// A target file held by another process is waited on for the configured
/// lock timeout. Returns the resolved target name alongside, for reporting.
pub(crate) async fn build_migrator(global: &GlobalArgs) -> Result<(Project, Migrator, String)> {
    let project = load_project(global)?;
    let target = Config::resolve_target(global.target.as_deref());
    let settings = MigratorSettings::from_project(&project, target.as_deref())
        .map_err(|e| fail(&e))?;
    let db_config = project
        .config
        .get_database_config(target.as_deref())
        .context("Failed to get database configuration")?;
    let db = open_exclusive(&db_config.path, settings.lock_timeout, || {
        create_database_connection(&db_config)
    })
    .await
    .map_err(|e| fail(&e))?;
    let target_name = target.unwrap_or_else(|| "default".to_string());
    Ok((project, Migrator::new(db, settings), target_name))
}

/// Serialize `data` as pretty-printed JSON and write it to `path`.
///
/// Creates any missing parent directories before writing.
pub(crate) fn write_json_results<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create target directory")?;
    }
    let json = serde_json::to_string_pretty(data).context("Failed to serialize results")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Calculate column widths for a table given headers and row data.
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a left-aligned table to stdout, columns separated by two spaces.
///
/// ```ignore
/// print_table(
///     &["VERSION", "STATUS"],
///     &[vec!["3".into(), "applied".into()]],
/// );
/// // VERSION  STATUS
/// // -------  -------
/// // 3        applied
/// ```
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}
