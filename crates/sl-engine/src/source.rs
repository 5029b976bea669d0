//! Migration discovery.
//!
//! Walks the configured migration directories, validates file names, reads
//! each script and splits it into statements. The result is sorted by
//! `(version, path)` so enumeration order never leaks into a plan.

use crate::error::{MigrateError, MigrateResult};
use sl_core::{compute_script_checksum, CoreError, MigrationFileName, Version};
use sl_sql::{split_statements, SqlDialect, SqlStatement};
use std::path::{Path, PathBuf};

/// A discovered migration script, ready to plan and execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Version parsed from the file name
    pub version: Version,
    /// Human-readable label from the file name
    pub description: String,
    /// File name, as recorded in the history table
    pub script: String,
    /// Full path of the file
    pub path: PathBuf,
    /// SHA-256 of the content (CRLF normalised)
    pub checksum: String,
    /// Statements in execution order
    pub statements: Vec<SqlStatement>,
}

/// Discover every migration under `roots`.
///
/// Non-`.sql` files and hidden entries are ignored. Paths matching one of the
/// `exclude` patterns are skipped, directories included. Any other `.sql`
/// file must follow the naming convention. A root that does not exist is
/// skipped with a warning.
pub fn discover(
    roots: &[PathBuf],
    dialect: &dyn SqlDialect,
    exclude: &[glob::Pattern],
) -> MigrateResult<Vec<MigrationScript>> {
    let mut files = Vec::new();
    for root in roots {
        if !root.is_dir() {
            log::warn!("Migration directory {} does not exist", root.display());
            continue;
        }
        collect_sql_files(root, exclude, &mut files)?;
    }

    let mut scripts = files
        .iter()
        .map(|path| load_script(path, dialect))
        .collect::<MigrateResult<Vec<_>>>()?;
    scripts.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.path.cmp(&b.path)));

    log::debug!("Discovered {} migration script(s)", scripts.len());
    Ok(scripts)
}

/// Read and split one migration file
pub fn load_script(path: &Path, dialect: &dyn SqlDialect) -> MigrateResult<MigrationScript> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| MigrateError::MalformedName {
            path: path.to_path_buf(),
            reason: "file name is not valid UTF-8".to_string(),
        })?;

    let parsed = MigrationFileName::parse(file_name).map_err(|reason| MigrateError::MalformedName {
        path: path.to_path_buf(),
        reason,
    })?;

    let bytes = std::fs::read(path).map_err(|e| CoreError::IoWithPath {
        path: path.display().to_string(),
        source: e,
    })?;
    let content = String::from_utf8(bytes).map_err(|e| MigrateError::MalformedScript {
        path: path.to_path_buf(),
        message: format!("not valid UTF-8 (byte {})", e.utf8_error().valid_up_to()),
    })?;

    let statements =
        split_statements(&content, dialect).map_err(|e| MigrateError::MalformedScript {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if statements.is_empty() {
        log::warn!("{} contains no statements", path.display());
    }

    Ok(MigrationScript {
        version: parsed.version,
        description: parsed.description,
        script: file_name.to_string(),
        path: path.to_path_buf(),
        checksum: compute_script_checksum(&content),
        statements,
    })
}

fn collect_sql_files(
    dir: &Path,
    exclude: &[glob::Pattern],
    files: &mut Vec<PathBuf>,
) -> MigrateResult<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();

        if entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with('.'))
        {
            continue;
        }
        if exclude.iter().any(|p| p.matches_path(&path)) {
            log::debug!("Excluded {}", path.display());
            continue;
        }

        if path.is_dir() {
            collect_sql_files(&path, exclude, files)?;
        } else if path.extension().is_some_and(|e| e == "sql") {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
