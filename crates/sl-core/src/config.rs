//! Configuration types and parsing for sluice.yml

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Main project configuration from sluice.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project name
    pub name: String,

    /// Directories containing versioned migration scripts
    #[serde(default = "default_migration_paths")]
    pub migration_paths: Vec<String>,

    /// Glob patterns (relative to the project root) for `.sql` files that are
    /// deliberately not migrations and must not be rejected as malformed
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Output directory for run reports
    #[serde(default = "default_target_path")]
    pub target_path: String,

    /// SQL dialect used for statement splitting and linting
    #[serde(default)]
    pub dialect: Dialect,

    /// Database connection configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Named target configurations (e.g., dev, staging, prod)
    #[serde(default)]
    pub targets: HashMap<String, TargetConfig>,

    /// Where the history table lives
    #[serde(default)]
    pub history: HistoryConfig,

    /// Whether scripts run inside a transaction
    #[serde(default)]
    pub transactional: TransactionMode,

    /// How long to wait for the run lock before giving up
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Reject version sets with holes (V1, V2, V4)
    #[serde(default)]
    pub require_contiguous: bool,

    /// Allow pending versions lower than the highest applied version
    #[serde(default)]
    pub allow_out_of_order: bool,

    /// What to do when an applied script no longer matches its checksum
    #[serde(default)]
    pub on_checksum_mismatch: DriftPolicy,
}

/// Target-specific configuration overrides
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TargetConfig {
    /// Database configuration override
    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    /// History table override
    #[serde(default)]
    pub history: Option<HistoryConfig>,
}

/// Database type selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// DuckDB (default)
    #[default]
    DuckDb,
    /// Snowflake
    Snowflake,
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::DuckDb => write!(f, "duckdb"),
            DbType::Snowflake => write!(f, "snowflake"),
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database type (duckdb or snowflake)
    #[serde(rename = "type", default)]
    pub db_type: DbType,

    /// Database path (for DuckDB file-based or :memory:)
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DbType::default(),
            path: default_db_path(),
        }
    }
}

/// Location of the history table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Schema holding the history table (database default when unset)
    #[serde(default)]
    pub schema: Option<String>,

    /// History table name
    #[serde(default = "default_history_table")]
    pub table: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            schema: None,
            table: default_history_table(),
        }
    }
}

/// SQL dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// DuckDB SQL dialect
    #[default]
    DuckDb,
    /// Snowflake SQL dialect
    Snowflake,
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dialect::DuckDb => write!(f, "duckdb"),
            Dialect::Snowflake => write!(f, "snowflake"),
        }
    }
}

/// Transaction handling for migration scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionMode {
    /// Use a transaction when the backend supports transactional DDL (default)
    #[default]
    Auto,
    /// Always wrap each script in a transaction
    Always,
    /// Never use transactions; guard scripts with in-flight markers instead
    Never,
}

impl TransactionMode {
    /// Resolve the mode against what the backend reports
    pub fn resolve(self, backend_supports_ddl_tx: bool) -> bool {
        match self {
            TransactionMode::Auto => backend_supports_ddl_tx,
            TransactionMode::Always => true,
            TransactionMode::Never => false,
        }
    }
}

impl std::fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionMode::Auto => write!(f, "auto"),
            TransactionMode::Always => write!(f, "always"),
            TransactionMode::Never => write!(f, "never"),
        }
    }
}

/// Policy for checksum drift on applied migrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DriftPolicy {
    /// Drift is fatal (default)
    #[default]
    Fail,
    /// Drift is logged and otherwise ignored
    Warn,
}

fn default_migration_paths() -> Vec<String> {
    vec!["migrations".to_string()]
}

fn default_target_path() -> String {
    "target".to_string()
}

fn default_history_table() -> String {
    "sluice_schema_history".to_string()
}

fn default_lock_timeout_secs() -> u64 {
    30
}

const DEFAULT_DB_PATH: &str = ":memory:";

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

/// Returns true for a plain SQL identifier (letters, digits, underscore; no leading digit).
fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Err(CoreError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a project directory
    /// Looks for sluice.yml or sluice.yaml
    pub fn load_from_dir(dir: &Path) -> CoreResult<Self> {
        let yml_path = dir.join("sluice.yml");
        let yaml_path = dir.join("sluice.yaml");

        if yml_path.exists() {
            Self::load(&yml_path)
        } else if yaml_path.exists() {
            Self::load(&yaml_path)
        } else {
            Err(CoreError::ConfigNotFound {
                path: yml_path.display().to_string(),
            })
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "Project name cannot be empty".to_string(),
            });
        }

        if self.migration_paths.is_empty() {
            return Err(CoreError::ConfigInvalid {
                message: "At least one migration_paths entry must be specified".to_string(),
            });
        }

        let histories = std::iter::once(&self.history)
            .chain(self.targets.values().filter_map(|t| t.history.as_ref()));
        for history in histories {
            Self::validate_history(history)?;
        }

        for pattern in &self.exclude {
            glob::Pattern::new(pattern).map_err(|e| CoreError::ConfigInvalid {
                message: format!("Invalid exclude pattern '{}': {}", pattern, e),
            })?;
        }

        Ok(())
    }

    fn validate_history(history: &HistoryConfig) -> CoreResult<()> {
        if !is_plain_identifier(&history.table) {
            return Err(CoreError::ConfigInvalid {
                message: format!(
                    "history.table '{}' must be a plain identifier (letters, digits, underscore)",
                    history.table
                ),
            });
        }
        if let Some(schema) = &history.schema {
            if !is_plain_identifier(schema) {
                return Err(CoreError::ConfigInvalid {
                    message: format!("history.schema '{}' must be a plain identifier", schema),
                });
            }
        }
        Ok(())
    }

    /// Resolve relative path strings to absolute paths against a root directory
    fn paths_absolute(paths: &[String], root: &Path) -> Vec<PathBuf> {
        paths.iter().map(|p| root.join(p)).collect()
    }

    /// Get absolute migration paths relative to a project root
    pub fn migration_paths_absolute(&self, root: &Path) -> Vec<PathBuf> {
        Self::paths_absolute(&self.migration_paths, root)
    }

    /// Get absolute target path relative to a project root
    pub fn target_path_absolute(&self, root: &Path) -> PathBuf {
        root.join(&self.target_path)
    }

    /// Compile the exclude globs, anchored at the project root
    pub fn exclude_patterns(&self, root: &Path) -> CoreResult<Vec<glob::Pattern>> {
        self.exclude
            .iter()
            .map(|p| {
                let anchored = root.join(p);
                glob::Pattern::new(&anchored.to_string_lossy()).map_err(|e| {
                    CoreError::ConfigInvalid {
                        message: format!("Invalid exclude pattern '{}': {}", p, e),
                    }
                })
            })
            .collect()
    }

    /// Get target configuration by name
    pub fn get_target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.get(name)
    }

    fn require_target(&self, name: &str) -> CoreResult<&TargetConfig> {
        self.targets
            .get(name)
            .ok_or_else(|| CoreError::ConfigInvalid {
                message: format!(
                    "Target '{}' not found. Available targets: {}",
                    name,
                    self.available_targets().join(", ")
                ),
            })
    }

    /// Get the list of available target names, sorted
    pub fn available_targets(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Get database configuration, optionally applying target overrides
    ///
    /// If target is specified and exists, uses target's database config.
    /// Otherwise, uses the base database config.
    pub fn get_database_config(&self, target: Option<&str>) -> CoreResult<DatabaseConfig> {
        match target {
            Some(name) => Ok(self
                .require_target(name)?
                .database
                .clone()
                .unwrap_or_else(|| self.database.clone())),
            None => Ok(self.database.clone()),
        }
    }

    /// Get history table configuration, optionally applying target overrides
    pub fn get_history_config(&self, target: Option<&str>) -> CoreResult<HistoryConfig> {
        match target {
            Some(name) => Ok(self
                .require_target(name)?
                .history
                .clone()
                .unwrap_or_else(|| self.history.clone())),
            None => Ok(self.history.clone()),
        }
    }

    /// Resolve target from CLI flag or SLUICE_TARGET environment variable
    ///
    /// Priority: CLI flag > SLUICE_TARGET env var > None
    pub fn resolve_target(cli_target: Option<&str>) -> Option<String> {
        cli_target
            .map(String::from)
            .or_else(|| std::env::var("SLUICE_TARGET").ok())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
