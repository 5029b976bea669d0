//! Error types for sl-core

use thiserror::Error;

/// Core error type for Sluice
#[derive(Error, Debug)]
pub enum CoreError {
    /// E001: Configuration file not found
    #[error("[E001] Config file not found: {path}")]
    ConfigNotFound { path: String },

    /// E002: Invalid configuration value
    #[error("[E002] Invalid config: {message}")]
    ConfigInvalid { message: String },

    /// E003: Project directory not found
    #[error("[E003] Project directory not found: {path}")]
    ProjectNotFound { path: String },

    /// E004: Unknown history action stored in the history table
    #[error("[E004] Unknown history action '{action}'")]
    UnknownAction { action: String },

    /// E005: Invalid version identifier
    #[error("[E005] Invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    /// E006: IO error
    #[error("[E006] IO error: {0}")]
    Io(#[from] std::io::Error),

    /// E007: IO error with file path context
    #[error("[E007] Failed to read '{path}': {source}")]
    IoWithPath {
        path: String,
        source: std::io::Error,
    },

    /// E008: YAML parse error
    #[error("[E008] Config parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;
