//! Project loading: resolves the project root and its configuration.

use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};

/// A loaded Sluice project
#[derive(Debug, Clone)]
pub struct Project {
    /// Project root directory
    pub root: PathBuf,

    /// Parsed project configuration
    pub config: Config,
}

impl Project {
    /// Load a project from a directory containing `sluice.yml`
    pub fn load(path: &Path) -> CoreResult<Self> {
        Self::load_with_config(path, None)
    }

    /// Load a project, optionally reading the configuration from an explicit file
    pub fn load_with_config(path: &Path, config_path: Option<&Path>) -> CoreResult<Self> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !root.is_dir() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let config = match config_path {
            Some(p) => Config::load(p)?,
            None => Config::load_from_dir(&root)?,
        };

        Ok(Self { root, config })
    }

    /// Get the target directory path (run reports)
    pub fn target_dir(&self) -> PathBuf {
        self.config.target_path_absolute(&self.root)
    }

    /// Get the absolute migration directories
    pub fn migration_dirs(&self) -> Vec<PathBuf> {
        self.config.migration_paths_absolute(&self.root)
    }
}
