//! Environment configuration.
//!
//! - `REVISION_KERNEL_MIGRATIONS`: migrations folder
//! - `REVISION_KERNEL_DIR`: package directory; its `migrations` subfolder is
//!   used when `REVISION_KERNEL_MIGRATIONS` is unset

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::scripts::FsScriptStore;

/// Variable naming the migrations folder.
pub const MIGRATIONS_ENV: &str = "REVISION_KERNEL_MIGRATIONS";

/// Variable naming the package directory.
pub const PACKAGE_DIR_ENV: &str = "REVISION_KERNEL_DIR";

/// Missing or invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Neither variable is set.
    #[error("migrations folder is not defined, set {MIGRATIONS_ENV} or {PACKAGE_DIR_ENV}")]
    MigrationsFolderUndefined,

    /// The configured folder is not a directory.
    #[error("migrations folder {0:?} is not a directory")]
    NotADirectory(PathBuf),
}

/// Location of the top-level migrations folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationsConfig {
    /// Top-level migrations folder.
    pub path: PathBuf,
}

impl MigrationsConfig {
    /// Use an explicit folder.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(
            std::env::var(MIGRATIONS_ENV).ok(),
            std::env::var(PACKAGE_DIR_ENV).ok(),
        )
    }

    fn from_vars(migrations: Option<String>, package_dir: Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = migrations.filter(|p| !p.is_empty()) {
            return Ok(Self::new(path));
        }
        match package_dir.filter(|p| !p.is_empty()) {
            Some(dir) => Ok(Self::new(Path::new(&dir).join("migrations"))),
            None => Err(ConfigError::MigrationsFolderUndefined),
        }
    }

    /// Open a filesystem script store over the folder.
    ///
    /// The folder must already exist.
    pub fn script_store(&self) -> Result<FsScriptStore, ConfigError> {
        if !self.path.is_dir() {
            return Err(ConfigError::NotADirectory(self.path.clone()));
        }
        tracing::debug!(path = %self.path.display(), "Using migrations folder");
        Ok(FsScriptStore::new(&self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_order() {
        let config = MigrationsConfig::from_vars(Some("/srv/migrations".into()), Some("/pkg".into())).unwrap();
        assert_eq!(config.path, PathBuf::from("/srv/migrations"));

        let config = MigrationsConfig::from_vars(None, Some("/pkg".into())).unwrap();
        assert_eq!(config.path, PathBuf::from("/pkg/migrations"));

        let config = MigrationsConfig::from_vars(Some(String::new()), Some("/pkg".into())).unwrap();
        assert_eq!(config.path, PathBuf::from("/pkg/migrations"));

        assert_eq!(
            MigrationsConfig::from_vars(None, None),
            Err(ConfigError::MigrationsFolderUndefined)
        );
    }

    #[test]
    fn test_script_store_requires_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = MigrationsConfig::new(dir.path()).script_store().unwrap();
        assert_eq!(store.root(), dir.path());

        let missing = dir.path().join("missing");
        assert_eq!(
            MigrationsConfig::new(&missing).script_store().unwrap_err(),
            ConfigError::NotADirectory(missing)
        );
    }
}
