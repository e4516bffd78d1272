//! Configuration management for Stowage

pub mod schema;

pub use schema::{CacheConfig, Config, StorageConfig};

use crate::error::{StowageError, StowageResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Name of the configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "stowage.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for `stowage.toml` in `workdir`
    pub fn new(workdir: &Path) -> Self {
        Self {
            config_path: workdir.join(CONFIG_FILE_NAME),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> StowageResult<Config> {
        if !fs::try_exists(&self.config_path).await.unwrap_or(false) {
            debug!(
                "Config file {} not found, using defaults",
                self.config_path.display()
            );
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> StowageResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StowageError::io(format!("reading config from {}", path.display()), e))?;

        let invalid = |reason: String| StowageError::ConfigInvalid {
            path: path.to_path_buf(),
            reason,
        };

        let config: Config = toml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        config.validate().map_err(invalid)?;

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> StowageResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            StowageError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    async fn ensure_config_dir(&self) -> StowageResult<()> {
        if let Some(parent) = self.config_path.parent() {
            if parent.as_os_str().is_empty() {
                return Ok(());
            }
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StowageError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp.path());

        assert_eq!(manager.path(), temp.path().join("stowage.toml"));
        let config = manager.load().await.unwrap();
        assert_eq!(config, Config::default());
    }

    #[tokio::test]
    async fn save_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/stowage.toml");
        let manager = ConfigManager::with_path(path);

        let mut config = Config::default();
        config.cache.filename = "deps.tgz".to_string();
        config.storage.root = Some(temp.path().join("store"));

        manager.save(&config).await.unwrap();
        let loaded = manager.load().await.unwrap();

        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn invalid_file_names_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stowage.toml");
        std::fs::write(&path, "[cache]\npipe_capacity = 0\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, StowageError::ConfigInvalid { .. }));
        assert!(err.to_string().contains("pipe_capacity"));
    }

    #[tokio::test]
    async fn malformed_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("stowage.toml");
        std::fs::write(&path, "[cache\n").unwrap();

        let err = ConfigManager::with_path(path).load().await.unwrap_err();
        assert!(matches!(err, StowageError::ConfigInvalid { .. }));
    }
}
