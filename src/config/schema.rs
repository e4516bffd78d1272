//! Configuration schema for Stowage
//!
//! Configuration is read from `stowage.toml` in the working directory.
//! Every key is optional; command-line flags take precedence.

use crate::cache::{DEFAULT_CHUNK_SIZE, DEFAULT_PIPE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage backend settings
    pub storage: StorageConfig,

    /// Cache settings
    pub cache: CacheConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per namespace.
    /// Defaults to `<user cache dir>/stowage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured root, or the per-user default
    pub fn resolved_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(Self::default_root)
    }

    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stowage")
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Archive file name template used when `--filename` is not given
    pub filename: String,

    /// Entries older than this many days are removed by `flush`
    pub flush_age_days: u32,

    /// Chunks buffered between archiver and storage
    pub pipe_capacity: usize,

    /// Bytes per chunk
    pub chunk_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            filename: "archive.tar".to_string(),
            flush_age_days: 30,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Check values serde cannot; returns a description of the first problem
    pub fn validate(&self) -> Result<(), String> {
        if self.cache.filename.trim().is_empty() {
            return Err("cache.filename must not be empty".to_string());
        }
        if self.cache.pipe_capacity == 0 {
            return Err("cache.pipe_capacity must be at least 1".to_string());
        }
        if self.cache.chunk_size == 0 {
            return Err("cache.chunk_size must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.cache.filename, "archive.tar");
        assert_eq!(config.cache.flush_age_days, 30);
        assert_eq!(config.cache.pipe_capacity, 16);
        assert_eq!(config.cache.chunk_size, 64 * 1024);
        assert!(config.storage.root.is_none());
        assert!(config.storage.resolved_root().ends_with("stowage"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            filename = "deps.tgz"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.filename, "deps.tgz");
        assert_eq!(config.cache.flush_age_days, 30);
    }

    #[test]
    fn storage_root_override() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            root = "/var/cache/ci"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.resolved_root(), PathBuf::from("/var/cache/ci"));
    }

    #[test]
    fn validate_rejects_zero_sizes() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.cache.chunk_size = 0;
        assert!(config.validate().unwrap_err().contains("chunk_size"));

        config = Config::default();
        config.cache.filename = " ".to_string();
        assert!(config.validate().is_err());
    }
}
