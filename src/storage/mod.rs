//! Object storage abstraction
//!
//! Provides a trait for the object stores caches are kept in. Paths are
//! `<namespace>/<object>`: the namespace is a bucket for S3-style stores, a
//! directory for [`FilesystemStorage`].

mod filesystem;

pub use filesystem::FilesystemStorage;

use crate::config::StorageConfig;
use crate::error::{StowageError, StowageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

/// A single stored cache object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Full storage path, `<namespace>/<object>`
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// Last modification time
    pub last_modified: DateTime<Utc>,
}

/// A storage path split into namespace and object key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    namespace: String,
    object: String,
}

impl StorageKey {
    /// Split `path` on its first `/` after an optional leading slash.
    ///
    /// Both halves must be non-empty. Namespaces are case-insensitive and
    /// normalized to lower case; object keys are kept verbatim.
    pub fn parse(path: &str) -> StowageResult<Self> {
        let full = path.strip_prefix('/').unwrap_or(path);

        match full.split_once('/') {
            Some((namespace, object)) if !namespace.is_empty() && !object.is_empty() => Ok(Self {
                namespace: namespace.to_lowercase(),
                object: object.to_string(),
            }),
            _ => Err(StowageError::InvalidKey(path.to_string())),
        }
    }

    /// Bucket or directory name
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Key of the object inside the namespace
    pub fn object(&self) -> &str {
        &self.object
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.object)
    }
}

/// Abstract object storage interface
///
/// Backends may create namespaces lazily on `put`. `list` ordering is
/// unspecified.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stream the object at `key` into `dst`
    async fn get(&self, key: &str, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> StowageResult<()>;

    /// Store everything read from `src` until EOF at `key`
    async fn put(&self, key: &str, src: &mut (dyn AsyncRead + Unpin + Send)) -> StowageResult<()>;

    /// All objects whose path starts with `prefix`
    async fn list(&self, prefix: &str) -> StowageResult<Vec<FileEntry>>;

    /// Whether an object exists at `key`
    async fn exists(&self, key: &str) -> StowageResult<bool>;

    /// Remove the object at `key`
    async fn delete(&self, key: &str) -> StowageResult<()>;

    /// Get the human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Create the storage backend described by `config`
pub fn create_storage(config: &StorageConfig) -> Arc<dyn Storage> {
    let root = config.resolved_root();
    debug!("Using filesystem storage at {}", root.display());
    Arc::new(FilesystemStorage::new(root))
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
