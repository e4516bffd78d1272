//! Local filesystem object store
//!
//! Each namespace is a directory under the storage root and each object a
//! file beneath it. Uploads land in a hidden temporary file and are renamed
//! into place only once the source has been read to a clean EOF.

use crate::error::{StowageError, StowageResult};
use crate::storage::{format_bytes, FileEntry, Storage, StorageKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Suffix of in-flight uploads; never listed
const PARTIAL_SUFFIX: &str = ".stowage-partial";

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    /// Create a store rooted at `root`. Nothing is created until the first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn namespace_dir(&self, key: &StorageKey) -> PathBuf {
        self.root.join(key.namespace())
    }

    /// Map an object key to a file, refusing keys that would leave the
    /// namespace or collide with in-flight uploads
    fn object_path(&self, key: &StorageKey) -> StowageResult<PathBuf> {
        let mut path = self.namespace_dir(key);
        let mut depth = 0;
        for component in Path::new(key.object()).components() {
            match component {
                Component::Normal(part) => {
                    path.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                _ => return Err(StowageError::InvalidKey(key.to_string())),
            }
        }
        if depth == 0 || is_partial(&path) {
            return Err(StowageError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }

    async fn namespace_exists(&self, key: &StorageKey) -> bool {
        fs::metadata(self.namespace_dir(key))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Storage for FilesystemStorage {
    async fn get(&self, key: &str, dst: &mut (dyn AsyncWrite + Unpin + Send)) -> StowageResult<()> {
        let key = StorageKey::parse(key)?;
        info!("Retrieving file in {} at {}", key.namespace(), key.object());

        if !self.namespace_exists(&key).await {
            return Err(StowageError::NamespaceNotFound(key.namespace().to_string()));
        }

        let path = self.object_path(&key)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| StowageError::io(format!("open {}", path.display()), e))?;

        let num_bytes = tokio::io::copy(&mut file, dst)
            .await
            .map_err(|e| StowageError::io(format!("downloading {}", key), e))?;
        dst.flush()
            .await
            .map_err(|e| StowageError::io(format!("downloading {}", key), e))?;

        info!("Downloaded {} from {}", format_bytes(num_bytes), self.root.display());
        Ok(())
    }

    async fn put(&self, key: &str, src: &mut (dyn AsyncRead + Unpin + Send)) -> StowageResult<()> {
        let key = StorageKey::parse(key)?;
        info!("Uploading to bucket {} at {}", key.namespace(), key.object());

        let path = self.object_path(&key)?;
        let ns_dir = self.namespace_dir(&key);

        if self.namespace_exists(&key).await {
            debug!("Bucket {} already exists", key.namespace());
        } else {
            fs::create_dir_all(&ns_dir)
                .await
                .map_err(|e| StowageError::io(format!("creating bucket {}", ns_dir.display()), e))?;
            info!("Bucket {} created", key.namespace());
        }

        let parent = path.parent().unwrap_or(&ns_dir).to_path_buf();
        fs::create_dir_all(&parent)
            .await
            .map_err(|e| StowageError::io(format!("creating {}", parent.display()), e))?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = parent.join(format!(
            ".{}.{}{}",
            file_name,
            std::process::id(),
            PARTIAL_SUFFIX
        ));

        let mut file = fs::File::create(&partial)
            .await
            .map_err(|e| StowageError::io(format!("creating {}", partial.display()), e))?;

        let copied = match tokio::io::copy(src, &mut file).await {
            Ok(n) => file.sync_all().await.map(|()| n),
            Err(e) => Err(e),
        };
        drop(file);

        let num_bytes = match copied {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(StowageError::io(format!("uploading {}", key), e));
            }
        };

        fs::rename(&partial, &path)
            .await
            .map_err(|e| StowageError::io(format!("storing {}", path.display()), e))?;

        info!("Uploaded {} to {}", format_bytes(num_bytes), self.root.display());
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StowageResult<Vec<FileEntry>> {
        let key = StorageKey::parse(prefix)?;
        info!("Retrieving objects in bucket {} at {}", key.namespace(), key.object());

        if !self.namespace_exists(&key).await {
            return Err(StowageError::NamespaceNotFound(key.namespace().to_string()));
        }

        let ns_dir = self.namespace_dir(&key);
        let walk_key = key.clone();
        let objects = tokio::task::spawn_blocking(move || collect_entries(&ns_dir, &walk_key))
            .await
            .map_err(|e| StowageError::TaskJoin(e.to_string()))??;

        info!(
            "Found {} objects in bucket {} at {}",
            objects.len(),
            key.namespace(),
            key.object()
        );
        Ok(objects)
    }

    async fn exists(&self, key: &str) -> StowageResult<bool> {
        let key = StorageKey::parse(key)?;

        if !self.namespace_exists(&key).await {
            return Ok(false);
        }

        let path = self.object_path(&key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StowageError::io(format!("stat {}", path.display()), e)),
        }
    }

    async fn delete(&self, key: &str) -> StowageResult<()> {
        let key = StorageKey::parse(key)?;
        info!("Deleting object in bucket {} at {}", key.namespace(), key.object());

        if !self.namespace_exists(&key).await {
            return Err(StowageError::NamespaceNotFound(key.namespace().to_string()));
        }

        let path = self.object_path(&key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StowageError::io(format!("remove {}", path.display()), e))
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(PARTIAL_SUFFIX))
}

/// Walk a namespace directory and collect objects under the key's prefix
fn collect_entries(ns_dir: &Path, key: &StorageKey) -> StowageResult<Vec<FileEntry>> {
    let mut objects = Vec::new();

    for entry in WalkDir::new(ns_dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            StowageError::io(format!("walking {}", ns_dir.display()), std::io::Error::from(e))
        })?;
        if !entry.file_type().is_file() || is_partial(entry.path()) {
            continue;
        }

        let rel = entry.path().strip_prefix(ns_dir).unwrap_or(entry.path());
        let object = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if !object.starts_with(key.object()) {
            continue;
        }

        let meta = entry.metadata().map_err(|e| {
            StowageError::io(format!("stat {}", entry.path().display()), std::io::Error::from(e))
        })?;
        let modified = meta
            .modified()
            .map_err(|e| StowageError::io(format!("stat {}", entry.path().display()), e))?;

        let path = format!("{}/{}", key.namespace(), object);
        let last_modified = DateTime::<Utc>::from(modified);
        debug!(
            "Found object {}: Size={} LastModified={}",
            path,
            meta.len(),
            last_modified.to_rfc3339()
        );
        objects.push(FileEntry {
            path,
            size: meta.len(),
            last_modified,
        });
    }

    Ok(objects)
}
