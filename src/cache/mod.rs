//! Cache orchestration
//!
//! Ties an [`Archive`] format to a [`Storage`] backend. Archives are never
//! materialized on disk: packing streams through a bounded pipe straight
//! into the storage upload, and downloads stream straight into the unpacker.
//!
//! # Operations
//!
//! | Operation | Producer | Consumer |
//! |-----------|----------|----------|
//! | rebuild | `Archive::pack` (blocking task) | `Storage::put` |
//! | restore | `Storage::get` | `Archive::unpack` (blocking task) |
//! | flush | `Storage::list` | `Storage::delete` |
//!
//! Both halves of a transfer are always awaited before an outcome is
//! reported. When both fail, the producer's error wins unless it is only a
//! broken pipe caused by the consumer giving up.

pub mod flush;
pub mod pipe;
pub mod plan;

pub use flush::{older_than, FlushReport};
pub use plan::{CacheTemplates, Plan};

use pipe::pipe;

use crate::archive::Archive;
use crate::error::{StowageError, StowageResult};
use crate::storage::{FileEntry, Storage, StorageKey};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinError;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

/// Default number of chunks buffered between packer and uploader
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

/// Default size of a pipe chunk
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// What a rebuild did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A fresh archive was stored
    Stored,
    /// The key already existed and is content-derived
    Skipped,
}

/// Which key a restore was served from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    Primary,
    Fallback,
}

/// Rebuilds, restores and flushes caches for one working directory
pub struct Cache {
    storage: Arc<dyn Storage>,
    archive: Arc<dyn Archive>,
    workdir: PathBuf,
    pipe_capacity: usize,
    chunk_size: usize,
}

impl Cache {
    /// Create a cache; mounts are packed relative to, and restored into, `workdir`
    pub fn new(
        storage: Arc<dyn Storage>,
        archive: Arc<dyn Archive>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            archive,
            workdir: workdir.into(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Override pipe sizing; peak buffered memory is `capacity * chunk_size`
    pub fn with_pipe(mut self, capacity: usize, chunk_size: usize) -> Self {
        self.pipe_capacity = capacity.max(1);
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pack `mounts` and store the archive at `key`.
    ///
    /// With `skip_if_exists`, an existing object at `key` is taken as
    /// current and nothing is packed. A failed existence check is logged
    /// and the rebuild goes ahead.
    pub async fn rebuild(
        &self,
        mounts: &[PathBuf],
        key: &str,
        skip_if_exists: bool,
    ) -> StowageResult<RebuildOutcome> {
        StorageKey::parse(key)?;

        if skip_if_exists {
            match self.storage.exists(key).await {
                Ok(true) => {
                    info!("Cache exists at {}, skipping rebuild", key);
                    return Ok(RebuildOutcome::Skipped);
                }
                Ok(false) => debug!("No cache at {}", key),
                Err(e) => warn!("Could not check for existing cache at {}: {}", key, e),
            }
        }

        info!(
            "Rebuilding cache at {} from {} mount(s) as {}",
            key,
            mounts.len(),
            self.archive.name()
        );
        let started = Instant::now();

        let (writer, reader) = pipe(self.pipe_capacity, self.chunk_size);
        let archive = Arc::clone(&self.archive);
        let root = self.workdir.clone();
        let srcs = mounts.to_vec();

        let producer = tokio::task::spawn_blocking(move || {
            let mut writer = writer;
            match archive.pack(&root, &srcs, &mut writer) {
                Ok(()) => writer
                    .close()
                    .map_err(|e| StowageError::io("closing archive stream", e)),
                Err(e) => {
                    writer.close_with_error(io::Error::new(io::ErrorKind::Other, e.to_string()));
                    Err(e)
                }
            }
        });
        let consumer = async move {
            // The reader must be gone once put returns, or a packer still
            // writing would block on a full pipe
            let mut reader = reader;
            self.storage.put(key, &mut reader).await
        };

        let (packed, stored) = tokio::join!(producer, consumer);
        settle(flatten(packed), stored)?;

        info!("Cache rebuilt at {} in {:.1?}", key, started.elapsed());
        Ok(RebuildOutcome::Stored)
    }

    /// Restore the archive at `key` into the working directory.
    ///
    /// Any failure of the primary key, including a missing object or a
    /// corrupt archive, moves on to `fallback` when one is given and differs
    /// from `key`. If the fallback fails too, its error is returned.
    pub async fn restore(
        &self,
        key: &str,
        fallback: Option<&str>,
    ) -> StowageResult<RestoreOutcome> {
        let primary_err = match self.restore_from(key).await {
            Ok(()) => return Ok(RestoreOutcome::Primary),
            Err(e) => e,
        };

        match fallback.filter(|f| !f.is_empty() && *f != key) {
            Some(fallback) => {
                warn!(
                    "Failed to restore {}: {}; trying fallback {}",
                    key, primary_err, fallback
                );
                self.restore_from(fallback).await?;
                Ok(RestoreOutcome::Fallback)
            }
            None => Err(primary_err),
        }
    }

    /// Delete entries under `prefix` selected by `is_expired`
    pub async fn flush<F>(&self, prefix: &str, is_expired: F) -> StowageResult<FlushReport>
    where
        F: Fn(&FileEntry) -> bool,
    {
        flush::flush(self.storage.as_ref(), prefix, is_expired).await
    }

    async fn restore_from(&self, key: &str) -> StowageResult<()> {
        StorageKey::parse(key)?;

        info!("Restoring cache from {}", key);
        let started = Instant::now();

        let (mut writer, reader) = tokio::io::duplex(self.chunk_size);
        let mut input = SyncIoBridge::new(reader);
        let archive = Arc::clone(&self.archive);
        let dst = self.workdir.clone();

        let consumer = tokio::task::spawn_blocking(move || archive.unpack(&dst, &mut input));
        let producer = async move {
            let fetched = self.storage.get(key, &mut writer).await;
            // EOF for the unpacker
            drop(writer);
            fetched
        };

        let (fetched, unpacked) = tokio::join!(producer, consumer);
        settle(fetched, flatten(unpacked))?;

        info!("Cache restored from {} in {:.1?}", key, started.elapsed());
        Ok(())
    }
}

fn flatten(joined: Result<StowageResult<()>, JoinError>) -> StowageResult<()> {
    joined.map_err(|e| StowageError::TaskJoin(e.to_string()))?
}

/// Combine the outcomes of both ends of a transfer
fn settle(producer: StowageResult<()>, consumer: StowageResult<()>) -> StowageResult<()> {
    match (producer, consumer) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Err(p), Err(c)) if p.is_broken_pipe() => {
            debug!("Producer stopped after consumer failed: {}", p);
            Err(c)
        }
        (Err(p), Err(c)) => {
            warn!("Consumer also failed: {}", c);
            Err(p)
        }
    }
}
