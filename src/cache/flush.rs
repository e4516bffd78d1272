//! Expiry-based cleanup of stored caches

use crate::error::{FlushFailure, StowageError, StowageResult};
use crate::storage::{format_bytes, FileEntry, Storage, StorageKey};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

/// Result of a flush in which every selected delete succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Number of entries listed under the prefix
    pub examined: usize,
    /// Paths that were deleted
    pub deleted: Vec<String>,
    /// Total size of the deleted entries
    pub freed_bytes: u64,
}

/// Predicate selecting entries last modified more than `days` before `now`.
///
/// An age reaching past the earliest representable time selects nothing.
pub fn older_than(days: u32, now: DateTime<Utc>) -> impl Fn(&FileEntry) -> bool + Send + Sync {
    let cutoff = Duration::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    move |entry| entry.last_modified < cutoff
}

/// Delete every entry under `prefix` selected by `is_expired`.
///
/// Individual delete failures do not stop the flush; once all candidates
/// have been tried they are reported together as
/// [`StowageError::FlushIncomplete`].
pub async fn flush<F>(storage: &dyn Storage, prefix: &str, is_expired: F) -> StowageResult<FlushReport>
where
    F: Fn(&FileEntry) -> bool,
{
    StorageKey::parse(prefix)?;

    info!("Cleaning files from {}", prefix);
    let entries = storage.list(prefix).await?;
    debug!("Found {} entries under {}", entries.len(), prefix);

    let mut report = FlushReport {
        examined: entries.len(),
        ..Default::default()
    };
    let mut failed = Vec::new();

    for entry in entries.iter().filter(|e| is_expired(e)) {
        match storage.delete(&entry.path).await {
            Ok(()) => {
                info!(
                    "Deleted {} ({}, last modified {})",
                    entry.path,
                    format_bytes(entry.size),
                    entry.last_modified.format("%Y-%m-%d")
                );
                report.deleted.push(entry.path.clone());
                report.freed_bytes += entry.size;
            }
            Err(e) => {
                warn!("Failed to delete {}: {}", entry.path, e);
                failed.push(FlushFailure {
                    path: entry.path.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if !failed.is_empty() {
        return Err(StowageError::FlushIncomplete {
            deleted: report.deleted,
            failed,
        });
    }

    Ok(report)
}
