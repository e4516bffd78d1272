//! Error types for Stowage
//!
//! All modules use `StowageResult<T>` as their return type.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Stowage operations
pub type StowageResult<T> = Result<T, StowageError>;

/// A single delete that failed during a flush
#[derive(Debug)]
pub struct FlushFailure {
    /// Storage path of the entry that could not be deleted
    pub path: String,
    /// Why the delete failed
    pub reason: String,
}

impl fmt::Display for FlushFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// All errors that can occur in Stowage
#[derive(Error, Debug)]
pub enum StowageError {
    // Template errors
    #[error("Invalid cache key template {template:?}: {reason}")]
    Template { template: String, reason: String },

    #[error("Undefined template variable: .{0}")]
    UndefinedVariable(String),

    // Filesystem errors
    #[error("stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid mount {}: {reason}", .path.display())]
    InvalidMount { path: PathBuf, reason: String },

    #[error("Unsupported archive entry {}: {kind}", .path.display())]
    UnsupportedEntry { path: PathBuf, kind: String },

    // Archive errors
    #[error("{0}")]
    Decode(String),

    #[error("Unknown file format for archive {0}")]
    UnknownFormat(String),

    // Storage errors
    #[error("Invalid path {0}")]
    InvalidKey(String),

    #[error("{0} does not exist")]
    NamespaceNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Cache errors
    #[error("Flush incomplete: {}", summarize_flush(.deleted, .failed))]
    FlushIncomplete {
        deleted: Vec<String>,
        failed: Vec<FlushFailure>,
    },

    #[error("Background task failed: {0}")]
    TaskJoin(String),

    // Configuration errors
    #[error("Invalid configuration at {}: {reason}", .path.display())]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {}: {source}", .path.display())]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // IO errors
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    // Serialization errors
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

fn summarize_flush(deleted: &[String], failed: &[FlushFailure]) -> String {
    let details = failed
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!(
        "{} of {} deletes failed ({})",
        failed.len(),
        failed.len() + deleted.len(),
        details
    )
}

impl StowageError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a template error
    pub fn template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            reason: reason.into(),
        }
    }

    /// The underlying IO error kind, if this error wraps one
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Io { source, .. } | Self::Stat { source, .. } => Some(source.kind()),
            _ => None,
        }
    }

    /// Whether this error is only the echo of the other side of a pipe closing
    pub fn is_broken_pipe(&self) -> bool {
        self.io_kind() == Some(io::ErrorKind::BrokenPipe)
    }

    /// Whether this error names a missing file, object or namespace
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NamespaceNotFound(_))
            || self.io_kind() == Some(io::ErrorKind::NotFound)
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::UnknownFormat(_) => Some("Use a filename ending in .tar, .tgz or .tar.gz"),
            Self::InvalidKey(_) => Some("Cache paths look like <bucket>/<path>, e.g. cache/my-repo"),
            Self::UndefinedVariable(_) => Some("Pass the variable with --meta KEY=VALUE"),
            Self::NamespaceNotFound(_) => Some("Run a rebuild first to create the bucket"),
            _ => None,
        }
    }
}
