//! Built-in template functions
//!
//! Each function is a fixed, named entry in [`FUNCTIONS`]:
//!
//! - `checksum(path)` reads the file (side effect: file I/O). Failures degrade
//!   to an empty string and a warning, they never abort the render.
//! - `epoch()` reads the wall clock.
//! - `arch()` and `os()` are constants of the build target.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Functions callable from a cache key template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFunction {
    /// Content hash of a file
    Checksum,
    /// Current Unix timestamp in seconds
    Epoch,
    /// Target architecture
    Arch,
    /// Target operating system
    Os,
}

/// Lookup table from template name to function
const FUNCTIONS: &[(&str, TemplateFunction)] = &[
    ("checksum", TemplateFunction::Checksum),
    ("epoch", TemplateFunction::Epoch),
    ("arch", TemplateFunction::Arch),
    ("os", TemplateFunction::Os),
];

impl TemplateFunction {
    /// Find a function by its template name
    pub fn lookup(name: &str) -> Option<Self> {
        FUNCTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
    }

    /// Name used in templates
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checksum => "checksum",
            Self::Epoch => "epoch",
            Self::Arch => "arch",
            Self::Os => "os",
        }
    }

    /// Number of string arguments the function takes
    pub fn arity(&self) -> usize {
        match self {
            Self::Checksum => 1,
            Self::Epoch | Self::Arch | Self::Os => 0,
        }
    }

    /// Evaluate the function. Arity has been checked at parse time.
    pub fn call(&self, workdir: &Path, args: &[String]) -> String {
        match self {
            Self::Checksum => args
                .first()
                .map(|path| checksum(workdir, path))
                .unwrap_or_default(),
            Self::Epoch => Utc::now().timestamp().to_string(),
            Self::Arch => std::env::consts::ARCH.to_string(),
            Self::Os => std::env::consts::OS.to_string(),
        }
    }
}

/// Hash a file's full contents, or return an empty string if it can't be read
fn checksum(workdir: &Path, path: &str) -> String {
    let abs_path = clean_path(&workdir.join(path));

    let mut file = match File::open(&abs_path) {
        Ok(f) => f,
        Err(e) => {
            warn!(
                "cache key template/checksum could not open {}: {}",
                abs_path.display(),
                e
            );
            return String::new();
        }
    };

    let mut hasher = Sha256::new();
    if let Err(e) = io::copy(&mut file, &mut hasher) {
        warn!(
            "cache key template/checksum could not read {}: {}",
            abs_path.display(),
            e
        );
        return String::new();
    }

    let digest = hex::encode(hasher.finalize());
    debug!("checksum {} = {}", abs_path.display(), digest);
    digest
}

/// Lexically normalize a path: drop `.` and resolve `..` without touching the
/// filesystem
pub(crate) fn clean_path(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                None | Some(Component::ParentDir) => cleaned.push(".."),
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(_) => {
                    cleaned.pop();
                }
            },
            other => cleaned.push(other.as_os_str()),
        }
    }
    cleaned
}
