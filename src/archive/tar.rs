//! Uncompressed tar archives

use crate::archive::{drain, Archive, SealableWriter};
use crate::error::{StowageError, StowageResult};
use ::tar::{Builder, EntryType};
use std::fs::{self, FileType};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Plain tar format (`.tar`)
#[derive(Debug, Clone, Copy, Default)]
pub struct TarArchive;

impl TarArchive {
    /// Create a tar archive codec
    pub fn new() -> Self {
        Self
    }
}

impl Archive for TarArchive {
    fn pack(&self, root: &Path, srcs: &[PathBuf], out: &mut dyn Write) -> StowageResult<()> {
        let mut builder = Builder::new(SealableWriter::new(out));
        builder.follow_symlinks(false);

        if let Err(e) = append_sources(&mut builder, root, srcs) {
            // Keep the end-of-archive marker out of a failed stream
            builder.get_mut().seal();
            return Err(e);
        }

        builder
            .finish()
            .map_err(|e| StowageError::io("finishing tar stream", e))
    }

    fn unpack(&self, dst: &Path, input: &mut dyn Read) -> StowageResult<()> {
        let count = unpack_entries(dst, input)?;
        drain(input)?;
        debug!("Unpacked {} entries into {}", count, dst.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tar"
    }
}

fn append_sources<W: Write>(
    builder: &mut Builder<W>,
    root: &Path,
    srcs: &[PathBuf],
) -> StowageResult<()> {
    for src in srcs {
        let name = archive_name(root, src)?;
        let full = root.join(&name);

        let meta = fs::symlink_metadata(&full).map_err(|e| StowageError::Stat {
            path: src.clone(),
            source: e,
        })?;

        if !meta.is_dir() {
            append_entry(builder, &full, &name, meta.file_type())?;
            continue;
        }

        for entry in WalkDir::new(&full).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                StowageError::io(format!("walking {}", full.display()), io::Error::from(e))
            })?;

            let rel = entry.path().strip_prefix(&full).unwrap_or(entry.path());
            let entry_name = if rel.as_os_str().is_empty() {
                name.clone()
            } else {
                name.join(rel)
            };
            if entry_name.as_os_str().is_empty() {
                // The working directory itself has no name inside the archive
                continue;
            }

            append_entry(builder, entry.path(), &entry_name, entry.file_type())?;
        }
    }

    Ok(())
}

fn append_entry<W: Write>(
    builder: &mut Builder<W>,
    path: &Path,
    name: &Path,
    file_type: FileType,
) -> StowageResult<()> {
    if !(file_type.is_file() || file_type.is_dir() || file_type.is_symlink()) {
        return Err(StowageError::UnsupportedEntry {
            path: name.to_path_buf(),
            kind: describe(file_type).to_string(),
        });
    }

    debug!("Adding {}", name.display());
    builder
        .append_path_with_name(path, name)
        .map_err(|e| StowageError::io(format!("adding {} to archive", path.display()), e))
}

/// Name a mount inside the archive: relative to `root`, no `.`, no `..`
fn archive_name(root: &Path, src: &Path) -> StowageResult<PathBuf> {
    let relative = if src.is_absolute() {
        src.strip_prefix(root)
            .map_err(|_| StowageError::InvalidMount {
                path: src.to_path_buf(),
                reason: format!("outside of working directory {}", root.display()),
            })?
    } else {
        src
    };

    let mut name = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => name.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StowageError::InvalidMount {
                    path: src.to_path_buf(),
                    reason: "must not leave the working directory".to_string(),
                })
            }
        }
    }

    Ok(name)
}

fn describe(file_type: FileType) -> &'static str {
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_socket() {
            return "socket";
        }
        if file_type.is_fifo() {
            return "fifo";
        }
        if file_type.is_block_device() || file_type.is_char_device() {
            return "device";
        }
    }
    let _ = file_type;
    "special file"
}

/// Reader that remembers how the stream ended, so extraction failures can be
/// reported as decode errors rather than filesystem errors
struct TrackedReader<'a> {
    inner: &'a mut dyn Read,
    hit_eof: bool,
    read_error: Option<String>,
}

impl<'a> TrackedReader<'a> {
    fn new(inner: &'a mut dyn Read) -> Self {
        Self {
            inner,
            hit_eof: false,
            read_error: None,
        }
    }

    fn classify(&self, err: StowageError) -> StowageError {
        if self.hit_eof {
            StowageError::Decode("unexpected EOF".to_string())
        } else if let Some(reason) = &self.read_error {
            StowageError::Decode(reason.clone())
        } else {
            err
        }
    }
}

impl Read for TrackedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(0) if !buf.is_empty() => {
                self.hit_eof = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                match e.kind() {
                    io::ErrorKind::Interrupted => {}
                    io::ErrorKind::UnexpectedEof => self.hit_eof = true,
                    _ => self.read_error = Some(e.to_string()),
                }
                Err(e)
            }
        }
    }
}

/// Extract every entry of a tar stream under `dst`, returning the number of
/// entries written. Stops at the end-of-archive marker.
pub(crate) fn unpack_entries(dst: &Path, input: &mut dyn Read) -> StowageResult<usize> {
    fs::create_dir_all(dst)
        .map_err(|e| StowageError::io(format!("creating {}", dst.display()), e))?;

    let mut source = TrackedReader::new(input);
    let result = extract(dst, &mut source);
    result.map_err(|e| source.classify(e))
}

fn extract(dst: &Path, source: &mut TrackedReader<'_>) -> StowageResult<usize> {
    let decode = |e: io::Error| StowageError::Decode(e.to_string());

    let mut archive = ::tar::Archive::new(source);
    archive.set_preserve_permissions(true);
    archive.set_preserve_mtime(true);
    archive.set_overwrite(true);

    let mut count = 0;
    for entry in archive.entries().map_err(decode)? {
        let mut entry = entry.map_err(decode)?;
        let path = entry.path().map_err(decode)?.into_owned();
        let entry_type = entry.header().entry_type();

        if !matches!(
            entry_type,
            EntryType::Regular | EntryType::Continuous | EntryType::Directory | EntryType::Symlink
        ) {
            return Err(StowageError::UnsupportedEntry {
                path,
                kind: format!("{:?}", entry_type),
            });
        }

        let unpacked = entry
            .unpack_in(dst)
            .map_err(|e| StowageError::io(format!("unpacking {}", path.display()), e))?;
        if !unpacked {
            warn!("Skipping {}: path escapes {}", path.display(), dst.display());
            continue;
        }

        debug!("Extracted {}", path.display());
        count += 1;
    }

    Ok(count)
}
