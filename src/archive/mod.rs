//! Streaming archive formats
//!
//! Provides a trait for packing a set of workspace paths into a byte stream
//! and unpacking such a stream back into a directory tree:
//! - `.tar`: plain tar
//! - `.tgz` / `.tar.gz`: gzip-compressed tar

mod tar;
mod tgz;

pub use self::tar::TarArchive;
pub use self::tgz::TgzArchive;

use crate::error::{StowageError, StowageResult};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Abstract archive format
///
/// Both operations are blocking and sequential: `pack` only ever appends to
/// `out`, `unpack` only ever reads `input` front to back, so either side can
/// be one end of a pipe.
pub trait Archive: Send + Sync {
    /// Write every path in `srcs` (relative to `root`) to `out`
    fn pack(&self, root: &Path, srcs: &[PathBuf], out: &mut dyn Write) -> StowageResult<()>;

    /// Recreate the archived tree from `input` under `dst`
    fn unpack(&self, dst: &Path, input: &mut dyn Read) -> StowageResult<()>;

    /// Human-readable format name for logging
    fn name(&self) -> &'static str;
}

/// Pick the archive format from a file name suffix
pub fn from_filename(name: &str) -> StowageResult<Arc<dyn Archive>> {
    if name.ends_with(".tar") {
        return Ok(Arc::new(TarArchive::new()));
    }

    if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
        return Ok(Arc::new(TgzArchive::new()));
    }

    Err(StowageError::UnknownFormat(name.to_string()))
}

/// Writer that can be sealed after a failure so nothing else reaches the
/// underlying stream, including trailers written from `Drop` impls
pub(crate) struct SealableWriter<W> {
    inner: W,
    sealed: bool,
}

impl<W: Write> SealableWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self {
            inner,
            sealed: false,
        }
    }

    /// Discard everything written from now on
    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }
}

impl<W: Write> Write for SealableWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.sealed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "archive stream sealed after error",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.sealed {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// Read and discard whatever follows the end of an archive
pub(crate) fn drain(input: &mut dyn Read) -> StowageResult<u64> {
    io::copy(input, &mut io::sink()).map_err(|e| StowageError::Decode(e.to_string()))
}
