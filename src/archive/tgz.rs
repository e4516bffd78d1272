//! Gzip-compressed tar archives
//!
//! Wraps [`TarArchive`] with a streaming gzip encoder/decoder; the tar layer
//! is reused unchanged.

use crate::archive::tar::unpack_entries;
use crate::archive::{drain, Archive, SealableWriter, TarArchive};
use crate::error::{StowageError, StowageResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Gzip-compressed tar format (`.tgz`, `.tar.gz`)
#[derive(Debug, Clone, Copy, Default)]
pub struct TgzArchive {
    inner: TarArchive,
}

impl TgzArchive {
    /// Create a tar.gz archive codec
    pub fn new() -> Self {
        Self {
            inner: TarArchive::new(),
        }
    }
}

impl Archive for TgzArchive {
    fn pack(&self, root: &Path, srcs: &[PathBuf], out: &mut dyn Write) -> StowageResult<()> {
        let mut encoder = GzEncoder::new(SealableWriter::new(out), Compression::default());

        if let Err(e) = self.inner.pack(root, srcs, &mut encoder) {
            // Dropping the encoder would otherwise write a valid gzip trailer
            encoder.get_mut().seal();
            return Err(e);
        }

        encoder
            .finish()
            .map_err(|e| StowageError::io("finishing gzip stream", e))?;
        Ok(())
    }

    fn unpack(&self, dst: &Path, input: &mut dyn Read) -> StowageResult<()> {
        let mut decoder = GzDecoder::new(input);
        let count = unpack_entries(dst, &mut decoder)?;

        // Read up to the gzip trailer so its CRC is verified, then drain the
        // raw stream behind it
        drain(&mut decoder)?;
        drain(decoder.into_inner())?;

        debug!("Unpacked {} entries into {}", count, dst.display());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tgz"
    }
}
