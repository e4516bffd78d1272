//! Bounded byte pipe from a blocking writer to an async reader
//!
//! The writer side is a `std::io::Write` meant to run on a blocking thread
//! (archive packing); the reader side is an `AsyncRead` handed to storage
//! uploads. At most `capacity` chunks of `chunk_size` bytes are in flight.
//!
//! Unlike a plain channel close, a writer can end the stream with an error,
//! and a writer dropped without [`PipeWriter::close`] is reported to the
//! reader as a broken pipe. A reader therefore only ever sees a clean EOF for
//! a complete stream.

use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::io::{self, Write};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;

enum Frame {
    Data(Bytes),
    End,
    Failed(io::Error),
}

/// Create a pipe holding at most `capacity` chunks of `chunk_size` bytes
pub fn pipe(capacity: usize, chunk_size: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let frames = stream::unfold(Some(rx), |state| async move {
        let mut rx = state?;
        match rx.recv().await {
            Some(Frame::Data(chunk)) => Some((Ok(chunk), Some(rx))),
            Some(Frame::End) => None,
            Some(Frame::Failed(e)) => Some((Err(e), None)),
            None => Some((
                Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe writer dropped before closing",
                )),
                None,
            )),
        }
    })
    .boxed();

    let writer = PipeWriter {
        tx,
        buf: BytesMut::with_capacity(chunk_size),
        chunk_size: chunk_size.max(1),
    };
    let reader = PipeReader {
        inner: StreamReader::new(frames),
    };
    (writer, reader)
}

/// Blocking write half. Must not be used from inside an async task.
pub struct PipeWriter {
    tx: mpsc::Sender<Frame>,
    buf: BytesMut,
    chunk_size: usize,
}

impl PipeWriter {
    /// Flush buffered bytes and mark the stream complete
    pub fn close(mut self) -> io::Result<()> {
        self.send_buffered()?;
        self.send(Frame::End)
    }

    /// End the stream with `err`; buffered bytes are discarded
    pub fn close_with_error(self, err: io::Error) {
        // The reader may already be gone, in which case nobody is left to tell
        let _ = self.tx.blocking_send(Frame::Failed(err));
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.send(Frame::Data(chunk))
    }

    fn send(&self, frame: Frame) -> io::Result<()> {
        self.tx
            .blocking_send(frame)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader closed"))
    }
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pipe reader closed",
            ));
        }
        self.buf.extend_from_slice(buf);
        if self.buf.len() >= self.chunk_size {
            self.send_buffered()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Async read half
pub struct PipeReader {
    inner: StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn transfers_all_bytes() {
        let (mut writer, mut reader) = pipe(2, 8);
        let producer = tokio::task::spawn_blocking(move || {
            for i in 0..100u8 {
                writer.write_all(&[i; 3])?;
            }
            writer.close()
        });

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        producer.await.unwrap().unwrap();

        assert_eq!(out.len(), 300);
        assert_eq!(&out[297..], &[99, 99, 99]);
    }

    #[tokio::test]
    async fn error_reaches_reader() {
        let (mut writer, mut reader) = pipe(4, 1024);
        tokio::task::spawn_blocking(move || {
            writer.write_all(b"partial").unwrap();
            writer.close_with_error(io::Error::new(io::ErrorKind::Other, "stat mount1: gone"));
        });

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.to_string(), "stat mount1: gone");
        assert!(out.is_empty(), "buffered bytes are discarded on error");
    }

    #[tokio::test]
    async fn dropped_writer_is_broken_pipe() {
        let (mut writer, mut reader) = pipe(4, 4);
        tokio::task::spawn_blocking(move || {
            writer.write_all(b"12345678").unwrap();
            drop(writer);
        });

        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn dropped_reader_fails_writer() {
        let (mut writer, reader) = pipe(1, 4);
        drop(reader);

        let result = tokio::task::spawn_blocking(move || writer.write_all(b"12345678"))
            .await
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::BrokenPipe);
    }
}
