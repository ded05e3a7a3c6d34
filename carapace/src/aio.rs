//! Asynchronous reader/writer over a pull-based byte source and sink.
//!
//! The async reader accumulates pulled chunks as segments (no copying on
//! refill) and lends out synchronous [`MsgPackReader`] views over the
//! buffered prefix; [`buffer_next_structure`](AsyncMsgPackReader::buffer_next_structure)
//! resumes an interrupted skip scan across refills, so a structure is only
//! ever decoded once it is known to be complete.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::BytesMut;
use carapace_msgpack::{
    ByteSequence, DecodeResult, Deformatter as _, Formatter, MSGPACK_DEFORMATTER,
    MSGPACK_FORMATTER, MsgPackReader, MsgPackWriter, OutputBuffer, SkipProgress, TokenKind,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::Error;

const READ_CHUNK: usize = 8 * 1024;
const FLUSH_THRESHOLD: usize = 32 * 1024;

/// Cooperative cancellation flag, consulted before every pull and flush.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not yet cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; observers fail with [`Error::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Pulls bytes from an async source and exposes buffered synchronous reader
/// views.
pub struct AsyncMsgPackReader<S> {
    source: S,
    seq: ByteSequence,
    /// Everything before this absolute position has been decoded.
    read_pos: usize,
    /// How far the completeness scan has committed whole tokens.
    scan_pos: usize,
    skip: SkipProgress,
    cancel: CancellationToken,
    eof: bool,
}

impl<S: AsyncRead + Unpin> AsyncMsgPackReader<S> {
    /// Wrap a pull source.
    pub fn new(source: S, cancel: CancellationToken) -> Self {
        Self {
            source,
            seq: ByteSequence::new(),
            read_pos: 0,
            scan_pos: 0,
            skip: SkipProgress::new(),
            cancel,
            eof: false,
        }
    }

    /// Pull one more chunk; returns how many bytes arrived (0 at the end of
    /// the source).
    pub async fn fetch_more(&mut self) -> Result<usize, Error> {
        self.cancel.check()?;
        if self.eof {
            return Ok(0);
        }
        let mut chunk = BytesMut::with_capacity(READ_CHUNK);
        let pulled = self.source.read_buf(&mut chunk).await?;
        if pulled == 0 {
            self.eof = true;
        } else {
            self.seq.push_chunk(chunk.freeze());
        }
        Ok(pulled)
    }

    /// Fetch until the buffer holds at least one whole structure past the
    /// committed read position.
    pub async fn buffer_next_structure(&mut self) -> Result<(), Error> {
        if self.scan_pos < self.read_pos {
            self.scan_pos = self.read_pos;
            self.skip.reset();
        }
        loop {
            let mut cursor = self.seq.cursor_at(self.scan_pos);
            match MSGPACK_DEFORMATTER.try_skip(&mut cursor, &mut self.skip) {
                DecodeResult::Success(()) => {
                    self.scan_pos = cursor.consumed();
                    return Ok(());
                }
                DecodeResult::TokenMismatch { lead } => {
                    return Err(Error::Wire(carapace_msgpack::Error::TokenMismatch {
                        expected: TokenKind::Unknown,
                        lead,
                        position: cursor.consumed(),
                    }));
                }
                DecodeResult::EmptyBuffer | DecodeResult::InsufficientBuffer => {
                    // whole tokens are committed; the scan resumes from here
                    self.scan_pos = cursor.consumed();
                    if self.fetch_more().await? == 0 {
                        return Err(Error::Wire(carapace_msgpack::Error::EndOfStream {
                            position: self.seq.len(),
                        }));
                    }
                }
            }
        }
    }

    /// A synchronous reader view over the buffered bytes, starting at the
    /// committed read position. Commit its final position back with
    /// [`commit`](Self::commit) when done.
    pub fn reader(&self) -> MsgPackReader<'_> {
        MsgPackReader::at(&self.seq, self.read_pos)
    }

    /// Commit a reader view's advanced position.
    pub fn commit(&mut self, position: usize) {
        debug_assert!(position >= self.read_pos, "reader view moved backwards");
        self.read_pos = position;
    }

    /// Release buffered segments that lie entirely before the committed read
    /// position.
    pub fn trim(&mut self) {
        let released = self.seq.release_before(self.read_pos);
        self.read_pos -= released;
        self.scan_pos -= released.min(self.scan_pos);
    }
}

/// Accumulates encoded bytes and flushes sealed chunks to an async sink.
pub struct AsyncMsgPackWriter<S> {
    sink: S,
    out: OutputBuffer,
    formatter: &'static dyn Formatter,
    cancel: CancellationToken,
}

impl<S: AsyncWrite + Unpin> AsyncMsgPackWriter<S> {
    /// Wrap a sink with the current-spec formatter.
    pub fn new(sink: S, cancel: CancellationToken) -> Self {
        Self::with_formatter(sink, &MSGPACK_FORMATTER, cancel)
    }

    /// Wrap a sink with an explicit formatter.
    pub fn with_formatter(
        sink: S,
        formatter: &'static dyn Formatter,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sink,
            out: OutputBuffer::with_seal_threshold(FLUSH_THRESHOLD),
            formatter,
            cancel,
        }
    }

    /// Bytes accumulated but not yet handed to the sink.
    pub fn pending(&self) -> usize {
        self.out.len()
    }

    /// A synchronous writer view over the accumulation buffer.
    pub fn writer(&mut self) -> MsgPackWriter<'_> {
        MsgPackWriter::with_formatter(&mut self.out, self.formatter)
    }

    /// Hand sealed chunks to the sink, checking cancellation per chunk.
    pub async fn flush_sealed(&mut self) -> Result<(), Error> {
        for chunk in self.out.take_sealed() {
            self.cancel.check()?;
            self.sink.write_all(&chunk).await?;
        }
        Ok(())
    }

    /// Seal and flush everything, then flush the sink itself.
    pub async fn finish(&mut self) -> Result<(), Error> {
        self.out.seal();
        self.flush_sealed().await?;
        self.sink.flush().await?;
        Ok(())
    }
}
