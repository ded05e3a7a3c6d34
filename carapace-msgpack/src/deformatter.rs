//! Streaming token-read policy.
//!
//! Every operation takes the cursor by reference and returns a
//! [`DecodeResult`]; the cursor only moves on `Success`. Tokens that straddle
//! a segment boundary are retried from a small stack copy.

use crate::codes::{self, TOKEN_KINDS, TokenKind};
use crate::extension::ExtensionHeader;
use crate::primitives::{self, Decoded, Float, Integer};
use crate::result::DecodeResult;
use crate::sequence::SeqCursor;

/// Upper bound on the bytes any header or scalar token can occupy.
const MAX_TOKEN_PREFIX: usize = 17;

/// Resumable state for [`Deformatter::try_skip`].
///
/// When a skip runs out of bytes the outstanding structure count stays here;
/// calling `try_skip` again with the same progress value picks up exactly
/// where the previous attempt stopped.
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipProgress {
    pub(crate) pending: u64,
}

impl SkipProgress {
    /// Fresh state for skipping one whole structure.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when a previous skip was interrupted.
    pub fn in_progress(&self) -> bool {
        self.pending > 0
    }

    /// Structures still to consume before the skip completes.
    pub fn pending(&self) -> u64 {
        self.pending
    }

    /// Forget any interrupted skip.
    pub fn reset(&mut self) {
        self.pending = 0;
    }
}

/// Token-level decode policy bound to one wire format.
pub trait Deformatter: Send + Sync {
    /// Classify the next token without consuming anything.
    fn try_peek_kind(&self, cur: &SeqCursor<'_>) -> DecodeResult<TokenKind>;
    /// Consume nil.
    fn try_read_nil(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<()>;
    /// Consume a boolean.
    fn try_read_bool(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<bool>;
    /// Consume any integer encoding.
    fn try_read_integer(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<Integer>;
    /// Consume a float 32 or float 64.
    fn try_read_float(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<Float>;
    /// Consume a string header, yielding the payload length.
    fn try_read_str_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32>;
    /// Consume a binary header, yielding the payload length.
    fn try_read_bin_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32>;
    /// Consume an array header, yielding the element count.
    fn try_read_array_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32>;
    /// Consume a map header, yielding the pair count.
    fn try_read_map_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32>;
    /// Consume an extension header.
    fn try_read_ext_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<ExtensionHeader>;
    /// Skip one whole structure, resuming from `progress` when it records an
    /// interrupted attempt. On insufficiency the cursor stays after the last
    /// fully consumed token and `progress` holds the outstanding count.
    fn try_skip(&self, cur: &mut SeqCursor<'_>, progress: &mut SkipProgress) -> DecodeResult<()>;
}

/// The MessagePack deformatter. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackDeformatter;

/// The shared MessagePack deformatter instance.
pub static MSGPACK_DEFORMATTER: MsgPackDeformatter = MsgPackDeformatter;

/// Decode one token with the contiguous fast path and a stack-copy retry for
/// tokens that straddle segments.
fn decode_with<T>(
    cur: &mut SeqCursor<'_>,
    decode: impl Fn(&[u8]) -> DecodeResult<Decoded<T>>,
) -> DecodeResult<T> {
    if cur.remaining() == 0 {
        return DecodeResult::EmptyBuffer;
    }
    let span = cur.contiguous();
    match decode(span) {
        DecodeResult::Success(d) => {
            cur.advance(d.len);
            DecodeResult::Success(d.value)
        }
        DecodeResult::TokenMismatch { lead } => DecodeResult::TokenMismatch { lead },
        DecodeResult::EmptyBuffer => DecodeResult::EmptyBuffer,
        DecodeResult::InsufficientBuffer => {
            if span.len() >= cur.remaining() {
                // the whole sequence really is too short
                return DecodeResult::InsufficientBuffer;
            }
            let mut stack = [0u8; MAX_TOKEN_PREFIX];
            let copied = cur.peek_into(&mut stack);
            match decode(&stack[..copied]) {
                DecodeResult::Success(d) => {
                    cur.advance(d.len);
                    DecodeResult::Success(d.value)
                }
                DecodeResult::TokenMismatch { lead } => DecodeResult::TokenMismatch { lead },
                DecodeResult::EmptyBuffer => DecodeResult::EmptyBuffer,
                DecodeResult::InsufficientBuffer => DecodeResult::InsufficientBuffer,
            }
        }
    }
}

impl Deformatter for MsgPackDeformatter {
    fn try_peek_kind(&self, cur: &SeqCursor<'_>) -> DecodeResult<TokenKind> {
        match cur.peek() {
            Some(lead) => DecodeResult::Success(TOKEN_KINDS[lead as usize]),
            None => DecodeResult::EmptyBuffer,
        }
    }

    fn try_read_nil(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<()> {
        decode_with(cur, primitives::read_nil)
    }

    fn try_read_bool(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<bool> {
        decode_with(cur, primitives::read_bool)
    }

    fn try_read_integer(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<Integer> {
        decode_with(cur, primitives::read_integer)
    }

    fn try_read_float(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<Float> {
        decode_with(cur, primitives::read_float)
    }

    fn try_read_str_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32> {
        decode_with(cur, primitives::read_str_header)
    }

    fn try_read_bin_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32> {
        decode_with(cur, primitives::read_bin_header)
    }

    fn try_read_array_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32> {
        decode_with(cur, primitives::read_array_header)
    }

    fn try_read_map_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<u32> {
        decode_with(cur, primitives::read_map_header)
    }

    fn try_read_ext_header(&self, cur: &mut SeqCursor<'_>) -> DecodeResult<ExtensionHeader> {
        decode_with(cur, primitives::read_ext_header)
    }

    fn try_skip(&self, cur: &mut SeqCursor<'_>, progress: &mut SkipProgress) -> DecodeResult<()> {
        if progress.pending == 0 {
            progress.pending = 1;
        }
        while progress.pending > 0 {
            let checkpoint = *cur;
            let result = skip_one(self, cur);
            let children = match result {
                DecodeResult::Success(children) => children,
                DecodeResult::TokenMismatch { lead } => {
                    return DecodeResult::TokenMismatch { lead };
                }
                DecodeResult::EmptyBuffer => return DecodeResult::EmptyBuffer,
                DecodeResult::InsufficientBuffer => {
                    *cur = checkpoint;
                    return DecodeResult::InsufficientBuffer;
                }
            };
            progress.pending = progress.pending - 1 + children;
        }
        DecodeResult::Success(())
    }
}

/// Consume a single token, returning how many child structures it announced.
fn skip_one(de: &MsgPackDeformatter, cur: &mut SeqCursor<'_>) -> DecodeResult<u64> {
    let Some(lead) = cur.peek() else {
        return DecodeResult::EmptyBuffer;
    };
    match TOKEN_KINDS[lead as usize] {
        TokenKind::Null => de.try_read_nil(cur).map(|_| 0),
        TokenKind::Boolean => de.try_read_bool(cur).map(|_| 0),
        TokenKind::Integer => de.try_read_integer(cur).map(|_| 0),
        TokenKind::Float => de.try_read_float(cur).map(|_| 0),
        TokenKind::Vector => de.try_read_array_header(cur).map(|n| n as u64),
        TokenKind::Map => de.try_read_map_header(cur).map(|n| 2 * n as u64),
        TokenKind::String => skip_payload(cur, |c| de.try_read_str_header(c)),
        TokenKind::Binary => skip_payload(cur, |c| de.try_read_bin_header(c)),
        TokenKind::Extension => skip_payload(cur, |c| {
            de.try_read_ext_header(c).map(|header| header.length)
        }),
        TokenKind::Unknown => DecodeResult::TokenMismatch { lead },
    }
}

/// Consume a header plus its inline payload.
fn skip_payload(
    cur: &mut SeqCursor<'_>,
    header: impl Fn(&mut SeqCursor<'_>) -> DecodeResult<u32>,
) -> DecodeResult<u64> {
    let mut probe = *cur;
    let len = match header(&mut probe) {
        DecodeResult::Success(len) => len as usize,
        DecodeResult::TokenMismatch { lead } => return DecodeResult::TokenMismatch { lead },
        DecodeResult::EmptyBuffer => return DecodeResult::EmptyBuffer,
        DecodeResult::InsufficientBuffer => return DecodeResult::InsufficientBuffer,
    };
    if probe.remaining() < len {
        return DecodeResult::InsufficientBuffer;
    }
    probe.advance(len);
    *cur = probe;
    DecodeResult::Success(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::ByteSequence;
    use bytes::Bytes;

    fn skip_all(bytes: &[u8]) -> (DecodeResult<()>, usize, SkipProgress) {
        let seq = ByteSequence::from_slice(bytes);
        let mut cur = seq.cursor();
        let mut progress = SkipProgress::new();
        let result = MSGPACK_DEFORMATTER.try_skip(&mut cur, &mut progress);
        (result, cur.consumed(), progress)
    }

    #[test]
    fn skip_advances_past_exactly_one_structure() {
        // [1, [2, 3, 4]] followed by a trailing scalar
        let bytes = [0x92, 0x01, 0x93, 0x02, 0x03, 0x04, 0x05];
        let (result, consumed, _) = skip_all(&bytes);
        assert_eq!(result, DecodeResult::Success(()));
        assert_eq!(consumed, 6);

        // {"a": [true, nil]}
        let bytes = [0x81, 0xa1, b'a', 0x92, 0xc3, 0xc0];
        let (result, consumed, _) = skip_all(&bytes);
        assert_eq!(result, DecodeResult::Success(()));
        assert_eq!(consumed, bytes.len());

        // str / bin / ext payloads are consumed inline
        let bytes = [0xa3, b'a', b'b', b'c'];
        assert_eq!(skip_all(&bytes).1, 4);
        let bytes = [0xc4, 0x02, 0xaa, 0xbb];
        assert_eq!(skip_all(&bytes).1, 4);
        let bytes = [0xd6, 0x01, 1, 2, 3, 4];
        assert_eq!(skip_all(&bytes).1, 6);
    }

    #[test]
    fn interrupted_skip_records_pending_and_resumes() {
        let full = [0x92, 0x01, 0x93, 0x02, 0x03, 0x04];
        for cut in 1..full.len() {
            let seq = ByteSequence::from_slice(&full[..cut]);
            let mut cur = seq.cursor();
            let mut progress = SkipProgress::new();
            let result = MSGPACK_DEFORMATTER.try_skip(&mut cur, &mut progress);
            assert!(result.needs_more_bytes(), "cut at {cut}");
            assert!(progress.in_progress());

            // resume over the uncommitted tail plus the remainder
            let committed = cur.consumed();
            let mut resumed = ByteSequence::new();
            resumed.push_chunk(Bytes::copy_from_slice(&full[committed..cut]));
            resumed.push_chunk(Bytes::copy_from_slice(&full[cut..]));
            let mut cur = resumed.cursor();
            let result = MSGPACK_DEFORMATTER.try_skip(&mut cur, &mut progress);
            assert_eq!(result, DecodeResult::Success(()), "cut at {cut}");
            assert_eq!(committed + cur.consumed(), full.len());
            assert!(!progress.in_progress());
        }
    }

    #[test]
    fn tokens_split_across_segments_decode_via_the_stack_copy() {
        let mut seq = ByteSequence::new();
        seq.push_chunk(Bytes::copy_from_slice(&[0xcd]));
        seq.push_chunk(Bytes::copy_from_slice(&[0x01, 0x00]));
        let mut cur = seq.cursor();
        let result = MSGPACK_DEFORMATTER.try_read_integer(&mut cur);
        assert_eq!(result, DecodeResult::Success(Integer::Unsigned(256)));
        assert_eq!(cur.remaining(), 0);
    }

    #[test]
    fn failed_reads_leave_the_cursor_alone() {
        let seq = ByteSequence::from_slice(&[0xa1, b'x']);
        let mut cur = seq.cursor();
        assert!(matches!(
            MSGPACK_DEFORMATTER.try_read_integer(&mut cur),
            DecodeResult::TokenMismatch { lead: 0xa1 }
        ));
        assert_eq!(cur.consumed(), 0);

        let seq = ByteSequence::from_slice(&[0xcd, 0x01]);
        let mut cur = seq.cursor();
        assert_eq!(
            MSGPACK_DEFORMATTER.try_read_integer(&mut cur),
            DecodeResult::InsufficientBuffer
        );
        assert_eq!(cur.consumed(), 0);
    }
}
