//! Synchronous read façade.
//!
//! Wraps a cursor and a [`Deformatter`]; insufficiency becomes
//! [`Error::EndOfStream`] here, and the cursor is always repositioned to the
//! token start before an error surfaces.

use std::borrow::Cow;

use crate::codes::TokenKind;
use crate::deformatter::{Deformatter, MSGPACK_DEFORMATTER, SkipProgress};
use crate::error::Error;
use crate::extension::{ExtensionHeader, TIMESTAMP_TYPE_CODE, Timestamp};
use crate::primitives::{self, Integer};
use crate::result::DecodeResult;
use crate::sequence::{ByteSequence, SeqCursor};

/// A saved reader position, restorable with [`MsgPackReader::restore`].
#[derive(Debug, Clone, Copy)]
pub struct ReaderCheckpoint<'a> {
    cursor: SeqCursor<'a>,
    expected: u64,
}

/// Value-type reader binding a [`ByteSequence`] cursor to a [`Deformatter`].
///
/// Tracks `expected_remaining_structures`: every array or map header adds the
/// number of elements it announces, every consumed structure subtracts one.
/// The counter drives [`skip_to_end_of_structure`](Self::skip_to_end_of_structure)
/// after a converter stops reading a container early.
pub struct MsgPackReader<'a> {
    cursor: SeqCursor<'a>,
    deformatter: &'static dyn Deformatter,
    expected_remaining_structures: u64,
}

impl<'a> MsgPackReader<'a> {
    /// A reader over the whole sequence using the MessagePack deformatter.
    pub fn new(seq: &'a ByteSequence) -> Self {
        Self::with_deformatter(seq, &MSGPACK_DEFORMATTER)
    }

    /// A reader starting `pos` bytes into the sequence.
    pub fn at(seq: &'a ByteSequence, pos: usize) -> Self {
        let mut reader = Self::new(seq);
        reader.cursor = seq.cursor_at(pos);
        reader
    }

    /// A reader bound to an explicit deformatter.
    pub fn with_deformatter(seq: &'a ByteSequence, deformatter: &'static dyn Deformatter) -> Self {
        Self {
            cursor: seq.cursor(),
            deformatter,
            expected_remaining_structures: 0,
        }
    }

    /// Absolute position from the start of the sequence.
    pub fn position(&self) -> usize {
        self.cursor.consumed()
    }

    /// Bytes left in the sequence.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Structures that must still be consumed to finish every container
    /// currently entered.
    pub fn expected_remaining_structures(&self) -> u64 {
        self.expected_remaining_structures
    }

    /// Save the current position and structure counter.
    pub fn checkpoint(&self) -> ReaderCheckpoint<'a> {
        ReaderCheckpoint {
            cursor: self.cursor,
            expected: self.expected_remaining_structures,
        }
    }

    /// Return to a saved position.
    pub fn restore(&mut self, checkpoint: ReaderCheckpoint<'a>) {
        self.cursor = checkpoint.cursor;
        self.expected_remaining_structures = checkpoint.expected;
    }

    fn consumed_structure(&mut self) {
        self.expected_remaining_structures = self.expected_remaining_structures.saturating_sub(1);
    }

    fn decode<T>(
        &mut self,
        expected: TokenKind,
        f: impl FnOnce(&'static dyn Deformatter, &mut SeqCursor<'a>) -> DecodeResult<T>,
    ) -> Result<T, Error> {
        let position = self.cursor.consumed();
        match f(self.deformatter, &mut self.cursor) {
            DecodeResult::Success(value) => Ok(value),
            DecodeResult::TokenMismatch { lead } => Err(Error::TokenMismatch {
                expected,
                lead,
                position,
            }),
            DecodeResult::EmptyBuffer | DecodeResult::InsufficientBuffer => {
                Err(Error::EndOfStream { position })
            }
        }
    }

    /// Classify the next token without consuming it.
    pub fn peek_kind(&self) -> Result<TokenKind, Error> {
        match self.deformatter.try_peek_kind(&self.cursor) {
            DecodeResult::Success(kind) => Ok(kind),
            _ => Err(Error::EndOfStream {
                position: self.cursor.consumed(),
            }),
        }
    }

    /// Streaming variant of [`peek_kind`](Self::peek_kind).
    pub fn try_peek_kind(&self) -> DecodeResult<TokenKind> {
        self.deformatter.try_peek_kind(&self.cursor)
    }

    /// Peek the next token as an extension header without consuming it.
    pub fn try_peek_ext_header(&self) -> DecodeResult<ExtensionHeader> {
        let mut probe = self.cursor;
        self.deformatter.try_read_ext_header(&mut probe)
    }

    /// Consume nil.
    pub fn read_nil(&mut self) -> Result<(), Error> {
        self.decode(TokenKind::Null, |de, cur| de.try_read_nil(cur))?;
        self.consumed_structure();
        Ok(())
    }

    /// Consume a boolean.
    pub fn read_bool(&mut self) -> Result<bool, Error> {
        let value = self.decode(TokenKind::Boolean, |de, cur| de.try_read_bool(cur))?;
        self.consumed_structure();
        Ok(value)
    }

    /// Consume any integer encoding without coercing it.
    pub fn read_integer(&mut self) -> Result<Integer, Error> {
        let value = self.decode(TokenKind::Integer, |de, cur| de.try_read_integer(cur))?;
        self.consumed_structure();
        Ok(value)
    }

    fn read_float_value(&mut self) -> Result<f64, Error> {
        match self.peek_kind()? {
            TokenKind::Integer => {
                let integer = self.read_integer()?;
                Ok(match integer {
                    Integer::Unsigned(v) => v as f64,
                    Integer::Signed(v) => v as f64,
                })
            }
            _ => {
                let value = self.decode(TokenKind::Float, |de, cur| de.try_read_float(cur))?;
                self.consumed_structure();
                Ok(value.to_f64())
            }
        }
    }

    /// Consume a float 32; a float 64 or integer on the wire is narrowed.
    pub fn read_f32(&mut self) -> Result<f32, Error> {
        self.read_float_value().map(|v| v as f32)
    }

    /// Consume a float 64; a float 32 or integer on the wire is widened.
    pub fn read_f64(&mut self) -> Result<f64, Error> {
        self.read_float_value()
    }

    /// Consume a string as raw UTF-8 bytes, borrowed when contiguous.
    pub fn read_str_bytes(&mut self) -> Result<Cow<'a, [u8]>, Error> {
        let checkpoint = self.checkpoint();
        let len = self.decode(TokenKind::String, |de, cur| de.try_read_str_header(cur))?;
        let payload = self.read_payload(len as usize, checkpoint)?;
        self.consumed_structure();
        Ok(payload)
    }

    /// Consume a string, borrowed when contiguous.
    pub fn read_str(&mut self) -> Result<Cow<'a, str>, Error> {
        let checkpoint = self.checkpoint();
        let position = self.position();
        match self.read_str_bytes()? {
            Cow::Borrowed(bytes) => match core::str::from_utf8(bytes) {
                Ok(s) => Ok(Cow::Borrowed(s)),
                Err(_) => {
                    self.restore(checkpoint);
                    Err(Error::InvalidUtf8 { position })
                }
            },
            Cow::Owned(bytes) => match String::from_utf8(bytes) {
                Ok(s) => Ok(Cow::Owned(s)),
                Err(_) => {
                    self.restore(checkpoint);
                    Err(Error::InvalidUtf8 { position })
                }
            },
        }
    }

    /// Consume a binary blob, borrowed when contiguous. Accepts str-family
    /// headers for old-spec payloads.
    pub fn read_bin(&mut self) -> Result<Cow<'a, [u8]>, Error> {
        let checkpoint = self.checkpoint();
        let len = self.decode(TokenKind::Binary, |de, cur| de.try_read_bin_header(cur))?;
        let payload = self.read_payload(len as usize, checkpoint)?;
        self.consumed_structure();
        Ok(payload)
    }

    /// Consume an array header, yielding the element count.
    pub fn read_array_header(&mut self) -> Result<usize, Error> {
        let count = self.decode(TokenKind::Vector, |de, cur| de.try_read_array_header(cur))?;
        self.expected_remaining_structures =
            self.expected_remaining_structures.saturating_sub(1) + count as u64;
        Ok(count as usize)
    }

    /// Consume a map header, yielding the pair count.
    pub fn read_map_header(&mut self) -> Result<usize, Error> {
        let count = self.decode(TokenKind::Map, |de, cur| de.try_read_map_header(cur))?;
        self.expected_remaining_structures =
            self.expected_remaining_structures.saturating_sub(1) + 2 * count as u64;
        Ok(count as usize)
    }

    /// Consume an extension header; the payload follows via
    /// [`read_ext_payload`](Self::read_ext_payload).
    pub fn read_ext_header(&mut self) -> Result<ExtensionHeader, Error> {
        let header = self.decode(TokenKind::Extension, |de, cur| de.try_read_ext_header(cur))?;
        self.consumed_structure();
        Ok(header)
    }

    /// Consume the payload announced by an extension header.
    pub fn read_ext_payload(&mut self, len: u32) -> Result<Cow<'a, [u8]>, Error> {
        let checkpoint = self.checkpoint();
        self.read_payload(len as usize, checkpoint)
    }

    /// Consume a whole extension token.
    pub fn read_extension(&mut self) -> Result<(ExtensionHeader, Cow<'a, [u8]>), Error> {
        let checkpoint = self.checkpoint();
        let header = self.read_ext_header()?;
        match self.read_ext_payload(header.length) {
            Ok(payload) => Ok((header, payload)),
            Err(err) => {
                self.restore(checkpoint);
                Err(err)
            }
        }
    }

    /// Consume a reserved timestamp extension.
    pub fn read_timestamp(&mut self) -> Result<Timestamp, Error> {
        let checkpoint = self.checkpoint();
        let (header, payload) = self.read_extension()?;
        if header.type_code != TIMESTAMP_TYPE_CODE {
            self.restore(checkpoint);
            return Err(Error::UnexpectedExtension {
                expected: TIMESTAMP_TYPE_CODE,
                actual: header.type_code,
            });
        }
        match primitives::decode_timestamp(&payload) {
            Some(ts) => Ok(ts),
            None => {
                self.restore(checkpoint);
                Err(Error::InvalidTimestamp {
                    length: header.length,
                })
            }
        }
    }

    fn read_payload(
        &mut self,
        len: usize,
        checkpoint: ReaderCheckpoint<'a>,
    ) -> Result<Cow<'a, [u8]>, Error> {
        if len > self.cursor.remaining() {
            let remaining = self.cursor.remaining();
            self.restore(checkpoint);
            return Err(Error::OversizedLength {
                announced: len as u64,
                remaining: remaining as u64,
            });
        }
        let span = self.cursor.contiguous();
        if span.len() >= len {
            let payload = &span[..len];
            self.cursor.advance(len);
            Ok(Cow::Borrowed(payload))
        } else {
            let mut payload = vec![0u8; len];
            let copied = self.cursor.peek_into(&mut payload);
            debug_assert_eq!(copied, len);
            self.cursor.advance(len);
            Ok(Cow::Owned(payload))
        }
    }

    /// Skip one whole structure.
    pub fn skip(&mut self) -> Result<(), Error> {
        let checkpoint = self.checkpoint();
        let position = self.position();
        let mut progress = SkipProgress::new();
        match self.deformatter.try_skip(&mut self.cursor, &mut progress) {
            DecodeResult::Success(()) => {
                self.consumed_structure();
                Ok(())
            }
            DecodeResult::TokenMismatch { lead } => {
                self.restore(checkpoint);
                Err(Error::TokenMismatch {
                    expected: TokenKind::Unknown,
                    lead,
                    position,
                })
            }
            DecodeResult::EmptyBuffer | DecodeResult::InsufficientBuffer => {
                self.restore(checkpoint);
                Err(Error::EndOfStream { position })
            }
        }
    }

    /// Streaming skip; an interrupted attempt leaves its state in `progress`
    /// and the cursor after the last whole token.
    pub fn try_skip(&mut self, progress: &mut SkipProgress) -> DecodeResult<()> {
        let result = self.deformatter.try_skip(&mut self.cursor, progress);
        if result.is_success() {
            self.consumed_structure();
        }
        result
    }

    /// Skip everything the structure counter still expects, leaving the
    /// reader just past the current top-level structure.
    pub fn skip_to_end_of_structure(&mut self) -> Result<(), Error> {
        while self.expected_remaining_structures > 0 {
            self.skip()?;
        }
        Ok(())
    }

    /// Capture the next structure's bytes verbatim, borrowed when contiguous.
    pub fn read_raw(&mut self) -> Result<Cow<'a, [u8]>, Error> {
        let start = self.cursor;
        self.skip()?;
        Ok(start.slice_to(&self.cursor))
    }

    /// Advance past map entries until one's key equals `name`, leaving the
    /// reader at that entry's value. `false` means the map was fully consumed
    /// without a match. Must be positioned at a map header.
    pub fn skip_to_property(&mut self, name: &str) -> Result<bool, Error> {
        let count = self.read_map_header()?;
        for _ in 0..count {
            let key = self.read_str_bytes()?;
            if key.as_ref() == name.as_bytes() {
                return Ok(true);
            }
            self.skip()?;
        }
        Ok(false)
    }

    /// Advance past array elements until `index`, leaving the reader at that
    /// element. `false` means the array was shorter and was fully consumed.
    /// Must be positioned at an array header.
    pub fn skip_to_index(&mut self, index: usize) -> Result<bool, Error> {
        let count = self.read_array_header()?;
        if index >= count {
            for _ in 0..count {
                self.skip()?;
            }
            return Ok(false);
        }
        for _ in 0..index {
            self.skip()?;
        }
        Ok(true)
    }
}

macro_rules! integer_reads {
    ($($(#[$doc:meta])* $name:ident -> $ty:ty, $to:ident);+ $(;)?) => {
        impl<'a> MsgPackReader<'a> {
            $(
                $(#[$doc])*
                pub fn $name(&mut self) -> Result<$ty, Error> {
                    let checkpoint = self.checkpoint();
                    let integer = self.read_integer()?;
                    match integer.$to() {
                        Ok(value) => Ok(value),
                        Err(err) => {
                            self.restore(checkpoint);
                            Err(err)
                        }
                    }
                }
            )+
        }
    };
}

integer_reads! {
    /// Consume an integer coerced to `u8`.
    read_u8 -> u8, to_u8;
    /// Consume an integer coerced to `u16`.
    read_u16 -> u16, to_u16;
    /// Consume an integer coerced to `u32`.
    read_u32 -> u32, to_u32;
    /// Consume an integer coerced to `u64`.
    read_u64 -> u64, to_u64;
    /// Consume an integer coerced to `usize`.
    read_usize -> usize, to_usize;
    /// Consume an integer coerced to `i8`.
    read_i8 -> i8, to_i8;
    /// Consume an integer coerced to `i16`.
    read_i16 -> i16, to_i16;
    /// Consume an integer coerced to `i32`.
    read_i32 -> i32, to_i32;
    /// Consume an integer coerced to `i64`.
    read_i64 -> i64, to_i64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_repositions_the_reader() {
        let seq = ByteSequence::from_slice(&[0xcf, 0, 0, 0, 1, 0, 0, 0, 0]);
        let mut reader = MsgPackReader::new(&seq);
        assert!(matches!(
            reader.read_u32(),
            Err(Error::IntegerOverflow { target: "u32" })
        ));
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u64().unwrap(), 1 << 32);
    }

    #[test]
    fn oversized_length_header_fails_fast() {
        // str32 announcing 4 GiB backed by three bytes
        let seq = ByteSequence::from_slice(&[0xdb, 0xff, 0xff, 0xff, 0xff, b'a', b'b', b'c']);
        let mut reader = MsgPackReader::new(&seq);
        assert!(matches!(
            reader.read_str(),
            Err(Error::OversizedLength { announced, .. }) if announced == 0xffff_ffff
        ));
        assert_eq!(reader.position(), 0);
    }

    #[test]
    fn expected_structures_track_headers_and_scalars() {
        // {"a": [1, 2], "b": nil}
        let seq = ByteSequence::from_slice(&[
            0x82, 0xa1, b'a', 0x92, 0x01, 0x02, 0xa1, b'b', 0xc0,
        ]);
        let mut reader = MsgPackReader::new(&seq);
        reader.read_map_header().unwrap();
        assert_eq!(reader.expected_remaining_structures(), 4);
        reader.read_str().unwrap();
        assert_eq!(reader.expected_remaining_structures(), 3);
        reader.read_array_header().unwrap();
        assert_eq!(reader.expected_remaining_structures(), 4);
        reader.read_u32().unwrap();
        reader.read_u32().unwrap();
        assert_eq!(reader.expected_remaining_structures(), 2);
        reader.skip_to_end_of_structure().unwrap();
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn raw_capture_is_borrowed_and_verbatim() {
        let bytes = [0x92, 0x01, 0xa1, b'x', 0xc3];
        let seq = ByteSequence::from_slice(&bytes);
        let mut reader = MsgPackReader::new(&seq);
        let raw = reader.read_raw().unwrap();
        assert!(matches!(raw, Cow::Borrowed(_)));
        assert_eq!(raw.as_ref(), &bytes[..4]);
        assert_eq!(reader.position(), 4);
        assert!(reader.read_bool().unwrap());
    }

    #[test]
    fn skip_to_property_lands_on_the_value() {
        // {"a": 1, "b": [2, 3], "c": true}
        let seq = ByteSequence::from_slice(&[
            0x83, 0xa1, b'a', 0x01, 0xa1, b'b', 0x92, 0x02, 0x03, 0xa1, b'c', 0xc3,
        ]);
        let mut reader = MsgPackReader::new(&seq);
        assert!(reader.skip_to_property("b").unwrap());
        assert_eq!(reader.read_array_header().unwrap(), 2);

        let mut reader = MsgPackReader::new(&seq);
        assert!(!reader.skip_to_property("missing").unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn skip_to_index_lands_on_the_element() {
        let seq = ByteSequence::from_slice(&[0x93, 0xa1, b'x', 0x05, 0xc2]);
        let mut reader = MsgPackReader::new(&seq);
        assert!(reader.skip_to_index(1).unwrap());
        assert_eq!(reader.read_u8().unwrap(), 5);

        let mut reader = MsgPackReader::new(&seq);
        assert!(!reader.skip_to_index(7).unwrap());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn timestamp_round_trips_through_the_facades() {
        let mut out = crate::OutputBuffer::new();
        let mut writer = crate::MsgPackWriter::new(&mut out);
        let ts = Timestamp::new(1_700_000_000, 123_456_789).unwrap();
        writer.write_timestamp(ts).unwrap();
        let seq = ByteSequence::from(out.into_vec());
        let mut reader = MsgPackReader::new(&seq);
        assert_eq!(reader.read_timestamp().unwrap(), ts);
    }

    #[test]
    fn wrong_extension_code_restores_position() {
        let mut out = crate::OutputBuffer::new();
        let mut writer = crate::MsgPackWriter::new(&mut out);
        writer.write_extension(7, &[0xaa]);
        let seq = ByteSequence::from(out.into_vec());
        let mut reader = MsgPackReader::new(&seq);
        assert!(matches!(
            reader.read_timestamp(),
            Err(Error::UnexpectedExtension {
                expected: -1,
                actual: 7
            })
        ));
        let (header, payload) = reader.read_extension().unwrap();
        assert_eq!(header.type_code, 7);
        assert_eq!(payload.as_ref(), &[0xaa]);
    }
}
