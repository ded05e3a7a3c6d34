//! Pure MessagePack primitive codec.
//!
//! Decoding works over a contiguous span and reports how many bytes each
//! token consumed; it never allocates and never looks past the token.
//! Encoding always emits the shortest representation that fits the value.

use crate::codes;
use crate::error::Error;
use crate::extension::{ExtensionHeader, Timestamp};
use crate::output::OutputBuffer;
use crate::result::{DecodeResult, try_decode};

/// A decoded token value plus the number of bytes it occupied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded<T> {
    /// The decoded value.
    pub value: T,
    /// Bytes consumed from the span, lead byte included.
    pub len: usize,
}

impl<T> Decoded<T> {
    pub(crate) const fn new(value: T, len: usize) -> Self {
        Self { value, len }
    }
}

/// An integer as found on the wire, before coercion to a target type.
///
/// Non-negative values normalize to `Unsigned` regardless of which family
/// encoded them; `Signed` always holds a negative value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integer {
    /// Zero or positive.
    Unsigned(u64),
    /// Strictly negative.
    Signed(i64),
}

macro_rules! integer_targets {
    ($($fn_name:ident -> $ty:ty),+ $(,)?) => {
        $(
            /// Coerce to the target type; overflow is a fatal error distinct
            /// from a token mismatch.
            pub fn $fn_name(self) -> Result<$ty, Error> {
                let overflow = Error::IntegerOverflow {
                    target: stringify!($ty),
                };
                match self {
                    Integer::Unsigned(v) => <$ty>::try_from(v).map_err(|_| overflow),
                    Integer::Signed(v) => <$ty>::try_from(v).map_err(|_| overflow),
                }
            }
        )+
    };
}

impl Integer {
    integer_targets! {
        to_u8 -> u8,
        to_u16 -> u16,
        to_u32 -> u32,
        to_u64 -> u64,
        to_usize -> usize,
        to_i8 -> i8,
        to_i16 -> i16,
        to_i32 -> i32,
        to_i64 -> i64,
    }

    fn from_signed(v: i64) -> Self {
        if v >= 0 {
            Integer::Unsigned(v as u64)
        } else {
            Integer::Signed(v)
        }
    }
}

/// A float as found on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Float {
    /// float 32
    F32(f32),
    /// float 64
    F64(f64),
}

impl Float {
    /// Widen to `f64`; always exact.
    pub fn to_f64(self) -> f64 {
        match self {
            Float::F32(v) => v as f64,
            Float::F64(v) => v as f64,
        }
    }

    /// Narrow to `f32`; a float 64 is cast.
    pub fn to_f32(self) -> f32 {
        match self {
            Float::F32(v) => v,
            Float::F64(v) => v as f32,
        }
    }
}

fn lead(buf: &[u8]) -> DecodeResult<u8> {
    match buf.first() {
        Some(&b) => DecodeResult::Success(b),
        None => DecodeResult::EmptyBuffer,
    }
}

/// The `N` bytes following the lead byte, or `InsufficientBuffer`.
fn tail<const N: usize>(buf: &[u8]) -> DecodeResult<[u8; N]> {
    if buf.len() < 1 + N {
        return DecodeResult::InsufficientBuffer;
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[1..1 + N]);
    DecodeResult::Success(out)
}

/// Decode nil.
pub fn read_nil(buf: &[u8]) -> DecodeResult<Decoded<()>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::NIL => DecodeResult::Success(Decoded::new((), 1)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a boolean.
pub fn read_bool(buf: &[u8]) -> DecodeResult<Decoded<bool>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FALSE => DecodeResult::Success(Decoded::new(false, 1)),
        codes::TRUE => DecodeResult::Success(Decoded::new(true, 1)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode any integer family.
pub fn read_integer(buf: &[u8]) -> DecodeResult<Decoded<Integer>> {
    let lead = try_decode!(lead(buf));
    match lead {
        0x00..=codes::POSFIXINT_MAX => {
            DecodeResult::Success(Decoded::new(Integer::Unsigned(lead as u64), 1))
        }
        codes::NEGFIXINT_MIN..=0xff => {
            DecodeResult::Success(Decoded::new(Integer::Signed(lead as i8 as i64), 1))
        }
        codes::UINT8 => tail::<1>(buf)
            .map(|b| Decoded::new(Integer::Unsigned(b[0] as u64), 2)),
        codes::UINT16 => tail::<2>(buf)
            .map(|b| Decoded::new(Integer::Unsigned(u16::from_be_bytes(b) as u64), 3)),
        codes::UINT32 => tail::<4>(buf)
            .map(|b| Decoded::new(Integer::Unsigned(u32::from_be_bytes(b) as u64), 5)),
        codes::UINT64 => tail::<8>(buf)
            .map(|b| Decoded::new(Integer::Unsigned(u64::from_be_bytes(b)), 9)),
        codes::INT8 => tail::<1>(buf)
            .map(|b| Decoded::new(Integer::from_signed(b[0] as i8 as i64), 2)),
        codes::INT16 => tail::<2>(buf)
            .map(|b| Decoded::new(Integer::from_signed(i16::from_be_bytes(b) as i64), 3)),
        codes::INT32 => tail::<4>(buf)
            .map(|b| Decoded::new(Integer::from_signed(i32::from_be_bytes(b) as i64), 5)),
        codes::INT64 => tail::<8>(buf)
            .map(|b| Decoded::new(Integer::from_signed(i64::from_be_bytes(b)), 9)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a float 32 or float 64.
pub fn read_float(buf: &[u8]) -> DecodeResult<Decoded<Float>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FLOAT32 => {
            tail::<4>(buf).map(|b| Decoded::new(Float::F32(f32::from_be_bytes(b)), 5))
        }
        codes::FLOAT64 => {
            tail::<8>(buf).map(|b| Decoded::new(Float::F64(f64::from_be_bytes(b)), 9))
        }
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a string header, yielding the payload length.
pub fn read_str_header(buf: &[u8]) -> DecodeResult<Decoded<u32>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FIXSTR_MIN..=codes::FIXSTR_MAX => {
            DecodeResult::Success(Decoded::new((lead & 0x1f) as u32, 1))
        }
        codes::STR8 => tail::<1>(buf).map(|b| Decoded::new(b[0] as u32, 2)),
        codes::STR16 => tail::<2>(buf).map(|b| Decoded::new(u16::from_be_bytes(b) as u32, 3)),
        codes::STR32 => tail::<4>(buf).map(|b| Decoded::new(u32::from_be_bytes(b), 5)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a binary header, yielding the payload length.
///
/// `str`-family headers are accepted as well: pre-bin writers (the old spec)
/// framed binary with the raw/str family.
pub fn read_bin_header(buf: &[u8]) -> DecodeResult<Decoded<u32>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::BIN8 => tail::<1>(buf).map(|b| Decoded::new(b[0] as u32, 2)),
        codes::BIN16 => tail::<2>(buf).map(|b| Decoded::new(u16::from_be_bytes(b) as u32, 3)),
        codes::BIN32 => tail::<4>(buf).map(|b| Decoded::new(u32::from_be_bytes(b), 5)),
        _ => read_str_header(buf),
    }
}

/// Decode an array header, yielding the element count.
pub fn read_array_header(buf: &[u8]) -> DecodeResult<Decoded<u32>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FIXARRAY_MIN..=codes::FIXARRAY_MAX => {
            DecodeResult::Success(Decoded::new((lead & 0x0f) as u32, 1))
        }
        codes::ARRAY16 => tail::<2>(buf).map(|b| Decoded::new(u16::from_be_bytes(b) as u32, 3)),
        codes::ARRAY32 => tail::<4>(buf).map(|b| Decoded::new(u32::from_be_bytes(b), 5)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a map header, yielding the pair count.
pub fn read_map_header(buf: &[u8]) -> DecodeResult<Decoded<u32>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FIXMAP_MIN..=codes::FIXMAP_MAX => {
            DecodeResult::Success(Decoded::new((lead & 0x0f) as u32, 1))
        }
        codes::MAP16 => tail::<2>(buf).map(|b| Decoded::new(u16::from_be_bytes(b) as u32, 3)),
        codes::MAP32 => tail::<4>(buf).map(|b| Decoded::new(u32::from_be_bytes(b), 5)),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode an extension header, yielding the type code and payload length.
pub fn read_ext_header(buf: &[u8]) -> DecodeResult<Decoded<ExtensionHeader>> {
    let lead = try_decode!(lead(buf));
    match lead {
        codes::FIXEXT1 | codes::FIXEXT2 | codes::FIXEXT4 | codes::FIXEXT8 | codes::FIXEXT16 => {
            let length = 1u32 << (lead - codes::FIXEXT1);
            tail::<1>(buf).map(|b| Decoded::new(ExtensionHeader::new(b[0] as i8, length), 2))
        }
        codes::EXT8 => tail::<2>(buf)
            .map(|b| Decoded::new(ExtensionHeader::new(b[1] as i8, b[0] as u32), 3)),
        codes::EXT16 => tail::<3>(buf).map(|b| {
            let length = u16::from_be_bytes([b[0], b[1]]) as u32;
            Decoded::new(ExtensionHeader::new(b[2] as i8, length), 4)
        }),
        codes::EXT32 => tail::<5>(buf).map(|b| {
            let length = u32::from_be_bytes([b[0], b[1], b[2], b[3]]);
            Decoded::new(ExtensionHeader::new(b[4] as i8, length), 6)
        }),
        _ => DecodeResult::TokenMismatch { lead },
    }
}

/// Decode a timestamp extension payload of 4, 8, or 12 bytes.
pub fn decode_timestamp(payload: &[u8]) -> Option<Timestamp> {
    match payload.len() {
        4 => {
            let seconds = u32::from_be_bytes(payload.try_into().ok()?) as i64;
            Timestamp::new(seconds, 0).ok()
        }
        8 => {
            let combined = u64::from_be_bytes(payload.try_into().ok()?);
            let nanos = (combined >> 34) as u32;
            let seconds = (combined & ((1 << 34) - 1)) as i64;
            Timestamp::new(seconds, nanos).ok()
        }
        12 => {
            let nanos = u32::from_be_bytes(payload[..4].try_into().ok()?);
            let seconds = i64::from_be_bytes(payload[4..].try_into().ok()?);
            Timestamp::new(seconds, nanos).ok()
        }
        _ => None,
    }
}

/// Encode nil.
pub fn write_nil(out: &mut OutputBuffer) {
    out.put_u8(codes::NIL);
}

/// Encode a boolean.
pub fn write_bool(out: &mut OutputBuffer, value: bool) {
    out.put_u8(if value { codes::TRUE } else { codes::FALSE });
}

/// Encode an unsigned integer in its shortest form.
pub fn write_uint(out: &mut OutputBuffer, n: u64) {
    match n {
        0..=127 => {
            // positive fixint
            out.put_u8(n as u8);
        }
        128..=255 => {
            // uint8
            out.put_u8(codes::UINT8);
            out.put_u8(n as u8);
        }
        256..=65535 => {
            // uint16
            out.put_u8(codes::UINT16);
            out.put_slice(&(n as u16).to_be_bytes());
        }
        65536..=4294967295 => {
            // uint32
            out.put_u8(codes::UINT32);
            out.put_slice(&(n as u32).to_be_bytes());
        }
        _ => {
            // uint64
            out.put_u8(codes::UINT64);
            out.put_slice(&n.to_be_bytes());
        }
    }
}

/// Encode a signed integer in its shortest form; non-negative values use the
/// unsigned family.
pub fn write_int(out: &mut OutputBuffer, n: i64) {
    match n {
        0..=i64::MAX => write_uint(out, n as u64),
        -32..=-1 => {
            // negative fixint
            out.put_u8(n as u8);
        }
        -128..=-33 => {
            // int8
            out.put_u8(codes::INT8);
            out.put_u8(n as u8);
        }
        -32768..=-129 => {
            // int16
            out.put_u8(codes::INT16);
            out.put_slice(&(n as i16).to_be_bytes());
        }
        -2147483648..=-32769 => {
            // int32
            out.put_u8(codes::INT32);
            out.put_slice(&(n as i32).to_be_bytes());
        }
        _ => {
            // int64
            out.put_u8(codes::INT64);
            out.put_slice(&n.to_be_bytes());
        }
    }
}

/// Encode a float 32. Never widened.
pub fn write_f32(out: &mut OutputBuffer, n: f32) {
    out.put_u8(codes::FLOAT32);
    out.put_slice(&n.to_be_bytes());
}

/// Encode a float 64.
pub fn write_f64(out: &mut OutputBuffer, n: f64) {
    out.put_u8(codes::FLOAT64);
    out.put_slice(&n.to_be_bytes());
}

/// Encode a string header. `allow_str8` is off in old-spec mode, which
/// predates the str 8 form.
pub fn write_str_header(out: &mut OutputBuffer, len: u32, allow_str8: bool) {
    match len {
        0..=31 => {
            // fixstr
            out.put_u8(codes::FIXSTR_MIN | len as u8);
        }
        32..=255 if allow_str8 => {
            // str8
            out.put_u8(codes::STR8);
            out.put_u8(len as u8);
        }
        32..=65535 => {
            // str16
            out.put_u8(codes::STR16);
            out.put_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            // str32
            out.put_u8(codes::STR32);
            out.put_slice(&len.to_be_bytes());
        }
    }
}

/// Encode a binary header.
pub fn write_bin_header(out: &mut OutputBuffer, len: u32) {
    match len {
        0..=255 => {
            // bin8
            out.put_u8(codes::BIN8);
            out.put_u8(len as u8);
        }
        256..=65535 => {
            // bin16
            out.put_u8(codes::BIN16);
            out.put_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            // bin32
            out.put_u8(codes::BIN32);
            out.put_slice(&len.to_be_bytes());
        }
    }
}

/// Encode an array header.
pub fn write_array_header(out: &mut OutputBuffer, len: u32) {
    match len {
        0..=15 => {
            // fixarray
            out.put_u8(codes::FIXARRAY_MIN | len as u8);
        }
        16..=65535 => {
            // array16
            out.put_u8(codes::ARRAY16);
            out.put_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            // array32
            out.put_u8(codes::ARRAY32);
            out.put_slice(&len.to_be_bytes());
        }
    }
}

/// Encode a map header.
pub fn write_map_header(out: &mut OutputBuffer, len: u32) {
    match len {
        0..=15 => {
            // fixmap
            out.put_u8(codes::FIXMAP_MIN | len as u8);
        }
        16..=65535 => {
            // map16
            out.put_u8(codes::MAP16);
            out.put_slice(&(len as u16).to_be_bytes());
        }
        _ => {
            // map32
            out.put_u8(codes::MAP32);
            out.put_slice(&len.to_be_bytes());
        }
    }
}

/// Encode an extension header, using fixext forms for the power-of-two
/// payload lengths.
pub fn write_ext_header(out: &mut OutputBuffer, header: ExtensionHeader) {
    match header.length {
        1 => out.put_u8(codes::FIXEXT1),
        2 => out.put_u8(codes::FIXEXT2),
        4 => out.put_u8(codes::FIXEXT4),
        8 => out.put_u8(codes::FIXEXT8),
        16 => out.put_u8(codes::FIXEXT16),
        0..=255 => {
            out.put_u8(codes::EXT8);
            out.put_u8(header.length as u8);
        }
        256..=65535 => {
            out.put_u8(codes::EXT16);
            out.put_slice(&(header.length as u16).to_be_bytes());
        }
        _ => {
            out.put_u8(codes::EXT32);
            out.put_slice(&header.length.to_be_bytes());
        }
    }
    out.put_u8(header.type_code as u8);
}

/// Encode a timestamp in its most compact form, header included.
pub fn write_timestamp(out: &mut OutputBuffer, ts: Timestamp) {
    let len = ts.payload_len();
    write_ext_header(out, ExtensionHeader::new(crate::extension::TIMESTAMP_TYPE_CODE, len));
    match len {
        4 => out.put_slice(&(ts.seconds() as u32).to_be_bytes()),
        8 => {
            let combined = ((ts.nanos() as u64) << 34) | ts.seconds() as u64;
            out.put_slice(&combined.to_be_bytes());
        }
        _ => {
            out.put_slice(&ts.nanos().to_be_bytes());
            out.put_slice(&ts.seconds().to_be_bytes());
        }
    }
}

/// The shortest unsigned-integer encoding of `n` as a standalone byte string,
/// for callers that embed a compact integer inside an extension payload.
pub fn encoded_uint(n: u64) -> ([u8; 9], usize) {
    let mut buf = [0u8; 9];
    match n {
        0..=127 => {
            buf[0] = n as u8;
            (buf, 1)
        }
        128..=255 => {
            buf[0] = codes::UINT8;
            buf[1] = n as u8;
            (buf, 2)
        }
        256..=65535 => {
            buf[0] = codes::UINT16;
            buf[1..3].copy_from_slice(&(n as u16).to_be_bytes());
            (buf, 3)
        }
        65536..=4294967295 => {
            buf[0] = codes::UINT32;
            buf[1..5].copy_from_slice(&(n as u32).to_be_bytes());
            (buf, 5)
        }
        _ => {
            buf[0] = codes::UINT64;
            buf[1..9].copy_from_slice(&n.to_be_bytes());
            (buf, 9)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uint_bytes(n: u64) -> Vec<u8> {
        let mut out = OutputBuffer::new();
        write_uint(&mut out, n);
        out.into_vec()
    }

    fn int_bytes(n: i64) -> Vec<u8> {
        let mut out = OutputBuffer::new();
        write_int(&mut out, n);
        out.into_vec()
    }

    #[test]
    fn integers_use_the_shortest_encoding() {
        assert_eq!(uint_bytes(0), [0x00]);
        assert_eq!(uint_bytes(127), [0x7f]);
        assert_eq!(uint_bytes(128), [0xcc, 0x80]);
        assert_eq!(uint_bytes(255), [0xcc, 0xff]);
        assert_eq!(uint_bytes(256), [0xcd, 0x01, 0x00]);
        assert_eq!(uint_bytes(65536), [0xce, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(
            uint_bytes(u64::MAX),
            [0xcf, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
        );
        assert_eq!(int_bytes(-1), [0xff]);
        assert_eq!(int_bytes(-32), [0xe0]);
        assert_eq!(int_bytes(-33), [0xd0, 0xdf]);
        assert_eq!(int_bytes(-128), [0xd0, 0x80]);
        assert_eq!(int_bytes(-129), [0xd1, 0xff, 0x7f]);
        // non-negative signed values take the unsigned forms
        assert_eq!(int_bytes(200), [0xcc, 0xc8]);
    }

    #[test]
    fn integer_reads_accept_any_family_and_normalize() {
        let decoded = read_integer(&[0xd0, 0x05]).map(|d| d.value);
        assert_eq!(decoded, DecodeResult::Success(Integer::Unsigned(5)));
        let decoded = read_integer(&[0xcf, 0, 0, 0, 1, 0, 0, 0, 0]).map(|d| d.value);
        assert_eq!(decoded, DecodeResult::Success(Integer::Unsigned(1 << 32)));
        let decoded = read_integer(&[0xe0]).map(|d| d.value);
        assert_eq!(decoded, DecodeResult::Success(Integer::Signed(-32)));
    }

    #[test]
    fn integer_coercion_overflow_is_not_a_mismatch() {
        let DecodeResult::Success(d) = read_integer(&[0xcf, 0, 0, 0, 1, 0, 0, 0, 0]) else {
            panic!("decode failed");
        };
        assert!(matches!(
            d.value.to_u32(),
            Err(Error::IntegerOverflow { target: "u32" })
        ));
        let DecodeResult::Success(d) = read_integer(&[0xcc, 0x80]) else {
            panic!("decode failed");
        };
        assert!(matches!(d.value.to_i8(), Err(Error::IntegerOverflow { .. })));
        assert_eq!(d.value.to_u8().unwrap(), 128);
    }

    #[test]
    fn truncated_tokens_report_insufficiency_not_mismatch() {
        assert_eq!(read_integer(&[]), DecodeResult::EmptyBuffer);
        assert_eq!(read_integer(&[0xcd, 0x01]), DecodeResult::InsufficientBuffer);
        assert_eq!(read_str_header(&[0xda, 0x01]), DecodeResult::InsufficientBuffer);
        assert_eq!(read_ext_header(&[0xc7]), DecodeResult::InsufficientBuffer);
        assert_eq!(
            read_bool(&[0x42]),
            DecodeResult::TokenMismatch { lead: 0x42 }
        );
    }

    #[test]
    fn str_headers_tie_break_at_family_boundaries() {
        let mut out = OutputBuffer::new();
        write_str_header(&mut out, 31, true);
        write_str_header(&mut out, 32, true);
        write_str_header(&mut out, 255, true);
        write_str_header(&mut out, 256, true);
        assert_eq!(out.into_vec(), [0xbf, 0xd9, 0x20, 0xd9, 0xff, 0xda, 0x01, 0x00]);
    }

    #[test]
    fn old_spec_str_headers_skip_str8() {
        let mut out = OutputBuffer::new();
        write_str_header(&mut out, 32, false);
        assert_eq!(out.into_vec(), [0xda, 0x00, 0x20]);
    }

    #[test]
    fn ext_headers_prefer_fixext_forms() {
        let cases: &[(u32, &[u8])] = &[
            (1, &[0xd4, 0x01]),
            (2, &[0xd5, 0x01]),
            (4, &[0xd6, 0x01]),
            (8, &[0xd7, 0x01]),
            (16, &[0xd8, 0x01]),
            (3, &[0xc7, 0x03, 0x01]),
            (17, &[0xc7, 0x11, 0x01]),
            (300, &[0xc8, 0x01, 0x2c, 0x01]),
        ];
        for (len, expected) in cases {
            let mut out = OutputBuffer::new();
            write_ext_header(&mut out, ExtensionHeader::new(1, *len));
            assert_eq!(out.into_vec(), *expected, "payload length {len}");
        }
    }

    #[test]
    fn ext_header_round_trips() {
        for len in [0u32, 1, 2, 3, 4, 8, 16, 17, 255, 256, 70000] {
            let mut out = OutputBuffer::new();
            write_ext_header(&mut out, ExtensionHeader::new(-1, len));
            let bytes = out.into_vec();
            let DecodeResult::Success(d) = read_ext_header(&bytes) else {
                panic!("header decode failed for {len}");
            };
            assert_eq!(d.value, ExtensionHeader::new(-1, len));
            assert_eq!(d.len, bytes.len());
        }
    }

    #[test]
    fn timestamp_forms_round_trip() {
        let cases = [
            Timestamp::new(0, 0).unwrap(),
            Timestamp::new(u32::MAX as i64, 0).unwrap(),
            Timestamp::new(1, 999_999_999).unwrap(),
            Timestamp::new((1 << 34) - 1, 1).unwrap(),
            Timestamp::new(1 << 34, 0).unwrap(),
            Timestamp::new(-62_135_596_800, 123).unwrap(),
        ];
        for ts in cases {
            let mut out = OutputBuffer::new();
            write_timestamp(&mut out, ts);
            let bytes = out.into_vec();
            let DecodeResult::Success(header) = read_ext_header(&bytes) else {
                panic!("ext header decode failed");
            };
            assert_eq!(header.value.type_code, -1);
            let payload = &bytes[header.len..];
            assert_eq!(payload.len() as u32, header.value.length);
            assert_eq!(decode_timestamp(payload), Some(ts));
        }
    }

    #[test]
    fn timestamp64_packs_nanos_high() {
        let mut out = OutputBuffer::new();
        write_timestamp(&mut out, Timestamp::new(1, 1).unwrap());
        // fixext8, type -1, (1 << 34) | 1
        assert_eq!(
            out.into_vec(),
            [0xd7, 0xff, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01]
        );
    }
}
