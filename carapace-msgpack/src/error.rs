//! Error type surfaced at the synchronous reader/writer boundary.

use core::fmt;

use crate::codes::TokenKind;

/// Wire-level error.
///
/// Streaming reads report insufficiency as [`DecodeResult`](crate::DecodeResult)
/// values; only the synchronous façade converts them into this type.
#[derive(Debug)]
pub enum Error {
    /// The next token is not of the kind the caller asked for.
    TokenMismatch {
        /// The kind the caller requested.
        expected: TokenKind,
        /// The lead byte actually found.
        lead: u8,
        /// Absolute position of the offending token.
        position: usize,
    },
    /// The buffer ended before a complete token could be read.
    EndOfStream {
        /// Position at which more bytes were needed.
        position: usize,
    },
    /// A decoded integer does not fit the requested target type.
    IntegerOverflow {
        /// Name of the target type.
        target: &'static str,
    },
    /// A string payload is not valid UTF-8.
    InvalidUtf8 {
        /// Position of the payload start.
        position: usize,
    },
    /// A length header announces more bytes than remain in the entire buffer.
    OversizedLength {
        /// The announced payload length.
        announced: u64,
        /// Bytes actually remaining.
        remaining: u64,
    },
    /// An extension carried the expected type code but a malformed payload.
    InvalidTimestamp {
        /// The payload length that was found.
        length: u32,
    },
    /// An extension token carried an unexpected type code.
    UnexpectedExtension {
        /// The code the caller asked for.
        expected: i8,
        /// The code found on the wire.
        actual: i8,
    },
    /// Timestamps cannot be written in old-spec compatibility mode.
    OldSpecTimestamp,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TokenMismatch {
                expected,
                lead,
                position,
            } => write!(
                f,
                "expected {} but found lead byte 0x{lead:02x} at position {position}",
                expected.name()
            ),
            Error::EndOfStream { position } => {
                write!(f, "unexpected end of stream at position {position}")
            }
            Error::IntegerOverflow { target } => {
                write!(f, "integer value overflows {target}")
            }
            Error::InvalidUtf8 { position } => {
                write!(f, "string payload at position {position} is not valid UTF-8")
            }
            Error::OversizedLength {
                announced,
                remaining,
            } => write!(
                f,
                "length header announces {announced} bytes but only {remaining} remain"
            ),
            Error::InvalidTimestamp { length } => {
                write!(f, "malformed timestamp extension payload of {length} bytes")
            }
            Error::UnexpectedExtension { expected, actual } => {
                write!(f, "expected extension type {expected} but found {actual}")
            }
            Error::OldSpecTimestamp => {
                f.write_str("timestamps cannot be encoded in old-spec compatibility mode")
            }
        }
    }
}

impl std::error::Error for Error {}
