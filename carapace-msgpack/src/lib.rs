#![warn(missing_docs)]
#![warn(clippy::std_instead_of_core)]

//! Streaming MessagePack wire primitives.
//!
//! This crate is the token layer under `carapace`: a bit-exact primitive
//! codec, a segmented read buffer that tolerates incomplete input, a chained
//! write buffer, and the [`Formatter`]/[`Deformatter`] policy pair that the
//! converter graph is bound to.
//!
//! Streaming reads return a three-valued [`DecodeResult`] instead of failing:
//! callers that can fetch more bytes retry from the same position, and only
//! the synchronous [`MsgPackReader`]/[`MsgPackWriter`] façades convert
//! insufficiency into an [`Error`].

pub mod codes;
mod deformatter;
mod error;
mod extension;
mod formatter;
mod output;
pub mod primitives;
mod reader;
mod result;
mod sequence;
mod writer;

pub use codes::{TOKEN_KINDS, TokenKind, kind_of};
pub use deformatter::{Deformatter, MSGPACK_DEFORMATTER, MsgPackDeformatter, SkipProgress};
pub use error::Error;
pub use extension::{ExtensionHeader, TIMESTAMP_TYPE_CODE, Timestamp};
pub use formatter::{Formatter, MSGPACK_FORMATTER, MsgPackFormatter, OLD_SPEC_FORMATTER, OldSpecFormatter};
pub use output::OutputBuffer;
pub use primitives::{Float, Integer};
pub use reader::{MsgPackReader, ReaderCheckpoint};
pub use result::DecodeResult;
pub use sequence::{ByteSequence, SeqCursor};
pub use writer::MsgPackWriter;
