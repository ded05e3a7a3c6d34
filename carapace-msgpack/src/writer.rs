//! Synchronous write façade.

use crate::error::Error;
use crate::extension::{ExtensionHeader, Timestamp};
use crate::formatter::{Formatter, MSGPACK_FORMATTER};
use crate::output::OutputBuffer;

/// Value-type writer binding an [`OutputBuffer`] to a [`Formatter`].
///
/// Lives for a single serialization call. Between tokens the buffer gets a
/// chance to seal its head chunk, so an async sink can drain while the
/// encoder keeps going.
pub struct MsgPackWriter<'a> {
    out: &'a mut OutputBuffer,
    formatter: &'static dyn Formatter,
}

impl<'a> MsgPackWriter<'a> {
    /// A writer using the current-spec MessagePack formatter.
    pub fn new(out: &'a mut OutputBuffer) -> Self {
        Self::with_formatter(out, &MSGPACK_FORMATTER)
    }

    /// A writer bound to an explicit formatter.
    pub fn with_formatter(out: &'a mut OutputBuffer, formatter: &'static dyn Formatter) -> Self {
        Self { out, formatter }
    }

    /// Bytes written so far.
    pub fn written(&self) -> usize {
        self.out.len()
    }

    /// Emit nil.
    pub fn write_nil(&mut self) {
        self.formatter.write_nil(self.out);
        self.out.maybe_seal();
    }

    /// Emit a boolean.
    pub fn write_bool(&mut self, value: bool) {
        self.formatter.write_bool(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit an unsigned integer.
    pub fn write_u64(&mut self, value: u64) {
        self.formatter.write_uint(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a signed integer.
    pub fn write_i64(&mut self, value: i64) {
        self.formatter.write_int(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a float 32.
    pub fn write_f32(&mut self, value: f32) {
        self.formatter.write_f32(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a float 64.
    pub fn write_f64(&mut self, value: f64) {
        self.formatter.write_f64(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a string.
    pub fn write_str(&mut self, value: &str) {
        self.formatter.write_str(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a byte blob.
    pub fn write_bin(&mut self, value: &[u8]) {
        self.formatter.write_bin(self.out, value);
        self.out.maybe_seal();
    }

    /// Emit a binary header alone, to be followed by `len` raw payload bytes.
    pub fn write_bin_header(&mut self, len: usize) {
        self.formatter.write_bin_header(self.out, len as u32);
    }

    /// Emit an array header announcing `len` elements.
    pub fn write_array_header(&mut self, len: usize) {
        self.formatter.write_array_header(self.out, len as u32);
        self.out.maybe_seal();
    }

    /// Emit a map header announcing `len` pairs.
    pub fn write_map_header(&mut self, len: usize) {
        self.formatter.write_map_header(self.out, len as u32);
        self.out.maybe_seal();
    }

    /// Emit an extension token with its payload.
    pub fn write_extension(&mut self, type_code: i8, payload: &[u8]) {
        self.formatter
            .write_ext_header(self.out, ExtensionHeader::new(type_code, payload.len() as u32));
        self.out.put_slice(payload);
        self.out.maybe_seal();
    }

    /// Emit a timestamp; fails in old-spec compatibility mode.
    pub fn write_timestamp(&mut self, ts: Timestamp) -> Result<(), Error> {
        self.formatter.write_timestamp(self.out, ts)?;
        self.out.maybe_seal();
        Ok(())
    }

    /// Copy pre-encoded token bytes through verbatim.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.out.put_slice(bytes);
        self.out.maybe_seal();
    }
}
