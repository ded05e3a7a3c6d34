//! Token-level encode policy.

use crate::error::Error;
use crate::extension::{ExtensionHeader, Timestamp};
use crate::output::OutputBuffer;
use crate::primitives;

/// Token-level encode policy bound to one wire format.
pub trait Formatter: Send + Sync {
    /// Emit nil.
    fn write_nil(&self, out: &mut OutputBuffer);
    /// Emit a boolean.
    fn write_bool(&self, out: &mut OutputBuffer, value: bool);
    /// Emit an unsigned integer in the shortest form that fits.
    fn write_uint(&self, out: &mut OutputBuffer, value: u64);
    /// Emit a signed integer in the shortest form that fits.
    fn write_int(&self, out: &mut OutputBuffer, value: i64);
    /// Emit a float 32; never widened to float 64.
    fn write_f32(&self, out: &mut OutputBuffer, value: f32);
    /// Emit a float 64.
    fn write_f64(&self, out: &mut OutputBuffer, value: f64);
    /// Emit a string.
    fn write_str(&self, out: &mut OutputBuffer, value: &str);
    /// Emit a byte blob.
    fn write_bin(&self, out: &mut OutputBuffer, value: &[u8]);
    /// Emit a binary header alone; the caller appends the payload.
    fn write_bin_header(&self, out: &mut OutputBuffer, len: u32);
    /// Emit an array header.
    fn write_array_header(&self, out: &mut OutputBuffer, len: u32);
    /// Emit a map header.
    fn write_map_header(&self, out: &mut OutputBuffer, len: u32);
    /// Emit an extension header; the caller appends the payload.
    fn write_ext_header(&self, out: &mut OutputBuffer, header: ExtensionHeader);
    /// Emit a timestamp in its most compact form.
    fn write_timestamp(&self, out: &mut OutputBuffer, ts: Timestamp) -> Result<(), Error>;
}

/// The current-spec MessagePack formatter. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct MsgPackFormatter;

/// Old-spec compatibility formatter: binary takes the raw/str family (which
/// predates both `bin` and `str8`) and timestamps are unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OldSpecFormatter;

/// The shared current-spec formatter instance.
pub static MSGPACK_FORMATTER: MsgPackFormatter = MsgPackFormatter;

/// The shared old-spec formatter instance.
pub static OLD_SPEC_FORMATTER: OldSpecFormatter = OldSpecFormatter;

impl Formatter for MsgPackFormatter {
    fn write_nil(&self, out: &mut OutputBuffer) {
        primitives::write_nil(out);
    }

    fn write_bool(&self, out: &mut OutputBuffer, value: bool) {
        primitives::write_bool(out, value);
    }

    fn write_uint(&self, out: &mut OutputBuffer, value: u64) {
        primitives::write_uint(out, value);
    }

    fn write_int(&self, out: &mut OutputBuffer, value: i64) {
        primitives::write_int(out, value);
    }

    fn write_f32(&self, out: &mut OutputBuffer, value: f32) {
        primitives::write_f32(out, value);
    }

    fn write_f64(&self, out: &mut OutputBuffer, value: f64) {
        primitives::write_f64(out, value);
    }

    fn write_str(&self, out: &mut OutputBuffer, value: &str) {
        primitives::write_str_header(out, value.len() as u32, true);
        out.put_slice(value.as_bytes());
    }

    fn write_bin(&self, out: &mut OutputBuffer, value: &[u8]) {
        primitives::write_bin_header(out, value.len() as u32);
        out.put_slice(value);
    }

    fn write_bin_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_bin_header(out, len);
    }

    fn write_array_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_array_header(out, len);
    }

    fn write_map_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_map_header(out, len);
    }

    fn write_ext_header(&self, out: &mut OutputBuffer, header: ExtensionHeader) {
        primitives::write_ext_header(out, header);
    }

    fn write_timestamp(&self, out: &mut OutputBuffer, ts: Timestamp) -> Result<(), Error> {
        primitives::write_timestamp(out, ts);
        Ok(())
    }
}

impl Formatter for OldSpecFormatter {
    fn write_nil(&self, out: &mut OutputBuffer) {
        primitives::write_nil(out);
    }

    fn write_bool(&self, out: &mut OutputBuffer, value: bool) {
        primitives::write_bool(out, value);
    }

    fn write_uint(&self, out: &mut OutputBuffer, value: u64) {
        primitives::write_uint(out, value);
    }

    fn write_int(&self, out: &mut OutputBuffer, value: i64) {
        primitives::write_int(out, value);
    }

    fn write_f32(&self, out: &mut OutputBuffer, value: f32) {
        primitives::write_f32(out, value);
    }

    fn write_f64(&self, out: &mut OutputBuffer, value: f64) {
        primitives::write_f64(out, value);
    }

    fn write_str(&self, out: &mut OutputBuffer, value: &str) {
        primitives::write_str_header(out, value.len() as u32, false);
        out.put_slice(value.as_bytes());
    }

    fn write_bin(&self, out: &mut OutputBuffer, value: &[u8]) {
        primitives::write_str_header(out, value.len() as u32, false);
        out.put_slice(value);
    }

    fn write_bin_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_str_header(out, len, false);
    }

    fn write_array_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_array_header(out, len);
    }

    fn write_map_header(&self, out: &mut OutputBuffer, len: u32) {
        primitives::write_map_header(out, len);
    }

    fn write_ext_header(&self, out: &mut OutputBuffer, header: ExtensionHeader) {
        primitives::write_ext_header(out, header);
    }

    fn write_timestamp(&self, _out: &mut OutputBuffer, _ts: Timestamp) -> Result<(), Error> {
        Err(Error::OldSpecTimestamp)
    }
}
