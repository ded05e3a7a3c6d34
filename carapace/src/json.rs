//! Diagnostic JSON rendering of arbitrary MessagePack data.

use std::fmt::Write;

use carapace_msgpack::{Integer, MsgPackReader, TokenKind};

use crate::error::Error;

const RENDER_DEPTH: u32 = 192;

/// Pretty-print the next structure as JSON-ish text, for diagnostics.
///
/// Binary and extension payloads render as hex; non-finite floats render as
/// quoted strings. Consumes exactly one structure from the reader.
pub fn render_as_json(reader: &mut MsgPackReader<'_>, out: &mut dyn Write) -> Result<(), Error> {
    render_value(reader, out, RENDER_DEPTH)
}

fn fmt_err(_: std::fmt::Error) -> Error {
    Error::Io(std::io::Error::other("text sink failed"))
}

fn render_value(
    reader: &mut MsgPackReader<'_>,
    out: &mut dyn Write,
    depth: u32,
) -> Result<(), Error> {
    if depth == 0 {
        return Err(Error::DepthLimitExceeded {
            limit: RENDER_DEPTH,
        });
    }
    match reader.peek_kind()? {
        TokenKind::Null => {
            reader.read_nil()?;
            out.write_str("null").map_err(fmt_err)
        }
        TokenKind::Boolean => {
            let value = reader.read_bool()?;
            out.write_str(if value { "true" } else { "false" })
                .map_err(fmt_err)
        }
        TokenKind::Integer => match reader.read_integer()? {
            Integer::Unsigned(v) => write!(out, "{v}").map_err(fmt_err),
            Integer::Signed(v) => write!(out, "{v}").map_err(fmt_err),
        },
        TokenKind::Float => {
            let value = reader.read_f64()?;
            if value.is_finite() {
                write!(out, "{value}").map_err(fmt_err)
            } else {
                write!(out, "\"{value}\"").map_err(fmt_err)
            }
        }
        TokenKind::String => {
            let text = reader.read_str()?;
            write_escaped(out, &text).map_err(fmt_err)
        }
        TokenKind::Binary => {
            let bytes = reader.read_bin()?;
            out.write_str("\"base16:").map_err(fmt_err)?;
            for byte in bytes.iter() {
                write!(out, "{byte:02x}").map_err(fmt_err)?;
            }
            out.write_char('"').map_err(fmt_err)
        }
        TokenKind::Vector => {
            let count = reader.read_array_header()?;
            out.write_char('[').map_err(fmt_err)?;
            for index in 0..count {
                if index > 0 {
                    out.write_char(',').map_err(fmt_err)?;
                }
                render_value(reader, out, depth - 1)?;
            }
            out.write_char(']').map_err(fmt_err)
        }
        TokenKind::Map => {
            let count = reader.read_map_header()?;
            out.write_char('{').map_err(fmt_err)?;
            for index in 0..count {
                if index > 0 {
                    out.write_char(',').map_err(fmt_err)?;
                }
                // keys that are not strings are rendered, then quoted
                if reader.peek_kind()? == TokenKind::String {
                    let key = reader.read_str()?;
                    write_escaped(out, &key).map_err(fmt_err)?;
                } else {
                    let mut key = String::new();
                    render_value(reader, &mut key, depth - 1)?;
                    write_escaped(out, &key).map_err(fmt_err)?;
                }
                out.write_char(':').map_err(fmt_err)?;
                render_value(reader, out, depth - 1)?;
            }
            out.write_char('}').map_err(fmt_err)
        }
        TokenKind::Extension => {
            let (header, payload) = reader.read_extension()?;
            write!(out, "{{\"$extension\":{},\"payload\":\"", header.type_code)
                .map_err(fmt_err)?;
            for byte in payload.iter() {
                write!(out, "{byte:02x}").map_err(fmt_err)?;
            }
            out.write_str("\"}").map_err(fmt_err)
        }
        TokenKind::Unknown => Err(Error::InvalidValue {
            message: "reserved lead byte 0xc1 in input".to_owned(),
        }),
    }
}

fn write_escaped(out: &mut dyn Write, text: &str) -> std::fmt::Result {
    out.write_char('"')?;
    for c in text.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
