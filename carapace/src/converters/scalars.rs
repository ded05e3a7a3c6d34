//! Leaf converters for primitive and well-known types.

use std::str::FromStr;

use bytes::Bytes;
use carapace_msgpack::{MsgPackReader, MsgPackWriter, TokenKind, primitives};
use serde_json::{Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::shape::{Shape, Shaped};

macro_rules! integer_shapes {
    ($($name:ident: $ty:ty, $read:ident, $write:ident => $wide:ty);+ $(;)?) => {
        $(
            struct $name;

            impl Converter<$ty> for $name {
                fn write(
                    &self,
                    writer: &mut MsgPackWriter<'_>,
                    value: &$ty,
                    _ctx: &mut SerializationContext<'_>,
                ) -> Result<(), Error> {
                    writer.$write(*value as $wide);
                    Ok(())
                }

                fn read(
                    &self,
                    reader: &mut MsgPackReader<'_>,
                    _ctx: &mut DeserializationContext<'_>,
                ) -> Result<$ty, Error> {
                    Ok(reader.$read()?)
                }

                fn json_schema(&self) -> Value {
                    json!({ "type": "integer" })
                }
            }

            impl Shaped for $ty {
                fn shape() -> Shape<$ty> {
                    Shape::converter($name)
                }
            }
        )+
    };
}

integer_shapes! {
    U8Converter: u8, read_u8, write_u64 => u64;
    U16Converter: u16, read_u16, write_u64 => u64;
    U32Converter: u32, read_u32, write_u64 => u64;
    U64Converter: u64, read_u64, write_u64 => u64;
    I8Converter: i8, read_i8, write_i64 => i64;
    I16Converter: i16, read_i16, write_i64 => i64;
    I32Converter: i32, read_i32, write_i64 => i64;
    I64Converter: i64, read_i64, write_i64 => i64;
}

struct BoolConverter;

impl Converter<bool> for BoolConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &bool,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_bool(*value);
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<bool, Error> {
        Ok(reader.read_bool()?)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "boolean" })
    }
}

impl Shaped for bool {
    fn shape() -> Shape<bool> {
        Shape::converter(BoolConverter)
    }
}

struct F32Converter;

impl Converter<f32> for F32Converter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &f32,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_f32(*value);
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<f32, Error> {
        Ok(reader.read_f32()?)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "number" })
    }
}

impl Shaped for f32 {
    fn shape() -> Shape<f32> {
        Shape::converter(F32Converter)
    }
}

struct F64Converter;

impl Converter<f64> for F64Converter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &f64,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_f64(*value);
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<f64, Error> {
        Ok(reader.read_f64()?)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "number" })
    }
}

impl Shaped for f64 {
    fn shape() -> Shape<f64> {
        Shape::converter(F64Converter)
    }
}

struct UnitConverter;

impl Converter<()> for UnitConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        _value: &(),
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_nil();
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<(), Error> {
        Ok(reader.read_nil()?)
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "null" })
    }
}

impl Shaped for () {
    fn shape() -> Shape<()> {
        Shape::converter(UnitConverter)
    }
}

struct CharConverter;

impl Converter<char> for CharConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &char,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        let mut buf = [0u8; 4];
        writer.write_str(value.encode_utf8(&mut buf));
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<char, Error> {
        let s = reader.read_str()?;
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(Error::InvalidValue {
                message: format!("expected a single-character string, found {:?}", s.as_ref()),
            }),
        }
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "minLength": 1, "maxLength": 1 })
    }
}

impl Shaped for char {
    fn shape() -> Shape<char> {
        Shape::converter(CharConverter)
    }
}

struct StringConverter;

impl Converter<String> for StringConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &String,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_str(value);
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<String, Error> {
        Ok(reader.read_str()?.into_owned())
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string" })
    }
}

impl Shaped for String {
    fn shape() -> Shape<String> {
        Shape::converter(StringConverter)
    }
}

/// Raw byte buffers serialize as the `bin` family. The bulk copy is the
/// accelerated path; disabling acceleration falls back to bounded chunked
/// copies between seal checks.
struct BytesConverter;

impl Converter<Bytes> for BytesConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Bytes,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        if ctx.options().disable_acceleration {
            writer.write_bin_header(value.len());
            for chunk in value.chunks(1024) {
                writer.write_raw(chunk);
            }
        } else {
            writer.write_bin(value);
        }
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<Bytes, Error> {
        Ok(Bytes::copy_from_slice(&reader.read_bin()?))
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "contentEncoding": "binary" })
    }
}

impl Shaped for Bytes {
    fn shape() -> Shape<Bytes> {
        Shape::converter(BytesConverter)
    }
}

macro_rules! int128_shapes {
    ($($name:ident: $ty:ty);+ $(;)?) => {
        $(
            /// Compact integer encoding when the value fits in 64 bits, a
            /// decimal string beyond that.
            struct $name;

            impl Converter<$ty> for $name {
                fn write(
                    &self,
                    writer: &mut MsgPackWriter<'_>,
                    value: &$ty,
                    _ctx: &mut SerializationContext<'_>,
                ) -> Result<(), Error> {
                    if let Ok(v) = i64::try_from(*value) {
                        writer.write_i64(v);
                    } else if let Ok(v) = u64::try_from(*value) {
                        writer.write_u64(v);
                    } else {
                        writer.write_str(&value.to_string());
                    }
                    Ok(())
                }

                fn read(
                    &self,
                    reader: &mut MsgPackReader<'_>,
                    _ctx: &mut DeserializationContext<'_>,
                ) -> Result<$ty, Error> {
                    match reader.peek_kind()? {
                        TokenKind::String => {
                            let s = reader.read_str()?;
                            <$ty>::from_str(&s).map_err(|_| Error::InvalidValue {
                                message: format!(
                                    "{:?} is not a valid {}",
                                    s.as_ref(),
                                    stringify!($ty)
                                ),
                            })
                        }
                        _ => {
                            let integer = reader.read_integer()?;
                            Ok(match integer {
                                primitives::Integer::Unsigned(v) => v as $ty,
                                primitives::Integer::Signed(v) => {
                                    <$ty>::try_from(v).map_err(|_| Error::Wire(
                                        carapace_msgpack::Error::IntegerOverflow {
                                            target: stringify!($ty),
                                        },
                                    ))?
                                }
                            })
                        }
                    }
                }

                fn json_schema(&self) -> Value {
                    json!({ "type": ["integer", "string"] })
                }
            }

            impl Shaped for $ty {
                fn shape() -> Shape<$ty> {
                    Shape::converter($name)
                }
            }
        )+
    };
}

int128_shapes! {
    U128Converter: u128;
    I128Converter: i128;
}

struct TimestampConverter;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

impl Converter<jiff::Timestamp> for TimestampConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &jiff::Timestamp,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        let total = value.as_nanosecond();
        let seconds = total.div_euclid(NANOS_PER_SECOND) as i64;
        let nanos = total.rem_euclid(NANOS_PER_SECOND) as u32;
        let ts = carapace_msgpack::Timestamp::new(seconds, nanos)?;
        writer.write_timestamp(ts)?;
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<jiff::Timestamp, Error> {
        let ts = reader.read_timestamp()?;
        let total = ts.seconds() as i128 * NANOS_PER_SECOND + ts.nanos() as i128;
        jiff::Timestamp::from_nanosecond(total).map_err(|err| Error::InvalidValue {
            message: format!("timestamp out of range: {err}"),
        })
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "format": "date-time" })
    }
}

impl Shaped for jiff::Timestamp {
    fn shape() -> Shape<jiff::Timestamp> {
        Shape::converter(TimestampConverter)
    }
}

/// UUIDs travel as 16-byte binary blobs.
struct UuidConverter;

impl Converter<uuid::Uuid> for UuidConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &uuid::Uuid,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_bin(value.as_bytes());
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<uuid::Uuid, Error> {
        let bytes = reader.read_bin()?;
        uuid::Uuid::from_slice(&bytes).map_err(|_| Error::InvalidValue {
            message: format!("expected a 16-byte UUID payload, found {} bytes", bytes.len()),
        })
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "format": "uuid" })
    }
}

impl Shaped for uuid::Uuid {
    fn shape() -> Shape<uuid::Uuid> {
        Shape::converter(UuidConverter)
    }
}

/// Decimals travel inside the configured library extension, payload being
/// their canonical decimal string.
struct DecimalConverter;

impl Converter<rust_decimal::Decimal> for DecimalConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &rust_decimal::Decimal,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        let code = ctx.options().extension_codes.decimal;
        if code < 0 {
            return Err(Error::ReservedExtensionCode { code });
        }
        writer.write_extension(code, value.to_string().as_bytes());
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<rust_decimal::Decimal, Error> {
        let code = ctx.options().extension_codes.decimal;
        let checkpoint = reader.checkpoint();
        let (header, payload) = reader.read_extension()?;
        if header.type_code != code {
            reader.restore(checkpoint);
            return Err(Error::Wire(carapace_msgpack::Error::UnexpectedExtension {
                expected: code,
                actual: header.type_code,
            }));
        }
        let text = core::str::from_utf8(&payload).map_err(|_| Error::InvalidValue {
            message: "decimal payload is not UTF-8".to_owned(),
        })?;
        rust_decimal::Decimal::from_str(text).map_err(|_| Error::InvalidValue {
            message: format!("{text:?} is not a valid decimal"),
        })
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string", "format": "decimal" })
    }
}

impl Shaped for rust_decimal::Decimal {
    fn shape() -> Shape<rust_decimal::Decimal> {
        Shape::converter(DecimalConverter)
    }
}
