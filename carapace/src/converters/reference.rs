//! Smart-pointer converters and reference preservation.

use std::any::Any;
use std::collections::HashSet;
use std::sync::Arc;

use carapace_msgpack::{DecodeResult, MsgPackReader, MsgPackWriter, primitives};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::shape::{Shape, Shaped};

struct BoxConverter<T> {
    inner: Arc<dyn Converter<T>>,
}

impl<T: Send + Sync + 'static> Converter<Box<T>> for BoxConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Box<T>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        self.inner.write(writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<Box<T>, Error> {
        Ok(Box::new(self.inner.read(reader, ctx)?))
    }

    fn json_schema(&self) -> Value {
        self.inner.json_schema()
    }
}

impl<T: Shaped> Shaped for Box<T> {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            Ok(Arc::new(BoxConverter {
                inner: b.converter_for::<T>()?,
            }) as Arc<dyn Converter<Self>>)
        })
    }
}

struct ArcConverter<T> {
    inner: Arc<dyn Converter<T>>,
}

impl<T: Send + Sync + 'static> Converter<Arc<T>> for ArcConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Arc<T>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        self.inner.write(writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<Arc<T>, Error> {
        Ok(Arc::new(self.inner.read(reader, ctx)?))
    }

    fn json_schema(&self) -> Value {
        self.inner.json_schema()
    }
}

/// Wraps a shared-pointer converter with identity tracking.
///
/// Outbound, a value seen before in the same call becomes a back-reference
/// extension whose payload is the previously assigned id as a compact
/// integer. Inbound, ids are reserved before contents are read so they line
/// up with the writer's first-encounter order.
struct ReferencePreservingConverter<T> {
    type_code: i8,
    inner: Arc<dyn Converter<Arc<T>>>,
}

impl<T: Send + Sync + 'static> Converter<Arc<T>> for ReferencePreservingConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Arc<T>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        let identity = Arc::as_ptr(value) as usize;
        if let Some(tracker) = ctx.refs_mut() {
            if let Some(id) = tracker.existing_id(identity) {
                let (buf, len) = primitives::encoded_uint(id as u64);
                writer.write_extension(self.type_code, &buf[..len]);
                return Ok(());
            }
            tracker.assign(identity);
        }
        self.inner.write(writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<Arc<T>, Error> {
        let back_reference = ctx.refs_mut().is_some()
            && matches!(
                reader.try_peek_ext_header(),
                DecodeResult::Success(header) if header.type_code == self.type_code
            );
        if back_reference {
            let (_, payload) = reader.read_extension()?;
            let id = match primitives::read_integer(&payload) {
                DecodeResult::Success(decoded) => decoded.value.to_u32().map_err(Error::Wire)?,
                _ => {
                    return Err(Error::InvalidValue {
                        message: "malformed back-reference payload".to_owned(),
                    });
                }
            };
            let Some(tracker) = ctx.refs_mut() else {
                unreachable!("back-reference recognized without a tracker");
            };
            let value = tracker.get(id)?;
            return value
                .downcast::<T>()
                .map_err(|_| Error::ReferenceTypeMismatch { id });
        }

        let slot = ctx.refs_mut().map(|tracker| tracker.reserve());
        let value = self.inner.read(reader, ctx)?;
        if let Some(slot) = slot {
            if let Some(tracker) = ctx.refs_mut() {
                tracker.fulfill(slot, value.clone() as Arc<dyn Any + Send + Sync>);
            }
        }
        Ok(value)
    }

    fn wraps_references(&self) -> bool {
        true
    }

    fn json_schema(&self) -> Value {
        self.inner.json_schema()
    }
}

impl<T: Shaped> Shaped for Arc<T> {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            let plain = Arc::new(ArcConverter {
                inner: b.converter_for::<T>()?,
            });
            if b.options().preserve_references {
                let code = b.options().extension_codes.reference;
                if code < 0 {
                    return Err(Error::ReservedExtensionCode { code });
                }
                Ok(Arc::new(ReferencePreservingConverter {
                    type_code: code,
                    inner: plain,
                }) as Arc<dyn Converter<Self>>)
            } else {
                Ok(plain as Arc<dyn Converter<Self>>)
            }
        })
    }
}

/// Shared strings; interning is enabled by option and scoped to this
/// converter instance (one per serializer).
struct ArcStrConverter {
    intern: Option<Mutex<HashSet<Arc<str>>>>,
}

impl Converter<Arc<str>> for ArcStrConverter {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Arc<str>,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_str(value);
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<Arc<str>, Error> {
        let text = reader.read_str()?;
        match &self.intern {
            None => Ok(Arc::from(text.as_ref())),
            Some(pool) => {
                let mut pool = pool.lock();
                if let Some(existing) = pool.get(text.as_ref()) {
                    Ok(existing.clone())
                } else {
                    let fresh: Arc<str> = Arc::from(text.as_ref());
                    pool.insert(fresh.clone());
                    Ok(fresh)
                }
            }
        }
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "string" })
    }
}

impl Shaped for Arc<str> {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            let intern = b
                .options()
                .intern_strings
                .then(|| Mutex::new(HashSet::new()));
            Ok(Arc::new(ArcStrConverter { intern }) as Arc<dyn Converter<Self>>)
        })
    }
}
