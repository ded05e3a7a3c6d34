//! Converter implementations composed by the graph builder.

pub(crate) mod collections;
pub(crate) mod enums;
pub(crate) mod records;
pub(crate) mod reference;
pub(crate) mod scalars;
pub(crate) mod unions;

use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter};
use serde_json::Value;

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;

pub use collections::MdArray;

/// Marshals a value through a surrogate type and that type's converter.
pub(crate) struct SurrogateConverter<T, S> {
    pub(crate) inner: Arc<dyn Converter<S>>,
    pub(crate) to: fn(&T) -> S,
    pub(crate) from: fn(S) -> T,
}

impl<T: 'static, S: 'static> Converter<T> for SurrogateConverter<T, S> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            let surrogate = (self.to)(value);
            self.inner.write(writer, &surrogate, ctx)
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        ctx.descend(|ctx| Ok((self.from)(self.inner.read(reader, ctx)?)))
    }

    fn json_schema(&self) -> Value {
        self.inner.json_schema()
    }
}
