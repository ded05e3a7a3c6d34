//! The converter abstraction every shape compiles down to.

use std::any::Any;

use carapace_msgpack::{MsgPackReader, MsgPackWriter};
use serde_json::Value;

use crate::context::{DeserializationContext, SerializationContext};
use crate::error::Error;

/// Serializes and deserializes instances of one type against the token-level
/// reader/writer façades.
///
/// Converters are composed by the graph builder, cached per serializer, and
/// shared freely across threads.
pub trait Converter<T: 'static>: Send + Sync + 'static {
    /// Write one value as exactly one wire structure.
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error>;

    /// Read one value from exactly one wire structure.
    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error>;

    /// Whether this converter benefits from cooperative element-wise
    /// buffering on the async paths.
    fn prefer_async_serialization(&self) -> bool {
        false
    }

    /// Whether reference preservation is already applied at this layer.
    fn wraps_references(&self) -> bool {
        false
    }

    /// JSON-schema fragment describing this converter's wire shape.
    fn json_schema(&self) -> Value {
        Value::Bool(true)
    }

    /// Element-wise view used by the async driver; `None` means the whole
    /// structure is buffered before decoding.
    fn streamable(&self) -> Option<&dyn SequenceStream<T>> {
        None
    }
}

/// Type-erased accumulator threaded through a [`SequenceStream`].
pub struct SeqAccum(Box<dyn Any + Send>);

impl SeqAccum {
    /// Wrap a concrete accumulator.
    pub fn new(value: impl Any + Send) -> Self {
        Self(Box::new(value))
    }

    /// Borrow the concrete accumulator.
    ///
    /// # Panics
    ///
    /// Panics when the stored type differs; stream implementations always
    /// pass back the accumulator their own `begin` produced.
    pub fn get_mut<A: 'static>(&mut self) -> &mut A {
        self.0
            .downcast_mut::<A>()
            .expect("sequence accumulator type confusion")
    }

    /// Unwrap the concrete accumulator.
    ///
    /// # Panics
    ///
    /// Panics when the stored type differs.
    pub fn take<A: 'static>(self) -> A {
        *self
            .0
            .downcast::<A>()
            .expect("sequence accumulator type confusion")
    }
}

/// Element-wise decoding protocol for collection converters.
///
/// The async driver calls `begin` once the container header is buffered, then
/// buffers `structures_per_element` whole structures before each `element`
/// call, so element reads never see a truncated buffer.
pub trait SequenceStream<T>: Send + Sync {
    /// Wire structures consumed per element (2 for map pairs).
    fn structures_per_element(&self) -> usize {
        1
    }

    /// Read the container header; yields the element count and a fresh
    /// accumulator.
    fn begin(&self, reader: &mut MsgPackReader<'_>) -> Result<(usize, SeqAccum), Error>;

    /// Read one element into the accumulator.
    fn element(
        &self,
        acc: &mut SeqAccum,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<(), Error>;

    /// Turn the accumulator into the finished collection.
    fn finish(&self, acc: SeqAccum) -> Result<T, Error>;
}
