#![warn(missing_docs)]

//! Shape-driven MessagePack serialization.
//!
//! `carapace` builds a reusable converter graph from structural type
//! descriptions ([`Shaped`]/[`Shape`]) and binds it to the MessagePack wire
//! format through the token-level façades of `carapace-msgpack`. The graph
//! handles records in both map and array schemes, collections, unions over a
//! closed set of aliased cases, optional reference preservation for shared
//! values, and streaming/resumable decoding over async byte sources.
//!
//! ```
//! use carapace::{Property, Shape, Shaped};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Person {
//!     name: String,
//!     age: u32,
//! }
//!
//! impl Shaped for Person {
//!     fn shape() -> Shape<Self> {
//!         Shape::record("Person")
//!             .property(Property::new("name", |p: &Person| &p.name, |p, v| p.name = v))
//!             .property(Property::new("age", |p: &Person| &p.age, |p, v| p.age = v))
//!             .construct_default()
//!             .build()
//!     }
//! }
//!
//! let ada = Person { name: "Ada".into(), age: 36 };
//! let bytes = carapace::to_vec(&ada).unwrap();
//! let back: Person = carapace::from_slice(&bytes).unwrap();
//! assert_eq!(ada, back);
//! ```

mod aio;
mod context;
mod converter;
mod converters;
mod error;
mod json;
mod options;
mod provider;
mod shape;

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

pub use carapace_msgpack as msgpack;
pub use carapace_msgpack::{
    ByteSequence, MsgPackReader, MsgPackWriter, OutputBuffer, SkipProgress, Timestamp, TokenKind,
};

pub use aio::{AsyncMsgPackReader, AsyncMsgPackWriter, CancellationToken};
pub use context::{DeserializationContext, SerializationContext};
pub use converter::{Converter, SeqAccum, SequenceStream};
pub use converters::MdArray;
pub use error::Error;
pub use json::render_as_json;
pub use options::{
    DefaultValuesPolicy, ExtensionCodes, MultiDimFormat, NameCase, SerializerOptions,
};
pub use provider::{ConverterProvider, GraphBuilder};
pub use shape::{
    ArgumentState, EnumShapeBuilder, Property, PropertyKind, RecordShapeBuilder, Shape, Shaped,
    UnionAlias, UnionShapeBuilder,
};

use carapace_msgpack::{Formatter, MSGPACK_FORMATTER, OLD_SPEC_FORMATTER};
use context::TrackerPool;

/// The serialization engine: options, converter cache, and tracker pool.
///
/// Cheap to construct per option set; converters are cached on the instance,
/// so keep one serializer around per configuration.
pub struct MsgPackSerializer {
    options: Arc<SerializerOptions>,
    provider: ConverterProvider,
    pool: TrackerPool,
}

impl Default for MsgPackSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl MsgPackSerializer {
    /// A serializer with default options.
    pub fn new() -> Self {
        Self::with_options(SerializerOptions::default())
    }

    /// A serializer with explicit options.
    pub fn with_options(options: SerializerOptions) -> Self {
        let options = Arc::new(options);
        Self {
            provider: ConverterProvider::new(options.clone()),
            options,
            pool: TrackerPool::default(),
        }
    }

    /// The options this serializer was built with.
    pub fn options(&self) -> &SerializerOptions {
        &self.options
    }

    fn formatter(&self) -> &'static dyn Formatter {
        if self.options.old_spec_compatibility {
            &OLD_SPEC_FORMATTER
        } else {
            &MSGPACK_FORMATTER
        }
    }

    /// Serialize one value as one top-level structure.
    pub fn serialize<T: Shaped>(&self, value: &T) -> Result<Vec<u8>, Error> {
        self.options.extension_codes.validate()?;
        let converter = self.provider.get::<T>()?;
        let mut out = OutputBuffer::new();
        {
            let mut writer = MsgPackWriter::with_formatter(&mut out, self.formatter());
            let mut ctx = SerializationContext::new(&self.options, &self.pool);
            converter.write(&mut writer, value, &mut ctx)?;
        }
        Ok(out.into_vec())
    }

    /// Deserialize one value, consuming exactly one top-level structure;
    /// trailing bytes are left alone.
    pub fn deserialize<T: Shaped>(&self, bytes: &[u8]) -> Result<T, Error> {
        let seq = ByteSequence::from_slice(bytes);
        let mut reader = MsgPackReader::new(&seq);
        self.deserialize_from(&mut reader)
    }

    /// Deserialize one value from an existing reader, advancing it past
    /// exactly one structure.
    pub fn deserialize_from<T: Shaped>(&self, reader: &mut MsgPackReader<'_>) -> Result<T, Error> {
        self.options.extension_codes.validate()?;
        let converter = self.provider.get::<T>()?;
        let mut ctx = DeserializationContext::new(&self.options, &self.pool);
        converter.read(reader, &mut ctx)
    }

    /// Serialize one value into an async sink, flushing sealed chunks
    /// cooperatively and honoring cancellation between chunks.
    pub async fn serialize_async<T, S>(
        &self,
        value: &T,
        sink: S,
        cancel: &CancellationToken,
    ) -> Result<(), Error>
    where
        T: Shaped,
        S: AsyncWrite + Unpin,
    {
        self.options.extension_codes.validate()?;
        let converter = self.provider.get::<T>()?;
        let mut sink = AsyncMsgPackWriter::with_formatter(sink, self.formatter(), cancel.clone());
        {
            let mut ctx = SerializationContext::new(&self.options, &self.pool);
            let mut writer = sink.writer();
            converter.write(&mut writer, value, &mut ctx)?;
        }
        sink.finish().await
    }

    /// Deserialize one value from an async pull source, buffering only as
    /// much as each structure needs. Collection converters stream
    /// element-by-element; everything else buffers one whole structure.
    pub async fn deserialize_async<T, S>(
        &self,
        source: S,
        cancel: &CancellationToken,
    ) -> Result<T, Error>
    where
        T: Shaped,
        S: AsyncRead + Unpin,
    {
        self.options.extension_codes.validate()?;
        let converter = self.provider.get::<T>()?;
        let mut areader = AsyncMsgPackReader::new(source, cancel.clone());
        let mut ctx = DeserializationContext::new(&self.options, &self.pool);

        if let Some(stream) = converter.streamable() {
            let (count, mut acc) = loop {
                let mut reader = areader.reader();
                match stream.begin(&mut reader) {
                    Ok(begun) => {
                        let position = reader.position();
                        areader.commit(position);
                        break begun;
                    }
                    Err(Error::Wire(carapace_msgpack::Error::EndOfStream { position })) => {
                        if areader.fetch_more().await? == 0 {
                            return Err(Error::Wire(carapace_msgpack::Error::EndOfStream {
                                position,
                            }));
                        }
                    }
                    Err(err) => return Err(err),
                }
            };
            for _ in 0..count {
                for _ in 0..stream.structures_per_element() {
                    areader.buffer_next_structure().await?;
                }
                let mut reader = areader.reader();
                stream.element(&mut acc, &mut reader, &mut ctx)?;
                let position = reader.position();
                areader.commit(position);
                areader.trim();
            }
            stream.finish(acc)
        } else {
            areader.buffer_next_structure().await?;
            let mut reader = areader.reader();
            converter.read(&mut reader, &mut ctx)
        }
    }

    /// The JSON-schema fragment for `T`'s wire form, assembled from the
    /// converter graph.
    pub fn json_schema<T: Shaped>(&self) -> Result<serde_json::Value, Error> {
        Ok(self.provider.get::<T>()?.json_schema())
    }
}

/// Serialize with default options.
pub fn to_vec<T: Shaped>(value: &T) -> Result<Vec<u8>, Error> {
    MsgPackSerializer::new().serialize(value)
}

/// Deserialize with default options.
pub fn from_slice<T: Shaped>(bytes: &[u8]) -> Result<T, Error> {
    MsgPackSerializer::new().deserialize(bytes)
}
