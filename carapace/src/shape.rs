//! Type shapes: the structural descriptions the converter graph is built
//! from.
//!
//! A [`Shape`] is supplied per type through the [`Shaped`] trait. Leaf types
//! carry a ready converter; containers defer to a build function; records and
//! unions are described as data and compiled by the graph builder.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter, OutputBuffer, primitives};
use serde_json::Value;

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::provider::GraphBuilder;

/// A type the serializer can resolve a converter for.
pub trait Shaped: Sized + Send + Sync + 'static {
    /// The structural description of `Self`.
    fn shape() -> Shape<Self>;
}

type BuildFn<T> =
    Box<dyn FnOnce(&mut GraphBuilder<'_>) -> Result<Arc<dyn Converter<T>>, Error> + Send>;

pub(crate) enum ShapeKind<T: 'static> {
    Converter(Arc<dyn Converter<T>>),
    Build(BuildFn<T>),
    Record(RecordShape<T>),
    Union(UnionShape<T>),
}

/// Structural description of one type.
pub struct Shape<T: 'static> {
    pub(crate) kind: ShapeKind<T>,
}

impl<T: 'static> Shape<T> {
    /// A shape backed by an explicit converter override.
    pub fn converter(converter: impl Converter<T>) -> Self {
        Self {
            kind: ShapeKind::Converter(Arc::new(converter)),
        }
    }

    /// A shape built on demand with access to the graph builder; containers
    /// use this to resolve their element converters.
    pub fn build_with(
        f: impl FnOnce(&mut GraphBuilder<'_>) -> Result<Arc<dyn Converter<T>>, Error>
        + Send
        + 'static,
    ) -> Self {
        Self {
            kind: ShapeKind::Build(Box::new(f)),
        }
    }

    /// Start describing a record (named properties, optional key indices).
    pub fn record(type_name: &'static str) -> RecordShapeBuilder<T> {
        RecordShapeBuilder {
            type_name,
            properties: Vec::new(),
            construction: None,
            before_serialize: None,
            after_deserialize: None,
        }
    }

    /// Start describing a closed polymorphic union.
    pub fn union(type_name: &'static str) -> UnionShapeBuilder<T> {
        UnionShapeBuilder {
            type_name,
            base: None,
            cases: Vec::new(),
        }
    }

    /// Start describing a unit enum serialized by ordinal or name.
    pub fn unit_enum(type_name: &'static str) -> EnumShapeBuilder<T> {
        EnumShapeBuilder {
            type_name,
            entries: Vec::new(),
        }
    }

    /// A shape that marshals through a surrogate type.
    pub fn surrogate<S: Shaped>(to: fn(&T) -> S, from: fn(S) -> T) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::build_with(move |b| {
            let inner = b.converter_for::<S>()?;
            Ok(Arc::new(crate::converters::SurrogateConverter { inner, to, from })
                as Arc<dyn Converter<T>>)
        })
    }

    pub(crate) fn into_converter(
        self,
        b: &mut GraphBuilder<'_>,
    ) -> Result<Arc<dyn Converter<T>>, Error> {
        match self.kind {
            ShapeKind::Converter(converter) => Ok(converter),
            ShapeKind::Build(f) => f(b),
            ShapeKind::Record(shape) => crate::converters::records::build_record(shape, b),
            ShapeKind::Union(shape) => crate::converters::unions::build_union(shape, b),
        }
    }
}

/// Whether a property counts as a value or a reference for the
/// default-values policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyKind {
    /// Scalar-like payloads.
    #[default]
    Value,
    /// Shared or heap-identity payloads.
    Reference,
}

/// One record property: typed accessors plus serialization metadata.
pub struct Property<T, E> {
    name: &'static str,
    get: fn(&T) -> &E,
    set: Option<fn(&mut T, E)>,
    key_index: Option<u32>,
    required: bool,
    kind: PropertyKind,
    is_default: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    make_default: Option<Arc<dyn Fn() -> E + Send + Sync>>,
}

impl<T, E> Property<T, E> {
    /// A settable property.
    pub fn new(name: &'static str, get: fn(&T) -> &E, set: fn(&mut T, E)) -> Self {
        Self {
            name,
            get,
            set: Some(set),
            key_index: None,
            required: false,
            kind: PropertyKind::default(),
            is_default: None,
            make_default: None,
        }
    }

    /// A property that serializes but cannot be written back.
    pub fn readonly(name: &'static str, get: fn(&T) -> &E) -> Self {
        Self {
            name,
            get,
            set: None,
            key_index: None,
            required: false,
            kind: PropertyKind::default(),
            is_default: None,
            make_default: None,
        }
    }

    /// Assign an integer key; any keyed property switches the record to the
    /// array scheme.
    pub fn key(mut self, index: u32) -> Self {
        self.key_index = Some(index);
        self
    }

    /// Mark the property required: its absence on the wire is an error.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark the property reference-kind for the default-values policy.
    pub fn reference_kind(mut self) -> Self {
        self.kind = PropertyKind::Reference;
        self
    }

    /// Declare the property's default: equal values can be elided on write
    /// per the default-values policy, and absence on read produces this
    /// value.
    pub fn with_default(mut self, value: E) -> Self
    where
        E: Clone + PartialEq + Send + Sync + 'static,
    {
        let probe = value.clone();
        self.is_default = Some(Arc::new(move |candidate| *candidate == probe));
        self.make_default = Some(Arc::new(move || value.clone()));
        self
    }
}

pub(crate) type WritePropFn<T> = Box<
    dyn Fn(&T, &mut MsgPackWriter<'_>, &mut SerializationContext<'_>) -> Result<(), Error>
        + Send
        + Sync,
>;
pub(crate) type ReadIntoFn<T> = Box<
    dyn Fn(&mut T, &mut MsgPackReader<'_>, &mut DeserializationContext<'_>) -> Result<(), Error>
        + Send
        + Sync,
>;
pub(crate) type ReadSlotFn = Box<
    dyn Fn(&mut MsgPackReader<'_>, &mut DeserializationContext<'_>) -> Result<Box<dyn Any + Send>, Error>
        + Send
        + Sync,
>;
pub(crate) type ApplySlotFn<T> =
    Box<dyn Fn(&mut T, Box<dyn Any + Send>) -> Result<(), Error> + Send + Sync>;
pub(crate) type MakeSlotFn = Box<dyn Fn() -> Box<dyn Any + Send> + Send + Sync>;

/// A property compiled against its element converter.
pub(crate) struct BoundProperty<T> {
    pub(crate) name: &'static str,
    pub(crate) key_index: Option<u32>,
    pub(crate) required: bool,
    pub(crate) write_value: WritePropFn<T>,
    pub(crate) read_into: Option<ReadIntoFn<T>>,
    pub(crate) read_slot: ReadSlotFn,
    pub(crate) apply_slot: Option<ApplySlotFn<T>>,
    pub(crate) fill_default_slot: Option<MakeSlotFn>,
    pub(crate) should_serialize: Box<dyn Fn(&T) -> bool + Send + Sync>,
    pub(crate) schema: Value,
}

pub(crate) trait PropertyDef<T>: Send + Sync {
    fn key_index(&self) -> Option<u32>;
    fn bind(&self, index: usize, b: &mut GraphBuilder<'_>) -> Result<BoundProperty<T>, Error>;
}

impl<T: 'static, E: Shaped> PropertyDef<T> for Property<T, E> {
    fn key_index(&self) -> Option<u32> {
        self.key_index
    }

    fn bind(&self, index: usize, b: &mut GraphBuilder<'_>) -> Result<BoundProperty<T>, Error> {
        use crate::options::DefaultValuesPolicy;

        let converter = b.converter_for::<E>()?;
        let get = self.get;

        let skip_if_default = match b.options().serialize_default_values {
            DefaultValuesPolicy::Always => false,
            DefaultValuesPolicy::ValueTypesOnly => self.kind == PropertyKind::Reference,
            DefaultValuesPolicy::ReferenceTypesOnly => self.kind == PropertyKind::Value,
            DefaultValuesPolicy::RequiredOnly => !self.required,
            DefaultValuesPolicy::Never => true,
        };
        let should_serialize: Box<dyn Fn(&T) -> bool + Send + Sync> =
            match (skip_if_default, self.is_default.clone()) {
                (true, Some(is_default)) => Box::new(move |value| !is_default(get(value))),
                _ => Box::new(|_| true),
            };

        let write_value: WritePropFn<T> = {
            let converter = converter.clone();
            Box::new(
                move |value: &T,
                      writer: &mut MsgPackWriter<'_>,
                      ctx: &mut SerializationContext<'_>| {
                    converter.write(writer, get(value), ctx)
                },
            )
        };
        let read_into: Option<ReadIntoFn<T>> = self.set.map(|set| {
            let converter = converter.clone();
            Box::new(
                move |value: &mut T,
                      reader: &mut MsgPackReader<'_>,
                      ctx: &mut DeserializationContext<'_>| {
                    set(value, converter.read(reader, ctx)?);
                    Ok(())
                },
            ) as ReadIntoFn<T>
        });
        let read_slot: ReadSlotFn = {
            let converter = converter.clone();
            Box::new(
                move |reader: &mut MsgPackReader<'_>, ctx: &mut DeserializationContext<'_>| {
                    Ok(Box::new(converter.read(reader, ctx)?) as Box<dyn Any + Send>)
                },
            )
        };
        let apply_slot: Option<ApplySlotFn<T>> = self.set.map(|set| {
            Box::new(move |value: &mut T, slot: Box<dyn Any + Send>| {
                let element = slot
                    .downcast::<E>()
                    .map_err(|_| Error::ArgumentTypeMismatch { index })?;
                set(value, *element);
                Ok(())
            }) as ApplySlotFn<T>
        });
        let fill_default_slot: Option<MakeSlotFn> = self.make_default.clone().map(|make| {
            Box::new(move || Box::new(make()) as Box<dyn Any + Send>) as MakeSlotFn
        });

        Ok(BoundProperty {
            name: self.name,
            key_index: self.key_index,
            required: self.required,
            write_value,
            read_into,
            read_slot,
            apply_slot,
            fill_default_slot,
            should_serialize,
            schema: converter.json_schema(),
        })
    }
}

/// How a record comes into existence during deserialization.
pub(crate) enum Construction<T> {
    /// Default-construct, then apply settable properties.
    Mutate(Box<dyn Fn() -> T + Send + Sync>),
    /// Fill an [`ArgumentState`], then invoke a constructor.
    Ctor(Box<dyn Fn(&mut ArgumentState) -> Result<T, Error> + Send + Sync>),
}

/// Typed constructor-argument slots, indexed by property declaration order.
pub struct ArgumentState {
    slots: Vec<Option<Box<dyn Any + Send>>>,
}

impl ArgumentState {
    pub(crate) fn with_len(len: usize) -> Self {
        let mut slots = Vec::with_capacity(len);
        slots.resize_with(len, || None);
        Self { slots }
    }

    /// Whether the slot at `index` was filled from the wire or a default.
    pub fn is_present(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Remove and downcast the slot at `index`.
    pub fn take<E: 'static>(&mut self, index: usize) -> Result<E, Error> {
        let Some(slot) = self.slots.get_mut(index) else {
            return Err(Error::MissingArgument { index });
        };
        let Some(boxed) = slot.take() else {
            return Err(Error::MissingArgument { index });
        };
        boxed
            .downcast::<E>()
            .map(|boxed| *boxed)
            .map_err(|_| Error::ArgumentTypeMismatch { index })
    }

    pub(crate) fn put(&mut self, index: usize, value: Box<dyn Any + Send>) {
        self.slots[index] = Some(value);
    }

    pub(crate) fn take_boxed(&mut self, index: usize) -> Option<Box<dyn Any + Send>> {
        self.slots.get_mut(index).and_then(|slot| slot.take())
    }
}

pub(crate) struct RecordShape<T: 'static> {
    pub(crate) type_name: &'static str,
    pub(crate) properties: Vec<Box<dyn PropertyDef<T>>>,
    pub(crate) construction: Option<Construction<T>>,
    pub(crate) before_serialize: Option<fn(&T)>,
    pub(crate) after_deserialize: Option<fn(&mut T)>,
}

/// Builder for record shapes.
pub struct RecordShapeBuilder<T: 'static> {
    type_name: &'static str,
    properties: Vec<Box<dyn PropertyDef<T>>>,
    construction: Option<Construction<T>>,
    before_serialize: Option<fn(&T)>,
    after_deserialize: Option<fn(&mut T)>,
}

impl<T: 'static> RecordShapeBuilder<T> {
    /// Declare a property. Declaration order is the constructor-argument
    /// order and, for unkeyed records, the map entry order.
    pub fn property<E: Shaped>(mut self, property: Property<T, E>) -> Self {
        self.properties.push(Box::new(property));
        self
    }

    /// Deserialize by default construction plus property mutation.
    pub fn construct_default(self) -> Self
    where
        T: Default,
    {
        self.construct_with(T::default)
    }

    /// Deserialize by invoking `make` and then mutating properties.
    pub fn construct_with(mut self, make: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.construction = Some(Construction::Mutate(Box::new(make)));
        self
    }

    /// Deserialize through a non-default constructor fed from an
    /// [`ArgumentState`]; slots are indexed by property declaration order.
    pub fn construct(
        mut self,
        ctor: impl Fn(&mut ArgumentState) -> Result<T, Error> + Send + Sync + 'static,
    ) -> Self {
        self.construction = Some(Construction::Ctor(Box::new(ctor)));
        self
    }

    /// Callback invoked once before a value is serialized.
    pub fn before_serialize(mut self, callback: fn(&T)) -> Self {
        self.before_serialize = Some(callback);
        self
    }

    /// Callback invoked once after a value is deserialized.
    pub fn after_deserialize(mut self, callback: fn(&mut T)) -> Self {
        self.after_deserialize = Some(callback);
        self
    }

    /// Finish the record description.
    pub fn build(self) -> Shape<T> {
        Shape {
            kind: ShapeKind::Record(RecordShape {
                type_name: self.type_name,
                properties: self.properties,
                construction: self.construction,
                before_serialize: self.before_serialize,
                after_deserialize: self.after_deserialize,
            }),
        }
    }
}

/// Wire tag identifying a union case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnionAlias {
    /// Integer alias.
    Int(i64),
    /// String alias.
    Str(&'static str),
}

impl fmt::Display for UnionAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnionAlias::Int(v) => write!(f, "{v}"),
            UnionAlias::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for UnionAlias {
    fn from(v: i64) -> Self {
        UnionAlias::Int(v)
    }
}

impl From<i32> for UnionAlias {
    fn from(v: i32) -> Self {
        UnionAlias::Int(v as i64)
    }
}

impl From<&'static str> for UnionAlias {
    fn from(v: &'static str) -> Self {
        UnionAlias::Str(v)
    }
}

pub(crate) type ReadCaseFn<T> = Box<
    dyn Fn(&mut MsgPackReader<'_>, &mut DeserializationContext<'_>) -> Result<T, Error>
        + Send
        + Sync,
>;

/// A union case compiled against its payload converter.
pub(crate) struct BoundUnionCase<T> {
    pub(crate) alias: UnionAlias,
    pub(crate) alias_token: Vec<u8>,
    pub(crate) matches: Box<dyn Fn(&T) -> bool + Send + Sync>,
    pub(crate) write_payload: WritePropFn<T>,
    pub(crate) read: ReadCaseFn<T>,
    pub(crate) schema: Value,
}

pub(crate) trait UnionCaseDef<T>: Send + Sync {
    fn alias(&self) -> UnionAlias;
    fn bind(
        &self,
        type_name: &'static str,
        b: &mut GraphBuilder<'_>,
    ) -> Result<BoundUnionCase<T>, Error>;
}

struct UnionCase<T, P> {
    alias: UnionAlias,
    project: fn(&T) -> Option<&P>,
    inject: fn(P) -> T,
}

impl<T: 'static, P: Shaped> UnionCaseDef<T> for UnionCase<T, P> {
    fn alias(&self) -> UnionAlias {
        self.alias
    }

    fn bind(
        &self,
        type_name: &'static str,
        b: &mut GraphBuilder<'_>,
    ) -> Result<BoundUnionCase<T>, Error> {
        let converter = b.converter_for::<P>()?;
        let project = self.project;
        let inject = self.inject;

        // pre-encode the alias as finished token bytes
        let mut token = OutputBuffer::new();
        match self.alias {
            UnionAlias::Int(v) => primitives::write_int(&mut token, v),
            UnionAlias::Str(s) => {
                let allow_str8 = !b.options().old_spec_compatibility;
                primitives::write_str_header(&mut token, s.len() as u32, allow_str8);
                token.put_slice(s.as_bytes());
            }
        }

        let matches: Box<dyn Fn(&T) -> bool + Send + Sync> =
            Box::new(move |value| project(value).is_some());
        let write_payload: WritePropFn<T> = {
            let converter = converter.clone();
            Box::new(
                move |value: &T,
                      writer: &mut MsgPackWriter<'_>,
                      ctx: &mut SerializationContext<'_>| {
                    match project(value) {
                        Some(payload) => converter.write(writer, payload, ctx),
                        None => Err(Error::UnregisteredUnionCase { type_name }),
                    }
                },
            )
        };
        let read: ReadCaseFn<T> = {
            let converter = converter.clone();
            Box::new(
                move |reader: &mut MsgPackReader<'_>, ctx: &mut DeserializationContext<'_>| {
                    Ok(inject(converter.read(reader, ctx)?))
                },
            )
        };

        Ok(BoundUnionCase {
            alias: self.alias,
            alias_token: token.into_vec(),
            matches,
            write_payload,
            read,
            schema: converter.json_schema(),
        })
    }
}

pub(crate) struct UnionShape<T: 'static> {
    pub(crate) type_name: &'static str,
    pub(crate) base: Option<Box<Shape<T>>>,
    pub(crate) cases: Vec<Box<dyn UnionCaseDef<T>>>,
}

/// Builder for closed polymorphic unions: `[alias, payload]` envelopes over a
/// declared set of cases.
pub struct UnionShapeBuilder<T: 'static> {
    type_name: &'static str,
    base: Option<Box<Shape<T>>>,
    cases: Vec<Box<dyn UnionCaseDef<T>>>,
}

impl<T: 'static> UnionShapeBuilder<T> {
    /// Declare a case. `project` recognizes (and borrows the payload of)
    /// values belonging to this case; `inject` rebuilds the value from a
    /// payload. Cases match in declaration order.
    pub fn case<P: Shaped>(
        mut self,
        alias: impl Into<UnionAlias>,
        project: fn(&T) -> Option<&P>,
        inject: fn(P) -> T,
    ) -> Self {
        self.cases.push(Box::new(UnionCase {
            alias: alias.into(),
            project,
            inject,
        }));
        self
    }

    /// Declare the nil-alias base representation, used when a value matches
    /// no case.
    pub fn base(mut self, shape: Shape<T>) -> Self {
        self.base = Some(Box::new(shape));
        self
    }

    /// Finish the union description.
    pub fn build(self) -> Shape<T> {
        Shape {
            kind: ShapeKind::Union(UnionShape {
                type_name: self.type_name,
                base: self.base,
                cases: self.cases,
            }),
        }
    }
}

pub(crate) struct EnumEntry<T> {
    pub(crate) name: &'static str,
    pub(crate) ordinal: i64,
    pub(crate) value: T,
}

/// Builder for unit enums: entries carry a name, an ordinal, and the value
/// itself.
pub struct EnumShapeBuilder<T> {
    type_name: &'static str,
    entries: Vec<EnumEntry<T>>,
}

impl<T> EnumShapeBuilder<T> {
    /// Declare one enum entry.
    pub fn entry(mut self, name: &'static str, ordinal: i64, value: T) -> Self {
        self.entries.push(EnumEntry {
            name,
            ordinal,
            value,
        });
        self
    }

    /// Finish the enum description.
    pub fn build(self) -> Shape<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
    {
        let type_name = self.type_name;
        let entries = self.entries;
        Shape::build_with(move |b| {
            crate::converters::enums::build_enum(type_name, entries, b)
        })
    }
}
