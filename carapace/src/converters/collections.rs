//! Converters for enumerables, dictionaries, and nullable values.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::marker::PhantomData;
use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter, TokenKind};
use serde_json::{Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::{Converter, SeqAccum, SequenceStream};
use crate::error::Error;
use crate::options::MultiDimFormat;
use crate::shape::{Shape, Shaped};

/// Caps the lower size hint a `collect` sees, so a hostile length header
/// cannot force a huge up-front allocation. Each element needs at least one
/// wire byte, so the bytes remaining bound the element count.
struct ClampedHint<I> {
    inner: I,
    cap: usize,
}

impl<I: Iterator> Iterator for ClampedHint<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lower, upper) = self.inner.size_hint();
        (lower.min(self.cap), upper)
    }
}

struct NullableConverter<E> {
    inner: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync + 'static> Converter<Option<E>> for NullableConverter<E> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &Option<E>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        match value {
            Some(inner) => self.inner.write(writer, inner, ctx),
            None => {
                writer.write_nil();
                Ok(())
            }
        }
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<Option<E>, Error> {
        if reader.peek_kind()? == TokenKind::Null {
            reader.read_nil()?;
            Ok(None)
        } else {
            Ok(Some(self.inner.read(reader, ctx)?))
        }
    }

    fn json_schema(&self) -> Value {
        json!({ "anyOf": [self.inner.json_schema(), { "type": "null" }] })
    }
}

impl<E: Shaped> Shaped for Option<E> {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            Ok(Arc::new(NullableConverter {
                inner: b.converter_for::<E>()?,
            }) as Arc<dyn Converter<Self>>)
        })
    }
}

/// Array-encoded enumerable collected through `FromIterator`.
pub(crate) struct CollectConverter<C, E> {
    element: Arc<dyn Converter<E>>,
    _marker: PhantomData<fn() -> C>,
}

impl<C, E> Converter<C> for CollectConverter<C, E>
where
    C: FromIterator<E> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = &'a E>,
    E: Send + 'static,
{
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &C,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            writer.write_array_header(value.into_iter().count());
            for item in value {
                self.element.write(writer, item, ctx)?;
            }
            Ok(())
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<C, Error> {
        ctx.descend(|ctx| {
            let count = reader.read_array_header()?;
            let cap = reader.remaining();
            ClampedHint {
                inner: (0..count).map(|_| self.element.read(reader, ctx)),
                cap,
            }
            .collect()
        })
    }

    fn prefer_async_serialization(&self) -> bool {
        true
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "array", "items": self.element.json_schema() })
    }

    fn streamable(&self) -> Option<&dyn SequenceStream<C>> {
        Some(self)
    }
}

impl<C, E> SequenceStream<C> for CollectConverter<C, E>
where
    C: FromIterator<E> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = &'a E>,
    E: Send + 'static,
{
    fn begin(&self, reader: &mut MsgPackReader<'_>) -> Result<(usize, SeqAccum), Error> {
        let count = reader.read_array_header()?;
        Ok((count, SeqAccum::new(Vec::<E>::new())))
    }

    fn element(
        &self,
        acc: &mut SeqAccum,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<(), Error> {
        let items = acc.get_mut::<Vec<E>>();
        items.push(self.element.read(reader, ctx)?);
        Ok(())
    }

    fn finish(&self, acc: SeqAccum) -> Result<C, Error> {
        Ok(acc.take::<Vec<E>>().into_iter().collect())
    }
}

fn collect_shape<C, E>() -> Shape<C>
where
    C: FromIterator<E> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = &'a E>,
    E: Shaped,
{
    Shape::build_with(|b| {
        Ok(Arc::new(CollectConverter::<C, E> {
            element: b.converter_for::<E>()?,
            _marker: PhantomData,
        }) as Arc<dyn Converter<C>>)
    })
}

impl<E: Shaped> Shaped for Vec<E> {
    fn shape() -> Shape<Self> {
        collect_shape::<Self, E>()
    }
}

impl<E: Shaped> Shaped for Box<[E]> {
    fn shape() -> Shape<Self> {
        collect_shape::<Self, E>()
    }
}

impl<E: Shaped + Eq + Hash> Shaped for HashSet<E> {
    fn shape() -> Shape<Self> {
        collect_shape::<Self, E>()
    }
}

impl<E: Shaped + Ord> Shaped for BTreeSet<E> {
    fn shape() -> Shape<Self> {
        collect_shape::<Self, E>()
    }
}

struct ArrayConverter<E, const N: usize> {
    element: Arc<dyn Converter<E>>,
}

impl<E: Send + Sync + 'static, const N: usize> Converter<[E; N]> for ArrayConverter<E, N> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &[E; N],
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            writer.write_array_header(N);
            for item in value {
                self.element.write(writer, item, ctx)?;
            }
            Ok(())
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<[E; N], Error> {
        ctx.descend(|ctx| {
            let count = reader.read_array_header()?;
            if count != N {
                return Err(Error::ArrayLengthMismatch {
                    expected: N,
                    actual: count,
                });
            }
            let mut items = Vec::with_capacity(N);
            for _ in 0..N {
                items.push(self.element.read(reader, ctx)?);
            }
            match <[E; N]>::try_from(items) {
                Ok(array) => Ok(array),
                Err(_) => unreachable!("length was checked above"),
            }
        })
    }

    fn json_schema(&self) -> Value {
        json!({
            "type": "array",
            "items": self.element.json_schema(),
            "minItems": N,
            "maxItems": N,
        })
    }
}

impl<E: Shaped, const N: usize> Shaped for [E; N] {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            Ok(Arc::new(ArrayConverter::<E, N> {
                element: b.converter_for::<E>()?,
            }) as Arc<dyn Converter<Self>>)
        })
    }
}

/// Map-encoded dictionary collected through `FromIterator`.
pub(crate) struct MapConverter<C, K, V> {
    key: Arc<dyn Converter<K>>,
    value: Arc<dyn Converter<V>>,
    _marker: PhantomData<fn() -> C>,
}

impl<C, K, V> Converter<C> for MapConverter<C, K, V>
where
    C: FromIterator<(K, V)> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = (&'a K, &'a V)>,
    K: Send + 'static,
    V: Send + 'static,
{
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &C,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            writer.write_map_header(value.into_iter().count());
            for (key, item) in value {
                self.key.write(writer, key, ctx)?;
                self.value.write(writer, item, ctx)?;
            }
            Ok(())
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<C, Error> {
        ctx.descend(|ctx| {
            let count = reader.read_map_header()?;
            let cap = reader.remaining() / 2;
            ClampedHint {
                inner: (0..count).map(|_| {
                    let key = self.key.read(reader, ctx)?;
                    let value = self.value.read(reader, ctx)?;
                    Ok((key, value))
                }),
                cap,
            }
            .collect()
        })
    }

    fn prefer_async_serialization(&self) -> bool {
        true
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "object", "additionalProperties": self.value.json_schema() })
    }

    fn streamable(&self) -> Option<&dyn SequenceStream<C>> {
        Some(self)
    }
}

impl<C, K, V> SequenceStream<C> for MapConverter<C, K, V>
where
    C: FromIterator<(K, V)> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = (&'a K, &'a V)>,
    K: Send + 'static,
    V: Send + 'static,
{
    fn structures_per_element(&self) -> usize {
        2
    }

    fn begin(&self, reader: &mut MsgPackReader<'_>) -> Result<(usize, SeqAccum), Error> {
        let count = reader.read_map_header()?;
        Ok((count, SeqAccum::new(Vec::<(K, V)>::new())))
    }

    fn element(
        &self,
        acc: &mut SeqAccum,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<(), Error> {
        let key = self.key.read(reader, ctx)?;
        let value = self.value.read(reader, ctx)?;
        acc.get_mut::<Vec<(K, V)>>().push((key, value));
        Ok(())
    }

    fn finish(&self, acc: SeqAccum) -> Result<C, Error> {
        Ok(acc.take::<Vec<(K, V)>>().into_iter().collect())
    }
}

fn map_shape<C, K, V>() -> Shape<C>
where
    C: FromIterator<(K, V)> + Send + Sync + 'static,
    for<'a> &'a C: IntoIterator<Item = (&'a K, &'a V)>,
    K: Shaped,
    V: Shaped,
{
    Shape::build_with(|b| {
        Ok(Arc::new(MapConverter::<C, K, V> {
            key: b.converter_for::<K>()?,
            value: b.converter_for::<V>()?,
            _marker: PhantomData,
        }) as Arc<dyn Converter<C>>)
    })
}

impl<K: Shaped + Eq + Hash, V: Shaped> Shaped for HashMap<K, V> {
    fn shape() -> Shape<Self> {
        map_shape::<Self, K, V>()
    }
}

impl<K: Shaped + Ord, V: Shaped> Shaped for BTreeMap<K, V> {
    fn shape() -> Shape<Self> {
        map_shape::<Self, K, V>()
    }
}

macro_rules! tuple_shape {
    ($conv:ident, $n:expr, $(($idx:tt, $field:ident, $ty:ident)),+) => {
        struct $conv<$($ty),+> {
            $($field: Arc<dyn Converter<$ty>>,)+
        }

        impl<$($ty: Send + Sync + 'static),+> Converter<($($ty,)+)> for $conv<$($ty),+> {
            fn write(
                &self,
                writer: &mut MsgPackWriter<'_>,
                value: &($($ty,)+),
                ctx: &mut SerializationContext<'_>,
            ) -> Result<(), Error> {
                ctx.descend(|ctx| {
                    writer.write_array_header($n);
                    $(self.$field.write(writer, &value.$idx, ctx)?;)+
                    Ok(())
                })
            }

            fn read(
                &self,
                reader: &mut MsgPackReader<'_>,
                ctx: &mut DeserializationContext<'_>,
            ) -> Result<($($ty,)+), Error> {
                ctx.descend(|ctx| {
                    let count = reader.read_array_header()?;
                    if count != $n {
                        return Err(Error::ArrayLengthMismatch {
                            expected: $n,
                            actual: count,
                        });
                    }
                    Ok(($(self.$field.read(reader, ctx)?,)+))
                })
            }

            fn json_schema(&self) -> Value {
                json!({
                    "type": "array",
                    "prefixItems": [$(self.$field.json_schema()),+],
                })
            }
        }

        impl<$($ty: Shaped),+> Shaped for ($($ty,)+) {
            fn shape() -> Shape<Self> {
                Shape::build_with(|b| {
                    Ok(Arc::new($conv {
                        $($field: b.converter_for::<$ty>()?,)+
                    }) as Arc<dyn Converter<Self>>)
                })
            }
        }
    };
}

tuple_shape!(Tuple2Converter, 2, (0, first, A), (1, second, B));
tuple_shape!(Tuple3Converter, 3, (0, first, A), (1, second, B), (2, third, C));
tuple_shape!(
    Tuple4Converter,
    4,
    (0, first, A),
    (1, second, B),
    (2, third, C),
    (3, fourth, D)
);

/// A rectangular multidimensional array of rank `R`, stored row-major.
///
/// Two wire encodings exist: nested sub-arrays per rank, or a two-element
/// envelope of the dimension list plus the flat elements, selected by
/// [`MultiDimFormat`](crate::MultiDimFormat).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdArray<E, const R: usize> {
    dims: [usize; R],
    data: Vec<E>,
}

impl<E, const R: usize> MdArray<E, R> {
    /// Build an array; the dimension product must equal the element count.
    pub fn new(dims: [usize; R], data: Vec<E>) -> Result<Self, Error> {
        if R == 0 {
            return Err(Error::InvalidDimensions);
        }
        let product = dims
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or(Error::InvalidDimensions)?;
        if product != data.len() {
            return Err(Error::InvalidDimensions);
        }
        Ok(Self { dims, data })
    }

    /// The extent of each rank.
    pub fn dims(&self) -> [usize; R] {
        self.dims
    }

    /// The elements in row-major order.
    pub fn data(&self) -> &[E] {
        &self.data
    }

    /// Consume the array, yielding its elements in row-major order.
    pub fn into_data(self) -> Vec<E> {
        self.data
    }
}

struct MdArrayConverter<E, const R: usize> {
    element: Arc<dyn Converter<E>>,
    format: MultiDimFormat,
}

impl<E: Send + Sync + 'static, const R: usize> MdArrayConverter<E, R> {
    fn write_nested(
        &self,
        writer: &mut MsgPackWriter<'_>,
        dims: &[usize],
        data: &[E],
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        writer.write_array_header(dims[0]);
        if dims.len() == 1 {
            for item in data {
                self.element.write(writer, item, ctx)?;
            }
        } else if dims[0] > 0 {
            let chunk = data.len() / dims[0];
            if chunk == 0 {
                for _ in 0..dims[0] {
                    self.write_nested(writer, &dims[1..], &[], ctx)?;
                }
            } else {
                for part in data.chunks(chunk) {
                    self.write_nested(writer, &dims[1..], part, ctx)?;
                }
            }
        }
        Ok(())
    }

    fn read_nested(
        &self,
        reader: &mut MsgPackReader<'_>,
        level: usize,
        seen: &mut [Option<usize>; R],
        data: &mut Vec<E>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<(), Error> {
        let count = reader.read_array_header()?;
        match seen[level] {
            None => seen[level] = Some(count),
            Some(expected) if expected == count => {}
            Some(_) => return Err(Error::InvalidDimensions),
        }
        if level == R - 1 {
            for _ in 0..count {
                data.push(self.element.read(reader, ctx)?);
            }
        } else {
            for _ in 0..count {
                self.read_nested(reader, level + 1, seen, data, ctx)?;
            }
        }
        Ok(())
    }
}

impl<E: Send + Sync + 'static, const R: usize> Converter<MdArray<E, R>> for MdArrayConverter<E, R> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &MdArray<E, R>,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| match self.format {
            MultiDimFormat::Nested => {
                self.write_nested(writer, &value.dims, &value.data, ctx)
            }
            MultiDimFormat::FlatWithDimensions => {
                writer.write_array_header(2);
                writer.write_array_header(R);
                for dim in value.dims {
                    writer.write_u64(dim as u64);
                }
                writer.write_array_header(value.data.len());
                for item in &value.data {
                    self.element.write(writer, item, ctx)?;
                }
                Ok(())
            }
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<MdArray<E, R>, Error> {
        ctx.descend(|ctx| match self.format {
            MultiDimFormat::Nested => {
                let mut seen = [None; R];
                let mut data = Vec::new();
                self.read_nested(reader, 0, &mut seen, &mut data, ctx)?;
                let mut dims = [0usize; R];
                for (dim, observed) in dims.iter_mut().zip(seen) {
                    *dim = observed.unwrap_or(0);
                }
                MdArray::new(dims, data)
            }
            MultiDimFormat::FlatWithDimensions => {
                let envelope = reader.read_array_header()?;
                if envelope != 2 {
                    return Err(Error::ArrayLengthMismatch {
                        expected: 2,
                        actual: envelope,
                    });
                }
                let rank = reader.read_array_header()?;
                if rank != R {
                    return Err(Error::InvalidDimensions);
                }
                let mut dims = [0usize; R];
                for dim in dims.iter_mut() {
                    *dim = reader.read_usize()?;
                }
                let count = reader.read_array_header()?;
                let expected = dims
                    .iter()
                    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                    .ok_or(Error::InvalidDimensions)?;
                if count != expected {
                    return Err(Error::InvalidDimensions);
                }
                let mut data = Vec::with_capacity(count.min(reader.remaining()));
                for _ in 0..count {
                    data.push(self.element.read(reader, ctx)?);
                }
                MdArray::new(dims, data)
            }
        })
    }

    fn json_schema(&self) -> Value {
        json!({ "type": "array" })
    }
}

impl<E: Shaped, const R: usize> Shaped for MdArray<E, R> {
    fn shape() -> Shape<Self> {
        Shape::build_with(|b| {
            Ok(Arc::new(MdArrayConverter::<E, R> {
                element: b.converter_for::<E>()?,
                format: b.options().multidim_array_format,
            }) as Arc<dyn Converter<Self>>)
        })
    }
}
