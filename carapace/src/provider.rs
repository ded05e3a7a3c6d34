//! Converter resolution: the per-serializer cache and the delayed slot that
//! makes recursive shapes work.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use carapace_msgpack::{MsgPackReader, MsgPackWriter};
use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::options::SerializerOptions;
use crate::shape::Shaped;

/// Resolves and caches one converter per shape.
///
/// The cache is keyed by type identity; the provider itself belongs to one
/// serializer, whose graph-shaping options complete the key. Resolution of
/// the same type coalesces: concurrent callers receive a delayed converter
/// that blocks on first use until the builder publishes.
pub struct ConverterProvider {
    options: Arc<SerializerOptions>,
    cache: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl ConverterProvider {
    pub(crate) fn new(options: Arc<SerializerOptions>) -> Self {
        Self {
            options,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn options(&self) -> &SerializerOptions {
        &self.options
    }

    /// The converter for `T`, building it (and everything it references) on
    /// first resolution.
    pub fn get<T: Shaped>(&self) -> Result<Arc<dyn Converter<T>>, Error> {
        let key = TypeId::of::<T>();
        let delayed: Arc<DelayedConverter<T>>;
        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                let converter = entry
                    .downcast_ref::<Arc<dyn Converter<T>>>()
                    .expect("converter cache holds a foreign type")
                    .clone();
                return Ok(converter);
            }
            // Install the delayed slot before construction so recursive
            // shapes resolve to it; the concrete converter is published to
            // the same slot once it exists.
            delayed = Arc::new(DelayedConverter::new());
            cache.insert(key, Box::new(delayed.clone() as Arc<dyn Converter<T>>));
        }

        log::trace!("building converter for {}", type_name::<T>());
        let shape = T::shape();
        let mut builder = GraphBuilder { provider: self };
        match shape.into_converter(&mut builder) {
            Ok(converter) => {
                delayed.publish(Some(converter.clone()));
                self.cache
                    .lock()
                    .insert(key, Box::new(converter.clone()));
                Ok(converter)
            }
            Err(err) => {
                log::debug!("converter for {} failed to build: {err}", type_name::<T>());
                delayed.publish(None);
                self.cache.lock().remove(&key);
                Err(err)
            }
        }
    }
}

/// Hands shapes their element converters during graph construction.
pub struct GraphBuilder<'a> {
    pub(crate) provider: &'a ConverterProvider,
}

impl GraphBuilder<'_> {
    /// Resolve the converter for an element type.
    pub fn converter_for<E: Shaped>(&mut self) -> Result<Arc<dyn Converter<E>>, Error> {
        self.provider.get::<E>()
    }

    /// The options the graph is being built under.
    pub fn options(&self) -> &SerializerOptions {
        self.provider.options()
    }
}

/// A converter slot published exactly once.
///
/// References captured during construction forward every call to the final
/// converter; publication uses a once-cell so readers observe a fully
/// constructed value, and a condvar wakes callers that arrived early from
/// another thread.
struct DelayedConverter<T: 'static> {
    published: OnceLock<Arc<dyn Converter<T>>>,
    slot: Mutex<Option<Option<Arc<dyn Converter<T>>>>>,
    ready: Condvar,
}

impl<T: 'static> DelayedConverter<T> {
    fn new() -> Self {
        Self {
            published: OnceLock::new(),
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, converter: Option<Arc<dyn Converter<T>>>) {
        if let Some(converter) = &converter {
            let _ = self.published.set(converter.clone());
        }
        *self.slot.lock() = Some(converter);
        self.ready.notify_all();
    }

    fn resolve(&self) -> Result<Arc<dyn Converter<T>>, Error> {
        if let Some(converter) = self.published.get() {
            return Ok(converter.clone());
        }
        let mut slot = self.slot.lock();
        while slot.is_none() {
            self.ready.wait(&mut slot);
        }
        match &*slot {
            Some(Some(converter)) => Ok(converter.clone()),
            Some(None) => Err(Error::ConverterUnavailable {
                type_name: type_name::<T>(),
            }),
            None => unreachable!("condvar woke without a publication"),
        }
    }
}

impl<T: 'static> Converter<T> for DelayedConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        self.resolve()?.write(writer, value, ctx)
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        self.resolve()?.read(reader, ctx)
    }

    fn json_schema(&self) -> Value {
        match self.resolve() {
            Ok(converter) => converter.json_schema(),
            Err(_) => Value::Bool(true),
        }
    }
}
