//! Record converters: map-shaped (name keys) and array-shaped (integer
//! keys).

use std::collections::HashMap;
use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter, OutputBuffer, TokenKind, primitives};
use serde_json::{Map, Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::provider::GraphBuilder;
use crate::shape::{ArgumentState, BoundProperty, Construction, RecordShape};

pub(crate) fn build_record<T: 'static>(
    shape: RecordShape<T>,
    b: &mut GraphBuilder<'_>,
) -> Result<Arc<dyn Converter<T>>, Error> {
    let type_name = shape.type_name;
    let keyed = shape
        .properties
        .iter()
        .filter(|p| p.key_index().is_some())
        .count();
    if keyed != 0 && keyed != shape.properties.len() {
        return Err(Error::InconsistentKeys { type_name });
    }

    let mut props = Vec::with_capacity(shape.properties.len());
    for (index, def) in shape.properties.iter().enumerate() {
        props.push(def.bind(index, b)?);
    }

    if keyed == 0 {
        // map scheme: pre-encode property names once
        let case = b.options().property_name_case;
        let allow_str8 = !b.options().old_spec_compatibility;
        let mut encoded_names = Vec::with_capacity(props.len());
        let mut lookup: HashMap<Vec<u8>, usize> = HashMap::new();
        for (index, prop) in props.iter().enumerate() {
            let wire_name = case.apply(prop.name);
            let mut token = OutputBuffer::new();
            primitives::write_str_header(&mut token, wire_name.len() as u32, allow_str8);
            token.put_slice(wire_name.as_bytes());
            encoded_names.push(token.into_vec());
            lookup.insert(wire_name.clone().into_bytes(), index);
            if wire_name.as_bytes() != prop.name.as_bytes() {
                lookup.insert(prop.name.as_bytes().to_vec(), index);
            }
        }
        Ok(Arc::new(MapRecordConverter {
            type_name,
            props,
            encoded_names,
            lookup,
            construction: shape.construction,
            before_serialize: shape.before_serialize,
            after_deserialize: shape.after_deserialize,
        }))
    } else {
        let mut index_lookup: HashMap<u32, usize> = HashMap::new();
        let mut max_index = 0u32;
        for (index, prop) in props.iter().enumerate() {
            let key = prop
                .key_index
                .ok_or(Error::InconsistentKeys { type_name })?;
            if index_lookup.insert(key, index).is_some() {
                return Err(Error::InconsistentKeys { type_name });
            }
            max_index = max_index.max(key);
        }
        let mut slots = vec![None; max_index as usize + 1];
        for (&key, &index) in &index_lookup {
            slots[key as usize] = Some(index);
        }
        Ok(Arc::new(ArrayRecordConverter {
            type_name,
            props,
            slots,
            index_lookup,
            construction: shape.construction,
            before_serialize: shape.before_serialize,
            after_deserialize: shape.after_deserialize,
        }))
    }
}

/// A property absent from the wire is an error when required, takes its
/// declared default when one exists, and otherwise keeps whatever the
/// constructed instance holds.
fn settle_missing<T>(
    type_name: &'static str,
    prop: &BoundProperty<T>,
    value: &mut T,
) -> Result<(), Error> {
    if prop.required {
        return Err(Error::MissingRequiredProperty {
            type_name,
            property: prop.name,
        });
    }
    if let (Some(make), Some(apply)) = (&prop.fill_default_slot, &prop.apply_slot) {
        apply(value, make())?;
    }
    Ok(())
}

fn finish_construction<T>(
    type_name: &'static str,
    props: &[BoundProperty<T>],
    ctor: &(dyn Fn(&mut ArgumentState) -> Result<T, Error> + Send + Sync),
    mut args: ArgumentState,
    after_deserialize: Option<fn(&mut T)>,
) -> Result<T, Error> {
    for (index, prop) in props.iter().enumerate() {
        if !args.is_present(index) {
            if prop.required {
                return Err(Error::MissingRequiredProperty {
                    type_name,
                    property: prop.name,
                });
            }
            if let Some(make) = &prop.fill_default_slot {
                args.put(index, make());
            }
        }
    }
    let mut value = ctor(&mut args)?;
    // properties the constructor did not consume are applied through setters
    for (index, prop) in props.iter().enumerate() {
        if let Some(apply) = &prop.apply_slot {
            if let Some(slot) = args.take_boxed(index) {
                apply(&mut value, slot)?;
            }
        }
    }
    if let Some(callback) = after_deserialize {
        callback(&mut value);
    }
    Ok(value)
}

struct MapRecordConverter<T: 'static> {
    type_name: &'static str,
    props: Vec<BoundProperty<T>>,
    encoded_names: Vec<Vec<u8>>,
    lookup: HashMap<Vec<u8>, usize>,
    construction: Option<Construction<T>>,
    before_serialize: Option<fn(&T)>,
    after_deserialize: Option<fn(&mut T)>,
}

impl<T: 'static> Converter<T> for MapRecordConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            if let Some(callback) = self.before_serialize {
                callback(value);
            }
            let count = self
                .props
                .iter()
                .filter(|p| (p.should_serialize)(value))
                .count();
            writer.write_map_header(count);
            for (index, prop) in self.props.iter().enumerate() {
                if (prop.should_serialize)(value) {
                    writer.write_raw(&self.encoded_names[index]);
                    (prop.write_value)(value, writer, ctx)?;
                }
            }
            Ok(())
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        ctx.descend(|ctx| {
            let count = reader.read_map_header()?;
            match &self.construction {
                None => Err(Error::MissingConstructor {
                    type_name: self.type_name,
                }),
                Some(Construction::Mutate(make)) => {
                    let mut value = make();
                    let mut seen = vec![false; self.props.len()];
                    for _ in 0..count {
                        let key = reader.read_str_bytes()?;
                        match self.lookup.get(key.as_ref()) {
                            Some(&index) => {
                                seen[index] = true;
                                match self.props[index].read_into.as_ref() {
                                    Some(read_into) => read_into(&mut value, reader, ctx)?,
                                    // read-only property: the entry is skipped
                                    None => reader.skip()?,
                                }
                            }
                            // unrecognized entries are skipped
                            None => reader.skip()?,
                        }
                    }
                    for (index, prop) in self.props.iter().enumerate() {
                        if !seen[index] {
                            settle_missing(self.type_name, prop, &mut value)?;
                        }
                    }
                    if let Some(callback) = self.after_deserialize {
                        callback(&mut value);
                    }
                    Ok(value)
                }
                Some(Construction::Ctor(ctor)) => {
                    let mut args = ArgumentState::with_len(self.props.len());
                    for _ in 0..count {
                        let key = reader.read_str_bytes()?;
                        match self.lookup.get(key.as_ref()) {
                            Some(&index) => {
                                let slot = (self.props[index].read_slot)(reader, ctx)?;
                                args.put(index, slot);
                            }
                            None => reader.skip()?,
                        }
                    }
                    finish_construction(
                        self.type_name,
                        &self.props,
                        ctor,
                        args,
                        self.after_deserialize,
                    )
                }
            }
        })
    }

    fn json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for prop in &self.props {
            properties.insert(prop.name.to_owned(), prop.schema.clone());
            if prop.required {
                required.push(Value::String(prop.name.to_owned()));
            }
        }
        json!({
            "type": "object",
            "properties": Value::Object(properties),
            "required": required,
        })
    }
}

struct ArrayRecordConverter<T: 'static> {
    type_name: &'static str,
    props: Vec<BoundProperty<T>>,
    /// wire position to property index; gaps are written as nil
    slots: Vec<Option<usize>>,
    index_lookup: HashMap<u32, usize>,
    construction: Option<Construction<T>>,
    before_serialize: Option<fn(&T)>,
    after_deserialize: Option<fn(&mut T)>,
}

impl<T: 'static> ArrayRecordConverter<T> {
    fn read_mutate(
        &self,
        make: &(dyn Fn() -> T + Send + Sync),
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        let mut value = make();
        let mut seen = vec![false; self.props.len()];
        match reader.peek_kind()? {
            // tolerant evolution: a map keyed by property index
            TokenKind::Map => {
                let count = reader.read_map_header()?;
                for _ in 0..count {
                    let key = reader.read_u32()?;
                    match self.index_lookup.get(&key) {
                        Some(&index) => {
                            seen[index] = true;
                            match self.props[index].read_into.as_ref() {
                                Some(read_into) => read_into(&mut value, reader, ctx)?,
                                None => reader.skip()?,
                            }
                        }
                        None => reader.skip()?,
                    }
                }
            }
            _ => {
                let count = reader.read_array_header()?;
                for position in 0..count {
                    match self.slots.get(position).copied().flatten() {
                        Some(index) => {
                            seen[index] = true;
                            match self.props[index].read_into.as_ref() {
                                Some(read_into) => read_into(&mut value, reader, ctx)?,
                                None => reader.skip()?,
                            }
                        }
                        None => reader.skip()?,
                    }
                }
            }
        }
        for (index, prop) in self.props.iter().enumerate() {
            if !seen[index] {
                settle_missing(self.type_name, prop, &mut value)?;
            }
        }
        if let Some(callback) = self.after_deserialize {
            callback(&mut value);
        }
        Ok(value)
    }

    fn read_ctor(
        &self,
        ctor: &(dyn Fn(&mut ArgumentState) -> Result<T, Error> + Send + Sync),
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        let mut args = ArgumentState::with_len(self.props.len());
        match reader.peek_kind()? {
            TokenKind::Map => {
                let count = reader.read_map_header()?;
                for _ in 0..count {
                    let key = reader.read_u32()?;
                    match self.index_lookup.get(&key) {
                        Some(&index) => {
                            let slot = (self.props[index].read_slot)(reader, ctx)?;
                            args.put(index, slot);
                        }
                        None => reader.skip()?,
                    }
                }
            }
            _ => {
                let count = reader.read_array_header()?;
                for position in 0..count {
                    match self.slots.get(position).copied().flatten() {
                        Some(index) => {
                            let slot = (self.props[index].read_slot)(reader, ctx)?;
                            args.put(index, slot);
                        }
                        None => reader.skip()?,
                    }
                }
            }
        }
        finish_construction(
            self.type_name,
            &self.props,
            ctor,
            args,
            self.after_deserialize,
        )
    }
}

impl<T: 'static> Converter<T> for ArrayRecordConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            if let Some(callback) = self.before_serialize {
                callback(value);
            }
            writer.write_array_header(self.slots.len());
            for slot in &self.slots {
                match slot {
                    Some(index) => (self.props[*index].write_value)(value, writer, ctx)?,
                    // unassigned positions are nil-filled
                    None => writer.write_nil(),
                }
            }
            Ok(())
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        ctx.descend(|ctx| match &self.construction {
            None => Err(Error::MissingConstructor {
                type_name: self.type_name,
            }),
            Some(Construction::Mutate(make)) => self.read_mutate(&**make, reader, ctx),
            Some(Construction::Ctor(ctor)) => self.read_ctor(&**ctor, reader, ctx),
        })
    }

    fn json_schema(&self) -> Value {
        let items: Vec<Value> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Some(index) => self.props[*index].schema.clone(),
                None => json!({ "type": "null" }),
            })
            .collect();
        json!({ "type": "array", "prefixItems": items })
    }
}
