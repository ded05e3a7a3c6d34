//! Unit-enum converter: ordinal or name encoding, tolerant reads of either.

use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter, TokenKind};
use serde_json::{Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::provider::GraphBuilder;
use crate::shape::EnumEntry;

pub(crate) fn build_enum<T>(
    type_name: &'static str,
    entries: Vec<EnumEntry<T>>,
    b: &mut GraphBuilder<'_>,
) -> Result<Arc<dyn Converter<T>>, Error>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Ok(Arc::new(EnumConverter {
        type_name,
        entries,
        by_name: b.options().serialize_enums_by_name,
    }))
}

struct EnumConverter<T> {
    type_name: &'static str,
    entries: Vec<EnumEntry<T>>,
    by_name: bool,
}

impl<T> Converter<T> for EnumConverter<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        _ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.value == *value)
            .ok_or(Error::UnknownEnumValue {
                type_name: self.type_name,
            })?;
        if self.by_name {
            writer.write_str(entry.name);
        } else {
            writer.write_i64(entry.ordinal);
        }
        Ok(())
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        _ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        let entry = match reader.peek_kind()? {
            TokenKind::String => {
                let name = reader.read_str()?;
                self.entries.iter().find(|entry| entry.name == name.as_ref())
            }
            _ => {
                let ordinal = reader.read_i64()?;
                self.entries.iter().find(|entry| entry.ordinal == ordinal)
            }
        };
        entry.map(|entry| entry.value.clone()).ok_or(Error::UnknownEnumValue {
            type_name: self.type_name,
        })
    }

    fn json_schema(&self) -> Value {
        if self.by_name {
            let names: Vec<&str> = self.entries.iter().map(|entry| entry.name).collect();
            json!({ "enum": names })
        } else {
            let ordinals: Vec<i64> = self.entries.iter().map(|entry| entry.ordinal).collect();
            json!({ "enum": ordinals })
        }
    }
}
