//! Polymorphic union converter: a `[alias, payload]` envelope over a closed
//! set of declared cases.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use carapace_msgpack::{MsgPackReader, MsgPackWriter, TokenKind};
use serde_json::{Value, json};

use crate::context::{DeserializationContext, SerializationContext};
use crate::converter::Converter;
use crate::error::Error;
use crate::provider::GraphBuilder;
use crate::shape::{BoundUnionCase, UnionAlias, UnionShape};

pub(crate) fn build_union<T: 'static>(
    shape: UnionShape<T>,
    b: &mut GraphBuilder<'_>,
) -> Result<Arc<dyn Converter<T>>, Error> {
    let type_name = shape.type_name;
    let mut cases = Vec::with_capacity(shape.cases.len());
    let mut seen = HashSet::new();
    for case in &shape.cases {
        if !seen.insert(case.alias()) {
            return Err(Error::DuplicateUnionAlias {
                type_name,
                alias: case.alias().to_string(),
            });
        }
        cases.push(case.bind(type_name, b)?);
    }

    let mut int_lookup = HashMap::new();
    let mut str_lookup = HashMap::new();
    for (index, case) in cases.iter().enumerate() {
        match case.alias {
            UnionAlias::Int(alias) => {
                int_lookup.insert(alias, index);
            }
            UnionAlias::Str(alias) => {
                str_lookup.insert(alias.as_bytes(), index);
            }
        }
    }

    let base = match shape.base {
        Some(base) => Some(base.into_converter(b)?),
        None => None,
    };

    Ok(Arc::new(UnionConverter {
        type_name,
        cases,
        int_lookup,
        str_lookup,
        base,
    }))
}

struct UnionConverter<T: 'static> {
    type_name: &'static str,
    cases: Vec<BoundUnionCase<T>>,
    int_lookup: HashMap<i64, usize>,
    str_lookup: HashMap<&'static [u8], usize>,
    base: Option<Arc<dyn Converter<T>>>,
}

impl<T: 'static> Converter<T> for UnionConverter<T> {
    fn write(
        &self,
        writer: &mut MsgPackWriter<'_>,
        value: &T,
        ctx: &mut SerializationContext<'_>,
    ) -> Result<(), Error> {
        ctx.descend(|ctx| {
            writer.write_array_header(2);
            for case in &self.cases {
                if (case.matches)(value) {
                    writer.write_raw(&case.alias_token);
                    return (case.write_payload)(value, writer, ctx);
                }
            }
            match &self.base {
                Some(base) => {
                    // nil alias: the value is the declared base itself
                    writer.write_nil();
                    base.write(writer, value, ctx)
                }
                None => Err(Error::UnregisteredUnionCase {
                    type_name: self.type_name,
                }),
            }
        })
    }

    fn read(
        &self,
        reader: &mut MsgPackReader<'_>,
        ctx: &mut DeserializationContext<'_>,
    ) -> Result<T, Error> {
        ctx.descend(|ctx| {
            let len = reader.read_array_header()?;
            if len != 2 {
                return Err(Error::MalformedUnion { len });
            }
            match reader.peek_kind()? {
                TokenKind::Null => {
                    reader.read_nil()?;
                    match &self.base {
                        Some(base) => base.read(reader, ctx),
                        None => Err(Error::UnknownUnionAlias {
                            type_name: self.type_name,
                            alias: "nil".to_owned(),
                        }),
                    }
                }
                TokenKind::Integer => {
                    let alias = reader.read_i64()?;
                    match self.int_lookup.get(&alias) {
                        Some(&index) => (self.cases[index].read)(reader, ctx),
                        None => Err(Error::UnknownUnionAlias {
                            type_name: self.type_name,
                            alias: alias.to_string(),
                        }),
                    }
                }
                TokenKind::String => {
                    let alias = reader.read_str_bytes()?;
                    match self.str_lookup.get(alias.as_ref()) {
                        Some(&index) => (self.cases[index].read)(reader, ctx),
                        None => Err(Error::UnknownUnionAlias {
                            type_name: self.type_name,
                            alias: String::from_utf8_lossy(&alias).into_owned(),
                        }),
                    }
                }
                other => Err(Error::UnknownUnionAlias {
                    type_name: self.type_name,
                    alias: format!("<{}>", other.name()),
                }),
            }
        })
    }

    fn json_schema(&self) -> Value {
        let mut variants: Vec<Value> = self.cases.iter().map(|case| case.schema.clone()).collect();
        if let Some(base) = &self.base {
            variants.push(base.json_schema());
        }
        json!({ "oneOf": variants })
    }
}
