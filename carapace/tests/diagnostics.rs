//! JSON rendering and schema fragments.

use carapace::{
    ByteSequence, MsgPackReader, MsgPackSerializer, Property, Shape, Shaped, render_as_json,
    to_vec,
};

#[derive(Debug, Default, PartialEq)]
struct Sample {
    id: u32,
    tags: Vec<String>,
    blob: bytes::Bytes,
}

impl Shaped for Sample {
    fn shape() -> Shape<Self> {
        Shape::record("Sample")
            .property(Property::new("id", |s: &Sample| &s.id, |s, v| s.id = v).required())
            .property(Property::new("tags", |s: &Sample| &s.tags, |s, v| s.tags = v))
            .property(Property::new("blob", |s: &Sample| &s.blob, |s, v| s.blob = v))
            .construct_default()
            .build()
    }
}

#[test]
fn renders_maps_arrays_and_scalars_as_json_text() {
    let sample = Sample {
        id: 7,
        tags: vec!["a\"b".to_owned(), "c".to_owned()],
        blob: bytes::Bytes::from_static(&[0xde, 0xad]),
    };
    let bytes = to_vec(&sample).unwrap();
    let seq = ByteSequence::from_slice(&bytes);
    let mut reader = MsgPackReader::new(&seq);
    let mut out = String::new();
    render_as_json(&mut reader, &mut out).unwrap();
    assert_eq!(
        out,
        "{\"id\":7,\"tags\":[\"a\\\"b\",\"c\"],\"blob\":\"base16:dead\"}"
    );
    assert_eq!(reader.remaining(), 0);
}

#[test]
fn renders_extensions_and_non_string_keys() {
    // {1: true} followed by ext(5, [0xff])
    let bytes = [0x81, 0x01, 0xc3, 0xd4, 0x05, 0xff];
    let seq = ByteSequence::from_slice(&bytes);
    let mut reader = MsgPackReader::new(&seq);

    let mut out = String::new();
    render_as_json(&mut reader, &mut out).unwrap();
    assert_eq!(out, "{\"1\":true}");

    out.clear();
    render_as_json(&mut reader, &mut out).unwrap();
    assert_eq!(out, "{\"$extension\":5,\"payload\":\"ff\"}");
}

#[test]
fn schema_fragments_compose_through_the_graph() {
    let serializer = MsgPackSerializer::new();
    let schema = serializer.json_schema::<Sample>().unwrap();
    assert_eq!(schema["type"], "object");
    assert_eq!(schema["properties"]["id"]["type"], "integer");
    assert_eq!(schema["properties"]["tags"]["type"], "array");
    assert_eq!(schema["properties"]["tags"]["items"]["type"], "string");
    assert_eq!(schema["required"][0], "id");

    let schema = serializer.json_schema::<Vec<Option<bool>>>().unwrap();
    assert_eq!(schema["type"], "array");
    assert_eq!(schema["items"]["anyOf"][0]["type"], "boolean");
    assert_eq!(schema["items"]["anyOf"][1]["type"], "null");
}
