//! Reference preservation: dedup on write, identity on read.

use std::sync::Arc;

use carapace::{Error, MsgPackSerializer, Property, SerializerOptions, Shape, Shaped};

fn preserving() -> MsgPackSerializer {
    MsgPackSerializer::with_options(SerializerOptions {
        preserve_references: true,
        ..SerializerOptions::default()
    })
}

#[derive(Debug, Default, PartialEq)]
struct Empty {}

impl Shaped for Empty {
    fn shape() -> Shape<Self> {
        Shape::record("Empty").construct_default().build()
    }
}

#[test]
fn shared_values_are_written_once() {
    let serializer = preserving();
    let x = Arc::new(Empty {});
    let list = vec![x.clone(), x.clone()];
    let bytes = serializer.serialize(&list).unwrap();
    // [{}, ext(1, id 0)]
    assert_eq!(bytes, [0x92, 0x80, 0xd4, 0x01, 0x00]);

    let back: Vec<Arc<Empty>> = serializer.deserialize(&bytes).unwrap();
    assert_eq!(back.len(), 2);
    assert!(Arc::ptr_eq(&back[0], &back[1]));
}

#[test]
fn disabled_preservation_writes_every_occurrence() {
    let serializer = MsgPackSerializer::new();
    let x = Arc::new(Empty {});
    let list = vec![x.clone(), x.clone()];
    let bytes = serializer.serialize(&list).unwrap();
    assert_eq!(bytes, [0x92, 0x80, 0x80]);
    let back: Vec<Arc<Empty>> = serializer.deserialize(&bytes).unwrap();
    assert!(!Arc::ptr_eq(&back[0], &back[1]));
}

#[test]
fn ids_follow_first_encounter_order() {
    let serializer = preserving();
    let a = Arc::new(42u32);
    let b = Arc::new(7u32);
    let list = vec![a.clone(), b.clone(), a, b];
    let bytes = serializer.serialize(&list).unwrap();
    assert_eq!(
        bytes,
        [0x94, 0x2a, 0x07, 0xd4, 0x01, 0x00, 0xd4, 0x01, 0x01]
    );

    let back: Vec<Arc<u32>> = serializer.deserialize(&bytes).unwrap();
    assert_eq!(*back[0], 42);
    assert_eq!(*back[1], 7);
    assert!(Arc::ptr_eq(&back[0], &back[2]));
    assert!(Arc::ptr_eq(&back[1], &back[3]));
    assert!(!Arc::ptr_eq(&back[0], &back[1]));
}

#[derive(Debug, Default, PartialEq)]
struct Node {
    label: String,
    left: Option<Arc<Node>>,
    right: Option<Arc<Node>>,
}

impl Shaped for Node {
    fn shape() -> Shape<Self> {
        Shape::record("Node")
            .property(Property::new("label", |n: &Node| &n.label, |n, v| n.label = v))
            .property(Property::new("left", |n: &Node| &n.left, |n, v| n.left = v))
            .property(Property::new("right", |n: &Node| &n.right, |n, v| n.right = v))
            .construct_default()
            .build()
    }
}

#[test]
fn diamond_graphs_keep_their_shared_identity() {
    let serializer = preserving();
    let shared = Arc::new(Node {
        label: "leaf".to_owned(),
        left: None,
        right: None,
    });
    let root = Node {
        label: "root".to_owned(),
        left: Some(shared.clone()),
        right: Some(shared),
    };
    let bytes = serializer.serialize(&root).unwrap();
    let back: Node = serializer.deserialize(&bytes).unwrap();
    let left = back.left.as_ref().unwrap();
    let right = back.right.as_ref().unwrap();
    assert!(Arc::ptr_eq(left, right));
    assert_eq!(left.label, "leaf");

    // a plain serializer materializes two distinct leaves
    let plain = MsgPackSerializer::new();
    let back: Node = plain.deserialize(&plain.serialize(&back).unwrap()).unwrap();
    assert!(!Arc::ptr_eq(
        back.left.as_ref().unwrap(),
        back.right.as_ref().unwrap()
    ));
}

#[test]
fn wire_level_cycles_are_reported_not_materialized() {
    // {"label": "", "left": backref(0), "right": nil} where id 0 is the value
    // still being read
    let mut bytes = vec![0x83];
    bytes.extend_from_slice(&[0xa5, b'l', b'a', b'b', b'e', b'l', 0xa0]);
    bytes.extend_from_slice(&[0xa4, b'l', b'e', b'f', b't', 0xd4, 0x01, 0x00]);
    bytes.extend_from_slice(&[0xa5, b'r', b'i', b'g', b'h', b't', 0xc0]);
    let serializer = preserving();
    let result: Result<Arc<Node>, Error> = serializer.deserialize(&bytes);
    assert!(matches!(result, Err(Error::ReferenceCycle { id: 0 })));
}

#[test]
fn back_references_must_resolve_to_the_same_type() {
    // (Empty, backref to the Empty) read as (Arc<Empty>, Arc<u32>)
    let bytes = [0x92, 0x80, 0xd4, 0x01, 0x00];
    let serializer = preserving();
    let result: Result<(Arc<Empty>, Arc<u32>), Error> = serializer.deserialize(&bytes);
    assert!(matches!(result, Err(Error::ReferenceTypeMismatch { id: 0 })));
}

#[test]
fn unknown_back_reference_ids_are_rejected() {
    let bytes = [0x91, 0xd4, 0x01, 0x05];
    let serializer = preserving();
    let result: Result<Vec<Arc<Empty>>, Error> = serializer.deserialize(&bytes);
    assert!(matches!(result, Err(Error::UnknownReferenceId { id: 5 })));
}
