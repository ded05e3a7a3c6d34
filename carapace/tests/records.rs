//! Record converters: map scheme, array scheme, constructors, evolution.

use std::sync::atomic::{AtomicUsize, Ordering};

use carapace::{
    ArgumentState, Error, MsgPackSerializer, NameCase, Property, SerializerOptions, Shape, Shaped,
    from_slice, to_vec,
};

#[derive(Debug, Default, PartialEq, Clone)]
struct Person {
    name: String,
    age: u32,
}

impl Shaped for Person {
    fn shape() -> Shape<Self> {
        Shape::record("Person")
            .property(Property::new("name", |p: &Person| &p.name, |p, v| p.name = v))
            .property(Property::new("age", |p: &Person| &p.age, |p, v| p.age = v))
            .construct_default()
            .build()
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
struct KeyedPerson {
    name: String,
    age: u32,
}

impl Shaped for KeyedPerson {
    fn shape() -> Shape<Self> {
        Shape::record("KeyedPerson")
            .property(
                Property::new("name", |p: &KeyedPerson| &p.name, |p, v| p.name = v).key(0),
            )
            .property(Property::new("age", |p: &KeyedPerson| &p.age, |p, v| p.age = v).key(1))
            .construct_default()
            .build()
    }
}

#[test]
fn map_scheme_matches_expected_bytes() {
    let ada = Person {
        name: "Ada".to_owned(),
        age: 36,
    };
    let bytes = to_vec(&ada).unwrap();
    let expected = [
        0x82, 0xa4, b'n', b'a', b'm', b'e', 0xa3, b'A', b'd', b'a', 0xa3, b'a', b'g', b'e', 0x24,
    ];
    assert_eq!(bytes, expected);
    let back: Person = from_slice(&bytes).unwrap();
    assert_eq!(back, ada);
}

#[test]
fn array_scheme_matches_expected_bytes() {
    let ada = KeyedPerson {
        name: "Ada".to_owned(),
        age: 36,
    };
    let bytes = to_vec(&ada).unwrap();
    assert_eq!(bytes, [0x92, 0xa3, b'A', b'd', b'a', 0x24]);
    let back: KeyedPerson = from_slice(&bytes).unwrap();
    assert_eq!(back, ada);
}

#[test]
fn unknown_map_entries_are_skipped() {
    // {"name": "Ada", "hobby": ["chess", "math"], "age": 36, "x": {"y": 1}}
    let mut bytes = vec![0x84];
    bytes.extend_from_slice(&[0xa4, b'n', b'a', b'm', b'e', 0xa3, b'A', b'd', b'a']);
    bytes.extend_from_slice(&[0xa5, b'h', b'o', b'b', b'b', b'y']);
    bytes.extend_from_slice(&[0x92, 0xa5, b'c', b'h', b'e', b's', b's', 0xa4, b'm', b'a', b't', b'h']);
    bytes.extend_from_slice(&[0xa3, b'a', b'g', b'e', 0x24]);
    bytes.extend_from_slice(&[0xa1, b'x', 0x81, 0xa1, b'y', 0x01]);
    let back: Person = from_slice(&bytes).unwrap();
    assert_eq!(
        back,
        Person {
            name: "Ada".to_owned(),
            age: 36
        }
    );
}

#[test]
fn shorter_arrays_leave_trailing_properties_defaulted() {
    // [\"Ada\"] with no age element
    let bytes = [0x91, 0xa3, b'A', b'd', b'a'];
    let back: KeyedPerson = from_slice(&bytes).unwrap();
    assert_eq!(back.name, "Ada");
    assert_eq!(back.age, 0);
}

#[derive(Debug, PartialEq, Clone)]
struct Point {
    x: f64,
    y: f64,
    label: String,
}

impl Shaped for Point {
    fn shape() -> Shape<Self> {
        Shape::record("Point")
            .property(Property::readonly("x", |p: &Point| &p.x).key(0).required())
            .property(Property::readonly("y", |p: &Point| &p.y).key(1).required())
            .property(
                Property::new("label", |p: &Point| &p.label, |p, v| p.label = v)
                    .key(2)
                    .with_default(String::new()),
            )
            .construct(|args: &mut ArgumentState| {
                Ok(Point {
                    x: args.take(0)?,
                    y: args.take(1)?,
                    label: String::new(),
                })
            })
            .build()
    }
}

#[test]
fn constructor_records_roundtrip_from_arrays_and_index_maps() {
    let point = Point {
        x: 1.5,
        y: -2.0,
        label: "origin-ish".to_owned(),
    };
    let bytes = to_vec(&point).unwrap();
    let back: Point = from_slice(&bytes).unwrap();
    assert_eq!(back, point);

    // tolerant evolution: a map keyed by property index
    let mut bytes = vec![0x82];
    bytes.push(0x01); // key 1 => y
    bytes.extend_from_slice(&to_vec(&9.0f64).unwrap());
    bytes.push(0x00); // key 0 => x
    bytes.extend_from_slice(&to_vec(&4.0f64).unwrap());
    let back: Point = from_slice(&bytes).unwrap();
    assert_eq!(
        back,
        Point {
            x: 4.0,
            y: 9.0,
            label: String::new()
        }
    );
}

#[test]
fn missing_required_property_is_an_error() {
    // [] provides neither x nor y
    let result: Result<Point, Error> = from_slice(&[0x90]);
    assert!(matches!(
        result,
        Err(Error::MissingRequiredProperty {
            type_name: "Point",
            property: "x"
        })
    ));
}

#[derive(Debug, Default, PartialEq)]
struct Profile {
    first_name: String,
}

impl Shaped for Profile {
    fn shape() -> Shape<Self> {
        Shape::record("Profile")
            .property(Property::new(
                "FirstName",
                |p: &Profile| &p.first_name,
                |p, v| p.first_name = v,
            ))
            .construct_default()
            .build()
    }
}

#[test]
fn name_case_policy_rewrites_keys_and_accepts_both_spellings() {
    let serializer = MsgPackSerializer::with_options(SerializerOptions {
        property_name_case: NameCase::Camel,
        ..SerializerOptions::default()
    });
    let profile = Profile {
        first_name: "Grace".to_owned(),
    };
    let bytes = serializer.serialize(&profile).unwrap();
    // {"firstName": "Grace"}
    assert_eq!(bytes[1], 0xa9);
    assert_eq!(&bytes[2..11], b"firstName");
    assert_eq!(serializer.deserialize::<Profile>(&bytes).unwrap(), profile);

    // the declared spelling is registered too
    let mut declared = vec![0x81, 0xa9];
    declared.extend_from_slice(b"FirstName");
    declared.extend_from_slice(&[0xa5, b'G', b'r', b'a', b'c', b'e']);
    assert_eq!(serializer.deserialize::<Profile>(&declared).unwrap(), profile);
}

static BEFORE_CALLS: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Default, PartialEq)]
struct Totals {
    a: u32,
    b: u32,
    sum: u32,
}

impl Shaped for Totals {
    fn shape() -> Shape<Self> {
        Shape::record("Totals")
            .property(Property::new("a", |t: &Totals| &t.a, |t, v| t.a = v))
            .property(Property::new("b", |t: &Totals| &t.b, |t, v| t.b = v))
            .construct_default()
            .before_serialize(|_| {
                BEFORE_CALLS.fetch_add(1, Ordering::Relaxed);
            })
            .after_deserialize(|t| t.sum = t.a + t.b)
            .build()
    }
}

#[test]
fn lifecycle_callbacks_fire_at_the_converter_boundary() {
    let before = BEFORE_CALLS.load(Ordering::Relaxed);
    let bytes = to_vec(&Totals { a: 2, b: 3, sum: 0 }).unwrap();
    assert_eq!(BEFORE_CALLS.load(Ordering::Relaxed), before + 1);
    let back: Totals = from_slice(&bytes).unwrap();
    assert_eq!(back, Totals { a: 2, b: 3, sum: 5 });
}

#[derive(Debug, Default, PartialEq)]
struct Sparse {
    low: u8,
    high: u8,
}

impl Shaped for Sparse {
    fn shape() -> Shape<Self> {
        Shape::record("Sparse")
            .property(Property::new("low", |s: &Sparse| &s.low, |s, v| s.low = v).key(0))
            .property(Property::new("high", |s: &Sparse| &s.high, |s, v| s.high = v).key(3))
            .construct_default()
            .build()
    }
}

#[test]
fn array_scheme_fills_unassigned_positions_with_nil() {
    let value = Sparse { low: 1, high: 9 };
    let bytes = to_vec(&value).unwrap();
    assert_eq!(bytes, [0x94, 0x01, 0xc0, 0xc0, 0x09]);
    let back: Sparse = from_slice(&bytes).unwrap();
    assert_eq!(back, value);
}

#[derive(Debug, Default, PartialEq)]
struct Mixed {
    a: u8,
}

impl Shaped for Mixed {
    fn shape() -> Shape<Self> {
        Shape::record("Mixed")
            .property(Property::new("a", |m: &Mixed| &m.a, |m, v| m.a = v).key(0))
            .property(Property::new("b", |m: &Mixed| &m.a, |m, v| m.a = v))
            .construct_default()
            .build()
    }
}

#[test]
fn mixed_keyed_and_unkeyed_properties_fail_at_construction() {
    let result = to_vec(&Mixed { a: 1 });
    assert!(matches!(
        result,
        Err(Error::InconsistentKeys {
            type_name: "Mixed"
        })
    ));
}

#[test]
fn skip_to_property_and_index_position_the_reader() {
    let ada = Person {
        name: "Ada".to_owned(),
        age: 36,
    };
    let bytes = to_vec(&ada).unwrap();
    let seq = carapace::ByteSequence::from_slice(&bytes);
    let mut reader = carapace::MsgPackReader::new(&seq);
    assert!(reader.skip_to_property("age").unwrap());
    assert_eq!(reader.read_u32().unwrap(), 36);

    let keyed = to_vec(&KeyedPerson {
        name: "Ada".to_owned(),
        age: 36,
    })
    .unwrap();
    let seq = carapace::ByteSequence::from_slice(&keyed);
    let mut reader = carapace::MsgPackReader::new(&seq);
    assert!(reader.skip_to_index(1).unwrap());
    assert_eq!(reader.read_u32().unwrap(), 36);
}
