//! Union converter: alias envelopes, base fallback, and failure modes.

use carapace::{Error, Property, Shape, Shaped, from_slice, to_vec};

#[derive(Debug, Default, PartialEq, Clone)]
struct Circle {
    radius: u32,
}

impl Shaped for Circle {
    fn shape() -> Shape<Self> {
        Shape::record("Circle")
            .property(Property::new("radius", |c: &Circle| &c.radius, |c, v| c.radius = v).key(0))
            .construct_default()
            .build()
    }
}

#[derive(Debug, Default, PartialEq, Clone)]
struct Rect {
    w: u32,
    h: u32,
}

impl Shaped for Rect {
    fn shape() -> Shape<Self> {
        Shape::record("Rect")
            .property(Property::new("w", |r: &Rect| &r.w, |r, v| r.w = v).key(0))
            .property(Property::new("h", |r: &Rect| &r.h, |r, v| r.h = v).key(1))
            .construct_default()
            .build()
    }
}

#[derive(Debug, PartialEq, Clone)]
enum Figure {
    Circle(Circle),
    Rect(Rect),
}

impl Shaped for Figure {
    fn shape() -> Shape<Self> {
        Shape::union("Figure")
            .case(
                "c",
                |f: &Figure| match f {
                    Figure::Circle(c) => Some(c),
                    _ => None,
                },
                Figure::Circle,
            )
            .case(
                "r",
                |f: &Figure| match f {
                    Figure::Rect(r) => Some(r),
                    _ => None,
                },
                Figure::Rect,
            )
            .build()
    }
}

#[test]
fn string_aliased_case_matches_expected_bytes() {
    let figure = Figure::Circle(Circle { radius: 1 });
    let bytes = to_vec(&figure).unwrap();
    // [\"c\", [1]]
    assert_eq!(bytes, [0x92, 0xa1, b'c', 0x91, 0x01]);
    let back: Figure = from_slice(&bytes).unwrap();
    assert_eq!(back, figure);

    let figure = Figure::Rect(Rect { w: 2, h: 3 });
    let bytes = to_vec(&figure).unwrap();
    assert_eq!(bytes, [0x92, 0xa1, b'r', 0x92, 0x02, 0x03]);
    let back: Figure = from_slice(&bytes).unwrap();
    assert_eq!(back, figure);
}

#[test]
fn unknown_alias_is_fatal() {
    let bytes = [0x92, 0xa1, b'z', 0x91, 0x01];
    let result: Result<Figure, Error> = from_slice(&bytes);
    assert!(matches!(
        result,
        Err(Error::UnknownUnionAlias { type_name: "Figure", .. })
    ));

    // nil alias with no declared base is unknown too
    let bytes = [0x92, 0xc0, 0x91, 0x01];
    let result: Result<Figure, Error> = from_slice(&bytes);
    assert!(matches!(result, Err(Error::UnknownUnionAlias { .. })));
}

#[test]
fn union_envelope_must_be_two_elements() {
    let bytes = [0x93, 0xa1, b'c', 0x91, 0x01, 0xc0];
    let result: Result<Figure, Error> = from_slice(&bytes);
    assert!(matches!(result, Err(Error::MalformedUnion { len: 3 })));
}

#[derive(Debug, Default, PartialEq, Clone)]
struct Message {
    body: String,
    urgent: bool,
}

impl Shaped for Message {
    fn shape() -> Shape<Self> {
        Shape::record("Message")
            .property(Property::new("body", |m: &Message| &m.body, |m, v| m.body = v))
            .property(Property::new(
                "urgent",
                |m: &Message| &m.urgent,
                |m, v| m.urgent = v,
            ))
            .construct_default()
            .build()
    }
}

#[derive(Debug, PartialEq, Clone)]
struct Alert(Message);

impl Shaped for Alert {
    fn shape() -> Shape<Self> {
        Shape::surrogate::<Message>(|a| a.0.clone(), Alert)
    }
}

/// A union whose nil alias is the declared base representation itself.
#[derive(Debug, PartialEq, Clone)]
enum Envelope {
    Plain(Message),
    Alert(Alert),
}

impl Shaped for Envelope {
    fn shape() -> Shape<Self> {
        Shape::union("Envelope")
            .case(
                7,
                |e: &Envelope| match e {
                    Envelope::Alert(a) => Some(a),
                    _ => None,
                },
                Envelope::Alert,
            )
            .base(
                Shape::surrogate::<Message>(
                    |e| match e {
                        Envelope::Plain(m) => m.clone(),
                        Envelope::Alert(a) => a.0.clone(),
                    },
                    Envelope::Plain,
                ),
            )
            .build()
    }
}

#[test]
fn nil_alias_roundtrips_as_the_declared_base() {
    let plain = Envelope::Plain(Message {
        body: "hi".to_owned(),
        urgent: false,
    });
    let bytes = to_vec(&plain).unwrap();
    assert_eq!(bytes[0], 0x92);
    assert_eq!(bytes[1], 0xc0);
    let back: Envelope = from_slice(&bytes).unwrap();
    assert_eq!(back, plain);

    let alert = Envelope::Alert(Alert(Message {
        body: "now".to_owned(),
        urgent: true,
    }));
    let bytes = to_vec(&alert).unwrap();
    // integer alias 7
    assert_eq!(&bytes[..2], &[0x92, 0x07]);
    let back: Envelope = from_slice(&bytes).unwrap();
    assert_eq!(back, alert);
}

#[derive(Debug, PartialEq, Clone)]
enum Clash {
    A(Circle),
    B(Rect),
}

impl Shaped for Clash {
    fn shape() -> Shape<Self> {
        Shape::union("Clash")
            .case(
                1,
                |c: &Clash| match c {
                    Clash::A(a) => Some(a),
                    _ => None,
                },
                Clash::A,
            )
            .case(
                1,
                |c: &Clash| match c {
                    Clash::B(b) => Some(b),
                    _ => None,
                },
                Clash::B,
            )
            .build()
    }
}

#[test]
fn duplicate_aliases_fail_at_construction() {
    let result = to_vec(&Clash::A(Circle { radius: 1 }));
    assert!(matches!(
        result,
        Err(Error::DuplicateUnionAlias { type_name: "Clash", .. })
    ));
}

#[derive(Debug, PartialEq, Clone)]
enum Partial {
    Known(Circle),
    Unregistered(Rect),
}

impl Shaped for Partial {
    fn shape() -> Shape<Self> {
        Shape::union("Partial")
            .case(
                "k",
                |p: &Partial| match p {
                    Partial::Known(c) => Some(c),
                    _ => None,
                },
                Partial::Known,
            )
            .build()
    }
}

#[test]
fn values_outside_the_declared_cases_fail_to_write() {
    let result = to_vec(&Partial::Unregistered(Rect { w: 1, h: 1 }));
    assert!(matches!(
        result,
        Err(Error::UnregisteredUnionCase {
            type_name: "Partial"
        })
    ));
}

#[test]
fn surrogate_cases_share_the_payload_wire_form() {
    let message = Message {
        body: "standalone".to_owned(),
        urgent: true,
    };
    let bytes = to_vec(&Alert(message.clone())).unwrap();
    assert_eq!(bytes, to_vec(&message).unwrap());
    let back: Alert = from_slice(&bytes).unwrap();
    assert_eq!(back.0, message);
}
