//! Encoding values against schemas translated from wire blocks

#![allow(clippy::disallowed_methods)] // Allow unwrap() in tests for clarity

use tfprovider::codec::{decode, encode, encode_with, Encoding};
use tfprovider::proto;
use tfprovider::schema::translate_block;
use tfprovider::{AttributePath, Block, Dynamic};

fn attribute(name: &str, ty: &str) -> proto::schema::Attribute {
    proto::schema::Attribute {
        name: name.to_string(),
        r#type: ty.as_bytes().to_vec(),
        optional: true,
        ..Default::default()
    }
}

fn nested(name: &str, nesting: proto::schema::nested_block::NestingMode, attrs: Vec<proto::schema::Attribute>) -> proto::schema::NestedBlock {
    proto::schema::NestedBlock {
        type_name: name.to_string(),
        nesting: nesting as i32,
        block: Some(proto::schema::Block {
            attributes: attrs,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn server_block() -> Block {
    use proto::schema::nested_block::NestingMode;

    let raw = proto::schema::Block {
        attributes: vec![
            attribute("name", r#""string""#),
            attribute("replicas", r#""number""#),
            attribute("enabled", r#""bool""#),
            attribute("labels", r#"["map","string"]"#),
            attribute("ports", r#"["set","number"]"#),
            attribute("pair", r#"["tuple",["string","bool"]]"#),
            attribute("metadata", r#""dynamic""#),
        ],
        block_types: vec![
            nested("network", NestingMode::Single, vec![attribute("cidr", r#""string""#)]),
            nested("timeouts", NestingMode::Group, vec![attribute("create", r#""string""#)]),
            nested("disk", NestingMode::List, vec![attribute("size", r#""number""#)]),
            nested("volume", NestingMode::Map, vec![attribute("path", r#""string""#)]),
        ],
        ..Default::default()
    };
    translate_block(Some(&raw)).unwrap()
}

fn server_value() -> Dynamic {
    Dynamic::object([
        ("name", Dynamic::from("api-1")),
        ("replicas", Dynamic::from(3_i64)),
        ("enabled", Dynamic::from(true)),
        (
            "labels",
            Dynamic::object([("tier", Dynamic::from("backend")), ("zone", Dynamic::from("b"))]),
        ),
        ("ports", Dynamic::List(vec![Dynamic::from(80_i64), Dynamic::from(443_i64)])),
        ("pair", Dynamic::List(vec![Dynamic::from("x"), Dynamic::from(false)])),
        (
            "metadata",
            Dynamic::object([
                ("owner", Dynamic::from("team-a")),
                ("weight", Dynamic::from(0.25)),
                ("nothing", Dynamic::Null),
            ]),
        ),
        ("network", Dynamic::object([("cidr", Dynamic::from("10.0.0.0/16"))])),
        ("timeouts", Dynamic::object([("create", Dynamic::Null)])),
        (
            "disk",
            Dynamic::List(vec![
                Dynamic::object([("size", Dynamic::from(20_i64))]),
                Dynamic::object([("size", Dynamic::from(-1.5))]),
            ]),
        ),
        (
            "volume",
            Dynamic::object([("data", Dynamic::object([("path", Dynamic::from("/var/data"))]))]),
        ),
    ])
}

#[test]
fn round_trip_through_msgpack() {
    let block = server_block();
    let raw = encode_with(&server_value(), &block, Encoding::Msgpack).unwrap();
    assert!(raw.json.is_empty());
    assert_eq!(decode(&raw, &block).unwrap(), server_value());
}

#[test]
fn round_trip_through_json() {
    let block = server_block();
    let raw = encode_with(&server_value(), &block, Encoding::Json).unwrap();
    assert!(raw.msgpack.is_empty());
    assert_eq!(decode(&raw, &block).unwrap(), server_value());
}

#[test]
fn null_round_trips_for_the_whole_object() {
    let block = server_block();
    for encoding in [Encoding::Msgpack, Encoding::Json] {
        let raw = encode_with(&Dynamic::Null, &block, encoding).unwrap();
        assert_eq!(decode(&raw, &block).unwrap(), Dynamic::Null);
    }
}

#[test]
fn json_payload_from_provider_is_decoded() {
    let block = server_block();
    let raw = proto::DynamicValue {
        msgpack: Vec::new(),
        json: br#"{"name":"from-json","replicas":"2","metadata":{"value":[1,"a"],"type":["tuple",["number","string"]]}}"#.to_vec(),
    };

    let value = decode(&raw, &block).unwrap();
    assert_eq!(
        value.get(&AttributePath::new("name")),
        Some(&Dynamic::from("from-json"))
    );
    assert_eq!(
        value.get(&AttributePath::new("replicas")),
        Some(&Dynamic::Number(2.0))
    );
    assert_eq!(
        value.get(&AttributePath::new("metadata").index(1)),
        Some(&Dynamic::from("a"))
    );
    assert!(value.get(&AttributePath::new("disk")).unwrap().is_null());
}

#[test]
fn wrong_nested_value_reports_its_path() {
    let block = server_block();
    let value = Dynamic::object([(
        "volume",
        Dynamic::object([("data", Dynamic::object([("path", Dynamic::List(vec![]))]))]),
    )]);

    let diags = encode(&value, &block).unwrap_err();
    assert!(diags.has_errors());
    let diag = diags.iter().next().unwrap();
    assert_eq!(
        diag.attribute,
        AttributePath::new("volume").key("data").attribute("path")
    );
    assert_eq!(diag.attribute.to_string(), r#"volume["data"].path"#);
}
