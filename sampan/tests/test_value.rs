use std::collections::BTreeMap;

use insta::assert_snapshot;
use sampan::value::{Value, ValueKind};
use sampan::{context, render, ErrorKind, Template};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use similar_asserts::assert_eq;

#[derive(Serialize)]
enum Shape {
    Point,
    Circle(f64),
    Rect { h: u32, w: u32 },
}

#[test]
fn test_enums() {
    let value = Value::from_serialize(&vec![
        Shape::Point,
        Shape::Circle(1.5),
        Shape::Rect { h: 3, w: 2 },
    ]);
    assert_snapshot!(value.to_string(), @"['Point', {'Circle': 1.5}, {'Rect': {'h': 3, 'w': 2}}]");
}

#[test]
fn test_kinds() {
    assert_eq!(Value::from(()).kind(), ValueKind::None);
    assert_eq!(Value::from(1u64).kind(), ValueKind::Number);
    assert_eq!(Value::from_serialize(&[1, 2]).kind(), ValueKind::Seq);
    assert_eq!(Value::from_serialize(&("a", 1)).kind(), ValueKind::Seq);
    assert_eq!(context!(a => 1).kind(), ValueKind::Map);
    assert_eq!(Value::from_function(|| 1).kind(), ValueKind::Function);
}

#[test]
fn test_map_item_access() {
    let mut map = BTreeMap::new();
    map.insert(1, "one");
    map.insert(2, "two");
    assert_eq!(render!("{{ m[2] }} {{ m['1'] }}", m => map), "two one");
}

#[test]
fn test_truthiness_in_templates() {
    let tmpl = Template::from_source("{% if v %}T{% else %}F{% end %}").unwrap();
    let falsy = [
        Value::from(()),
        Value::from(false),
        Value::from(0),
        Value::from(0.0),
        Value::from(""),
        Value::from(Vec::<i32>::new()),
        context!(),
    ];
    for v in falsy {
        assert_eq!(tmpl.render(context!(v)).unwrap(), "F");
    }
    assert_eq!(tmpl.render(context!(v => " ")).unwrap(), "T");
    assert_eq!(tmpl.render(context!(v => vec![0])).unwrap(), "T");
}

#[test]
fn test_display_in_templates() {
    assert_eq!(render!("{{ x }}", x => 1.0f64), "1.0");
    assert_eq!(render!("{{ x }}", x => 2.25f64), "2.25");
    assert_eq!(render!("{{ x }}", x => Option::<i32>::None), "None");
    assert_eq!(render!("{{ x }}", x => false), "False");
    assert_eq!(render!("{% raw x %}", x => vec!["a", "b"]), "['a', 'b']");
}

#[test]
fn test_sequence_operations() {
    assert_eq!(render!("{{ [1] + [2, 3] }}"), "[1, 2, 3]");
    assert_eq!(render!("{{ [0] * 3 }}"), "[0, 0, 0]");
    assert_eq!(render!("{{ xs[-1] }}{{ 'abc'[1] }}", xs => vec![1, 2]), "2b");
    let err = Template::from_source("{{ xs[5] }}")
        .unwrap()
        .render(context!(xs => vec![1]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

struct Broken;

impl Serialize for Broken {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(S::Error::custom("cannot serialize this"))
    }
}

#[test]
fn test_bad_serialization() {
    let err = Template::from_source("{{ x }}")
        .unwrap()
        .render(context!(x => Broken))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadSerialization);
    assert_eq!(err.detail(), Some("cannot serialize this"));
}

#[cfg(feature = "json")]
#[test]
fn test_json_roundtrip_through_templates() {
    let data: serde_json::Value =
        serde_json::from_str(r#"{"user": {"name": "Ann", "roles": ["a", "b"]}, "n": 1.5}"#)
            .unwrap();
    assert_eq!(
        render!("{{ data.user.name }} {{ len(data.user.roles) }} {{ data.n * 2 }}", data),
        "Ann 2 3.0"
    );
    assert_eq!(
        render!("{% raw json_encode(data.user.roles) %}", data),
        r#"["a","b"]"#
    );
}

#[cfg(feature = "preserve_order")]
#[test]
fn test_preserve_order() {
    #[derive(Serialize)]
    struct Ordered {
        zebra: i32,
        apple: i32,
    }
    assert_eq!(
        render!("{% for k in d %}{{ k }}{% end %}", d => Ordered { zebra: 1, apple: 2 }),
        "zebraapple"
    );
}
