use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind};
use crate::functions;
use crate::value::{from_args, Value, ValueKind, ValueMap};

/// Returns the namespace every template starts out with.
pub(crate) fn get_globals() -> BTreeMap<String, Value> {
    let mut rv = BTreeMap::new();
    rv.insert("escape".into(), Value::from_named_function("escape", functions::xhtml_escape));
    rv.insert(
        "html_escape".into(),
        Value::from_named_function("html_escape", functions::xhtml_escape),
    );
    rv.insert(
        "xhtml_escape".into(),
        Value::from_named_function("xhtml_escape", functions::xhtml_escape),
    );
    #[cfg(feature = "urlencode")]
    {
        rv.insert("url_escape".into(), Value::from_function(functions::url_escape));
    }
    #[cfg(feature = "json")]
    {
        rv.insert("json_encode".into(), Value::from_function(functions::json_encode));
    }
    rv.insert("squeeze".into(), Value::from_function(functions::squeeze));
    rv.insert("range".into(), Value::from_function(functions::range));
    rv.insert("len".into(), Value::from_function(functions::len));
    rv.insert("str".into(), Value::from_named_function("str", functions::string));
    rv.insert("int".into(), Value::from_function(functions::int));
    rv.insert("float".into(), Value::from_function(functions::float));
    rv.insert("abs".into(), Value::from_function(functions::abs));
    rv.insert("min".into(), Value::from_function(functions::min));
    rv.insert("max".into(), Value::from_function(functions::max));
    rv.insert("sorted".into(), Value::from_function(functions::sorted));
    rv
}

fn no_method(value: &Value, name: &str) -> Error {
    Error::new(
        ErrorKind::UndefinedError,
        format!("{} has no method named {name}", value.kind()),
    )
}

/// Calls one of the built-in methods on a value.
///
/// Mapping entries that hold callables are invoked before the built-in
/// methods are considered, so `{{ ns.keys() }}` calls the entry named
/// `keys` if there is one.
pub(crate) fn call_method(value: &Value, name: &str, args: &[Value]) -> Result<Value, Error> {
    match value.kind() {
        ValueKind::String => call_string_method(value, value.as_str().unwrap_or_default(), name, args),
        ValueKind::Seq => call_seq_method(value, value.as_slice().unwrap_or_default(), name, args),
        ValueKind::Map => {
            let map = match value.as_map() {
                Some(map) => map,
                None => return Err(no_method(value, name)),
            };
            if let Some(func) = map.get(name) {
                return func.call(args);
            }
            call_map_method(value, map, name, args)
        }
        ValueKind::Invalid => value.validate().map(|_| Value::default()),
        _ => Err(no_method(value, name)),
    }
}

fn strip_chars<'s>(s: &'s str, chars: &Option<String>, left: bool, right: bool) -> &'s str {
    match chars {
        Some(chars) => {
            let pat = |c: char| chars.contains(c);
            match (left, right) {
                (true, true) => s.trim_matches(pat),
                (true, false) => s.trim_start_matches(pat),
                _ => s.trim_end_matches(pat),
            }
        }
        None => match (left, right) {
            (true, true) => s.trim(),
            (true, false) => s.trim_start(),
            _ => s.trim_end(),
        },
    }
}

fn title(s: &str) -> String {
    let mut rv = String::with_capacity(s.len());
    let mut capitalize = true;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if capitalize {
                rv.extend(c.to_uppercase());
                capitalize = false;
            } else {
                rv.extend(c.to_lowercase());
            }
        } else {
            rv.push(c);
            capitalize = true;
        }
    }
    rv
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

fn call_string_method(value: &Value, s: &str, name: &str, args: &[Value]) -> Result<Value, Error> {
    Ok(match name {
        "upper" => {
            ok!(from_args::<()>(args));
            Value::from(s.to_uppercase())
        }
        "lower" => {
            ok!(from_args::<()>(args));
            Value::from(s.to_lowercase())
        }
        "title" => {
            ok!(from_args::<()>(args));
            Value::from(title(s))
        }
        "capitalize" => {
            ok!(from_args::<()>(args));
            Value::from(capitalize(s))
        }
        "strip" | "lstrip" | "rstrip" => {
            let (chars,): (Option<String>,) = ok!(from_args(args));
            Value::from(strip_chars(s, &chars, name != "rstrip", name != "lstrip"))
        }
        "startswith" => {
            let (prefix,): (String,) = ok!(from_args(args));
            Value::from(s.starts_with(&prefix))
        }
        "endswith" => {
            let (suffix,): (String,) = ok!(from_args(args));
            Value::from(s.ends_with(&suffix))
        }
        "replace" => {
            let (old, new, count): (String, String, Option<usize>) = ok!(from_args(args));
            match count {
                Some(count) => Value::from(s.replacen(&old, &new, count)),
                None => Value::from(s.replace(&old, &new)),
            }
        }
        "split" => {
            let (sep, maxsplit): (Option<String>, Option<i64>) = ok!(from_args(args));
            let maxsplit = maxsplit.filter(|&n| n >= 0).map(|n| n as usize + 1);
            match (sep, maxsplit) {
                (Some(sep), _) if sep.is_empty() => {
                    return Err(Error::new(ErrorKind::InvalidArguments, "empty separator"))
                }
                (Some(sep), Some(n)) => s.splitn(n, sep.as_str()).map(Value::from).collect(),
                (Some(sep), None) => s.split(sep.as_str()).map(Value::from).collect(),
                (None, _) => s.split_whitespace().map(Value::from).collect(),
            }
        }
        "join" => {
            let (items,): (Vec<String>,) = ok!(from_args(args));
            Value::from(items.join(s))
        }
        _ => return Err(no_method(value, name)),
    })
}

fn call_seq_method(value: &Value, items: &[Value], name: &str, args: &[Value]) -> Result<Value, Error> {
    match name {
        "index" => {
            let (needle,): (Value,) = ok!(from_args(args));
            match items.iter().position(|x| *x == needle) {
                Some(idx) => Ok(Value::from(idx)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{needle:?} is not in list"),
                )),
            }
        }
        "count" => {
            let (needle,): (Value,) = ok!(from_args(args));
            Ok(Value::from(items.iter().filter(|x| **x == needle).count()))
        }
        _ => Err(no_method(value, name)),
    }
}

fn call_map_method(value: &Value, map: &ValueMap, name: &str, args: &[Value]) -> Result<Value, Error> {
    match name {
        "get" => {
            let (key, default): (Value, Option<Value>) = ok!(from_args(args));
            let key = match key.as_str() {
                Some(key) => key.to_string(),
                None => key.to_string(),
            };
            Ok(map.get(key.as_str()).cloned().or(default).unwrap_or_default())
        }
        "keys" => {
            ok!(from_args::<()>(args));
            Ok(map.keys().map(|k| Value::from(k.clone())).collect())
        }
        "values" => {
            ok!(from_args::<()>(args));
            Ok(map.values().cloned().collect())
        }
        "items" => {
            ok!(from_args::<()>(args));
            Ok(map
                .iter()
                .map(|(k, v)| Value::from(vec![Value::from(k.clone()), v.clone()]))
                .collect())
        }
        _ => Err(no_method(value, name)),
    }
}
