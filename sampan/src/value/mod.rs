//! Provides a dynamic value type abstraction.
//!
//! This module gives access to a dynamically typed value which is used by
//! the template engine during execution.
//!
//! For the most part the existence of the value type can be ignored as
//! the engine will perform the necessary conversions for you.  For instance
//! if you write a function that takes an `i64` as argument the value
//! coming in is automatically converted.
//!
//! # Converting Values
//!
//! Values are typically created via the [`From`] trait:
//!
//! ```
//! # use sampan::value::Value;
//! let int_value = Value::from(42);
//! let none_value = Value::from(());
//! let true_value = Value::from(true);
//! ```
//!
//! Or via the [`FromIterator`] trait:
//!
//! ```
//! # use sampan::value::Value;
//! // collection into a sequence
//! let value: Value = (1..10).into_iter().collect();
//! ```
//!
//! Any type implementing [`Serialize`] can be converted with
//! [`Value::from_serialize`], which is also what the
//! [`context!`](crate::context) macro uses.
//!
//! # Display
//!
//! Values format the way the template language prints them: `None`,
//! `True` and `False` for the constants, floats always carry a fractional
//! part and containers print their items in literal form (`[1, 'a']`).
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::ser::{Serialize, Serializer};

use crate::error::{Error, ErrorKind};
use crate::functions::{BoxedFunction, Function};

pub use crate::value::argtypes::{from_args, ArgType, FunctionArgs, FunctionResult, Rest};

mod argtypes;
pub(crate) mod ops;
mod serialize;

/// The map type used by mapping values.
#[cfg(feature = "preserve_order")]
pub type ValueMap = indexmap::IndexMap<Arc<str>, Value>;

/// The map type used by mapping values.
#[cfg(not(feature = "preserve_order"))]
pub type ValueMap = BTreeMap<Arc<str>, Value>;

/// Describes the kind of value.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValueKind {
    /// The value is none.
    None,
    /// The value is a bool.
    Bool,
    /// The value is a number (integer or float).
    Number,
    /// The value is a string.
    String,
    /// The value is a sequence.
    Seq,
    /// The value is a mapping.
    Map,
    /// The value can be called.
    Function,
    /// The value failed to convert.
    Invalid,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::None => "none",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Seq => "sequence",
            ValueKind::Map => "map",
            ValueKind::Function => "function",
            ValueKind::Invalid => "invalid value",
        })
    }
}

#[derive(Clone)]
pub(crate) enum ValueRepr {
    None,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Seq(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    Function(BoxedFunction),
    Invalid(Arc<str>),
}

/// Represents a dynamically typed value in the template engine.
///
/// Cloning a value is cheap, containers and strings are reference counted.
#[derive(Clone)]
pub struct Value(pub(crate) ValueRepr);

impl Default for Value {
    fn default() -> Value {
        Value(ValueRepr::None)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (ValueRepr::None, ValueRepr::None) => true,
            (ValueRepr::String(a), ValueRepr::String(b)) => a == b,
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => a == b,
            (ValueRepr::Map(a), ValueRepr::Map(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k) == Some(v))
            }
            (ValueRepr::Function(a), ValueRepr::Function(b)) => a.ptr_eq(b),
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::I64(a, b)) => a == b,
                Some(ops::CoerceResult::F64(a, b)) => a == b,
                None => false,
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (&self.0, &other.0) {
            (ValueRepr::String(a), ValueRepr::String(b)) => Some(a.cmp(b)),
            (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
                for (a, b) in a.iter().zip(b.iter()) {
                    match a.partial_cmp(b) {
                        Some(Ordering::Equal) => continue,
                        rv => return rv,
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => match ops::coerce(self, other) {
                Some(ops::CoerceResult::I64(a, b)) => Some(a.cmp(&b)),
                Some(ops::CoerceResult::F64(a, b)) => a.partial_cmp(&b),
                None => None,
            },
        }
    }
}

fn write_str_repr(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    ok!(write!(f, "{quote}"));
    for c in s.chars() {
        match c {
            '\\' => ok!(f.write_str("\\\\")),
            '\n' => ok!(f.write_str("\\n")),
            '\r' => ok!(f.write_str("\\r")),
            '\t' => ok!(f.write_str("\\t")),
            c if c == quote => ok!(write!(f, "\\{c}")),
            c => ok!(write!(f, "{c}")),
        }
    }
    write!(f, "{quote}")
}

fn write_float(f: &mut fmt::Formatter<'_>, val: f64) -> fmt::Result {
    if val.is_nan() {
        f.write_str("nan")
    } else if val.is_infinite() {
        f.write_str(if val > 0.0 { "inf" } else { "-inf" })
    } else if val.fract() == 0.0 && val.abs() < 1e16 {
        write!(f, "{val:.1}")
    } else {
        write!(f, "{val}")
    }
}

impl Value {
    /// Writes the literal form of the value, quoting strings.
    fn write_repr(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::String(s) => write_str_repr(f, s),
            _ => fmt::Display::fmt(self, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::None => f.write_str("None"),
            ValueRepr::Bool(true) => f.write_str("True"),
            ValueRepr::Bool(false) => f.write_str("False"),
            ValueRepr::I64(val) => write!(f, "{val}"),
            ValueRepr::F64(val) => write_float(f, *val),
            ValueRepr::String(val) => f.write_str(val),
            ValueRepr::Seq(items) => {
                ok!(f.write_str("["));
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(item.write_repr(f));
                }
                f.write_str("]")
            }
            ValueRepr::Map(map) => {
                ok!(f.write_str("{"));
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        ok!(f.write_str(", "));
                    }
                    ok!(write_str_repr(f, key));
                    ok!(f.write_str(": "));
                    ok!(value.write_repr(f));
                }
                f.write_str("}")
            }
            ValueRepr::Function(func) => write!(f, "<function {}>", func.name()),
            ValueRepr::Invalid(_) => f.write_str("<invalid value>"),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            ValueRepr::Invalid(err) => write!(f, "<invalid value: {err}>"),
            _ => self.write_repr(f),
        }
    }
}

impl Value {
    /// Creates a value from something that can be serialized.
    ///
    /// This is how the template context is created.  If serialization
    /// fails the value is invalid and using it while rendering fails with
    /// a [`BadSerialization`](ErrorKind::BadSerialization) error.
    ///
    /// ```
    /// # use sampan::value::Value;
    /// let val = Value::from_serialize(&vec![1, 2, 3]);
    /// assert_eq!(val.to_string(), "[1, 2, 3]");
    /// ```
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Value {
        match value.serialize(serialize::ValueSerializer) {
            Ok(rv) => rv,
            Err(err) => Value(ValueRepr::Invalid(match err.detail() {
                Some(detail) => Arc::from(detail),
                None => Arc::from(err.to_string()),
            })),
        }
    }

    /// Creates a mapping value.
    pub fn from_map(map: ValueMap) -> Value {
        Value(ValueRepr::Map(Arc::new(map)))
    }

    /// Creates a callable value from a function.
    ///
    /// ```
    /// # use sampan::value::Value;
    /// let double = Value::from_function(|x: i64| x * 2);
    /// assert_eq!(double.call(&[Value::from(21)]).unwrap(), Value::from(42));
    /// ```
    pub fn from_function<F, Rv, Args>(f: F) -> Value
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: FunctionArgs,
    {
        Value(ValueRepr::Function(BoxedFunction::new(f)))
    }

    /// Creates a callable value with a name used in messages.
    pub(crate) fn from_named_function<F, Rv, Args>(name: &'static str, f: F) -> Value
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: FunctionArgs,
    {
        Value(ValueRepr::Function(BoxedFunction::new(f).with_name(name)))
    }

    /// Returns the kind of the value.
    pub fn kind(&self) -> ValueKind {
        match self.0 {
            ValueRepr::None => ValueKind::None,
            ValueRepr::Bool(_) => ValueKind::Bool,
            ValueRepr::I64(_) | ValueRepr::F64(_) => ValueKind::Number,
            ValueRepr::String(_) => ValueKind::String,
            ValueRepr::Seq(_) => ValueKind::Seq,
            ValueRepr::Map(_) => ValueKind::Map,
            ValueRepr::Function(_) => ValueKind::Function,
            ValueRepr::Invalid(_) => ValueKind::Invalid,
        }
    }

    /// Is this value none?
    pub fn is_none(&self) -> bool {
        matches!(self.0, ValueRepr::None)
    }

    /// Is this value a number?
    pub fn is_number(&self) -> bool {
        matches!(self.0, ValueRepr::I64(_) | ValueRepr::F64(_))
    }

    /// Is this value true?
    ///
    /// None, `False`, zero and empty strings or containers are false,
    /// everything else is true.
    pub fn is_true(&self) -> bool {
        match &self.0 {
            ValueRepr::None | ValueRepr::Invalid(_) => false,
            ValueRepr::Bool(val) => *val,
            ValueRepr::I64(val) => *val != 0,
            ValueRepr::F64(val) => *val != 0.0,
            ValueRepr::String(val) => !val.is_empty(),
            ValueRepr::Seq(items) => !items.is_empty(),
            ValueRepr::Map(map) => !map.is_empty(),
            ValueRepr::Function(_) => true,
        }
    }

    /// If the value is a string, returns it.
    pub fn as_str(&self) -> Option<&str> {
        match &self.0 {
            ValueRepr::String(s) => Some(s),
            _ => None,
        }
    }

    /// If the value is an integer (or bool), returns it.
    pub fn as_i64(&self) -> Option<i64> {
        match self.0 {
            ValueRepr::Bool(val) => Some(val as i64),
            ValueRepr::I64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a number, returns it as float.
    pub fn as_f64(&self) -> Option<f64> {
        match self.0 {
            ValueRepr::Bool(val) => Some(val as i64 as f64),
            ValueRepr::I64(val) => Some(val as f64),
            ValueRepr::F64(val) => Some(val),
            _ => None,
        }
    }

    /// If the value is a sequence, returns the items.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match &self.0 {
            ValueRepr::Seq(items) => Some(&items[..]),
            _ => None,
        }
    }

    /// If the value is a mapping, returns it.
    pub fn as_map(&self) -> Option<&ValueMap> {
        match &self.0 {
            ValueRepr::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the length of strings and containers.
    pub fn len(&self) -> Option<usize> {
        match &self.0 {
            ValueRepr::String(s) => Some(s.chars().count()),
            ValueRepr::Seq(items) => Some(items.len()),
            ValueRepr::Map(map) => Some(map.len()),
            _ => None,
        }
    }

    /// Returns an error if the value (or any value it contains) failed to
    /// convert from its serialized form.
    pub(crate) fn validate(&self) -> Result<(), Error> {
        match &self.0 {
            ValueRepr::Invalid(err) => Err(Error::new(
                ErrorKind::BadSerialization,
                err.to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Looks up an attribute of a mapping.
    pub fn get_attr(&self, name: &str) -> Result<Value, Error> {
        match &self.0 {
            ValueRepr::Map(map) => match map.get(name) {
                Some(value) => Ok(value.clone()),
                None => Err(Error::new(
                    ErrorKind::UndefinedError,
                    format!("map has no attribute {name:?}"),
                )),
            },
            ValueRepr::Invalid(_) => self.validate().map(|_| Value::default()),
            _ => Err(Error::new(
                ErrorKind::UndefinedError,
                format!("{} has no attribute {name:?}", self.kind()),
            )),
        }
    }

    /// Looks up an item by index or key.
    ///
    /// Sequences and strings take integer indexes where negative indexes
    /// count from the end, mappings look up the stringified key.
    pub fn get_item(&self, key: &Value) -> Result<Value, Error> {
        match &self.0 {
            ValueRepr::Map(map) => {
                let key = key.to_string();
                match map.get(key.as_str()) {
                    Some(value) => Ok(value.clone()),
                    None => Err(Error::new(
                        ErrorKind::UndefinedError,
                        format!("key {key:?} not in map"),
                    )),
                }
            }
            ValueRepr::Seq(items) => {
                let idx = ok!(index_of(key, items.len()));
                Ok(items[idx].clone())
            }
            ValueRepr::String(s) => {
                let idx = ok!(index_of(key, s.chars().count()));
                Ok(Value::from(s.chars().nth(idx).map(String::from).unwrap_or_default()))
            }
            ValueRepr::Invalid(_) => self.validate().map(|_| Value::default()),
            _ => Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("{} is not subscriptable", self.kind()),
            )),
        }
    }

    /// Calls the value if it is a function.
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        match &self.0 {
            ValueRepr::Function(func) => func.invoke(args),
            _ => Err(Error::new(
                ErrorKind::NotCallable,
                format!("{} is not callable", self.kind()),
            )),
        }
    }

    /// Iterates over the value.
    ///
    /// Sequences yield their items, mappings their keys and strings their
    /// characters.
    pub fn try_iter(&self) -> Result<ValueIter, Error> {
        let items = match &self.0 {
            ValueRepr::Seq(items) => items.clone(),
            ValueRepr::Map(map) => Arc::new(map.keys().map(|k| Value::from(k.clone())).collect()),
            ValueRepr::String(s) => Arc::new(s.chars().map(|c| Value::from(String::from(c))).collect()),
            ValueRepr::Invalid(_) => return self.validate().map(|_| ValueIter::default()),
            _ => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("{} is not iterable", self.kind()),
                ))
            }
        };
        Ok(ValueIter { items, idx: 0 })
    }
}

fn index_of(key: &Value, len: usize) -> Result<usize, Error> {
    let idx = match key.as_i64() {
        Some(idx) => idx,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("indices must be integers, not {}", key.kind()),
            ))
        }
    };
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved < 0 || resolved >= len as i64 {
        Err(Error::new(
            ErrorKind::UndefinedError,
            format!("index {idx} out of range"),
        ))
    } else {
        Ok(resolved as usize)
    }
}

/// Iterates over the items of a value.
#[derive(Default)]
pub struct ValueIter {
    items: Arc<Vec<Value>>,
    idx: usize,
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let rv = some!(self.items.get(self.idx)).clone();
        self.idx += 1;
        Some(rv)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.items.len() - self.idx;
        (len, Some(len))
    }
}

impl ExactSizeIterator for ValueIter {}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match &self.0 {
            ValueRepr::None => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(*b),
            ValueRepr::I64(i) => serializer.serialize_i64(*i),
            ValueRepr::F64(f) => serializer.serialize_f64(*f),
            ValueRepr::String(s) => serializer.serialize_str(s),
            ValueRepr::Seq(items) => items.serialize(serializer),
            ValueRepr::Map(map) => {
                use serde::ser::SerializeMap;
                let mut m = ok!(serializer.serialize_map(Some(map.len())));
                for (k, v) in map.iter() {
                    ok!(m.serialize_entry(&**k, v));
                }
                m.end()
            }
            ValueRepr::Function(func) => serializer.serialize_str(&format!("<function {}>", func.name())),
            ValueRepr::Invalid(err) => Err(serde::ser::Error::custom(err)),
        }
    }
}

macro_rules! value_from {
    ($src:ty, $dst:ident) => {
        impl From<$src> for Value {
            #[inline(always)]
            fn from(val: $src) -> Self {
                Value(ValueRepr::$dst(val as _))
            }
        }
    };
}

value_from!(bool, Bool);
value_from!(u8, I64);
value_from!(u16, I64);
value_from!(u32, I64);
value_from!(i8, I64);
value_from!(i16, I64);
value_from!(i32, I64);
value_from!(i64, I64);
value_from!(f32, F64);
value_from!(f64, F64);

macro_rules! value_from_wide_int {
    ($src:ty) => {
        impl From<$src> for Value {
            fn from(val: $src) -> Self {
                match i64::try_from(val) {
                    Ok(val) => Value(ValueRepr::I64(val)),
                    Err(_) => Value(ValueRepr::F64(val as f64)),
                }
            }
        }
    };
}

value_from_wide_int!(u64);
value_from_wide_int!(usize);
value_from_wide_int!(i128);
value_from_wide_int!(u128);

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value(ValueRepr::None)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Value(ValueRepr::String(Arc::from(val)))
    }
}

impl From<Arc<str>> for Value {
    fn from(val: Arc<str>) -> Self {
        Value(ValueRepr::String(val))
    }
}

impl From<char> for Value {
    fn from(val: char) -> Self {
        Value::from(String::from(val))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(val: Option<T>) -> Self {
        match val {
            Some(val) => val.into(),
            None => Value(ValueRepr::None),
        }
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(val: Vec<T>) -> Self {
        Value(ValueRepr::Seq(Arc::new(
            val.into_iter().map(Into::into).collect(),
        )))
    }
}

impl<K: Into<Arc<str>>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(val: BTreeMap<K, V>) -> Self {
        Value::from_map(val.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(feature = "preserve_order")]
impl From<ValueMap> for Value {
    fn from(val: ValueMap) -> Self {
        Value::from_map(val)
    }
}

impl<V: Into<Value>> FromIterator<V> for Value {
    fn from_iter<T: IntoIterator<Item = V>>(iter: T) -> Self {
        Value(ValueRepr::Seq(Arc::new(iter.into_iter().map(Into::into).collect())))
    }
}
