use std::ops::{Deref, DerefMut};

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueMap, ValueRepr};

/// A utility trait that represents the return value of functions.
///
/// It's implemented for the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
pub trait FunctionResult {
    #[doc(hidden)]
    fn into_result(self) -> Result<Value, Error>;
}

impl<I: Into<Value>> FunctionResult for Result<I, Error> {
    fn into_result(self) -> Result<Value, Error> {
        self.map(Into::into)
    }
}

impl<I: Into<Value>> FunctionResult for I {
    fn into_result(self) -> Result<Value, Error> {
        Ok(self.into())
    }
}

/// Helper trait representing valid function arguments.
///
/// Functions are written with concrete types instead of values, this
/// trait converts the argument slice into a tuple of them.  It is
/// implemented for tuples of up to four [`ArgType`]s.
pub trait FunctionArgs: Sized {
    /// Converts to function arguments from a slice of values.
    #[doc(hidden)]
    fn from_values(values: &[Value]) -> Result<Self, Error>;
}

/// Utility function to convert a slice of values into arguments.
///
/// ```
/// use sampan::value::{from_args, Value};
/// # fn foo() -> Result<(), sampan::Error> {
/// let args = vec![Value::from("foo"), Value::from(42i64)];
/// let (string, num): (String, i64) = from_args(&args)?;
/// # Ok(()) } fn main() { foo().unwrap(); }
/// ```
#[inline(always)]
pub fn from_args<Args: FunctionArgs>(values: &[Value]) -> Result<Args, Error> {
    Args::from_values(values)
}

/// A trait implemented by all function argument types.
///
/// It's implemented for the following types:
///
/// * integers: [`i64`], [`i32`], [`usize`]
/// * floats: [`f64`]
/// * bool: [`bool`]
/// * string: [`String`]
/// * values: [`Value`]
/// * vectors: [`Vec<T>`]
/// * mappings: [`ValueMap`]
///
/// Optional parameters are encoded as `Option<T>` and [`Rest<T>`] collects
/// the remaining arguments.
pub trait ArgType: Sized {
    #[doc(hidden)]
    fn from_value(value: Option<&Value>) -> Result<Self, Error>;

    #[doc(hidden)]
    fn from_values(values: &[Value], offset: usize) -> Result<(Self, usize), Error> {
        Ok((ok!(Self::from_value(values.get(offset))), 1))
    }
}

fn missing_argument() -> Error {
    Error::new(ErrorKind::InvalidArguments, "missing argument")
}

fn too_many_arguments() -> Error {
    Error::new(ErrorKind::InvalidArguments, "too many arguments")
}

fn expected(kind: &str, value: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidArguments,
        format!("expected {kind}, got {}", value.kind()),
    )
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<$($name: ArgType,)*> FunctionArgs for ($($name,)*) {
            fn from_values(values: &[Value]) -> Result<Self, Error> {
                #![allow(non_snake_case, unused)]
                let mut idx = 0;
                $(
                    let ($name, offset) = ok!($name::from_values(values, idx));
                    idx += offset;
                )*
                if values.get(idx).is_some() {
                    Err(too_many_arguments())
                } else {
                    Ok(( $($name,)* ))
                }
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl ArgType for Value {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.clone()),
            None => Err(missing_argument()),
        }
    }
}

impl ArgType for String {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.to_string()),
            None => Err(missing_argument()),
        }
    }
}

impl ArgType for bool {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => Ok(value.is_true()),
            None => Err(missing_argument()),
        }
    }
}

impl ArgType for f64 {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => value.as_f64().ok_or_else(|| expected("number", value)),
            None => Err(missing_argument()),
        }
    }
}

macro_rules! int_arg_type {
    ($ty:ty) => {
        impl ArgType for $ty {
            fn from_value(value: Option<&Value>) -> Result<Self, Error> {
                let value = match value {
                    Some(value) => value,
                    None => return Err(missing_argument()),
                };
                let int = match value.0 {
                    ValueRepr::F64(f) if f.fract() == 0.0 => Some(f as i64),
                    _ => value.as_i64(),
                };
                match int.and_then(|x| <$ty>::try_from(x).ok()) {
                    Some(rv) => Ok(rv),
                    None => Err(expected(stringify!($ty), value)),
                }
            }
        }
    };
}

int_arg_type!(i64);
int_arg_type!(i32);
int_arg_type!(usize);

impl ArgType for ValueMap {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => match value.as_map() {
                Some(map) => Ok(map.clone()),
                None => Err(expected("map", value)),
            },
            None => Err(missing_argument()),
        }
    }
}

impl<T: ArgType> ArgType for Vec<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) => {
                let mut rv = Vec::new();
                for item in ok!(value.try_iter()) {
                    rv.push(ok!(T::from_value(Some(&item))));
                }
                Ok(rv)
            }
            None => Err(missing_argument()),
        }
    }
}

impl<T: ArgType> ArgType for Option<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        match value {
            Some(value) if !value.is_none() => T::from_value(Some(value)).map(Some),
            _ => Ok(None),
        }
    }
}

/// Utility type to capture remaining arguments.
///
/// The last argument of a function can use this type to become variadic.
/// The type itself deref's into the inner vector.
///
/// ```
/// # use sampan::value::{Rest, Value};
/// fn sum(values: Rest<i64>) -> i64 {
///     values.iter().sum()
/// }
/// let func = Value::from_function(sum);
/// ```
#[derive(Debug)]
pub struct Rest<T>(pub Vec<T>);

impl<T> Deref for Rest<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Rest<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: ArgType> ArgType for Rest<T> {
    fn from_value(value: Option<&Value>) -> Result<Self, Error> {
        Ok(Rest(ok!(value
            .iter()
            .map(|v| T::from_value(Some(v)))
            .collect::<Result<_, _>>())))
    }

    fn from_values(values: &[Value], offset: usize) -> Result<(Self, usize), Error> {
        let args = values.get(offset..).unwrap_or_default();
        Ok((
            Rest(ok!(args
                .iter()
                .map(|v| T::from_value(Some(v)))
                .collect::<Result<_, _>>())),
            args.len(),
        ))
    }
}

impl From<Value> for String {
    fn from(val: Value) -> Self {
        match val.0 {
            ValueRepr::String(s) => s.to_string(),
            _ => val.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_args() {
        let args = vec![Value::from(1), Value::from("x")];
        let (a, b): (i64, String) = from_args(&args).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, "x");
        let (a, b): (i64, Option<i64>) = from_args(&args[..1]).unwrap();
        assert_eq!((a, b), (1, None));
        let err = from_args::<(i64,)>(&args).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArguments);
        let (rest,): (Rest<Value>,) = from_args(&args).unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn test_int_conversion() {
        assert_eq!(i64::from_value(Some(&Value::from(2.0))).unwrap(), 2);
        assert!(i64::from_value(Some(&Value::from(2.5))).is_err());
        assert!(usize::from_value(Some(&Value::from(-1))).is_err());
    }
}
