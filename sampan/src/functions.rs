//! Global functions and abstractions.
//!
//! This module provides the abstractions for functions that can be
//! registered on a [`Loader`](crate::Loader) via
//! [`add_function`](crate::Loader::add_function), and the built-in
//! functions every template can call.
//!
//! # Custom Functions
//!
//! A custom function is just a simple rust function which accepts up to
//! four arguments and returns a result.
//!
//! ```rust
//! # use sampan::Loader;
//! # let mut loader = Loader::new();
//! use sampan::{Error, ErrorKind};
//!
//! fn include_file(name: String) -> Result<String, Error> {
//!     std::fs::read_to_string(&name)
//!         .map_err(|e| Error::new(
//!             ErrorKind::InvalidOperation,
//!             "cannot load file"
//!         ).with_source(e))
//! }
//!
//! loader.add_function("include_file", include_file);
//! ```
//!
//! # Built-in Functions
//!
//! The template namespace always contains the functions of this module.
//! Loader globals and render bindings of the same name shadow them.
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, ErrorKind};
use crate::utils::{safe_sort, squeeze as squeeze_str, HtmlEscape};
use crate::value::{FunctionArgs, FunctionResult, Rest, Value, ValueKind};

type FuncFunc = dyn Fn(&[Value]) -> Result<Value, Error> + Sync + Send + 'static;

/// A boxed function.
#[derive(Clone)]
pub(crate) struct BoxedFunction(Arc<FuncFunc>, &'static str);

/// A utility trait that represents functions.
///
/// This trait is used by [`add_function`](crate::Loader::add_function) and
/// [`Value::from_function`] to abstract over different types of functions.
///
/// A function can return any of the following types:
///
/// * `Rv` where `Rv` implements `Into<Value>`
/// * `Result<Rv, Error>` where `Rv` implements `Into<Value>`
///
/// The parameters can be marked optional by using `Option<T>`.  The last
/// argument can also use [`Rest<T>`](crate::value::Rest) to capture the
/// remaining arguments.  All types are supported for which
/// [`ArgType`](crate::value::ArgType) is implemented.
///
/// ```
/// # use sampan::Loader;
/// # let mut loader = Loader::new();
/// use sampan::value::Rest;
///
/// fn sum(values: Rest<i64>) -> i64 {
///     values.iter().sum()
/// }
///
/// loader.add_function("sum", sum);
/// ```
pub trait Function<Rv, Args>: Send + Sync + 'static {
    /// Calls a function with the given arguments.
    #[doc(hidden)]
    fn invoke(&self, args: Args) -> Rv;
}

macro_rules! tuple_impls {
    ( $( $name:ident )* ) => {
        impl<Func, Rv, $($name),*> Function<Rv, ($($name,)*)> for Func
        where
            Func: Fn($($name),*) -> Rv + Send + Sync + 'static,
            Rv: FunctionResult,
        {
            fn invoke(&self, args: ($($name,)*)) -> Rv {
                #[allow(non_snake_case)]
                let ($($name,)*) = args;
                (self)($($name,)*)
            }
        }
    };
}

tuple_impls! {}
tuple_impls! { A }
tuple_impls! { A B }
tuple_impls! { A B C }
tuple_impls! { A B C D }

impl BoxedFunction {
    /// Creates a new boxed function.
    pub fn new<F, Rv, Args>(f: F) -> BoxedFunction
    where
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: FunctionArgs,
    {
        BoxedFunction(
            Arc::new(move |args| -> Result<Value, Error> {
                f.invoke(ok!(Args::from_values(args))).into_result()
            }),
            std::any::type_name::<F>(),
        )
    }

    /// Overrides the name shown in messages.
    pub fn with_name(mut self, name: &'static str) -> BoxedFunction {
        self.1 = name;
        self
    }

    /// Invokes the function.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, Error> {
        (self.0)(args)
    }

    /// The name of the function.
    pub fn name(&self) -> &'static str {
        self.1.rsplit("::").next().unwrap_or(self.1)
    }

    pub fn ptr_eq(&self, other: &BoxedFunction) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BoxedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HTML escapes a value.
///
/// `&`, `<`, `>`, `"` and `'` are replaced by entities.  `escape` and
/// `html_escape` are aliases of this function.
pub fn xhtml_escape(value: Value) -> String {
    match value.as_str() {
        Some(s) => HtmlEscape(s).to_string(),
        None => HtmlEscape(&value.to_string()).to_string(),
    }
}

/// URL-encodes a value.
///
/// Spaces are encoded as `%20` unless `plus` is set, in which case they
/// become `+` as form encoded query strings expect.  `/` is left alone.
#[cfg(feature = "urlencode")]
pub fn url_escape(value: String, plus: Option<bool>) -> String {
    use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

    const SET: &AsciiSet = &NON_ALPHANUMERIC
        .remove(b'/')
        .remove(b'.')
        .remove(b'-')
        .remove(b'_')
        .remove(b'~');
    const PLUS_SET: &AsciiSet = &SET.remove(b' ');

    if plus.unwrap_or(false) {
        utf8_percent_encode(&value, PLUS_SET)
            .to_string()
            .replace(' ', "+")
    } else {
        utf8_percent_encode(&value, SET).to_string()
    }
}

/// Serializes a value to JSON.
#[cfg(feature = "json")]
pub fn json_encode(value: Value) -> Result<String, Error> {
    ok!(value.validate());
    serde_json::to_string(&value)
        .map(|s| s.replace("</", "<\\/"))
        .map_err(|err| {
            Error::new(ErrorKind::InvalidOperation, "cannot serialize to JSON").with_source(err)
        })
}

/// Collapses runs of whitespace into single spaces and trims the result.
pub fn squeeze(value: String) -> String {
    squeeze_str(&value)
}

/// Returns a list of integers.
///
/// `range(stop)`, `range(start, stop)` and `range(start, stop, step)`
/// behave like the python built-in of the same name.
pub fn range(lower: i64, upper: Option<i64>, step: Option<i64>) -> Result<Value, Error> {
    let (start, stop) = match upper {
        Some(upper) => (lower, upper),
        None => (0, lower),
    };
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::new(
            ErrorKind::InvalidArguments,
            "range() step must not be zero",
        ));
    }
    // i128 holds every intermediate for i64 bounds
    let (start, stop, step) = (start as i128, stop as i128, step as i128);
    let count = if step > 0 {
        (stop - start + step - 1).max(0) / step
    } else {
        (start - stop - step - 1).max(0) / -step
    };
    if count > 100_000 {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "range has too many elements",
        ));
    }
    Ok((0..count).map(|idx| (start + idx * step) as i64).collect())
}

/// Returns the length of a string or container.
pub fn len(value: Value) -> Result<usize, Error> {
    value.len().ok_or_else(|| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("{} has no length", value.kind()),
        )
    })
}

/// Converts a value to a string.
pub fn string(value: Option<Value>) -> String {
    value.map(String::from).unwrap_or_default()
}

/// Converts a value to an integer.
pub fn int(value: Value) -> Result<i64, Error> {
    match value.kind() {
        ValueKind::Number | ValueKind::Bool => match value.as_i64() {
            Some(rv) => Ok(rv),
            None => value
                .as_f64()
                .map(|f| f.trunc() as i64)
                .ok_or_else(|| Error::from(ErrorKind::InvalidOperation)),
        },
        ValueKind::String => value.as_str().unwrap_or_default().trim().parse().map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("invalid literal for int(): {value:?}"),
            )
        }),
        kind => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {kind} to int"),
        )),
    }
}

/// Converts a value to a float.
pub fn float(value: Value) -> Result<f64, Error> {
    match value.kind() {
        ValueKind::Number | ValueKind::Bool => value
            .as_f64()
            .ok_or_else(|| Error::from(ErrorKind::InvalidOperation)),
        ValueKind::String => value.as_str().unwrap_or_default().trim().parse().map_err(|_| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("could not convert string to float: {value:?}"),
            )
        }),
        kind => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {kind} to float"),
        )),
    }
}

/// Returns the absolute value of a number.
pub fn abs(value: Value) -> Result<Value, Error> {
    match (value.as_i64(), value.as_f64()) {
        (Some(i), _) => i
            .checked_abs()
            .map(Value::from)
            .ok_or_else(|| Error::new(ErrorKind::ImpossibleOperation, "integer overflow in abs")),
        (None, Some(f)) => Ok(Value::from(f.abs())),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("bad operand type for abs(): {}", value.kind()),
        )),
    }
}

fn extreme(name: &str, args: Rest<Value>, want: std::cmp::Ordering) -> Result<Value, Error> {
    let items: Vec<Value> = if args.len() == 1 {
        ok!(args[0].try_iter()).collect()
    } else {
        args.0
    };
    let mut iter = items.into_iter();
    let mut rv = match iter.next() {
        Some(first) => first,
        None => {
            return Err(Error::new(
                ErrorKind::InvalidArguments,
                format!("{name}() arg is an empty sequence"),
            ))
        }
    };
    for item in iter {
        if ok!(crate::value::ops::compare(&item, &rv, name)) == want {
            rv = item;
        }
    }
    Ok(rv)
}

/// Returns the smallest item of a sequence or of the arguments.
pub fn min(args: Rest<Value>) -> Result<Value, Error> {
    extreme("min", args, std::cmp::Ordering::Less)
}

/// Returns the largest item of a sequence or of the arguments.
pub fn max(args: Rest<Value>) -> Result<Value, Error> {
    extreme("max", args, std::cmp::Ordering::Greater)
}

/// Returns the items of a value as sorted list.
pub fn sorted(value: Value, reverse: Option<bool>) -> Result<Value, Error> {
    let mut items: Vec<Value> = ok!(value.try_iter()).collect();
    ok!(safe_sort(&mut items, |a, b| {
        crate::value::ops::compare(a, b, "sorted")
    }));
    if reverse.unwrap_or(false) {
        items.reverse();
    }
    Ok(Value::from(items))
}
