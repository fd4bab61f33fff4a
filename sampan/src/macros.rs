// `ok!` and `some!` are less bloaty alternatives to the standard library's try operator (`?`).
// Since we do not need type conversions in this crate we can fall back to much easier match
// patterns that compile faster and produce less bloaty code.

macro_rules! ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(err) => return Err(err),
        }
    };
}

macro_rules! some {
    ($expr:expr) => {
        match $expr {
            Some(val) => val,
            None => return None,
        }
    };
}

/// Hidden utility module for the [`context!`](crate::context!) macro.
#[doc(hidden)]
pub mod __context {
    use crate::value::{Value, ValueMap};

    #[inline(always)]
    pub fn make() -> ValueMap {
        ValueMap::default()
    }

    #[inline(always)]
    pub fn add(ctx: &mut ValueMap, key: &'static str, value: Value) {
        ctx.insert(key.into(), value);
    }

    #[inline(always)]
    pub fn build(ctx: ValueMap) -> Value {
        Value::from_map(ctx)
    }
}

/// Creates a template context from keys and values.
///
/// ```rust
/// # use sampan::context;
/// let ctx = context!{
///     name => "Peter",
///     location => "World",
/// };
/// ```
///
/// Alternatively if the variable name matches the key name it can
/// be omitted:
///
/// ```rust
/// # use sampan::context;
/// let name = "Peter";
/// let ctx = context!{ name };
/// ```
///
/// The return value is a mapping [`Value`](crate::value::Value).  Values
/// are converted with [`Value::from_serialize`](crate::value::Value::from_serialize)
/// and are passed by reference, so they can still be used afterwards.
#[macro_export]
macro_rules! context {
    () => {
        $crate::__context::build($crate::__context::make())
    };
    (
        $($key:ident $(=> $value:expr)?),* $(,)?
    ) => {{
        let mut ctx = $crate::__context::make();
        $(
            $crate::__context_pair!(ctx, $key $(=> $value)?);
        )*
        $crate::__context::build(ctx)
    }};
}

#[macro_export]
#[doc(hidden)]
macro_rules! __context_pair {
    ($ctx:ident, $key:ident) => {{
        $crate::__context_pair!($ctx, $key => $key);
    }};
    ($ctx:ident, $key:ident => $value:expr) => {
        $crate::__context::add(
            &mut $ctx,
            stringify!($key),
            $crate::value::Value::from_serialize(&$value),
        );
    };
}

/// Renders an inline template with the given context.
///
/// This compiles a one-off [`Template`](crate::Template) without a loader,
/// so `extends` and `include` are not available.  Errors panic, which makes
/// this mostly useful for tests and examples.
///
/// ```
/// # use sampan::render;
/// let rv = render!("Hello {{ name }}!", name => "World");
/// assert_eq!(rv, "Hello World!");
/// ```
#[macro_export]
macro_rules! render {
    ($source:expr $(, $key:ident $(=> $value:expr)?)* $(,)?) => {
        match $crate::Template::from_source($source) {
            Ok(tmpl) => match tmpl.render($crate::context! { $($key $(=> $value)? ,)* }) {
                Ok(rv) => rv,
                Err(err) => panic!("could not render template: {:#}", err),
            },
            Err(err) => panic!("could not compile template: {:#}", err),
        }
    };
}
