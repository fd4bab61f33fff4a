//! Sampan is a small template compiler with tornado style directives,
//! template inheritance and a restricted expression language.
//!
//! Templates are plain text with embedded directives:
//!
//! ```text
//! {% extends "base.html" %}
//! {% block body %}
//!   <ul>
//!   {% for user in users %}
//!     <li>{{ user.name }}</li>
//!   {% end %}
//!   </ul>
//! {% end %}
//! ```
//!
//! A template is compiled once and can then be rendered any number of times
//! (also concurrently) with different data.  Data is passed as any value that
//! implements [`serde::Serialize`]; the [`context!`] macro creates ad-hoc
//! contexts:
//!
//! ```
//! use sampan::{Template, context};
//!
//! let tmpl = Template::from_source("Hello {{ name }}!").unwrap();
//! assert_eq!(tmpl.render(context!(name => "John")).unwrap(), "Hello John!");
//! ```
//!
//! # Loading Templates
//!
//! Templates that extend or include other templates are loaded through a
//! [`Loader`].  The loader resolves names to sources, compiles each template
//! once and caches the result:
//!
//! ```
//! use sampan::{Loader, context};
//!
//! let mut loader = Loader::new();
//! loader.add_template("base.html", "<title>{% block title %}{% end %}</title>");
//! loader.add_template("index.html", r#"{% extends "base.html" %}{% block title %}Home{% end %}"#);
//! let tmpl = loader.load("index.html").unwrap();
//! assert_eq!(tmpl.render(context!()).unwrap(), "<title>Home</title>");
//! ```
//!
//! [`Loader::with_base_dir`] loads templates from the file system instead.
//!
//! # Syntax
//!
//! - `{{ expr }}` emits an expression, passed through the auto escape
//!   function (`html_escape` by default).  `{% raw expr %}` emits it
//!   unescaped.
//! - `{# ... #}` and `{% comment ... %}` are comments.
//! - `{% set name = expr %}` binds a variable for the rest of the render.
//! - `{% if %}`, `{% elif %}`, `{% else %}`, `{% for x in xs %}`,
//!   `{% while cond %}` (both with an optional `else`), `{% break %}` and
//!   `{% continue %}` control the flow.  Every block is closed with
//!   `{% end %}`.
//! - `{% try %}` with `{% except %}`, `{% else %}` and `{% finally %}` arms
//!   handles errors raised while evaluating expressions.
//! - `{% block name %}`, `{% extends name %}` and `{% include name %}`
//!   compose templates.
//! - `{% autoescape name %}` switches the escape function for the rest of
//!   the file (`None` turns escaping off).
//! - `{% apply func %}...{% end %}` passes the rendered body to `func`.
//! - `{% import mod %}`, `{% from mod import a %}` and `{% module expr %}`
//!   access modules registered with [`Loader::add_module`].
//! - `{{!`, `{%!` and `{#!` emit the delimiter literally.
//!
//! # Expressions
//!
//! Expressions support literals (strings, numbers, `True`, `False`, `None`,
//! lists and maps), attribute and item access, calls, arithmetic,
//! comparisons, `in`, and the boolean operators `and`, `or` and `not`.
//! Expressions can also be evaluated on their own with [`Expression`].
//!
//! # Optional Features
//!
//! - `json` (default): provides the `json_encode` function.
//! - `urlencode` (default): provides the `url_escape` function.
//! - `preserve_order`: maps keep the insertion order of their keys.
//! - `unicode`: allows unicode identifiers in expressions.
//! - `unstable_machinery`: exposes the scanner and parser for testing.
#![allow(clippy::cognitive_complexity)]
#![allow(clippy::needless_borrowed_reference)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

#[macro_use]
mod macros;

mod compiler;
mod defaults;
mod error;
mod expression;
mod loader;
mod output;
mod template;
mod utils;
mod vm;

pub mod functions;
pub mod value;

pub use self::error::{Error, ErrorCategory, ErrorKind};
pub use self::expression::Expression;
pub use self::loader::{path_loader, safe_join, Loader};
pub use self::template::{Template, DEFAULT_NAME};
pub use self::utils::{AutoEscape, HtmlEscape};

/// Re-export for convenience.
pub use self::value::Value;

pub use self::macros::__context;

/// This module gives access to the low level machinery.
///
/// This module is only provided by the `unstable_machinery` feature and does not
/// have a stable interface.  It mostly exists for internal testing purposes and
/// for debugging.
#[cfg(feature = "unstable_machinery")]
#[cfg_attr(docsrs, doc(cfg(feature = "unstable_machinery")))]
pub mod machinery {
    #![allow(missing_docs)]
    pub use crate::compiler::ast;
    pub use crate::compiler::lexer::{scan, tokenize_expr, Chunk, ExprTokenizer, Scanner};
    pub use crate::compiler::parser::{parse, parse_expr};
    pub use crate::compiler::tokens::{Pos, Span, Token};
}
