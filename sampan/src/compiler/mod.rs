#![allow(missing_docs)]
//! This module contains the internals of the compiler.
pub mod ast;
pub mod cursor;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod tokens;
