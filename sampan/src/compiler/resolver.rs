//! Resolution of template inheritance and inclusion.
//!
//! A template that extends another one is never rendered with its own
//! body.  Instead the body of the root of the `extends` chain is rendered
//! and every `block` in it is looked up in a map where the most derived
//! definition of each block wins.  That map is built incrementally: the
//! resolution of a child starts from its parent's resolution and overlays
//! the child's own blocks.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::compiler::ast::{Stmt, StmtKind};
use crate::compiler::tokens::Span;
use crate::error::{Error, ErrorKind};
use crate::loader::Loader;
use crate::template::Template;
use crate::utils::AutoEscape;

/// Per file information that statements refer back to while rendering.
pub(crate) struct FileInfo {
    pub name: String,
    pub source: Arc<str>,
    /// The templates included by this file, loaded at compile time.
    pub includes: BTreeMap<String, Template>,
}

impl fmt::Debug for FileInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInfo")
            .field("name", &self.name)
            .field("includes", &self.includes.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A block definition and the file it was defined in.
#[derive(Debug, Clone)]
pub(crate) struct BlockRef {
    pub body: Arc<[Stmt]>,
    pub file: Arc<FileInfo>,
    /// The auto escape setting in effect where the block was defined.
    pub auto_escape: AutoEscape,
}

/// The resolved form of a template.
#[derive(Debug, Default)]
pub(crate) struct Resolved {
    /// The root of the `extends` chain, if the template extends another.
    pub root: Option<Template>,
    /// All blocks with the most derived definition per name.
    pub blocks: BTreeMap<String, BlockRef>,
}

fn find_extends(body: &[Stmt]) -> Option<(&str, Span)> {
    for stmt in body {
        if let StmtKind::Extends(ref name) = stmt.kind {
            return Some((name, stmt.span));
        }
        let mut rv = None;
        stmt.kind.for_each_body(|body| {
            if rv.is_none() {
                rv = find_extends(body);
            }
        });
        if rv.is_some() {
            return rv;
        }
    }
    None
}

fn find_includes<'b>(body: &'b [Stmt], out: &mut Vec<(&'b str, Span)>) {
    for stmt in body {
        if let StmtKind::Include(ref name) = stmt.kind {
            out.push((name, stmt.span));
        }
        stmt.kind.for_each_body(|body| find_includes(body, out));
    }
}

/// Collects the blocks of a file in document order.
///
/// `auto_escape` tracks the setting statically in effect.  Directives
/// inside a block only last until the end of that block.
fn collect_blocks(
    body: &[Stmt],
    auto_escape: &mut AutoEscape,
    file: &Arc<FileInfo>,
    out: &mut BTreeMap<String, BlockRef>,
) {
    for stmt in body {
        match stmt.kind {
            StmtKind::AutoEscape(ref value) => *auto_escape = value.clone(),
            StmtKind::Block { ref name, ref body } => {
                out.insert(
                    name.clone(),
                    BlockRef {
                        body: body.clone(),
                        file: file.clone(),
                        auto_escape: auto_escape.clone(),
                    },
                );
                let mut inner = auto_escape.clone();
                collect_blocks(body, &mut inner, file, out);
            }
            ref other => other.for_each_body(|body| collect_blocks(body, auto_escape, file, out)),
        }
    }
}

fn load_referenced(
    loader: Option<&Loader>,
    what: &str,
    target: &str,
    name: &str,
    source: &Arc<str>,
    span: Span,
) -> Result<Template, Error> {
    let rv = match loader {
        Some(loader) => loader.load(target),
        None => Err(Error::new(
            ErrorKind::MissingLoader,
            format!("cannot {what} {target:?} without a loader"),
        )),
    };
    rv.map_err(|mut err| {
        err.attach_location(name, span.start_line as usize, 0, source);
        err
    })
}

/// Resolves the parent and the includes of a parsed template.
pub(crate) fn resolve(
    name: &str,
    source: &Arc<str>,
    body: &[Stmt],
    auto_escape: &AutoEscape,
    loader: Option<&Loader>,
) -> Result<(Arc<FileInfo>, Resolved), Error> {
    let mut include_refs = Vec::new();
    find_includes(body, &mut include_refs);
    let mut includes = BTreeMap::new();
    for (target, span) in include_refs {
        if includes.contains_key(target) {
            continue;
        }
        tracing::trace!(template = name, include = target, "resolving include");
        let tmpl = ok!(load_referenced(loader, "include", target, name, source, span));
        includes.insert(target.to_string(), tmpl);
    }

    let file = Arc::new(FileInfo {
        name: name.to_string(),
        source: source.clone(),
        includes,
    });

    let mut resolved = match find_extends(body) {
        Some((parent, span)) => {
            tracing::trace!(template = name, parent, "resolving parent template");
            let parent = ok!(load_referenced(loader, "extend", parent, name, source, span));
            let resolution = parent.resolution();
            Resolved {
                root: Some(resolution.root.clone().unwrap_or_else(|| parent.clone())),
                blocks: resolution.blocks.clone(),
            }
        }
        None => Resolved::default(),
    };

    let mut own_blocks = BTreeMap::new();
    collect_blocks(body, &mut auto_escape.clone(), &file, &mut own_blocks);
    for block_name in own_blocks.keys() {
        tracing::trace!(template = name, block = block_name.as_str(), "resolved block");
    }
    resolved.blocks.extend(own_blocks);

    Ok((file, resolved))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::compiler::parser::parse;

    fn resolve_str(source: &str) -> Result<(Arc<FileInfo>, Resolved), Error> {
        let body = ok!(parse("t", source));
        resolve("t", &Arc::from(source), &body, &AutoEscape::html(), None)
    }

    #[test]
    fn test_nested_blocks_are_collected() {
        let (_, resolved) =
            resolve_str("{% if x %}{% block a %}{% block b %}{% end %}{% end %}{% end %}").unwrap();
        assert!(resolved.root.is_none());
        assert_eq!(
            resolved.blocks.keys().map(|x| x.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );
    }

    #[test]
    fn test_block_auto_escape() {
        let (_, resolved) = resolve_str(
            "{% block a %}{% autoescape None %}{% block b %}{% end %}{% end %}{% block c %}{% end %}",
        )
        .unwrap();
        assert_eq!(resolved.blocks["a"].auto_escape, AutoEscape::html());
        assert_eq!(resolved.blocks["b"].auto_escape, AutoEscape::None);
        assert_eq!(resolved.blocks["c"].auto_escape, AutoEscape::html());
    }

    #[test]
    fn test_missing_loader() {
        let err = resolve_str("\n{% extends base.html %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingLoader);
        assert_eq!(err.line(), Some(2));
        let err = resolve_str("{% include 'x' %}").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingLoader);
    }
}
