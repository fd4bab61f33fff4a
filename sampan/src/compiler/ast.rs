use std::fmt;
use std::sync::Arc;

use crate::compiler::tokens::Span;
use crate::utils::AutoEscape;
use crate::value::Value;

/// A statement with the span of the tag (or text) that produced it.
#[derive(Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl fmt::Debug for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.kind, f)?;
        if f.alternate() {
            write!(f, "{:?}", self.span)?;
        }
        Ok(())
    }
}

/// A list of statements forming the body of a template or block.
pub type Body = Vec<Stmt>;

/// The kinds of statements a template consists of.
#[derive(Debug, Clone)]
pub enum StmtKind {
    /// Literal template text.
    Text(String),
    /// `{{ expr }}` or, with `raw` set, `{% raw expr %}`.
    Emit { expr: Expr, raw: bool },
    /// `{% set name = expr %}`
    Set { target: String, expr: Expr },
    /// `{% import name %}` or `{% import name as alias %}`
    Import { module: String, alias: String },
    /// `{% from name import a, b as c %}`
    FromImport {
        module: String,
        names: Vec<(String, String)>,
    },
    Break,
    Continue,
    /// An `if` chain.  Each arm is a condition and its body.
    If { arms: Vec<(Expr, Body)>, else_body: Option<Body> },
    For(Box<ForLoop>),
    While(Box<WhileLoop>),
    Try(Box<TryBlock>),
    /// A named block that descendants can override.
    Block { name: String, body: Arc<[Stmt]> },
    Extends(String),
    Include(String),
    AutoEscape(AutoEscape),
    /// Renders the body into a buffer and passes it to a callable.
    Apply { func: Expr, body: Body },
    /// Emits an expression resolved against the module registry.
    Module(Expr),
}

/// A `for` loop.
#[derive(Debug, Clone)]
pub struct ForLoop {
    pub targets: Vec<String>,
    pub iter: Expr,
    pub body: Body,
    pub else_body: Option<Body>,
}

/// A `while` loop.
#[derive(Debug, Clone)]
pub struct WhileLoop {
    pub cond: Expr,
    pub body: Body,
    pub else_body: Option<Body>,
}

/// An `except` arm of a `try` block.
#[derive(Debug, Clone)]
pub struct Handler {
    /// The name the error message is bound to (`except as name`).
    pub bind: Option<String>,
    pub body: Body,
}

/// A `try` block with its arms.
#[derive(Debug, Clone)]
pub struct TryBlock {
    pub body: Body,
    pub handlers: Vec<Handler>,
    pub else_body: Option<Body>,
    pub finally_body: Option<Body>,
}

/// Unary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOpKind {
    Not,
    Neg,
}

/// Binary operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOpKind {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    ScAnd,
    ScOr,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Rem,
    In,
    NotIn,
}

/// An expression node.
#[derive(Debug, Clone)]
pub enum Expr {
    Const(Value),
    Var(String),
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    GetAttr {
        expr: Box<Expr>,
        name: String,
    },
    GetItem {
        expr: Box<Expr>,
        subscript: Box<Expr>,
    },
    Call {
        expr: Box<Expr>,
        args: Vec<Expr>,
    },
    UnaryOp {
        op: UnaryOpKind,
        expr: Box<Expr>,
    },
    BinOp {
        op: BinOpKind,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A chain like `a < b < c`.  Each operand is evaluated at most once
    /// and evaluation stops at the first false link.
    Compare {
        left: Box<Expr>,
        ops: Vec<(BinOpKind, Expr)>,
    },
}

impl Expr {
    /// Returns the constant value if this is a literal.
    #[cfg(any(test, feature = "unstable_machinery"))]
    pub fn as_const(&self) -> Option<&Value> {
        match self {
            Expr::Const(value) => Some(value),
            _ => None,
        }
    }
}

impl StmtKind {
    /// Invokes `f` for every nested body of this statement.
    pub fn for_each_body<'a, F: FnMut(&'a [Stmt])>(&'a self, mut f: F) {
        match self {
            StmtKind::If { arms, else_body } => {
                for (_, body) in arms {
                    f(body);
                }
                if let Some(body) = else_body {
                    f(body);
                }
            }
            StmtKind::For(for_loop) => {
                f(&for_loop.body);
                if let Some(body) = &for_loop.else_body {
                    f(body);
                }
            }
            StmtKind::While(while_loop) => {
                f(&while_loop.body);
                if let Some(body) = &while_loop.else_body {
                    f(body);
                }
            }
            StmtKind::Try(try_block) => {
                f(&try_block.body);
                for handler in &try_block.handlers {
                    f(&handler.body);
                }
                if let Some(body) = &try_block.else_body {
                    f(body);
                }
                if let Some(body) = &try_block.finally_body {
                    f(body);
                }
            }
            StmtKind::Block { body, .. } => f(body),
            StmtKind::Apply { body, .. } => f(body),
            _ => {}
        }
    }
}
