use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::compiler::ast::Expr;
use crate::compiler::parser::parse_expr;
use crate::error::{Error, ErrorKind};
use crate::template::TemplateConfig;
use crate::value::{Value, ValueKind};
use crate::vm::state::State;
use crate::vm::Vm;

/// A handle to a compiled expression.
///
/// Expressions use the same language as `{{ ... }}` tags and see the same
/// built-in functions.  An expression compiled through
/// [`Loader::compile_expression`](crate::Loader::compile_expression) also
/// sees the globals of that loader.
///
/// ```rust
/// # use sampan::{Expression, context};
/// let expr = Expression::new("number > 10 and number < 20").unwrap();
/// let rv = expr.eval(context!(number => 15)).unwrap();
/// assert!(rv.is_true());
/// ```
pub struct Expression {
    expr: Expr,
    source: Arc<str>,
    config: Arc<TemplateConfig>,
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("source", &self.source)
            .finish()
    }
}

impl Expression {
    /// Compiles an expression with the built-in namespace.
    pub fn new(source: &str) -> Result<Expression, Error> {
        Expression::compile(source, TemplateConfig::shared_default())
    }

    pub(crate) fn compile(source: &str, config: Arc<TemplateConfig>) -> Result<Expression, Error> {
        tracing::debug!(expression = source, "compiling expression");
        let expr = ok!(parse_expr(source));
        Ok(Expression {
            expr,
            source: Arc::from(source),
            config,
        })
    }

    /// Returns the source of the expression.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates the expression with some context.
    ///
    /// The context needs to serialize into a map (or unit).  Names that are
    /// not in the context fall back to the namespace of built-in functions
    /// and loader globals.
    pub fn eval<S: Serialize>(&self, ctx: S) -> Result<Value, Error> {
        self._eval(Value::from_serialize(&ctx))
    }

    fn _eval(&self, root: Value) -> Result<Value, Error> {
        ok!(root.validate());
        if !matches!(root.kind(), ValueKind::Map | ValueKind::None) {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("expression context must be a map, got {}", root.kind()),
            ));
        }
        let state = State::new(root);
        Vm::new(&self.config).eval_expr(&state, &self.expr)
    }
}
