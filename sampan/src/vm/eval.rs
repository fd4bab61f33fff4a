use std::cmp::Ordering;
use std::sync::Arc;

use crate::compiler::ast::{BinOpKind, Expr, UnaryOpKind};
use crate::defaults::call_method;
use crate::error::{Error, ErrorKind};
use crate::value::{ops, Value, ValueMap};
use crate::vm::state::State;
use crate::vm::Vm;

/// Where variables are looked up first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Scope {
    Default,
    Modules,
}

impl<'a> Vm<'a> {
    /// Evaluates an expression.
    pub(crate) fn eval_expr(&self, state: &State, expr: &Expr) -> Result<Value, Error> {
        self.eval_in(state, expr, Scope::Default)
    }

    /// Evaluates the expression of a `module` tag where names refer to
    /// registered modules before anything else.
    pub(crate) fn eval_module_expr(&self, state: &State, expr: &Expr) -> Result<Value, Error> {
        self.eval_in(state, expr, Scope::Modules)
    }

    /// Resolves a name against the render state and the namespace.
    pub(crate) fn lookup(&self, state: &State, name: &str) -> Result<Value, Error> {
        if let Some(rv) = state.lookup(name) {
            return Ok(rv);
        }
        match self.config.namespace.get(name) {
            Some(rv) => Ok(rv.clone()),
            None => Err(Error::new(
                ErrorKind::UndefinedError,
                format!("'{name}' is undefined"),
            )),
        }
    }

    /// Looks up a registered module.
    pub(crate) fn get_module(&self, name: &str) -> Result<Value, Error> {
        match self.config.modules.get(name) {
            Some(rv) => Ok(rv.clone()),
            None => Err(Error::new(
                ErrorKind::UndefinedError,
                format!("no module named '{name}'"),
            )),
        }
    }

    fn eval_in(&self, state: &State, expr: &Expr, scope: Scope) -> Result<Value, Error> {
        match expr {
            Expr::Const(value) => Ok(value.clone()),
            Expr::Var(name) => {
                if scope == Scope::Modules {
                    if let Ok(module) = self.get_module(name) {
                        return Ok(module);
                    }
                }
                self.lookup(state, name)
            }
            Expr::List(items) => {
                let mut rv = Vec::with_capacity(items.len());
                for item in items {
                    rv.push(ok!(self.eval_in(state, item, scope)));
                }
                Ok(Value::from(rv))
            }
            Expr::Map(pairs) => {
                let mut rv = ValueMap::default();
                for (key, value) in pairs {
                    let key = ok!(self.eval_in(state, key, scope));
                    let value = ok!(self.eval_in(state, value, scope));
                    let key: Arc<str> = match key.as_str() {
                        Some(key) => Arc::from(key),
                        None => Arc::from(key.to_string()),
                    };
                    rv.insert(key, value);
                }
                Ok(Value::from_map(rv))
            }
            Expr::GetAttr { expr, name } => ok!(self.eval_in(state, expr, scope)).get_attr(name),
            Expr::GetItem { expr, subscript } => {
                let value = ok!(self.eval_in(state, expr, scope));
                let subscript = ok!(self.eval_in(state, subscript, scope));
                value.get_item(&subscript)
            }
            Expr::Call { expr, args } => match **expr {
                Expr::GetAttr { ref expr, ref name } => {
                    let obj = ok!(self.eval_in(state, expr, scope));
                    let args = ok!(self.eval_args(state, args, scope));
                    call_method(&obj, name, &args)
                }
                ref callee => {
                    let func = ok!(self.eval_in(state, callee, scope));
                    let args = ok!(self.eval_args(state, args, scope));
                    func.call(&args)
                }
            },
            Expr::UnaryOp { op, expr } => {
                let value = ok!(self.eval_in(state, expr, scope));
                match op {
                    UnaryOpKind::Not => Ok(Value::from(!value.is_true())),
                    UnaryOpKind::Neg => ops::neg(&value),
                }
            }
            Expr::BinOp { op, left, right } => self.eval_binop(state, *op, left, right, scope),
            Expr::Compare { left, ops } => {
                let mut lhs = ok!(self.eval_in(state, left, scope));
                let mut rv = Value::from(true);
                for (op, right) in ops {
                    let rhs = ok!(self.eval_in(state, right, scope));
                    rv = ok!(apply_binop(*op, &lhs, &rhs));
                    if !rv.is_true() {
                        break;
                    }
                    lhs = rhs;
                }
                Ok(rv)
            }
        }
    }

    fn eval_args(&self, state: &State, args: &[Expr], scope: Scope) -> Result<Vec<Value>, Error> {
        let mut rv = Vec::with_capacity(args.len());
        for arg in args {
            rv.push(ok!(self.eval_in(state, arg, scope)));
        }
        Ok(rv)
    }

    fn eval_binop(
        &self,
        state: &State,
        op: BinOpKind,
        left: &Expr,
        right: &Expr,
        scope: Scope,
    ) -> Result<Value, Error> {
        let lhs = ok!(self.eval_in(state, left, scope));
        match op {
            BinOpKind::ScAnd if !lhs.is_true() => return Ok(lhs),
            BinOpKind::ScOr if lhs.is_true() => return Ok(lhs),
            BinOpKind::ScAnd | BinOpKind::ScOr => return self.eval_in(state, right, scope),
            _ => {}
        }
        let rhs = ok!(self.eval_in(state, right, scope));
        apply_binop(op, &lhs, &rhs)
    }
}

fn apply_binop(op: BinOpKind, lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match op {
        BinOpKind::Eq => Ok(Value::from(lhs == rhs)),
        BinOpKind::Ne => Ok(Value::from(lhs != rhs)),
        BinOpKind::Lt => ops::compare(lhs, rhs, "<").map(|x| Value::from(x == Ordering::Less)),
        BinOpKind::Lte => ops::compare(lhs, rhs, "<=").map(|x| Value::from(x != Ordering::Greater)),
        BinOpKind::Gt => ops::compare(lhs, rhs, ">").map(|x| Value::from(x == Ordering::Greater)),
        BinOpKind::Gte => ops::compare(lhs, rhs, ">=").map(|x| Value::from(x != Ordering::Less)),
        BinOpKind::Add => ops::add(lhs, rhs),
        BinOpKind::Sub => ops::sub(lhs, rhs),
        BinOpKind::Mul => ops::mul(lhs, rhs),
        BinOpKind::Div => ops::div(lhs, rhs),
        BinOpKind::FloorDiv => ops::int_div(lhs, rhs),
        BinOpKind::Rem => ops::rem(lhs, rhs),
        BinOpKind::In => ops::contains(rhs, lhs),
        BinOpKind::NotIn => ops::contains(rhs, lhs).map(|x| Value::from(!x.is_true())),
        // both sides are already evaluated here
        BinOpKind::ScAnd => Ok((if lhs.is_true() { rhs } else { lhs }).clone()),
        BinOpKind::ScOr => Ok((if lhs.is_true() { lhs } else { rhs }).clone()),
    }
}
