use std::fmt::Write;

use crate::compiler::ast::{ForLoop, Stmt, StmtKind, TryBlock, WhileLoop};
use crate::error::{Error, ErrorKind};
use crate::output::Output;
use crate::template::{Template, TemplateConfig};
use crate::value::{Value, ValueKind};
use crate::vm::state::{Frame, State};

mod eval;
pub(crate) mod state;

/// How execution continues after a statement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Walks the statements of a template and writes the output.
pub(crate) struct Vm<'a> {
    config: &'a TemplateConfig,
}

impl<'a> Vm<'a> {
    /// Creates a new VM.
    pub fn new(config: &'a TemplateConfig) -> Vm<'a> {
        Vm { config }
    }

    /// Renders a template with the given context into the output.
    pub fn eval(&self, template: &'a Template, root: Value, out: &mut Output) -> Result<(), Error> {
        ok!(root.validate());
        if !matches!(root.kind(), ValueKind::Map | ValueKind::None) {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("template context must be a map, got {}", root.kind()),
            ));
        }
        let entry = template.entry();
        let mut state = State::new(root);
        let frame = Frame::new(
            entry.file(),
            entry.initial_auto_escape().clone(),
            template.blocks(),
        );
        self.exec_in_frame(&mut state, frame, entry.body(), out)
            .map(|_| ())
    }

    /// Executes a body in a new frame.  The frame is popped on every path.
    fn exec_in_frame(
        &self,
        state: &mut State<'a>,
        frame: Frame<'a>,
        body: &'a [Stmt],
        out: &mut Output,
    ) -> Result<Flow, Error> {
        state.push_frame(frame);
        let rv = self.exec_body(state, body, out);
        state.pop_frame();
        rv
    }

    fn exec_body(
        &self,
        state: &mut State<'a>,
        body: &'a [Stmt],
        out: &mut Output,
    ) -> Result<Flow, Error> {
        for stmt in body {
            match self.exec_stmt(state, stmt, out) {
                Ok(Flow::Normal) => {}
                Ok(flow) => return Ok(flow),
                Err(err) => return Err(state.locate(err, stmt.span)),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(
        &self,
        state: &mut State<'a>,
        stmt: &'a Stmt,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        match stmt.kind {
            StmtKind::Text(ref text) => out.write_str(text)?,
            StmtKind::Emit { ref expr, raw } => {
                let value = ok!(self.eval_expr(state, expr));
                ok!(self.emit(state, value, raw, out));
            }
            StmtKind::Set {
                ref target,
                ref expr,
            } => {
                let value = ok!(self.eval_expr(state, expr));
                state.set(target, value);
            }
            StmtKind::Import {
                ref module,
                ref alias,
            } => {
                let value = ok!(self.get_module(module));
                state.set(alias, value);
            }
            StmtKind::FromImport {
                ref module,
                ref names,
            } => {
                let value = ok!(self.get_module(module));
                for (name, alias) in names {
                    let attr = ok!(value.get_attr(name).map_err(|_| {
                        Error::new(
                            ErrorKind::UndefinedError,
                            format!("cannot import name '{name}' from '{module}'"),
                        )
                    }));
                    state.set(alias, attr);
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::If {
                ref arms,
                ref else_body,
            } => {
                for (cond, body) in arms {
                    if ok!(self.eval_expr(state, cond)).is_true() {
                        return self.exec_body(state, body, out);
                    }
                }
                if let Some(body) = else_body {
                    return self.exec_body(state, body, out);
                }
            }
            StmtKind::For(ref for_loop) => return self.exec_for(state, for_loop, out),
            StmtKind::While(ref while_loop) => return self.exec_while(state, while_loop, out),
            StmtKind::Try(ref try_block) => return self.exec_try(state, try_block, out),
            StmtKind::Block { ref name, ref body } => {
                let blocks = match state.frame() {
                    Some(frame) => frame.blocks,
                    None => return Ok(Flow::Normal),
                };
                match blocks.get(name) {
                    Some(block) => {
                        tracing::trace!(
                            block = name.as_str(),
                            template = block.file.name.as_str(),
                            "rendering block"
                        );
                        let frame = Frame::new(&block.file, block.auto_escape.clone(), blocks);
                        // break and continue reach the loop around the block
                        return self.exec_in_frame(state, frame, &block.body, out);
                    }
                    None => return self.exec_body(state, body, out),
                }
            }
            // the resolver already replaced the body with the parent's
            StmtKind::Extends(_) => {}
            StmtKind::Include(ref name) => {
                let file = match state.frame() {
                    Some(frame) => frame.file,
                    None => return Ok(Flow::Normal),
                };
                let included = match file.includes.get(name) {
                    Some(tmpl) => tmpl,
                    None => return Err(Error::new_not_found(name)),
                };
                let entry = included.entry();
                let frame = Frame::new(
                    entry.file(),
                    entry.initial_auto_escape().clone(),
                    included.blocks(),
                );
                ok!(self.exec_in_frame(state, frame, entry.body(), out));
            }
            StmtKind::AutoEscape(ref auto_escape) => {
                if let Some(frame) = state.frame_mut() {
                    frame.auto_escape = auto_escape.clone();
                }
            }
            StmtKind::Apply { ref func, ref body } => {
                out.begin_capture();
                let rv = self.exec_body(state, body, out);
                let captured = out.end_capture();
                ok!(rv);
                let func = ok!(self.eval_expr(state, func));
                let rv = ok!(func.call(&[Value::from(captured)]));
                ok!(self.emit(state, rv, true, out));
            }
            StmtKind::Module(ref expr) => {
                let value = ok!(self.eval_module_expr(state, expr));
                ok!(self.emit(state, value, true, out));
            }
        }
        Ok(Flow::Normal)
    }

    /// Writes a value, passing it through the auto escape function unless
    /// `raw` is set.
    fn emit(&self, state: &State, value: Value, raw: bool, out: &mut Output) -> Result<(), Error> {
        ok!(value.validate());
        let escape = match state.frame() {
            Some(frame) if !raw => frame.auto_escape.function_name(),
            _ => None,
        };
        match escape {
            Some(name) => {
                let func = ok!(self.lookup(state, name));
                let escaped = ok!(func.call(&[value]));
                write!(out, "{escaped}")?;
            }
            None => write!(out, "{value}")?,
        }
        Ok(())
    }

    fn bind_targets(&self, state: &mut State, targets: &[String], item: Value) -> Result<(), Error> {
        if let [target] = targets {
            state.set(target, item);
            return Ok(());
        }
        let values: Vec<Value> = ok!(item.try_iter()).collect();
        if values.len() != targets.len() {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!(
                    "cannot unpack {} values into {} loop variables",
                    values.len(),
                    targets.len()
                ),
            ));
        }
        for (target, value) in targets.iter().zip(values) {
            state.set(target, value);
        }
        Ok(())
    }

    fn exec_for(
        &self,
        state: &mut State<'a>,
        for_loop: &'a ForLoop,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        let iterable = ok!(self.eval_expr(state, &for_loop.iter));
        for item in ok!(iterable.try_iter()) {
            ok!(self.bind_targets(state, &for_loop.targets, item));
            if ok!(self.exec_body(state, &for_loop.body, out)) == Flow::Break {
                return Ok(Flow::Normal);
            }
        }
        match for_loop.else_body {
            Some(ref body) => self.exec_body(state, body, out),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_while(
        &self,
        state: &mut State<'a>,
        while_loop: &'a WhileLoop,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        while ok!(self.eval_expr(state, &while_loop.cond)).is_true() {
            if ok!(self.exec_body(state, &while_loop.body, out)) == Flow::Break {
                return Ok(Flow::Normal);
            }
        }
        match while_loop.else_body {
            Some(ref body) => self.exec_body(state, body, out),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_try(
        &self,
        state: &mut State<'a>,
        try_block: &'a TryBlock,
        out: &mut Output,
    ) -> Result<Flow, Error> {
        let rv = match self.exec_body(state, &try_block.body, out) {
            Ok(Flow::Normal) => match try_block.else_body {
                Some(ref body) => self.exec_body(state, body, out),
                None => Ok(Flow::Normal),
            },
            Ok(flow) => Ok(flow),
            Err(err) if err.is_catchable() && !try_block.handlers.is_empty() => {
                tracing::trace!(error = %err, "caught error in try block");
                let handler = &try_block.handlers[0];
                if let Some(ref bind) = handler.bind {
                    let message = match err.detail() {
                        Some(detail) => detail.to_string(),
                        None => err.kind().to_string(),
                    };
                    state.set(bind, Value::from(message));
                }
                self.exec_body(state, &handler.body, out)
            }
            Err(err) => Err(err),
        };
        match try_block.finally_body {
            Some(ref body) => match ok!(self.exec_body(state, body, out)) {
                Flow::Normal => rv,
                flow => Ok(flow),
            },
            None => rv,
        }
    }
}
