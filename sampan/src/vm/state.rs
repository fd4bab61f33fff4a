use std::collections::BTreeMap;
use std::fmt;

use crate::compiler::resolver::{BlockRef, FileInfo};
use crate::compiler::tokens::Span;
use crate::error::Error;
use crate::utils::AutoEscape;
use crate::value::Value;

/// A frame is pushed for the entry template, every block and every include.
pub(crate) struct Frame<'a> {
    pub file: &'a FileInfo,
    pub auto_escape: AutoEscape,
    pub blocks: &'a BTreeMap<String, BlockRef>,
}

impl<'a> Frame<'a> {
    pub fn new(
        file: &'a FileInfo,
        auto_escape: AutoEscape,
        blocks: &'a BTreeMap<String, BlockRef>,
    ) -> Frame<'a> {
        Frame {
            file,
            auto_escape,
            blocks,
        }
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("name", &self.file.name)
            .field("auto_escape", &self.auto_escape)
            .finish()
    }
}

/// The mutable state of a single render call.
///
/// Variables bound with `set`, loop targets and imports live for the rest
/// of the render, including templates that are included afterwards.
pub(crate) struct State<'a> {
    ctx: Value,
    locals: BTreeMap<String, Value>,
    frames: Vec<Frame<'a>>,
}

impl fmt::Debug for State<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("ctx", &self.ctx)
            .field("locals", &self.locals)
            .field("frames", &self.frames)
            .finish()
    }
}

impl<'a> State<'a> {
    /// Creates a new state for the given context.
    pub fn new(ctx: Value) -> State<'a> {
        State {
            ctx,
            locals: BTreeMap::new(),
            frames: Vec::new(),
        }
    }

    /// Looks up a variable in the locals and the context.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.locals.get(name) {
            return Some(value.clone());
        }
        self.ctx.as_map().and_then(|map| map.get(name)).cloned()
    }

    /// Binds a variable for the rest of the render.
    pub fn set(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }

    pub fn push_frame(&mut self, frame: Frame<'a>) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame<'a>> {
        self.frames.pop()
    }

    /// Returns the innermost frame.
    pub fn frame(&self) -> Option<&Frame<'a>> {
        self.frames.last()
    }

    pub fn frame_mut(&mut self) -> Option<&mut Frame<'a>> {
        self.frames.last_mut()
    }

    /// Attaches the location of the statement being executed to an error.
    pub fn locate(&self, mut err: Error, span: Span) -> Error {
        if let Some(frame) = self.frame() {
            err.attach_location(
                &frame.file.name,
                span.start_line as usize,
                0,
                &frame.file.source,
            );
        }
        err
    }
}
