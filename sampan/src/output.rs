use std::fmt;

/// The sink templates render into.
///
/// Besides forwarding to the underlying writer the output maintains a
/// capture stack.  While a capture is active (for instance for the body of
/// an `apply` block) everything written ends up in the innermost capture
/// buffer instead.
pub(crate) struct Output<'a> {
    w: &'a mut (dyn fmt::Write + 'a),
    capture_stack: Vec<String>,
}

impl<'a> Output<'a> {
    /// Creates a new output.
    pub fn new(w: &'a mut (dyn fmt::Write + 'a)) -> Self {
        Self {
            w,
            capture_stack: Vec::new(),
        }
    }

    /// Begins capturing into a string.
    pub fn begin_capture(&mut self) {
        self.capture_stack.push(String::new());
    }

    /// Ends the innermost capture and returns what was captured.
    pub fn end_capture(&mut self) -> String {
        self.capture_stack.pop().unwrap_or_default()
    }

    #[inline(always)]
    fn target(&mut self) -> &mut dyn fmt::Write {
        match self.capture_stack.last_mut() {
            Some(buf) => buf,
            None => &mut *self.w,
        }
    }
}

impl fmt::Write for Output<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.target().write_str(s)
    }

    #[inline]
    fn write_char(&mut self, c: char) -> fmt::Result {
        self.target().write_char(c)
    }
}
