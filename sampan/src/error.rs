use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Represents template errors.
///
/// Errors carry the [`ErrorKind`], an optional detail message and, where
/// known, the name of the template and the line (and for syntax errors the
/// column) the error happened at.  Formatting an error with the alternate
/// flag (``format!("{:#}", err)``) additionally prints the surrounding lines
/// of the template source if they are available.
///
/// # Example
///
/// ```rust
/// # let template = sampan::Template::from_source("{{ missing }}").unwrap();
/// match template.render(sampan::context!()) {
///     Ok(result) => println!("{}", result),
///     Err(err) => {
///         eprintln!("Could not render template:");
///         eprintln!("  {:#}", err);
///     }
/// }
/// ```
pub struct Error {
    kind: ErrorKind,
    detail: Option<Cow<'static, str>>,
    name: Option<String>,
    lineno: usize,
    col: usize,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
    template_source: Option<Arc<str>>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("detail", &self.detail)
            .field("name", &self.name)
            .field("lineno", &self.lineno)
            .field("col", &self.col)
            .field("source", &self.source)
            .finish()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind()
    }
}

impl Eq for Error {}

/// The broad class an [`ErrorKind`] belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The template source could not be parsed.
    Parse,
    /// A referenced template could not be resolved or loaded.
    Resolution,
    /// An expression failed while rendering.
    Eval,
}

/// An enum describing the error kind.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The template has a syntax error.
    SyntaxError,
    /// A template was not found by the loader.
    TemplateNotFound,
    /// `extends` or `include` was used without a loader.
    MissingLoader,
    /// A template extends or includes itself.
    RecursiveTemplate,
    /// The loader failed to read a template.
    CannotLoad,
    /// A variable, attribute or item is undefined.
    UndefinedError,
    /// An operator or method was used with unsupported types.
    InvalidOperation,
    /// A value that is not callable was called.
    NotCallable,
    /// A function was invoked with the wrong arguments.
    InvalidArguments,
    /// The operation cannot be performed (division by zero, overflow).
    ImpossibleOperation,
    /// A value could not be converted into the internal format.
    BadSerialization,
}

impl ErrorKind {
    fn description(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "syntax error",
            ErrorKind::TemplateNotFound => "template not found",
            ErrorKind::MissingLoader => "no template loader",
            ErrorKind::RecursiveTemplate => "recursive template",
            ErrorKind::CannotLoad => "cannot load template",
            ErrorKind::UndefinedError => "undefined value",
            ErrorKind::InvalidOperation => "invalid operation",
            ErrorKind::NotCallable => "not callable",
            ErrorKind::InvalidArguments => "invalid arguments",
            ErrorKind::ImpossibleOperation => "impossible operation",
            ErrorKind::BadSerialization => "could not serialize to internal format",
        }
    }

    /// Returns the category of this error kind.
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::SyntaxError => ErrorCategory::Parse,
            ErrorKind::TemplateNotFound
            | ErrorKind::MissingLoader
            | ErrorKind::RecursiveTemplate
            | ErrorKind::CannotLoad => ErrorCategory::Resolution,
            ErrorKind::UndefinedError
            | ErrorKind::InvalidOperation
            | ErrorKind::NotCallable
            | ErrorKind::InvalidArguments
            | ErrorKind::ImpossibleOperation
            | ErrorKind::BadSerialization => ErrorCategory::Eval,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref detail) = self.detail {
            write!(f, "{}: {}", self.kind, detail)?;
        } else {
            write!(f, "{}", self.kind)?;
        }
        if let Some(ref filename) = self.name {
            if self.col > 0 {
                write!(f, " (in {}:{}:{})", filename, self.lineno, self.col)?
            } else {
                write!(f, " (in {}:{})", filename, self.lineno)?
            }
        }
        if f.alternate() {
            if let Some(source) = self.template_source() {
                let lines: Vec<_> = source.lines().enumerate().collect();
                let idx = self.line().unwrap_or(1).max(1) - 1;
                if let Some((_, line)) = lines.get(idx) {
                    writeln!(f)?;
                    writeln!(f, "{:-^1$}", " Template Source ", 74)?;
                    let skip = idx.saturating_sub(3);
                    for (idx, line) in lines.iter().skip(skip).take(idx - skip) {
                        writeln!(f, "{:>4} | {}", idx + 1, line)?;
                    }
                    writeln!(f, "{:>4} > {}", idx + 1, line)?;
                    for (idx, line) in lines.iter().skip(idx + 1).take(3) {
                        writeln!(f, "{:>4} | {}", idx + 1, line)?;
                    }
                    write!(f, "{:-^1$}", "", 74)?;
                }
            }
        }
        Ok(())
    }
}

impl Error {
    /// Creates a new error with kind and detail.
    pub fn new<D: Into<Cow<'static, str>>>(kind: ErrorKind, detail: D) -> Error {
        Error {
            kind,
            detail: Some(detail.into()),
            name: None,
            lineno: 0,
            col: 0,
            source: None,
            template_source: None,
        }
    }

    pub(crate) fn new_not_found(name: &str) -> Error {
        Error::new(
            ErrorKind::TemplateNotFound,
            format!("template {name:?} does not exist"),
        )
    }

    pub(crate) fn set_location(&mut self, filename: &str, lineno: usize, col: usize) {
        self.name = Some(filename.into());
        self.lineno = lineno;
        self.col = col;
    }

    /// Attaches location and source information unless the error already
    /// carries a location.  The source is only attached if the location
    /// refers to the same template.
    pub(crate) fn attach_location(
        &mut self,
        filename: &str,
        lineno: usize,
        col: usize,
        source: &Arc<str>,
    ) {
        if self.name.is_none() {
            self.set_location(filename, lineno, col);
        }
        if self.template_source.is_none() && self.name.as_deref() == Some(filename) {
            self.template_source = Some(source.clone());
        }
    }

    /// Attaches another error as source to this error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error detail.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    /// Returns the template name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the line.
    pub fn line(&self) -> Option<usize> {
        self.name.as_ref().map(|_| self.lineno)
    }

    /// Returns the column for syntax errors.
    pub fn column(&self) -> Option<usize> {
        self.name.as_ref().filter(|_| self.col > 0).map(|_| self.col)
    }

    /// Returns the template source if it was attached to the error.
    pub fn template_source(&self) -> Option<&str> {
        self.template_source.as_deref()
    }

    /// Returns `true` if this error can be handled by `{% try %}`.
    pub(crate) fn is_catchable(&self) -> bool {
        self.kind.category() == ErrorCategory::Eval
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|err| err.as_ref() as _)
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error {
            kind,
            detail: None,
            name: None,
            lineno: 0,
            col: 0,
            source: None,
            template_source: None,
        }
    }
}

impl From<fmt::Error> for Error {
    fn from(_: fmt::Error) -> Self {
        Error::new(ErrorKind::InvalidOperation, "formatting failed")
    }
}

impl serde::ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: fmt::Display,
    {
        Error::new(ErrorKind::BadSerialization, msg.to_string())
    }
}
