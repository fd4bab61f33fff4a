use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::Serialize;

use crate::compiler::ast::{Body, Stmt};
use crate::compiler::parser::parse;
use crate::compiler::resolver::{resolve, BlockRef, FileInfo, Resolved};
use crate::defaults;
use crate::error::Error;
use crate::loader::Loader;
use crate::output::Output;
use crate::utils::AutoEscape;
use crate::value::Value;
use crate::vm::Vm;

/// The name of templates created from a string without a name.
pub const DEFAULT_NAME: &str = "<string>";

/// Loader level configuration shared by all templates a loader compiles.
#[derive(Clone)]
pub(crate) struct TemplateConfig {
    /// The auto escaping templates start out with.
    pub auto_escape: AutoEscape,
    /// Built-in functions overlaid with the loader globals.
    pub namespace: BTreeMap<String, Value>,
    /// Modules available to `import` and `module`.
    pub modules: BTreeMap<String, Value>,
}

impl Default for TemplateConfig {
    fn default() -> TemplateConfig {
        TemplateConfig {
            auto_escape: AutoEscape::default(),
            namespace: defaults::get_globals(),
            modules: BTreeMap::new(),
        }
    }
}

impl TemplateConfig {
    /// The configuration used by templates that are not created by a loader.
    pub fn shared_default() -> Arc<TemplateConfig> {
        static DEFAULT: OnceLock<Arc<TemplateConfig>> = OnceLock::new();
        DEFAULT.get_or_init(Default::default).clone()
    }
}

struct CompiledTemplate {
    file: Arc<FileInfo>,
    body: Body,
    config: Arc<TemplateConfig>,
    resolved: Resolved,
}

/// Represents a compiled template.
///
/// Templates are compiled once and can then be rendered any number of
/// times, also from multiple threads at once.  Cloning a template is cheap
/// as the compiled form is reference counted.
///
/// Templates that use `extends` or `include` need to be loaded through a
/// [`Loader`].  One-off templates can be created directly:
///
/// ```
/// # use sampan::{Template, context};
/// let tmpl = Template::from_source("Hello {{ name }}!").unwrap();
/// assert_eq!(tmpl.render(context!(name => "John")).unwrap(), "Hello John!");
/// ```
#[derive(Clone)]
pub struct Template {
    inner: Arc<CompiledTemplate>,
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ds = f.debug_struct("Template");
        ds.field("name", &self.name());
        ds.field("initial_auto_escape", &self.inner.config.auto_escape);
        ds.field("blocks", &self.inner.resolved.blocks.keys().collect::<Vec<_>>());
        if let Some(ref root) = self.inner.resolved.root {
            ds.field("root", &root.name());
        }
        ds.finish()
    }
}

impl Template {
    /// Compiles a named template without a loader.
    pub fn new(name: &str, source: &str) -> Result<Template, Error> {
        Template::compile(name, Arc::from(source), TemplateConfig::shared_default(), None)
    }

    /// Compiles a template from a string.
    ///
    /// The template is called `<string>` in error messages.
    pub fn from_source(source: &str) -> Result<Template, Error> {
        Template::new(DEFAULT_NAME, source)
    }

    pub(crate) fn compile(
        name: &str,
        source: Arc<str>,
        config: Arc<TemplateConfig>,
        loader: Option<&Loader>,
    ) -> Result<Template, Error> {
        tracing::debug!(template = name, "compiling template");
        let body = match parse(name, &source) {
            Ok(body) => body,
            Err(mut err) => {
                err.attach_location(name, 0, 0, &source);
                return Err(err);
            }
        };
        let (file, resolved) = ok!(resolve(name, &source, &body, &config.auto_escape, loader));
        Ok(Template {
            inner: Arc::new(CompiledTemplate {
                file,
                body,
                config,
                resolved,
            }),
        })
    }

    /// Returns the name of the template.
    pub fn name(&self) -> &str {
        &self.inner.file.name
    }

    /// Returns the source code of the template.
    pub fn source(&self) -> &str {
        &self.inner.file.source
    }

    /// Returns the name of the template this one extends from, if any.
    ///
    /// This is the root of the inheritance chain, the template whose body
    /// is actually rendered.
    pub fn root_name(&self) -> Option<&str> {
        self.inner.resolved.root.as_ref().map(|x| x.name())
    }

    /// Returns the names of all blocks after resolving inheritance.
    pub fn block_names(&self) -> impl Iterator<Item = &str> {
        self.inner.resolved.blocks.keys().map(|x| x.as_str())
    }

    /// Renders the template into a string.
    ///
    /// The provided value is used as the initial context for the template.
    /// It can be any object that implements [`Serialize`] and needs to
    /// serialize into a map (or unit for an empty context).  Either derive
    /// `Serialize` on your own struct or use the [`context!`](crate::context)
    /// macro to create an ad-hoc context.
    ///
    /// ```
    /// # use sampan::{Template, context};
    /// let tmpl = Template::from_source("{% for s in students %}<{{ s }}>{% end %}").unwrap();
    /// let rv = tmpl.render(context!(students => ["a", "b"])).unwrap();
    /// assert_eq!(rv, "<a><b>");
    /// ```
    ///
    /// Every call starts with fresh variables, `set` in one render does not
    /// leak into the next.
    pub fn render<S: Serialize>(&self, ctx: S) -> Result<String, Error> {
        // reduce the amount of code falling under mono morphization into
        // this function, and share the rest in _render.
        self._render(Value::from_serialize(&ctx))
    }

    fn _render(&self, root: Value) -> Result<String, Error> {
        let mut rv = String::with_capacity(self.source().len());
        ok!(Vm::new(&self.inner.config).eval(self, root, &mut Output::new(&mut rv)));
        Ok(rv)
    }

    /// The template whose body is rendered: the root of the `extends` chain
    /// or the template itself.
    pub(crate) fn entry(&self) -> &Template {
        self.inner.resolved.root.as_ref().unwrap_or(self)
    }

    pub(crate) fn body(&self) -> &[Stmt] {
        &self.inner.body
    }

    pub(crate) fn file(&self) -> &FileInfo {
        &self.inner.file
    }

    pub(crate) fn initial_auto_escape(&self) -> &AutoEscape {
        &self.inner.config.auto_escape
    }

    pub(crate) fn blocks(&self) -> &BTreeMap<String, BlockRef> {
        &self.inner.resolved.blocks
    }

    pub(crate) fn resolution(&self) -> &Resolved {
        &self.inner.resolved
    }
}
