use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};

use crate::error::{Error, ErrorKind};
use crate::expression::Expression;
use crate::functions::Function;
use crate::template::{Template, TemplateConfig};
use crate::utils::AutoEscape;
use crate::value::{FunctionArgs, FunctionResult, Value};

type SourceFunc = dyn Fn(&str) -> Result<Option<String>, Error> + Send + Sync;

/// Loads, compiles and caches templates.
///
/// A loader resolves template names to source code.  Sources can be
/// registered explicitly with [`add_template`](Self::add_template), read
/// from a base directory ([`with_base_dir`](Self::with_base_dir)) or
/// provided by a custom callback ([`set_source`](Self::set_source)).
/// Registered sources are consulted first.
///
/// Templates are compiled on first use and cached until
/// [`reset`](Self::reset) is called.  A loader can be shared between
/// threads; concurrent loads of the same name compile it only once.
///
/// ```
/// # use sampan::{Loader, context};
/// let mut loader = Loader::new();
/// loader.add_template("base", "[{% block title %}P{% end %}]");
/// loader.add_template("child", "{% extends 'base' %}{% block title %}C{% end %}");
/// let tmpl = loader.load("child").unwrap();
/// assert_eq!(tmpl.render(context!()).unwrap(), "[C]");
/// ```
///
/// Configuration (globals, functions, modules and auto escaping) must be
/// done before templates are loaded.  Templates that are already cached
/// keep the configuration they were compiled with.
pub struct Loader {
    config: Arc<TemplateConfig>,
    templates: BTreeMap<String, Arc<str>>,
    source: Option<Arc<SourceFunc>>,
    cache: RwLock<BTreeMap<String, Template>>,
    // names currently being compiled on the thread holding the lock
    compiling: ReentrantMutex<RefCell<Vec<String>>>,
}

impl Default for Loader {
    fn default() -> Loader {
        Loader::new()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .field("cached", &self.cache.read().keys().cloned().collect::<Vec<_>>())
            .field("auto_escape", &self.config.auto_escape)
            .finish()
    }
}

impl Loader {
    /// Creates a loader for templates registered as strings.
    pub fn new() -> Loader {
        Loader {
            config: TemplateConfig::shared_default(),
            templates: BTreeMap::new(),
            source: None,
            cache: RwLock::new(BTreeMap::new()),
            compiling: ReentrantMutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Creates a loader that reads templates from a directory.
    ///
    /// Template names are paths relative to the directory.  Names with
    /// segments starting with a dot (which includes `..`) or containing
    /// backslashes cannot be loaded.
    pub fn with_base_dir<P: AsRef<Path>>(dir: P) -> Loader {
        let mut rv = Loader::new();
        rv.set_source(path_loader(dir.as_ref().to_path_buf()));
        rv
    }

    /// Registers a template source under a name.
    ///
    /// The source is compiled when the template is loaded for the first
    /// time.  Re-registering a name drops the cached template.
    pub fn add_template<N: Into<String>, S: Into<String>>(&mut self, name: N, source: S) {
        let name = name.into();
        self.cache.get_mut().remove(&name);
        self.templates.insert(name, Arc::from(source.into()));
    }

    /// Sets a callback that provides template sources.
    ///
    /// The callback returns `Ok(None)` if the template does not exist.
    pub fn set_source<F>(&mut self, f: F)
    where
        F: Fn(&str) -> Result<Option<String>, Error> + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(f));
    }

    /// Sets the auto escaping templates start out with.
    ///
    /// The default is [`AutoEscape::html`].
    pub fn set_auto_escape(&mut self, auto_escape: AutoEscape) {
        Arc::make_mut(&mut self.config).auto_escape = auto_escape;
    }

    /// Adds a global variable to the template namespace.
    ///
    /// Globals shadow built-in functions of the same name and are shadowed
    /// by the variables passed to render.
    pub fn add_global<N, V>(&mut self, name: N, value: V)
    where
        N: Into<String>,
        V: Into<Value>,
    {
        Arc::make_mut(&mut self.config)
            .namespace
            .insert(name.into(), value.into());
    }

    /// Adds a function to the template namespace.
    ///
    /// ```
    /// # use sampan::{Loader, context};
    /// let mut loader = Loader::new();
    /// loader.add_function("double", |x: i64| x * 2);
    /// loader.add_template("t", "{{ double(21) }}");
    /// assert_eq!(loader.load("t").unwrap().render(context!()).unwrap(), "42");
    /// ```
    pub fn add_function<N, F, Rv, Args>(&mut self, name: N, f: F)
    where
        N: Into<String>,
        F: Function<Rv, Args>,
        Rv: FunctionResult,
        Args: FunctionArgs,
    {
        self.add_global(name, Value::from_function(f));
    }

    /// Registers a module for `import`, `from ... import` and `module`.
    ///
    /// Modules are usually mappings of functions.
    pub fn add_module<N, V>(&mut self, name: N, module: V)
    where
        N: Into<String>,
        V: Into<Value>,
    {
        Arc::make_mut(&mut self.config)
            .modules
            .insert(name.into(), module.into());
    }

    /// Compiles a standalone expression with the namespace of this loader.
    pub fn compile_expression(&self, source: &str) -> Result<Expression, Error> {
        Expression::compile(source, self.config.clone())
    }

    /// Loads a template by name.
    ///
    /// The template is compiled on first use, including the templates it
    /// extends or includes.  Failed loads are not cached.
    pub fn load(&self, name: &str) -> Result<Template, Error> {
        if name.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidArguments,
                "template name must not be empty",
            ));
        }
        if let Some(rv) = self.cache.read().get(name) {
            tracing::trace!(template = name, "template cache hit");
            return Ok(rv.clone());
        }

        let guard = self.compiling.lock();
        if let Some(rv) = self.cache.read().get(name) {
            tracing::trace!(template = name, "template compiled concurrently");
            return Ok(rv.clone());
        }
        if guard.borrow().iter().any(|x| x == name) {
            return Err(Error::new(
                ErrorKind::RecursiveTemplate,
                format!("template {name:?} extends or includes itself"),
            ));
        }

        tracing::debug!(template = name, "template cache miss");
        guard.borrow_mut().push(name.to_string());
        let rv = self.compile(name);
        guard.borrow_mut().pop();

        let tmpl = ok!(rv);
        self.cache.write().insert(name.to_string(), tmpl.clone());
        Ok(tmpl)
    }

    fn compile(&self, name: &str) -> Result<Template, Error> {
        let source = match self.templates.get(name) {
            Some(source) => source.clone(),
            None => match self.source {
                Some(ref source) => match ok!(source(name)) {
                    Some(source) => Arc::from(source),
                    None => return Err(Error::new_not_found(name)),
                },
                None => return Err(Error::new_not_found(name)),
            },
        };
        Template::compile(name, source, self.config.clone(), Some(self))
    }

    /// Removes all compiled templates from the cache.
    pub fn reset(&self) {
        let mut cache = self.cache.write();
        tracing::debug!(templates = cache.len(), "resetting template cache");
        cache.clear();
    }
}

/// Safely joins two paths.
pub fn safe_join(base: &Path, template: &str) -> Option<PathBuf> {
    let mut rv = base.to_path_buf();
    for segment in template.split('/') {
        if segment.starts_with('.') || segment.contains('\\') {
            return None;
        }
        rv.push(segment);
    }
    Some(rv)
}

/// Helper to load templates from a given directory.
///
/// This creates a source callback for [`Loader::set_source`] which looks
/// up templates in the given directory.  A missing file is reported as
/// missing template, other I/O errors fail with
/// [`CannotLoad`](ErrorKind::CannotLoad).
pub fn path_loader<P: AsRef<Path>>(
    dir: P,
) -> impl for<'a> Fn(&'a str) -> Result<Option<String>, Error> + Send + Sync + 'static {
    let dir = dir.as_ref().to_path_buf();
    move |name| {
        let path = match safe_join(&dir, name) {
            Some(path) => path,
            None => return Ok(None),
        };
        match fs::read_to_string(&path) {
            Ok(result) => Ok(Some(result)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::new(
                ErrorKind::CannotLoad,
                format!("could not read template {name:?}"),
            )
            .with_source(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_safe_join() {
        assert_eq!(
            safe_join(Path::new("foo"), "bar/baz"),
            Some(PathBuf::from("foo").join("bar").join("baz"))
        );
        assert_eq!(safe_join(Path::new("foo"), ".bar/baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/.baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar/../baz"), None);
        assert_eq!(safe_join(Path::new("foo"), "bar\\baz"), None);
    }

    #[test]
    fn test_loader_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Loader>();
    }
}
