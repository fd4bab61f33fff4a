use std::collections::BTreeMap;
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use insta::assert_snapshot;
use sampan::value::Value;
use sampan::{context, AutoEscape, Error, ErrorKind, Loader};
use similar_asserts::assert_eq;

fn counting_loader(templates: &'static [(&'static str, &'static str)]) -> (Loader, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut loader = Loader::new();
    let calls = counter.clone();
    loader.set_source(move |name| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(templates
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, source)| source.to_string()))
    });
    (loader, counter)
}

#[test]
fn test_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("layouts")).unwrap();
    fs::write(
        dir.path().join("layouts").join("base.html"),
        "<h1>{% block title %}{% end %}</h1>",
    )
    .unwrap();
    fs::write(
        dir.path().join("index.html"),
        "{% extends 'layouts/base.html' %}{% block title %}{{ title }}{% end %}",
    )
    .unwrap();

    let loader = Loader::with_base_dir(dir.path());
    let tmpl = loader.load("index.html").unwrap();
    assert_eq!(tmpl.name(), "index.html");
    assert_eq!(
        tmpl.render(context!(title => "Home & Away")).unwrap(),
        "<h1>Home &amp; Away</h1>"
    );
}

#[test]
fn test_base_dir_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("folder")).unwrap();
    fs::write(dir.path().join("secret"), "nope").unwrap();
    let loader = Loader::with_base_dir(dir.path().join("templates"));

    let err = loader.load("missing.html").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);
    assert_snapshot!(err.to_string(), @r###"template not found: template "missing.html" does not exist"###);

    // names cannot escape the base directory
    let err = loader.load("../secret").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TemplateNotFound);

    let loader = Loader::with_base_dir(dir.path());
    let err = loader.load("folder").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotLoad);
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_registered_sources_come_first() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a"), "from disk").unwrap();
    let mut loader = Loader::with_base_dir(dir.path());
    assert_eq!(loader.load("a").unwrap().render(context!()).unwrap(), "from disk");
    loader.add_template("a", "registered");
    assert_eq!(loader.load("a").unwrap().render(context!()).unwrap(), "registered");
}

#[test]
fn test_cache_and_reset() {
    let (loader, counter) = counting_loader(&[("t", "hello")]);
    let first = loader.load("t").unwrap();
    let second = loader.load("t").unwrap();
    assert_eq!(first.render(context!()).unwrap(), "hello");
    assert_eq!(second.render(context!()).unwrap(), "hello");
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    loader.reset();
    loader.load("t").unwrap();
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_failed_loads_are_not_cached() {
    let (loader, counter) = counting_loader(&[]);
    assert!(loader.load("t").is_err());
    assert!(loader.load("t").is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_source_errors() {
    let mut loader = Loader::new();
    loader.set_source(|name| {
        if name == "broken" {
            Err(Error::new(ErrorKind::CannotLoad, "backend is down"))
        } else {
            Ok(None)
        }
    });
    let err = loader.load("broken").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CannotLoad);
    assert_eq!(err.detail(), Some("backend is down"));
}

#[test]
fn test_empty_name() {
    let loader = Loader::new();
    assert_eq!(loader.load("").unwrap_err().kind(), ErrorKind::InvalidArguments);
}

#[test]
fn test_parents_are_shared() {
    let (loader, counter) = counting_loader(&[
        ("base", "{% block a %}{% end %}"),
        ("one", "{% extends base %}{% block a %}1{% end %}"),
        ("two", "{% extends base %}{% block a %}2{% end %}"),
    ]);
    assert_eq!(loader.load("one").unwrap().render(context!()).unwrap(), "1");
    assert_eq!(loader.load("two").unwrap().render(context!()).unwrap(), "2");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_concurrent_loads() {
    let (loader, counter) = counting_loader(&[
        ("base", "[{% block a %}{% end %}]"),
        ("page", "{% extends base %}{% block a %}{{ n }}{% end %}"),
    ]);
    std::thread::scope(|scope| {
        for n in 0..8 {
            let loader = &loader;
            scope.spawn(move || {
                let tmpl = loader.load("page").unwrap();
                assert_eq!(tmpl.render(context!(n)).unwrap(), format!("[{n}]"));
            });
        }
    });
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[test]
fn test_globals_and_functions() {
    let mut loader = Loader::new();
    loader.add_global("site", "Sampan");
    loader.add_function("double", |x: i64| x * 2);
    loader.add_template("t", "{{ site }}: {{ double(21) }}");
    let tmpl = loader.load("t").unwrap();
    assert_eq!(tmpl.render(context!()).unwrap(), "Sampan: 42");
    // render bindings shadow loader globals
    assert_eq!(tmpl.render(context!(site => "Other")).unwrap(), "Other: 42");

    let expr = loader.compile_expression("double(len(site))").unwrap();
    assert_eq!(expr.eval(context!()).unwrap(), Value::from(12));
}

#[test]
fn test_globals_shadow_builtins() {
    let mut loader = Loader::new();
    loader.add_function("len", |_: Value| "custom");
    loader.add_template("t", "{{ len([1]) }}");
    assert_eq!(loader.load("t").unwrap().render(context!()).unwrap(), "custom");
}

#[test]
fn test_auto_escape_setting() {
    let mut loader = Loader::new();
    loader.set_auto_escape(AutoEscape::None);
    loader.add_template("t", "{{ v }}{% autoescape html_escape %}{{ v }}");
    assert_eq!(
        loader.load("t").unwrap().render(context!(v => "<")).unwrap(),
        "<&lt;"
    );
}

fn util_module() -> Value {
    let mut module = BTreeMap::new();
    module.insert("name", Value::from("util"));
    module.insert("double", Value::from_function(|x: i64| x * 2));
    Value::from(module)
}

#[test]
fn test_modules() {
    let mut loader = Loader::new();
    loader.add_module("util", util_module());
    loader.add_template("import", "{% import util %}{{ util.double(2) }}");
    loader.add_template("alias", "{% import util as u %}{{ u.name }}");
    loader.add_template("from", "{% from util import double as d, name %}{{ d(3) }}{{ name }}");
    loader.add_template("module", "{% module util.double(4) %}|{% module util.name %}|{{ util.name }}");

    let render = |name: &str| {
        loader
            .load(name)
            .unwrap()
            .render(context!(util => context!(name => "ctx")))
            .unwrap()
    };
    assert_eq!(render("import"), "4");
    assert_eq!(render("alias"), "util");
    assert_eq!(render("from"), "6util");
    assert_eq!(render("module"), "8|util|ctx");
}

#[test]
fn test_unknown_modules() {
    let mut loader = Loader::new();
    loader.add_module("util", util_module());
    loader.add_template("unknown", "{% import nope %}");
    loader.add_template("bad_name", "{% from util import nope %}");
    loader.add_template(
        "caught",
        "{% try %}{% import nope %}{% except as e %}{% raw e %}{% end %}",
    );

    let err = loader.load("unknown").unwrap().render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    let err = loader.load("bad_name").unwrap().render(context!()).unwrap_err();
    assert_snapshot!(err.to_string(), @"undefined value: cannot import name 'nope' from 'util' (in bad_name:1)");
    assert_eq!(
        loader.load("caught").unwrap().render(context!()).unwrap(),
        "no module named 'nope'"
    );
}
