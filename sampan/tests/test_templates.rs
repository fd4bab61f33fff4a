use insta::assert_snapshot;
use sampan::{context, render, ErrorKind, Template};
use serde::Serialize;
use similar_asserts::assert_eq;

fn render_str(source: &str, ctx: sampan::Value) -> String {
    Template::from_source(source).unwrap().render(ctx).unwrap()
}

#[test]
fn test_plain_text() {
    let source = "Hello World!\n  <p>no directives here</p>\n";
    assert_eq!(render_str(source, context!()), source);
    assert_eq!(render_str(source, context!(x => 42)), source);
}

#[test]
fn test_comments() {
    assert_eq!(render!("<a>{# x #}<b>"), "<a><b>");
    assert_eq!(render!("<a>{% comment whatever %}<b>"), "<a><b>");
}

#[test]
fn test_literal_delimiters() {
    assert_eq!(render!("{{! x }}"), "{{ x }}");
    assert_eq!(render!("{%! if %}"), "{% if %}");
    assert_eq!(render!("{#! note #}"), "{# note #}");
    assert_eq!(render!("{{{ x }}}", x => 1), "{1}");
}

#[test]
fn test_escaping() {
    let ctx = context!(title => "A \"B\"");
    assert_eq!(render_str("{{ title }}", ctx.clone()), "A &quot;B&quot;");
    assert_eq!(render_str("{% raw title %}", ctx), "A \"B\"");
    assert_eq!(
        render!("{{ '<a href=\\'x\\'>&</a>' }}"),
        "&lt;a href=&#x27;x&#x27;&gt;&amp;&lt;/a&gt;"
    );
}

#[test]
fn test_autoescape_directive() {
    let ctx = context!(v => "<b>");
    assert_eq!(
        render_str("{{ v }}{% autoescape None %}{{ v }}", ctx.clone()),
        "&lt;b&gt;<b>"
    );
    assert_eq!(
        render_str("{% autoescape url_escape %}{{ 'a b' }}", ctx.clone()),
        "a%20b"
    );
    assert_eq!(render_str("{% auto_escape None %}{{ v }}", ctx), "<b>");
}

#[test]
fn test_conditional() {
    let tmpl = Template::from_source("{% if x %}Y{% else %}N{% end %}").unwrap();
    assert_eq!(tmpl.render(context!(x => true)).unwrap(), "Y");
    assert_eq!(tmpl.render(context!(x => false)).unwrap(), "N");

    let tmpl =
        Template::from_source("{% if n < 0 %}neg{% elif n == 0 %}zero{% else %}pos{% end %}")
            .unwrap();
    assert_eq!(tmpl.render(context!(n => -3)).unwrap(), "neg");
    assert_eq!(tmpl.render(context!(n => 0)).unwrap(), "zero");
    assert_eq!(tmpl.render(context!(n => 7)).unwrap(), "pos");
}

#[test]
fn test_for_loop() {
    let ctx = context!(students => vec!["a", "b"]);
    assert_eq!(
        render_str("{% for s in students %}<{{ s }}>{% end %}", ctx.clone()),
        "<a><b>"
    );
    assert_eq!(
        render_str("{% for s in students %}<{{ s }}>{% break %}{% end %}", ctx.clone()),
        "<a>"
    );
    assert_eq!(
        render_str(
            "{% for s in students %}{% if s == 'a' %}{% continue %}{% end %}{{ s }}{% end %}",
            ctx
        ),
        "b"
    );
}

#[test]
fn test_loop_else() {
    let tmpl =
        Template::from_source("{% for x in items %}{{ x }}{% if x == stop %}{% break %}{% end %}{% else %}!{% end %}")
            .unwrap();
    assert_eq!(
        tmpl.render(context!(items => vec![1, 2, 3], stop => 9)).unwrap(),
        "123!"
    );
    assert_eq!(
        tmpl.render(context!(items => vec![1, 2, 3], stop => 2)).unwrap(),
        "12"
    );
    assert_eq!(
        tmpl.render(context!(items => Vec::<i32>::new(), stop => 2)).unwrap(),
        "!"
    );
}

#[test]
fn test_for_unpacking() {
    let ctx = context!(pairs => vec![("a", 1), ("b", 2)]);
    assert_eq!(
        render_str("{% for k, v in pairs %}{{ k }}={{ v }};{% end %}", ctx),
        "a=1;b=2;"
    );
    assert_eq!(
        render!("{% for k, v in d.items() %}{{ k }}{{ v }}{% end %}", d => context!(x => 1)),
        "x1"
    );
    let err = Template::from_source("{% for a, b in [[1, 2, 3]] %}{% end %}")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
}

#[test]
fn test_while_loop() {
    assert_eq!(
        render!("{% set i = 0 %}{% while i < 3 %}{{ i }}{% set i = i + 1 %}{% end %}"),
        "012"
    );
    assert_eq!(
        render!("{% set i = 0 %}{% while True %}{% set i = i + 1 %}{% if i > 4 %}{% break %}{% end %}{% end %}{{ i }}"),
        "5"
    );
    assert_eq!(render!("{% while False %}x{% else %}done{% end %}"), "done");
}

#[test]
fn test_set_scoping() {
    let tmpl = Template::from_source(
        "{% for x in items %}{% if x == 2 %}{% set seen = x %}{% end %}{% end %}{{ seen }}",
    )
    .unwrap();
    assert_eq!(tmpl.render(context!(items => vec![1, 2, 3])).unwrap(), "2");

    let tmpl = Template::from_source(
        "{% for x in items %}{{ total }},{% set total = total + x %}{% end %}{{ total }}",
    )
    .unwrap();
    assert_eq!(
        tmpl.render(context!(items => vec![1, 2, 3], total => 0)).unwrap(),
        "0,1,3,6"
    );
    // every render starts with fresh bindings
    assert_eq!(
        tmpl.render(context!(items => vec![5], total => 0)).unwrap(),
        "0,5"
    );
}

#[test]
fn test_bindings_shadow_builtins() {
    assert_eq!(render!("{{ len }}", len => "mine"), "mine");
    assert_eq!(render!("{{ len('abc') }}"), "3");
}

#[test]
fn test_try() {
    assert_eq!(
        render!("{% try %}a{{ missing }}b{% except %}c{% end %}"),
        "ac"
    );
    assert_eq!(
        render!("{% try %}a{% except %}b{% else %}c{% finally %}d{% end %}"),
        "acd"
    );
    assert_eq!(
        render!("{% try %}{{ 1 // 0 }}{% except %}b{% else %}c{% finally %}d{% end %}"),
        "bd"
    );
    assert_eq!(
        render!("{% try %}{{ missing }}{% except as e %}[{{ e }}]{% end %}"),
        "[&#x27;missing&#x27; is undefined]"
    );
    let err = Template::from_source("{% try %}{{ missing }}{% finally %}x{% end %}")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
}

#[test]
fn test_try_in_loop() {
    assert_eq!(
        render!(
            "{% for x in items %}{% try %}{{ 10 // x }}{% except %}-{% end %},{% end %}",
            items => vec![1, 0, 5]
        ),
        "10,-,2,"
    );
    assert_eq!(
        render!("{% for x in [1, 2] %}{% try %}{% break %}{% finally %}f{% end %}{{ x }}{% end %}"),
        "f"
    );
}

#[test]
fn test_apply() {
    assert_eq!(
        render!("{% apply squeeze %}  a\n   b  {% end %}"),
        "a b"
    );
    // the body is escaped while capturing, the result is emitted as is
    assert_eq!(
        render!("{% apply str %}<{{ name }}>{% end %}", name => "<a>"),
        "<&lt;a&gt;>"
    );
}

#[test]
fn test_expressions() {
    assert_eq!(render!("{{ 1 + 2 * 3 }}"), "7");
    assert_eq!(render!("{{ 7 / 2 }}"), "3.5");
    assert_eq!(render!("{{ 4 / 2 }}"), "2.0");
    assert_eq!(render!("{{ -7 // 2 }}"), "-4");
    assert_eq!(render!("{{ 7 % 3 }}"), "1");
    assert_eq!(render!("{{ 'ab' * 2 }}"), "abab");
    assert_eq!(render!("{{ [1, 'a'] }}"), "[1, &#x27;a&#x27;]");
    assert_eq!(render!("{% raw {'k': 1} %}"), "{'k': 1}");
    assert_eq!(render!("{{ None }} {{ True }} {{ not 0 }}"), "None True True");
    assert_eq!(render!("{{ 'b' in 'abc' }} {{ 2 not in [1, 2] }}"), "True False");
    assert_eq!(render!("{{ '' or 'default' }}"), "default");
}

#[test]
fn test_builtins() {
    assert_eq!(render!("{{ range(3) }}"), "[0, 1, 2]");
    assert_eq!(render!("{{ sorted([3, 1, 2]) }}"), "[1, 2, 3]");
    assert_eq!(render!("{{ min(3, 1, 2) }}-{{ max([3, 1, 2]) }}"), "1-3");
    assert_eq!(render!("{{ int('42') + 1 }} {{ float(1) }} {{ abs(-2) }}"), "43 1.0 2");
    assert_eq!(render!("{{ str(1) + 'x' }}"), "1x");
    assert_eq!(render!("{{ squeeze('  a \n\t b ') }}"), "a b");
    assert_eq!(render!("{% raw url_escape('a b&c/d') %}"), "a%20b%26c/d");
    assert_eq!(render!("{% raw json_encode({'a': [1, None]}) %}"), r#"{"a":[1,null]}"#);
}

fn render_err(source: &str) -> ErrorKind {
    Template::from_source(source)
        .unwrap()
        .render(context!())
        .unwrap_err()
        .kind()
}

#[test]
fn test_builtin_error_paths() {
    // range bounds at the edges of the integer range
    assert_eq!(
        render!("{{ range(9223372036854775806, 9223372036854775807) }}"),
        "[9223372036854775806]"
    );
    assert_eq!(
        render!("{{ range(-9223372036854775807, -9223372036854775805) }}"),
        "[-9223372036854775807, -9223372036854775806]"
    );
    assert_eq!(
        render_err("{{ range(-1, 9223372036854775807) }}"),
        ErrorKind::InvalidOperation
    );
    assert_eq!(
        render_err("{{ range(9223372036854775807, -9223372036854775807, -1) }}"),
        ErrorKind::InvalidOperation
    );

    // repetition that would not fit into memory
    assert_eq!(
        render_err("{{ 'ab' * 9223372036854775807 }}"),
        ErrorKind::ImpossibleOperation
    );
    assert_eq!(render_err("{{ 'ab' * 10000000000 }}"), ErrorKind::ImpossibleOperation);
    assert_eq!(render_err("{{ [1] * 10000000000 }}"), ErrorKind::ImpossibleOperation);
    assert_eq!(render!("{{ '' * 9223372036854775807 }}|{{ [1] * -1 }}"), "|[]");

    // values without an ordering
    assert_eq!(
        render_err("{{ sorted(range(32) + ['a'] * 32) }}"),
        ErrorKind::InvalidOperation
    );
    assert_eq!(
        render_err("{{ sorted([1.0, float('nan'), 0.5]) }}"),
        ErrorKind::InvalidOperation
    );
    assert_eq!(render_err("{{ min(1, 'a') }}"), ErrorKind::InvalidOperation);
    assert_eq!(render_err("{{ max([2, 'a', 1]) }}"), ErrorKind::InvalidOperation);
    assert_eq!(render_err("{{ max(float('nan'), 1) }}"), ErrorKind::InvalidOperation);
    assert_eq!(
        render!("{% try %}{{ sorted([3, 'a']) }}{% except %}caught{% end %}"),
        "caught"
    );
}

#[test]
fn test_chained_comparisons() {
    assert_eq!(render!("{{ 3 > 2 > 1 }}"), "True");
    assert_eq!(render!("{{ 1 < 2 < 2 }}"), "False");
    assert_eq!(
        render!("{% if 0 <= n < 10 %}digit{% end %}", n => 7),
        "digit"
    );
}

#[test]
fn test_loop_control_inside_block() {
    assert_eq!(
        render!(
            "{% for x in [1, 2, 3] %}{% block item %}{% if x == 2 %}{% break %}{% end %}{{ x }}{% end %}{% end %}"
        ),
        "1"
    );
    assert_eq!(
        render!(
            "{% for x in [1, 2, 3] %}{% block item %}{% if x == 2 %}{% continue %}{% end %}{{ x }}{% end %}{% end %}"
        ),
        "13"
    );
}

#[test]
fn test_methods() {
    assert_eq!(render!("{{ 'hello world'.title() }}"), "Hello World");
    assert_eq!(render!("{{ ', '.join(['a', 'b']) }}"), "a, b");
    assert_eq!(render!("{{ 'a,b,c'.split(',')[1] }}"), "b");
    assert_eq!(render!("{{ '  x  '.strip() }}|"), "x|");
    assert_eq!(render!("{{ d.get('missing', 'dflt') }}", d => context!()), "dflt");
}

#[test]
fn test_struct_context() {
    #[derive(Serialize)]
    struct User {
        name: String,
        tags: Vec<String>,
    }

    let user = User {
        name: "Peter".into(),
        tags: vec!["admin".into(), "staff".into()],
    };
    assert_eq!(
        render!("{{ user.name }}: {{ user.tags[-1] }}", user),
        "Peter: staff"
    );
}

#[test]
fn test_text_is_verbatim() {
    assert_eq!(
        render!("  a  {% if True %}\n  b\n{% end %}  c  "),
        "  a  \n  b\n  c  "
    );
}

#[test]
fn test_render_errors() {
    let tmpl = Template::from_source("line one\n{{ undefined_name }}").unwrap();
    let err = tmpl.render(context!()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UndefinedError);
    assert_eq!(err.line(), Some(2));
    assert_snapshot!(err.to_string(), @"undefined value: 'undefined_name' is undefined (in <string>:2)");

    let err = Template::from_source("{{ 1 + 'a' }}")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let err = Template::from_source("{{ 'x'() }}")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotCallable);

    let err = Template::from_source("{{ 1 / 0 }}")
        .unwrap()
        .render(context!())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ImpossibleOperation);
}

#[test]
fn test_invalid_context() {
    let err = Template::from_source("x")
        .unwrap()
        .render(vec![1, 2])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert_eq!(Template::from_source("x").unwrap().render(()).unwrap(), "x");
}
