use insta::assert_snapshot;
use sampan::{ErrorCategory, ErrorKind, Template};
use similar_asserts::assert_eq;

fn syntax_error(source: &str) -> sampan::Error {
    let err = Template::from_source(source).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.kind().category(), ErrorCategory::Parse);
    err
}

fn detail(source: &str) -> String {
    syntax_error(source).detail().unwrap_or_default().to_string()
}

#[test]
fn test_unmatched_end() {
    let err = syntax_error("{% end %}");
    assert_snapshot!(err.to_string(), @"syntax error: unexpected end tag (in <string>:1:1)");
    assert_eq!(detail("{% if x %}{% end %}{% end %}"), "unexpected end tag");
}

#[test]
fn test_loop_controls_outside_loops() {
    assert_eq!(detail("{% break %}"), "break outside of loop");
    assert_eq!(detail("{% continue %}"), "continue outside of loop");
    assert_eq!(
        detail("{% for x in y %}{% apply f %}{% break %}{% end %}{% end %}"),
        "break outside of loop"
    );
    assert!(Template::from_source("{% for x in y %}{% if x %}{% break %}{% end %}{% end %}").is_ok());
    assert!(Template::from_source("{% for x in y %}{% block b %}{% break %}{% end %}{% end %}").is_ok());
    assert_eq!(detail("{% block b %}{% continue %}{% end %}"), "continue outside of loop");
    assert!(Template::from_source("{% while x %}{% try %}{% continue %}{% except %}{% end %}{% end %}").is_ok());
}

#[test]
fn test_misplaced_intermediate_tags() {
    assert_eq!(detail("{% else %}"), "else outside of if/for/while/try block");
    assert_eq!(detail("{% elif x %}"), "elif outside of if block");
    assert_eq!(
        detail("{% for x in y %}{% elif x %}{% end %}"),
        "elif cannot be attached to for block"
    );
    assert_eq!(
        detail("{% block a %}{% else %}{% end %}"),
        "else cannot be attached to block block"
    );
    assert_eq!(
        detail("{% try %}{% except %}{% finally %}{% except %}{% end %}"),
        "except after finally in try block"
    );
    assert_eq!(
        detail("{% try %}{% else %}{% end %}"),
        "else without except in try block"
    );
    assert_eq!(
        detail("{% try %}x{% end %}"),
        "try block requires except or finally"
    );
}

#[test]
fn test_unterminated() {
    assert_eq!(detail("{% if x %}"), "missing end tag for if block");
    assert_eq!(detail("{% for x in y %}{% else %}"), "missing end tag for for block");
    assert_eq!(detail("{{ x "), "missing end of expression tag");
    assert_eq!(detail("{% if x "), "missing end of block tag");
    assert_eq!(detail("{# x "), "missing end of comment tag");
}

#[test]
fn test_empty_directives() {
    assert_eq!(detail("{{ }}"), "empty expression");
    assert_eq!(detail("{%  %}"), "empty block tag");
    assert_eq!(detail("{% set %}"), "set is missing a statement");
    assert_eq!(detail("{% block %}{% end %}"), "block is missing a name");
    assert_eq!(detail("{% extends %}"), "extends is missing a template name");
}

#[test]
fn test_unknown_operator() {
    let err = syntax_error("ok\n  {% frobnicate x %}");
    assert_eq!(err.line(), Some(2));
    assert_eq!(err.column(), Some(3));
    assert_eq!(err.detail(), Some("unknown operator: frobnicate"));
}

#[test]
fn test_duplicates() {
    assert_eq!(
        detail("{% block a %}{% end %}{% block a %}{% end %}"),
        "block 'a' defined twice"
    );
    assert_eq!(
        detail("{% extends a %}{% extends b %}"),
        "tried to extend a second time"
    );
}

#[test]
fn test_expression_errors() {
    let err = syntax_error("{{ 1 + }}");
    assert_eq!(err.detail(), Some("unexpected end of expression, expected expression"));
    let err = syntax_error("{{ a b }}");
    assert_eq!(err.detail(), Some("unexpected identifier, expected end of expression"));
    syntax_error("{% set 1 = 2 %}");
    syntax_error("{% for in x %}{% end %}");
    syntax_error("{{ 'unterminated }}");
}

#[test]
fn test_errors_are_reported_at_compile_time() {
    // undefined names are a render error, not a compile error
    let tmpl = Template::from_source("{{ undefined_name }}").unwrap();
    let err = tmpl.render(()).unwrap_err();
    assert_eq!(err.kind().category(), ErrorCategory::Eval);
}

#[test]
fn test_alternate_display_shows_source() {
    let err = syntax_error("first\nsecond\n{% end %}\nfourth");
    assert_snapshot!(format!("{err:#}"), @r###"
    syntax error: unexpected end tag (in <string>:3:1)
    ---------------------------- Template Source -----------------------------
       1 | first
       2 | second
       3 > {% end %}
       4 | fourth
    --------------------------------------------------------------------------
    "###);
}

#[cfg(feature = "unstable_machinery")]
mod machinery {
    use sampan::machinery::ast::{BinOpKind, Expr, StmtKind};
    use sampan::machinery::{parse, parse_expr};

    #[test]
    fn test_statements() {
        let body = parse("t", "a{{ x }}{% raw y %}{% set z = 1 %}{# c #}b").unwrap();
        let kinds: Vec<_> = body.iter().map(|stmt| &stmt.kind).collect();
        assert!(matches!(kinds[0], StmtKind::Text(text) if text == "a"));
        assert!(matches!(kinds[1], StmtKind::Emit { raw: false, .. }));
        assert!(matches!(kinds[2], StmtKind::Emit { raw: true, .. }));
        assert!(matches!(kinds[3], StmtKind::Set { target, .. } if target == "z"));
        assert!(matches!(kinds[4], StmtKind::Text(text) if text == "b"));
        assert_eq!(kinds.len(), 5);
    }

    #[test]
    fn test_if_chain() {
        let body = parse("t", "{% if a %}1{% elif b %}2{% else %}3{% end %}").unwrap();
        match &body[0].kind {
            StmtKind::If { arms, else_body } => {
                assert_eq!(arms.len(), 2);
                assert!(else_body.is_some());
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_try_arms() {
        let body =
            parse("t", "{% try %}a{% except Exception as e %}b{% else %}c{% finally %}d{% end %}")
                .unwrap();
        match &body[0].kind {
            StmtKind::Try(try_block) => {
                assert_eq!(try_block.handlers.len(), 1);
                assert_eq!(try_block.handlers[0].bind.as_deref(), Some("e"));
                assert!(try_block.else_body.is_some());
                assert!(try_block.finally_body.is_some());
            }
            other => panic!("unexpected statement {other:?}"),
        }
    }

    #[test]
    fn test_expression_precedence() {
        match parse_expr("a or b and c").unwrap() {
            Expr::BinOp { op, right, .. } => {
                assert_eq!(op, BinOpKind::ScOr);
                assert!(matches!(*right, Expr::BinOp { op: BinOpKind::ScAnd, .. }));
            }
            other => panic!("unexpected expression {other:?}"),
        }
    }
}
