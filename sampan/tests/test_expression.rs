use sampan::value::Value;
use sampan::{context, ErrorKind, Expression, Loader};
use similar_asserts::assert_eq;

#[test]
fn test_basic_evaluation() {
    let expr = Expression::new("a + b * 2").unwrap();
    assert_eq!(expr.eval(context!(a => 1, b => 2)).unwrap(), Value::from(5));
    assert_eq!(expr.eval(context!(a => "x", b => "y")).unwrap(), Value::from("xyy"));
}

#[test]
fn test_compound_values() {
    let expr = Expression::new("[x, {'k': x}]").unwrap();
    let rv = expr.eval(context!(x => 1)).unwrap();
    assert_eq!(rv.to_string(), "[1, {'k': 1}]");
    assert_eq!(rv.len(), Some(2));
}

#[test]
fn test_short_circuit() {
    let expr = Expression::new("flag and missing").unwrap();
    assert_eq!(expr.eval(context!(flag => false)).unwrap(), Value::from(false));
    assert_eq!(
        expr.eval(context!(flag => true)).unwrap_err().kind(),
        ErrorKind::UndefinedError
    );

    let expr = Expression::new("value or 'fallback'").unwrap();
    assert_eq!(expr.eval(context!(value => "")).unwrap(), Value::from("fallback"));
    assert_eq!(expr.eval(context!(value => "set")).unwrap(), Value::from("set"));
}

#[test]
fn test_unit_context() {
    let expr = Expression::new("len('abc') == 3").unwrap();
    assert!(expr.eval(()).unwrap().is_true());
}

#[test]
fn test_errors() {
    assert_eq!(
        Expression::new("1 +").unwrap_err().kind(),
        ErrorKind::SyntaxError
    );
    assert_eq!(
        Expression::new("").unwrap_err().kind(),
        ErrorKind::SyntaxError
    );
    let expr = Expression::new("nope").unwrap();
    assert_eq!(expr.eval(context!()).unwrap_err().kind(), ErrorKind::UndefinedError);
    let expr = Expression::new("x").unwrap();
    assert_eq!(
        expr.eval(vec![1, 2]).unwrap_err().kind(),
        ErrorKind::InvalidOperation
    );
}

#[test]
fn test_loader_expressions_see_globals() {
    let mut loader = Loader::new();
    loader.add_global("limit", 10);
    let expr = loader.compile_expression("value > limit").unwrap();
    assert_eq!(expr.source(), "value > limit");
    assert!(expr.eval(context!(value => 11)).unwrap().is_true());
    assert!(!expr.eval(context!(value => 3)).unwrap().is_true());

    // plain expressions only know the built-in functions
    let expr = Expression::new("limit").unwrap();
    assert_eq!(expr.eval(context!()).unwrap_err().kind(), ErrorKind::UndefinedError);
}
