use std::cmp::Ordering;

use crate::error::{Error, ErrorKind};
use crate::value::{Value, ValueKind, ValueRepr};

pub(crate) enum CoerceResult {
    I64(i64, i64),
    F64(f64, f64),
}

fn as_number(value: &Value) -> Option<CoerceResult> {
    match value.0 {
        ValueRepr::Bool(val) => Some(CoerceResult::I64(val as i64, 0)),
        ValueRepr::I64(val) => Some(CoerceResult::I64(val, 0)),
        ValueRepr::F64(val) => Some(CoerceResult::F64(val, 0.0)),
        _ => None,
    }
}

/// Brings two numeric values to a common representation.
pub(crate) fn coerce(a: &Value, b: &Value) -> Option<CoerceResult> {
    match (as_number(a)?, as_number(b)?) {
        (CoerceResult::I64(a, _), CoerceResult::I64(b, _)) => Some(CoerceResult::I64(a, b)),
        (CoerceResult::F64(a, _), CoerceResult::F64(b, _)) => Some(CoerceResult::F64(a, b)),
        (CoerceResult::I64(a, _), CoerceResult::F64(b, _)) => Some(CoerceResult::F64(a as f64, b)),
        (CoerceResult::F64(a, _), CoerceResult::I64(b, _)) => Some(CoerceResult::F64(a, b as f64)),
    }
}

fn unsupported(op: &str, lhs: &Value, rhs: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!(
            "unsupported operand types for {op}: {} and {}",
            lhs.kind(),
            rhs.kind()
        ),
    )
}

fn overflow(op: &str) -> Error {
    Error::new(
        ErrorKind::ImpossibleOperation,
        format!("integer overflow in {op}"),
    )
}

fn division_by_zero() -> Error {
    Error::new(ErrorKind::ImpossibleOperation, "division by zero")
}

macro_rules! math_binop {
    ($name:ident, $int:ident, $float:tt) => {
        pub(crate) fn $name(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
            match coerce(lhs, rhs) {
                Some(CoerceResult::I64(a, b)) => a
                    .$int(b)
                    .map(Value::from)
                    .ok_or_else(|| overflow(stringify!($float))),
                Some(CoerceResult::F64(a, b)) => Ok(Value::from(a $float b)),
                None => Err(unsupported(stringify!($float), lhs, rhs)),
            }
        }
    };
}

math_binop!(sub, checked_sub, -);

/// Implements `+` which also concatenates strings and sequences.
pub(crate) fn add(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(a), ValueRepr::String(b)) => {
            let mut rv = String::with_capacity(a.len() + b.len());
            rv.push_str(a);
            rv.push_str(b);
            Ok(Value::from(rv))
        }
        (ValueRepr::Seq(a), ValueRepr::Seq(b)) => {
            Ok(Value::from_iter(a.iter().chain(b.iter()).cloned()))
        }
        _ => match coerce(lhs, rhs) {
            Some(CoerceResult::I64(a, b)) => a.checked_add(b).map(Value::from).ok_or_else(|| overflow("+")),
            Some(CoerceResult::F64(a, b)) => Ok(Value::from(a + b)),
            None => Err(unsupported("+", lhs, rhs)),
        },
    }
}

/// Upper bound for the byte length of a repeated string.
const MAX_REPEAT_STRING_LEN: usize = 10_000_000;

/// Upper bound for the item count of a repeated sequence.
const MAX_REPEAT_SEQ_LEN: usize = 100_000;

fn repeat_count(len: usize, n: i64, limit: usize) -> Result<usize, Error> {
    if len == 0 || n <= 0 {
        return Ok(0);
    }
    match usize::try_from(n).ok().and_then(|n| len.checked_mul(n)) {
        Some(total) if total <= limit => Ok(total / len),
        _ => Err(Error::new(
            ErrorKind::ImpossibleOperation,
            "result of repetition is too large",
        )),
    }
}

fn repeat(value: &Value, n: i64) -> Option<Result<Value, Error>> {
    match &value.0 {
        ValueRepr::String(s) => Some(
            repeat_count(s.len(), n, MAX_REPEAT_STRING_LEN).map(|n| Value::from(s.repeat(n))),
        ),
        ValueRepr::Seq(items) => Some(repeat_count(items.len(), n, MAX_REPEAT_SEQ_LEN).map(|n| {
            Value::from_iter(std::iter::repeat(items.iter().cloned()).take(n).flatten())
        })),
        _ => None,
    }
}

/// Implements `*` which also repeats strings and sequences.
pub(crate) fn mul(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match (&lhs.0, &rhs.0) {
        (ValueRepr::String(_) | ValueRepr::Seq(_), ValueRepr::I64(n))
        | (ValueRepr::I64(n), ValueRepr::String(_) | ValueRepr::Seq(_)) => {
            let container = if lhs.is_number() { rhs } else { lhs };
            repeat(container, *n).unwrap_or_else(|| Err(unsupported("*", lhs, rhs)))
        }
        _ => match coerce(lhs, rhs) {
            Some(CoerceResult::I64(a, b)) => a.checked_mul(b).map(Value::from).ok_or_else(|| overflow("*")),
            Some(CoerceResult::F64(a, b)) => Ok(Value::from(a * b)),
            None => Err(unsupported("*", lhs, rhs)),
        },
    }
}

/// Implements `/` which is always true division.
pub(crate) fn div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    let (a, b) = match coerce(lhs, rhs) {
        Some(CoerceResult::I64(a, b)) => (a as f64, b as f64),
        Some(CoerceResult::F64(a, b)) => (a, b),
        None => return Err(unsupported("/", lhs, rhs)),
    };
    if b == 0.0 {
        return Err(division_by_zero());
    }
    Ok(Value::from(a / b))
}

/// Implements `//` (floor division).
pub(crate) fn int_div(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(division_by_zero()),
        Some(CoerceResult::I64(a, b)) => match a.checked_div(b) {
            Some(q) if a % b != 0 && (a < 0) != (b < 0) => Ok(Value::from(q - 1)),
            Some(q) => Ok(Value::from(q)),
            None => Err(overflow("//")),
        },
        Some(CoerceResult::F64(_, b)) if b == 0.0 => Err(division_by_zero()),
        Some(CoerceResult::F64(a, b)) => Ok(Value::from((a / b).floor())),
        None => Err(unsupported("//", lhs, rhs)),
    }
}

/// Implements `%`.  The result takes the sign of the divisor.
pub(crate) fn rem(lhs: &Value, rhs: &Value) -> Result<Value, Error> {
    match coerce(lhs, rhs) {
        Some(CoerceResult::I64(_, 0)) => Err(division_by_zero()),
        Some(CoerceResult::I64(a, b)) => match a.checked_rem(b) {
            Some(r) if r != 0 && (r < 0) != (b < 0) => Ok(Value::from(r + b)),
            Some(r) => Ok(Value::from(r)),
            None => Err(overflow("%")),
        },
        Some(CoerceResult::F64(_, b)) if b == 0.0 => Err(division_by_zero()),
        Some(CoerceResult::F64(a, b)) => {
            let r = a % b;
            Ok(Value::from(if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }))
        }
        None => Err(unsupported("%", lhs, rhs)),
    }
}

/// Implements unary `-`.
pub(crate) fn neg(val: &Value) -> Result<Value, Error> {
    match val.0 {
        ValueRepr::Bool(b) => Ok(Value::from(-(b as i64))),
        ValueRepr::I64(x) => x.checked_neg().map(Value::from).ok_or_else(|| overflow("-")),
        ValueRepr::F64(x) => Ok(Value::from(-x)),
        _ => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("bad operand type for unary -: {}", val.kind()),
        )),
    }
}

/// Compares two values for the ordering operators.
pub(crate) fn compare(lhs: &Value, rhs: &Value, op: &str) -> Result<Ordering, Error> {
    match lhs.partial_cmp(rhs) {
        Some(ordering) => Ok(ordering),
        None => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!(
                "{op} not supported between {} and {}",
                lhs.kind(),
                rhs.kind()
            ),
        )),
    }
}

/// Implements the `in` operator.
pub(crate) fn contains(container: &Value, value: &Value) -> Result<Value, Error> {
    let rv = match &container.0 {
        ValueRepr::String(s) => match value.as_str() {
            Some(needle) => s.contains(needle),
            None => s.contains(&value.to_string()),
        },
        ValueRepr::Seq(items) => items.contains(value),
        ValueRepr::Map(map) => match value.kind() {
            ValueKind::String | ValueKind::Number | ValueKind::Bool => {
                map.contains_key(value.to_string().as_str())
            }
            _ => false,
        },
        _ => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("{} does not support the in operator", container.kind()),
            ))
        }
    };
    Ok(Value::from(rv))
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_adding() {
        let err = add(&Value::from("a"), &Value::from(42)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(add(&Value::from(1), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(
            add(&Value::from("foo"), &Value::from("bar")).unwrap(),
            Value::from("foobar")
        );
        assert_eq!(
            add(&Value::from(vec![1]), &Value::from(vec![2])).unwrap(),
            Value::from(vec![1, 2])
        );
    }

    #[test]
    fn test_division() {
        assert_eq!(div(&Value::from(7), &Value::from(2)).unwrap(), Value::from(3.5));
        assert_eq!(int_div(&Value::from(7), &Value::from(2)).unwrap(), Value::from(3));
        assert_eq!(int_div(&Value::from(-7), &Value::from(2)).unwrap(), Value::from(-4));
        assert_eq!(int_div(&Value::from(7), &Value::from(-2)).unwrap(), Value::from(-4));
        assert_eq!(rem(&Value::from(-7), &Value::from(3)).unwrap(), Value::from(2));
        assert_eq!(rem(&Value::from(7), &Value::from(-3)).unwrap(), Value::from(-2));
        assert_eq!(
            div(&Value::from(1), &Value::from(0)).unwrap_err().kind(),
            ErrorKind::ImpossibleOperation
        );
    }

    #[test]
    fn test_repeat() {
        assert_eq!(mul(&Value::from("ab"), &Value::from(2)).unwrap(), Value::from("abab"));
        assert_eq!(
            mul(&Value::from(2), &Value::from(vec![0])).unwrap(),
            Value::from(vec![0, 0])
        );
        assert_eq!(mul(&Value::from("ab"), &Value::from(-3)).unwrap(), Value::from(""));
        assert_eq!(
            mul(&Value::from(""), &Value::from(i64::MAX)).unwrap(),
            Value::from("")
        );
        for n in [i64::MAX, 10_000_000_000] {
            let err = mul(&Value::from("ab"), &Value::from(n)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ImpossibleOperation);
        }
        let err = mul(&Value::from(vec![1, 2]), &Value::from(1_000_000)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImpossibleOperation);
    }

    #[test]
    fn test_contains() {
        assert!(contains(&Value::from("hello"), &Value::from("ell")).unwrap().is_true());
        assert!(contains(&Value::from(vec![1, 2]), &Value::from(2.0)).unwrap().is_true());
        assert!(contains(&Value::from(1), &Value::from(1)).is_err());
    }
}
