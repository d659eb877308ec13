//! Structural deep equality over JSON values.
//!
//! This is the predicate the change-tracking machinery uses to decide
//! whether an attribute actually changed. It differs from `Value::eq` in
//! two ways: numbers are compared by coerced numeric value (`1` equals
//! `1.0`) while positive and negative zero stay distinct, and recursion
//! depth is capped so pathologically deep inputs terminate.

use serde_json::{Number, Value};

const MAX_DEPTH: usize = 100;

/// Compare two JSON values structurally.
///
/// Rules, in priority order: `Null` equals only `Null`; values of
/// different runtime categories are unequal; booleans and strings compare
/// by value; numbers by coerced numeric value (±0 distinguished); arrays
/// pairwise by length then element; objects by identical key-set and
/// pairwise-equal values. Past [`MAX_DEPTH`] comparison falls back to
/// `Value::eq`.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    values_equal(a, b, 0)
}

fn values_equal(a: &Value, b: &Value, depth: usize) -> bool {
    if depth > MAX_DEPTH {
        return a == b;
    }

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Array(x), Value::Array(y)) => arrays_equal(x, y, depth),
        (Value::Object(x), Value::Object(y)) => objects_equal(x, y, depth),
        // Category mismatch
        _ => false,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    // Integer fast paths keep full 64-bit precision.
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => {
            if x == 0.0 && y == 0.0 {
                // +0.0 and -0.0 are distinct values here.
                x.is_sign_positive() == y.is_sign_positive()
            } else {
                // Reflexive even for NaN, should one ever get through.
                x == y || (x.is_nan() && y.is_nan())
            }
        }
        _ => false,
    }
}

fn arrays_equal(a: &[Value], b: &[Value], depth: usize) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .all(|(av, bv)| values_equal(av, bv, depth + 1))
}

fn objects_equal(
    a: &serde_json::Map<String, Value>,
    b: &serde_json::Map<String, Value>,
    depth: usize,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    for (key, av) in a {
        match b.get(key) {
            None => return false,
            Some(bv) => {
                if !values_equal(av, bv, depth + 1) {
                    return false;
                }
            }
        }
    }
    true
}

/// Human-readable category name for a JSON value, used in error messages.
pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Int",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn primitives() {
        assert!(deep_equal(&json!(null), &json!(null)));
        assert!(deep_equal(&json!(true), &json!(true)));
        assert!(deep_equal(&json!("a"), &json!("a")));
        assert!(!deep_equal(&json!(true), &json!(false)));
        assert!(!deep_equal(&json!("a"), &json!("b")));
    }

    #[test]
    fn null_only_equals_null() {
        assert!(!deep_equal(&json!(null), &json!(0)));
        assert!(!deep_equal(&json!(null), &json!("")));
        assert!(!deep_equal(&json!(null), &json!(false)));
    }

    #[test]
    fn category_mismatch() {
        assert!(!deep_equal(&json!(1), &json!("1")));
        assert!(!deep_equal(&json!([1]), &json!({"0": 1})));
        assert!(!deep_equal(&json!(true), &json!(1)));
    }

    #[test]
    fn numbers_by_coerced_value() {
        assert!(deep_equal(&json!(1), &json!(1.0)));
        assert!(deep_equal(&json!(-3), &json!(-3.0)));
        assert!(!deep_equal(&json!(1), &json!(2)));
        // Large integers keep full precision.
        assert!(deep_equal(&json!(i64::MAX), &json!(i64::MAX)));
        assert!(!deep_equal(&json!(i64::MAX), &json!(i64::MAX - 1)));
    }

    #[test]
    fn signed_zero_distinguished() {
        assert!(!deep_equal(&json!(0.0), &json!(-0.0)));
        assert!(deep_equal(&json!(-0.0), &json!(-0.0)));
        // Integer zero and positive float zero coerce equal.
        assert!(deep_equal(&json!(0), &json!(0.0)));
    }

    #[test]
    fn arrays() {
        assert!(deep_equal(&json!([1, 2, 3]), &json!([1, 2, 3])));
        assert!(!deep_equal(&json!([1, 2]), &json!([1, 2, 3])));
        assert!(!deep_equal(&json!([1, 2, 3]), &json!([1, 3, 2])));
        assert!(deep_equal(&json!([]), &json!([])));
    }

    #[test]
    fn objects_by_key_set() {
        assert!(deep_equal(
            &json!({"a": 1, "b": [true]}),
            &json!({"b": [true], "a": 1})
        ));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
        assert!(!deep_equal(&json!({"a": 1}), &json!({"a": 2})));
    }

    #[test]
    fn nested_structures() {
        let a = json!({"user": {"tags": ["x", "y"], "meta": {"n": 1}}});
        let b = json!({"user": {"tags": ["x", "y"], "meta": {"n": 1.0}}});
        assert!(deep_equal(&a, &b));

        let c = json!({"user": {"tags": ["x", "z"], "meta": {"n": 1}}});
        assert!(!deep_equal(&a, &c));
    }

    #[test]
    fn deep_nesting_terminates() {
        let mut a = json!(1);
        let mut b = json!(1);
        for _ in 0..200 {
            a = json!([a]);
            b = json!([b]);
        }
        // Past the cap this falls back to Value::eq, which still matches.
        assert!(deep_equal(&a, &b));
    }

    #[test]
    fn type_names() {
        assert_eq!(value_type_name(&json!(null)), "Null");
        assert_eq!(value_type_name(&json!(1)), "Int");
        assert_eq!(value_type_name(&json!(1.5)), "Float");
        assert_eq!(value_type_name(&json!("s")), "String");
        assert_eq!(value_type_name(&json!([])), "Array");
        assert_eq!(value_type_name(&json!({})), "Object");
    }
}
