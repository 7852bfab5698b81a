use serde_json::{Number, Value};

/// Structural equality over JSON values.
///
/// Numbers compare by numeric value, so `1` and `1.0` are equal. Objects are
/// equal when they hold the same keys with equal values, in any order.
///
/// ```
/// use jsonshape::equal;
/// use serde_json::json;
///
/// assert!(equal(&json!({ "a": [1, 2] }), &json!({ "a": [1.0, 2] })));
/// assert!(!equal(&json!(null), &json!(false)));
/// ```
pub fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| equal(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, a)| b.get(key).map_or(false, |b| equal(a, b)))
        }
        _ => false,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
        return a == b;
    }

    if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
        return a == b;
    }

    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Returns the values of `values` with later duplicates removed, keeping the
/// first occurrence of each distinct value in input order.
pub fn unique(values: &[Value]) -> Vec<&Value> {
    let mut retained: Vec<&Value> = Vec::with_capacity(values.len());

    for value in values {
        if find_index(&retained, value, |kept, probe| equal(kept, probe)).is_none() {
            retained.push(value);
        }
    }

    retained
}

/// Position of the first item for which `comparator(item, probe)` holds.
pub fn find_index<T, P, F>(items: &[T], probe: &P, comparator: F) -> Option<usize>
where
    P: ?Sized,
    F: Fn(&T, &P) -> bool,
{
    items.iter().position(|item| comparator(item, probe))
}
