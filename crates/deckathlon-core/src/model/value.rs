// ── JSON value helpers ──
//
// Comparison, truthiness and merge rules shared by stores, filters and
// the registry. Items are schemaless JSON objects, so these rules are the
// closest thing the data layer has to a type system.

use std::cmp::Ordering;

use serde_json::{Map, Value};

/// An untyped record keyed by field name.
pub type Item = Map<String, Value>;

/// Normalize a primary-key value into a map key.
///
/// Numbers and strings address the same slot when their text matches
/// (`1` and `"1"`), as object keys do in the browser client. Null, arrays
/// and objects are not keys.
pub fn key_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Falsy: null, false, 0, "". Everything else, including empty arrays and
/// objects, is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strict equality with numeric normalization, so `1 == 1.0`.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        _ => a == b,
    }
}

/// Whether `list` holds a value equal to `value`.
pub fn contains_value(list: &[Value], value: &Value) -> bool {
    list.iter().any(|v| values_equal(v, value))
}

/// Ordering used by store sorting.
///
/// Missing and null values sort first. If either side is a string, both
/// compare as case-insensitive text with natural numeric collation
/// ("1" < "2" < "10"); numbers and booleans compare numerically.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());

    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => {
            if a.is_string() || b.is_string() {
                natural_cmp(&display_text(a), &display_text(b))
            } else {
                match (numeric(a), numeric(b)) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

/// Text form of a value: strings without quotes, everything else as JSON.
pub fn display_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Case-insensitive comparison treating digit runs as numbers.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let a = a.to_lowercase();
    let b = b.to_lowercase();
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let xs = take_digits(&mut ai);
                let ys = take_digits(&mut bi);
                let xt = xs.trim_start_matches('0');
                let yt = ys.trim_start_matches('0');
                let ord = xt.len().cmp(&yt.len()).then_with(|| xt.cmp(yt));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                let ord = x.cmp(&y);
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

/// Shallow field merge: every field of `source` overwrites `target`,
/// fields absent from `source` are kept.
pub fn merge_into(target: &mut Item, source: Item) {
    for (field, value) in source {
        target.insert(field, value);
    }
}

/// Split a JSON payload into items: an object is one item, an array yields
/// its object elements. Anything else yields nothing.
pub fn items_from_value(value: Value) -> Vec<Item> {
    match value {
        Value::Object(map) => vec![map],
        Value::Array(values) => values
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
