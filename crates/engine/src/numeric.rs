//! Loose scalar semantics shared by conditions, rules and coercion.
//!
//! Submitted values arrive as JSON scalars or strings, stored values are
//! always text. Comparisons therefore use numeric-string coercion: two
//! operands that both read as numbers compare as `rust_decimal::Decimal`,
//! anything else compares as text. No `f64` in comparisons.

use std::cmp::Ordering;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

/// Parse a numeric string: optional surrounding whitespace, optional sign,
/// digits with an optional fraction, optional exponent.
pub fn parse_numeric(s: &str) -> Option<Decimal> {
    let t = s.trim();
    if !is_numeric_str(t) {
        return None;
    }
    let unsigned = t.strip_prefix('+').unwrap_or(t);
    let normalized = if let Some(rest) = unsigned.strip_prefix('-') {
        format!("-{}", pad_fraction(rest))
    } else {
        pad_fraction(unsigned)
    };
    if normalized.contains(['e', 'E']) {
        Decimal::from_scientific(&normalized).ok()
    } else {
        Decimal::from_str(&normalized).ok()
    }
}

/// `.5` -> `0.5`, `5.` -> `5.0`, `5.e3` -> `5.0e3`.
fn pad_fraction(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    if s.starts_with('.') {
        out.push('0');
    }
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c == '.' && !matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
            out.push('0');
        }
    }
    out
}

fn is_numeric_str(t: &str) -> bool {
    let bytes = t.as_bytes();
    let mut i = 0;
    if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i - int_start;
    let mut frac_digits = 0;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        frac_digits = i - frac_start;
    }
    if int_digits == 0 && frac_digits == 0 {
        return false;
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

/// Numeric reading of a JSON value. Booleans, null and structures are not
/// numeric.
pub fn value_numeric(v: &Value) -> Option<Decimal> {
    match v {
        Value::Number(n) => parse_numeric(&n.to_string()),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

/// Emptiness test used by `filled`/`empty` and `required`: null, false,
/// zero, `""`, `"0"` and empty structures are empty.
pub fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f == 0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Text form of a value: strings as-is, numbers in JSON notation, `true` as
/// `"1"`, `false`/null as `""`, structures as JSON text.
pub fn to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => v.to_string(),
    }
}

/// Loose equality with numeric-string coercion.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, Value::String(s)) | (Value::String(s), Value::Null) => s.is_empty(),
        (Value::Null, other) | (other, Value::Null) => is_empty(other),
        (Value::Bool(x), other) | (other, Value::Bool(x)) => *x == !is_empty(other),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => a == b,
        _ => match (value_numeric(a), value_numeric(b)) {
            (Some(x), Some(y)) => x == y,
            _ => to_text(a) == to_text(b),
        },
    }
}

/// Loose ordering: numeric when both sides are numeric, otherwise byte-wise
/// text order.
pub fn loose_cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(_), _) | (_, Value::Bool(_)) | (Value::Null, _) | (_, Value::Null) => {
            (!is_empty(a)).cmp(&!is_empty(b))
        }
        _ => match (value_numeric(a), value_numeric(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => to_text(a).cmp(&to_text(b)),
        },
    }
}

/// Leading integer of a value, like a C `atoi`: `"4.7"` -> 4, `"abc"` -> 0.
pub fn leading_int(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::Bool(b) => i64::from(*b),
        Value::String(s) => {
            let t = s.trim_start();
            let (sign, digits) = match t.as_bytes().first() {
                Some(b'-') => (-1, &t[1..]),
                Some(b'+') => (1, &t[1..]),
                _ => (1, t),
            };
            let end = digits
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(digits.len());
            digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
        }
        _ => 0,
    }
}
