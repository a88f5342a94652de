//! RuleValidator: one value against one rule instance.
//!
//! Rule names resolve to [`RuleKind`] once, when the form is loaded. Every
//! kind is a pure predicate over `(value, props)` except `unique`, which
//! yields a [`RuleVerdict::Lookup`] for the caller to resolve against the
//! store.

use std::cmp::Ordering;
use std::sync::OnceLock;

use formflow_interchange::Id;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::coerce::coerce;
use crate::dates::{matches_php_format, parse_datetime};
use crate::numeric::{is_empty, loose_eq, to_text, value_numeric};
use crate::types::FieldType;

/// Closed set of rule kinds, with a fallback for names outside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleKind {
    Required,
    Min,
    Max,
    Between,
    Email,
    Url,
    Numeric,
    Integer,
    Alpha,
    AlphaNum,
    AlphaDash,
    Regex,
    In,
    NotIn,
    Date,
    DateFormat,
    Before,
    After,
    BeforeOrEqual,
    AfterOrEqual,
    Mimes,
    MimeTypes,
    Size,
    MaxFileSize,
    MinFileSize,
    Dimensions,
    Confirmed,
    Same,
    Different,
    Unique,
    StartsWith,
    EndsWith,
    Json,
    Latitude,
    Longitude,
    Unknown(String),
}

impl RuleKind {
    pub fn from_name(name: &str) -> RuleKind {
        match name.trim() {
            "required" => RuleKind::Required,
            "min" => RuleKind::Min,
            "max" => RuleKind::Max,
            "between" => RuleKind::Between,
            "email" => RuleKind::Email,
            "url" => RuleKind::Url,
            "numeric" => RuleKind::Numeric,
            "integer" => RuleKind::Integer,
            "alpha" => RuleKind::Alpha,
            "alpha_num" => RuleKind::AlphaNum,
            "alpha_dash" => RuleKind::AlphaDash,
            "regex" => RuleKind::Regex,
            "in" => RuleKind::In,
            "not_in" => RuleKind::NotIn,
            "date" => RuleKind::Date,
            "date_format" => RuleKind::DateFormat,
            "before" => RuleKind::Before,
            "after" => RuleKind::After,
            "before_or_equal" => RuleKind::BeforeOrEqual,
            "after_or_equal" => RuleKind::AfterOrEqual,
            "mimes" => RuleKind::Mimes,
            "mimetypes" => RuleKind::MimeTypes,
            "size" => RuleKind::Size,
            "max_file_size" => RuleKind::MaxFileSize,
            "min_file_size" => RuleKind::MinFileSize,
            "dimensions" => RuleKind::Dimensions,
            "confirmed" => RuleKind::Confirmed,
            "same" => RuleKind::Same,
            "different" => RuleKind::Different,
            "unique" => RuleKind::Unique,
            "starts_with" => RuleKind::StartsWith,
            "ends_with" => RuleKind::EndsWith,
            "json" => RuleKind::Json,
            "latitude" => RuleKind::Latitude,
            "longitude" => RuleKind::Longitude,
            other => RuleKind::Unknown(other.to_string()),
        }
    }
}

/// Store lookup requested by the `unique` rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueLookup {
    pub field_id: Id,
    /// The value as it would be stored.
    pub value: String,
    pub exclude_entry_id: Option<Id>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleVerdict {
    Valid,
    Invalid(String),
    Lookup(UniqueLookup),
}

/// Message for a `unique` lookup that found a match.
pub const UNIQUE_MESSAGE: &str = "This value has already been used.";

/// Where a rule is being applied.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleContext {
    pub field_id: Id,
    /// The entry being edited, for later-stage submissions.
    pub entry_id: Option<Id>,
}

/// Pure validation of one value against one rule. `unique` passes here;
/// use [`check_rule`] to get its store lookup.
pub fn validate_rule(
    value: &Value,
    field_type: Option<FieldType>,
    kind: &RuleKind,
    props: &Map<String, Value>,
) -> Vec<String> {
    match check_rule(value, field_type, kind, props, &RuleContext::default()) {
        RuleVerdict::Invalid(message) => vec![message],
        RuleVerdict::Valid | RuleVerdict::Lookup(_) => vec![],
    }
}

pub fn check_rule(
    value: &Value,
    field_type: Option<FieldType>,
    kind: &RuleKind,
    props: &Map<String, Value>,
    ctx: &RuleContext,
) -> RuleVerdict {
    let numeric_family = field_type.is_some_and(|t| t.is_numeric_family());
    match kind {
        RuleKind::Required => verdict(
            !is_empty(value) || is_literal_zero(value),
            || "This field is required.".to_string(),
        ),
        RuleKind::Min => bound(value, numeric_family, props, Ordering::Less),
        RuleKind::Max => bound(value, numeric_family, props, Ordering::Greater),
        RuleKind::Between => between(value, field_type, props),
        RuleKind::Email => verdict(matches(&EMAIL, EMAIL_PATTERN, &to_text(value)), || {
            "Must be a valid email address.".to_string()
        }),
        RuleKind::Url => verdict(matches(&URL, URL_PATTERN, &to_text(value)), || {
            "Must be a valid URL.".to_string()
        }),
        RuleKind::Numeric => verdict(value_numeric(value).is_some(), || {
            "Must be a numeric value.".to_string()
        }),
        RuleKind::Integer => verdict(is_integer(value), || "Must be an integer.".to_string()),
        RuleKind::Alpha => verdict(matches(&ALPHA, r"^[a-zA-Z]+$", &to_text(value)), || {
            "Must contain only letters.".to_string()
        }),
        RuleKind::AlphaNum => verdict(
            matches(&ALPHA_NUM, r"^[a-zA-Z0-9]+$", &to_text(value)),
            || "Must contain only letters and numbers.".to_string(),
        ),
        RuleKind::AlphaDash => verdict(
            matches(&ALPHA_DASH, r"^[a-zA-Z0-9_-]+$", &to_text(value)),
            || "Must contain only letters, numbers, dashes and underscores.".to_string(),
        ),
        RuleKind::Regex => verdict(regex_rule(value, props), || "Format is invalid.".to_string()),
        RuleKind::In => verdict(
            list_prop(props, "values").iter().any(|o| loose_eq(value, o)),
            || "Selected value is not valid.".to_string(),
        ),
        RuleKind::NotIn => verdict(
            !list_prop(props, "values").iter().any(|o| loose_eq(value, o)),
            || "Selected value is not allowed.".to_string(),
        ),
        RuleKind::Date => verdict(parse_datetime(&to_text(value)).is_some(), || {
            "Must be a valid date.".to_string()
        }),
        RuleKind::DateFormat => {
            let format = text_prop(props, "format").unwrap_or_else(|| "Y-m-d".to_string());
            verdict(matches_php_format(&to_text(value), &format), || {
                format!("Date must match format: {}", format)
            })
        }
        RuleKind::Before => date_compare(value, props, |o| o == Ordering::Less, "before"),
        RuleKind::After => date_compare(value, props, |o| o == Ordering::Greater, "after"),
        RuleKind::BeforeOrEqual => {
            date_compare(value, props, |o| o != Ordering::Greater, "before or equal to")
        }
        RuleKind::AfterOrEqual => {
            date_compare(value, props, |o| o != Ordering::Less, "after or equal to")
        }
        RuleKind::Mimes => {
            let info = file_info(value);
            let extension = info
                .get("extension")
                .map(to_text)
                .or_else(|| info.get("path").map(|p| path_extension(&to_text(p))))
                .unwrap_or_else(|| path_extension(&to_text(value)))
                .to_lowercase();
            let allowed = list_prop(props, "types");
            verdict(
                allowed.iter().any(|t| to_text(t).to_lowercase() == extension),
                || "File type not allowed.".to_string(),
            )
        }
        RuleKind::MimeTypes => {
            let mime = file_info(value).get("mime_type").map(to_text).unwrap_or_default();
            let allowed = list_prop(props, "types");
            verdict(allowed.iter().any(|t| to_text(t) == mime), || {
                "File MIME type not allowed.".to_string()
            })
        }
        RuleKind::Size => file_size(value, props, "size", |kb, want| kb == want, "be exactly"),
        RuleKind::MaxFileSize => {
            file_size(value, props, "max_size", |kb, want| kb <= want, "not exceed")
        }
        RuleKind::MinFileSize => {
            file_size(value, props, "min_size", |kb, want| kb >= want, "be at least")
        }
        RuleKind::Dimensions => verdict(dimensions(value, props), || {
            "Image dimensions do not meet requirements.".to_string()
        }),
        RuleKind::Confirmed => verdict(value == &raw_prop(props, "confirmation_value"), || {
            "Confirmation does not match.".to_string()
        }),
        RuleKind::Same => verdict(value == &raw_prop(props, "compare_value"), || {
            "Values must match.".to_string()
        }),
        RuleKind::Different => verdict(value != &raw_prop(props, "compare_value"), || {
            "Values must be different.".to_string()
        }),
        RuleKind::Unique => {
            let field_id = props
                .get("field_id")
                .and_then(value_numeric)
                .and_then(|d| d.to_i64())
                .unwrap_or(ctx.field_id);
            let exclude_entry_id = props
                .get("exclude_entry_id")
                .and_then(value_numeric)
                .and_then(|d| d.to_i64())
                .or(ctx.entry_id);
            let stored = match field_type {
                Some(t) => coerce(value, t),
                None => to_text(value),
            };
            RuleVerdict::Lookup(UniqueLookup {
                field_id,
                value: stored,
                exclude_entry_id,
            })
        }
        RuleKind::StartsWith => {
            let text = to_text(value);
            verdict(
                list_prop(props, "values")
                    .iter()
                    .any(|p| text.starts_with(&to_text(p))),
                || "Value must start with one of the specified prefixes.".to_string(),
            )
        }
        RuleKind::EndsWith => {
            let text = to_text(value);
            verdict(
                list_prop(props, "values")
                    .iter()
                    .any(|p| text.ends_with(&to_text(p))),
                || "Value must end with one of the specified suffixes.".to_string(),
            )
        }
        RuleKind::Json => {
            let valid = match value {
                Value::Null => false,
                Value::String(s) => serde_json::from_str::<Value>(s).is_ok(),
                _ => true,
            };
            verdict(valid, || "Must be valid JSON.".to_string())
        }
        RuleKind::Latitude => verdict(in_range(value, -90, 90), || {
            "Must be a valid latitude (-90 to 90).".to_string()
        }),
        RuleKind::Longitude => verdict(in_range(value, -180, 180), || {
            "Must be a valid longitude (-180 to 180).".to_string()
        }),
        RuleKind::Unknown(name) => RuleVerdict::Invalid(format!("Unknown rule: {}", name)),
    }
}

fn verdict(valid: bool, message: impl FnOnce() -> String) -> RuleVerdict {
    if valid {
        RuleVerdict::Valid
    } else {
        RuleVerdict::Invalid(message())
    }
}

fn is_literal_zero(v: &Value) -> bool {
    match v {
        Value::String(s) => s == "0",
        Value::Number(n) => n.as_i64() == Some(0),
        _ => false,
    }
}

// ── Props ───────────────────────────────────────────────────────────

fn raw_prop(props: &Map<String, Value>, key: &str) -> Value {
    props
        .get(key)
        .cloned()
        .unwrap_or_else(|| Value::String(String::new()))
}

fn text_prop(props: &Map<String, Value>, key: &str) -> Option<String> {
    props.get(key).filter(|v| !v.is_null()).map(to_text)
}

/// Numeric prop with its display text; missing or non-numeric reads as 0.
fn number_prop(props: &Map<String, Value>, key: &str) -> (Decimal, String) {
    match props.get(key) {
        Some(v) if !v.is_null() => (value_numeric(v).unwrap_or(Decimal::ZERO), to_text(v)),
        _ => (Decimal::ZERO, "0".to_string()),
    }
}

fn list_prop(props: &Map<String, Value>, key: &str) -> Vec<Value> {
    match props.get(key) {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ => vec![Value::String(s.clone())],
        },
        Some(Value::Null) | None => vec![],
        Some(other) => vec![other.clone()],
    }
}

// ── Magnitude and length ────────────────────────────────────────────

/// `min` (`reject = Less`) and `max` (`reject = Greater`).
fn bound(value: &Value, numeric_family: bool, props: &Map<String, Value>, reject: Ordering) -> RuleVerdict {
    if value.is_array() || value.is_object() {
        return RuleVerdict::Valid;
    }
    let (limit, shown) = number_prop(props, "value");
    let is_min = reject == Ordering::Less;
    if numeric_family {
        let valid = value_numeric(value).is_some_and(|n| n.cmp(&limit) != reject);
        verdict(valid, || {
            if is_min {
                format!("Value must be at least {}.", shown)
            } else {
                format!("Value must not exceed {}.", shown)
            }
        })
    } else {
        let len = Decimal::from(to_text(value).len());
        verdict(len.cmp(&limit) != reject, || {
            if is_min {
                format!("Must be at least {} characters.", shown)
            } else {
                format!("Must not exceed {} characters.", shown)
            }
        })
    }
}

fn between(value: &Value, field_type: Option<FieldType>, props: &Map<String, Value>) -> RuleVerdict {
    let (min, min_shown) = number_prop(props, "min");
    let (max, max_shown) = number_prop(props, "max");
    if field_type.is_some_and(|t| t.is_between_numeric()) {
        let valid = value_numeric(value).is_some_and(|n| n >= min && n <= max);
        verdict(valid, || {
            format!("Value must be between {} and {}.", min_shown, max_shown)
        })
    } else {
        let len = Decimal::from(to_text(value).len());
        verdict(len >= min && len <= max, || {
            format!(
                "Length must be between {} and {} characters.",
                min_shown, max_shown
            )
        })
    }
}

fn in_range(value: &Value, lo: i64, hi: i64) -> bool {
    value_numeric(value).is_some_and(|n| n >= Decimal::from(lo) && n <= Decimal::from(hi))
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        Value::Bool(true) => true,
        Value::String(s) => {
            let t = s.trim();
            let digits = t.strip_prefix(['-', '+']).unwrap_or(t);
            let canonical = digits == "0" || !digits.starts_with('0');
            canonical && !digits.is_empty() && t.parse::<i64>().is_ok()
        }
        _ => false,
    }
}

// ── Patterns ────────────────────────────────────────────────────────

static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
static URL: OnceLock<Option<Regex>> = OnceLock::new();
static ALPHA: OnceLock<Option<Regex>> = OnceLock::new();
static ALPHA_NUM: OnceLock<Option<Regex>> = OnceLock::new();
static ALPHA_DASH: OnceLock<Option<Regex>> = OnceLock::new();

const EMAIL_PATTERN: &str = r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$";
const URL_PATTERN: &str = r"^[A-Za-z][A-Za-z0-9+.-]*://[^\s/?#]+[^\s]*$";

fn matches(cell: &'static OnceLock<Option<Regex>>, pattern: &str, text: &str) -> bool {
    cell.get_or_init(|| Regex::new(pattern).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}

/// Admin-entered patterns: optional `/.../flags` delimiters. Empty, invalid
/// or unsupported patterns, and non-string values, pass.
fn regex_rule(value: &Value, props: &Map<String, Value>) -> bool {
    let pattern = text_prop(props, "pattern").unwrap_or_default();
    if pattern.is_empty() {
        return true;
    }
    let Value::String(text) = value else {
        return true;
    };
    match compile_admin_pattern(&pattern) {
        Some(re) => re.is_match(text),
        None => true,
    }
}

fn compile_admin_pattern(pattern: &str) -> Option<Regex> {
    let mut chars = pattern.chars();
    let first = chars.next()?;
    let (body, flags) = if "/#~@!%|{}[]".contains(first) {
        let close = match first {
            '{' => '}',
            '[' => ']',
            c => c,
        };
        let end = pattern.rfind(close).filter(|&i| i > 0)?;
        (&pattern[first.len_utf8()..end], &pattern[end + close.len_utf8()..])
    } else {
        (pattern, "")
    };
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => inline.push(flag),
            'u' | 'D' => {}
            _ => return None,
        }
    }
    let full = if inline.is_empty() {
        body.to_string()
    } else {
        format!("(?{}){}", inline, body)
    };
    Regex::new(&full).ok()
}

// ── Dates ───────────────────────────────────────────────────────────

fn date_compare(
    value: &Value,
    props: &Map<String, Value>,
    accept: impl Fn(Ordering) -> bool,
    relation: &str,
) -> RuleVerdict {
    let reference = text_prop(props, "date").unwrap_or_else(|| "now".to_string());
    let valid = match (parse_datetime(&to_text(value)), parse_datetime(&reference)) {
        (Some(a), Some(b)) => accept(a.cmp(&b)),
        _ => false,
    };
    verdict(valid, || format!("Date must be {} {}.", relation, reference))
}

// ── Files ───────────────────────────────────────────────────────────

/// Descriptor object of a stored or submitted file value.
fn file_info(value: &Value) -> Map<String, Value> {
    let decoded = match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
        other => other.clone(),
    };
    match decoded {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

fn path_extension(path: &str) -> String {
    std::path::Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

fn file_size(
    value: &Value,
    props: &Map<String, Value>,
    key: &str,
    accept: impl Fn(Decimal, Decimal) -> bool,
    wording: &str,
) -> RuleVerdict {
    let (want, shown) = number_prop(props, key);
    let bytes = file_info(value)
        .get("size")
        .and_then(value_numeric)
        .unwrap_or(Decimal::ZERO);
    let kb = bytes / Decimal::from(1024);
    verdict(accept(kb, want), || format!("File must {} {}KB.", wording, shown))
}

fn dimensions(value: &Value, props: &Map<String, Value>) -> bool {
    let info = file_info(value);
    let dim = |key: &str| info.get(key).and_then(value_numeric).unwrap_or(Decimal::ZERO);
    let (width, height) = (dim("width"), dim("height"));
    let prop = |key: &str| {
        props
            .get(key)
            .filter(|v| !v.is_null())
            .map(|v| value_numeric(v).unwrap_or(Decimal::ZERO))
    };
    let checks = [
        prop("min_width").map(|p| width >= p),
        prop("max_width").map(|p| width <= p),
        prop("min_height").map(|p| height >= p),
        prop("max_height").map(|p| height <= p),
        prop("width").map(|p| width == p),
        prop("height").map(|p| height == p),
    ];
    checks.iter().flatten().all(|&ok| ok)
}
