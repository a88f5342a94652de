//! ValueCoercer: raw submitted value -> canonical stored text, per field type.
//!
//! Coercion is total: anything unparsable passes through as text. Canonical
//! encodings per type:
//!
//! | Type | Stored as |
//! |------|-----------|
//! | text, phone, text area, radio, dropdown | trimmed text |
//! | email | trimmed, lowercased |
//! | number, slider | digits and `+-.` only |
//! | percentage | as number, `%` removed |
//! | date / time / datetime | `YYYY-MM-DD` / `HH:MM:SS` / `YYYY-MM-DD HH:MM:SS` |
//! | checkbox, toggle | `"1"` or `"0"` |
//! | multi-select | JSON array text |
//! | location | `{"lat","lng","address"}` |
//! | address | `{"street","city","state","postal_code","country"}` |
//! | currency | fixed two decimals |
//! | rating | integer clamped to `0..=5` |
//! | url | scheme added when missing |
//! | password | `sha256:<hex>` |
//! | colour | `#RRGGBB` upper-cased |
//! | uploads, voice | descriptor JSON `{path,original_name,mime_type,size,extension}` |
//! | signature | descriptor JSON `{path,mime_type,size}` |

use std::sync::OnceLock;

use base64::Engine as _;
use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::blob::{hex, BlobError, BlobStore, SubmittedValue, Upload};
use crate::dates::{format_date, format_datetime, format_time, parse_datetime};
use crate::numeric::{leading_int, parse_numeric, to_text};
use crate::types::FieldType;

const PASSWORD_PREFIX: &str = "sha256:";

/// Coerce a JSON value. Pure; uploads arriving as JSON are passed through.
pub fn coerce(raw: &Value, field_type: FieldType) -> String {
    match field_type {
        FieldType::TextInput
        | FieldType::PhoneInput
        | FieldType::TextArea
        | FieldType::RadioButton
        | FieldType::DropdownSelect => to_text(raw).trim().to_string(),
        FieldType::EmailInput => to_text(raw).trim().to_lowercase(),
        FieldType::NumberInput | FieldType::Slider => sanitize_number(&to_text(raw)),
        FieldType::PercentageInput => sanitize_number(&to_text(raw).replace('%', "")),
        FieldType::DateInput => date_like(raw, format_date),
        FieldType::TimeInput => date_like(raw, format_time),
        FieldType::DateTimeInput => date_like(raw, format_datetime),
        FieldType::Checkbox | FieldType::ToggleSwitch => {
            if is_truthy(raw) { "1" } else { "0" }.to_string()
        }
        FieldType::MultiSelect => multi_select(raw),
        FieldType::LocationPicker => location(raw),
        FieldType::AddressInput => address(raw),
        FieldType::CurrencyInput => currency(raw),
        FieldType::Rating => leading_int(raw).clamp(0, 5).to_string(),
        FieldType::UrlInput => url(raw),
        FieldType::PasswordInput => password(raw),
        FieldType::ColorPicker => colour(raw),
        FieldType::FileUpload
        | FieldType::ImageUpload
        | FieldType::VideoUpload
        | FieldType::DocumentUpload
        | FieldType::VoiceRecord
        | FieldType::SignaturePad => file_reference(raw),
    }
}

/// Coerce a submitted value, persisting uploads and signature images to the
/// blob store first.
pub async fn coerce_submitted(
    raw: &SubmittedValue,
    field_type: FieldType,
    blobs: &dyn BlobStore,
) -> Result<String, BlobError> {
    match raw {
        SubmittedValue::Upload(upload) => store_upload(upload, field_type, blobs).await,
        SubmittedValue::Json(Value::String(s))
            if field_type == FieldType::SignaturePad && s.starts_with("data:image/") =>
        {
            store_signature(s, blobs).await
        }
        SubmittedValue::Json(v) => Ok(coerce(v, field_type)),
    }
}

async fn store_upload(
    upload: &Upload,
    field_type: FieldType,
    blobs: &dyn BlobStore,
) -> Result<String, BlobError> {
    let directory = field_type.upload_directory().unwrap_or("files");
    let extension = upload.extension();
    let path = blobs.put(directory, &extension, &upload.bytes).await?;
    Ok(json!({
        "path": path,
        "original_name": upload.original_name,
        "mime_type": upload.mime_type,
        "size": upload.bytes.len(),
        "extension": extension,
    })
    .to_string())
}

/// `data:image/<ext>;base64,<payload>`. An undecodable payload stores `""`.
async fn store_signature(data_url: &str, blobs: &dyn BlobStore) -> Result<String, BlobError> {
    let Some((header, payload)) = data_url.split_once(',') else {
        return Ok(String::new());
    };
    let Some(ext) = header
        .strip_prefix("data:image/")
        .and_then(|h| h.strip_suffix(";base64"))
    else {
        return Ok(String::new());
    };
    let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(payload.trim()) else {
        return Ok(String::new());
    };
    let ext = ext.to_ascii_lowercase();
    let path = blobs.put("signatures", &ext, &bytes).await?;
    Ok(json!({
        "path": path,
        "mime_type": format!("image/{}", ext),
        "size": bytes.len(),
    })
    .to_string())
}

// ── Per-type helpers ────────────────────────────────────────────────

fn sanitize_number(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
        .collect()
}

fn date_like(raw: &Value, format: fn(&time::PrimitiveDateTime) -> String) -> String {
    let text = to_text(raw);
    match parse_datetime(&text) {
        Some(dt) => format(&dt),
        None => text,
    }
}

fn is_truthy(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.as_str(), "1" | "true" | "on" | "yes"),
        _ => false,
    }
}

fn multi_select(raw: &Value) -> String {
    match raw {
        Value::Array(_) | Value::Object(_) => raw.to_string(),
        Value::String(s) if serde_json::from_str::<Value>(s).is_ok() => s.clone(),
        Value::Null => "[]".to_string(),
        other => Value::Array(vec![Value::String(to_text(other))]).to_string(),
    }
}

/// Decode a structure that may arrive as JSON text.
fn structured(raw: &Value) -> Value {
    match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Location {
    #[serde(deserialize_with = "lenient_f64")]
    lat: f64,
    #[serde(deserialize_with = "lenient_f64")]
    lng: f64,
    address: Value,
}

fn lenient_f64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    let v = Value::deserialize(d)?;
    Ok(match &v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn location(raw: &Value) -> String {
    let mut loc: Location = serde_json::from_value(structured(raw)).unwrap_or_default();
    if loc.address.is_null() {
        loc.address = Value::String(String::new());
    }
    serde_json::to_string(&loc).unwrap_or_else(|_| to_text(raw))
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Address {
    #[serde(deserialize_with = "lenient_string")]
    street: String,
    #[serde(deserialize_with = "lenient_string")]
    city: String,
    #[serde(deserialize_with = "lenient_string")]
    state: String,
    #[serde(deserialize_with = "lenient_string")]
    postal_code: String,
    #[serde(deserialize_with = "lenient_string")]
    country: String,
}

fn lenient_string<'de, D: serde::Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(to_text(&Value::deserialize(d)?))
}

fn address(raw: &Value) -> String {
    let addr: Address = serde_json::from_value(structured(raw)).unwrap_or_default();
    serde_json::to_string(&addr).unwrap_or_else(|_| to_text(raw))
}

fn currency(raw: &Value) -> String {
    let cleaned: String = to_text(raw)
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        .collect();
    let amount = match numeric_prefix(&cleaned) {
        "" => Decimal::ZERO,
        prefix => match parse_numeric(prefix) {
            Some(d) => d,
            // Beyond Decimal's range: keep what was sent.
            None => return to_text(raw),
        },
    };
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    if rounded.is_zero() {
        rounded = Decimal::new(0, 2);
    }
    rounded.to_string()
}

/// Longest numeric prefix of sign, digits and optional fraction, e.g.
/// `"12.5-3"` -> `"12.5"`. Empty when no digit leads.
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = usize::from(bytes.first() == Some(&b'-'));
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - int_start;
    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        if frac_end > frac_start {
            digits += frac_end - frac_start;
            end = frac_end;
        }
    }
    if digits == 0 {
        ""
    } else {
        &s[..end]
    }
}

fn url(raw: &Value) -> String {
    static SCHEME: OnceLock<Option<Regex>> = OnceLock::new();
    let text = to_text(raw).trim().to_string();
    if text.is_empty() {
        return text;
    }
    let has_scheme = SCHEME
        .get_or_init(|| Regex::new(r"(?i)^https?://").ok())
        .as_ref()
        .map_or(false, |re| re.is_match(&text));
    if has_scheme {
        text
    } else {
        format!("http://{}", text)
    }
}

fn password(raw: &Value) -> String {
    let text = to_text(raw);
    if text.is_empty() || text.starts_with(PASSWORD_PREFIX) {
        return text;
    }
    format!("{}{}", PASSWORD_PREFIX, hex(&Sha256::digest(text.as_bytes())))
}

fn colour(raw: &Value) -> String {
    let text = to_text(raw).trim().to_string();
    if text.is_empty() {
        return text;
    }
    let hexpart = text.trim_start_matches('#');
    format!("#{}", hexpart.to_uppercase())
}

fn file_reference(raw: &Value) -> String {
    match raw {
        Value::String(s) if s.is_empty() => String::new(),
        Value::String(s) if serde_json::from_str::<Value>(s).is_ok_and(|v| v.is_object() || v.is_array()) => {
            s.clone()
        }
        Value::String(s) => json!({ "path": s }).to_string(),
        Value::Array(_) | Value::Object(_) => raw.to_string(),
        _ => "[]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn text_and_email() {
        assert_eq!(coerce(&json!("  hi  "), FieldType::TextInput), "hi");
        assert_eq!(coerce(&json!(" Ann@Example.COM "), FieldType::EmailInput), "ann@example.com");
        assert_eq!(coerce(&json!(42), FieldType::TextArea), "42");
    }

    #[test]
    fn numeric_sanitizing() {
        assert_eq!(coerce(&json!("1,234.5 kg"), FieldType::NumberInput), "1234.5");
        assert_eq!(coerce(&json!("45%"), FieldType::PercentageInput), "45");
        assert_eq!(coerce(&json!(-3), FieldType::Slider), "-3");
    }

    #[test]
    fn dates_normalize_or_pass_through() {
        assert_eq!(coerce(&json!("2024/03/05"), FieldType::DateInput), "2024-03-05");
        assert_eq!(coerce(&json!("09:05"), FieldType::TimeInput), "09:05:00");
        assert_eq!(
            coerce(&json!("2024-03-05T09:05:00Z"), FieldType::DateTimeInput),
            "2024-03-05 09:05:00"
        );
        assert_eq!(coerce(&json!("someday"), FieldType::DateInput), "someday");
    }

    #[test]
    fn booleanish() {
        for v in [json!(true), json!(1), json!("1"), json!("true"), json!("on"), json!("yes")] {
            assert_eq!(coerce(&v, FieldType::Checkbox), "1", "{v}");
        }
        for v in [json!(false), json!(0), json!("no"), json!("TRUE"), json!(null), json!(2)] {
            assert_eq!(coerce(&v, FieldType::ToggleSwitch), "0", "{v}");
        }
    }

    #[test]
    fn multi_select_wraps_scalars() {
        assert_eq!(coerce(&json!(["a", "b"]), FieldType::MultiSelect), r#"["a","b"]"#);
        assert_eq!(coerce(&json!(r#"["a"]"#), FieldType::MultiSelect), r#"["a"]"#);
        assert_eq!(coerce(&json!("a"), FieldType::MultiSelect), r#"["a"]"#);
    }

    #[test]
    fn location_and_address_fill_missing_parts() {
        let loc: Value =
            serde_json::from_str(&coerce(&json!({"lat": "1.5"}), FieldType::LocationPicker)).unwrap();
        assert_eq!(loc, json!({"lat": 1.5, "lng": 0.0, "address": ""}));
        let addr: Value =
            serde_json::from_str(&coerce(&json!(r#"{"city":"Oslo"}"#), FieldType::AddressInput))
                .unwrap();
        assert_eq!(
            addr,
            json!({"street": "", "city": "Oslo", "state": "", "postal_code": "", "country": ""})
        );
    }

    #[test]
    fn currency_has_two_decimals() {
        assert_eq!(coerce(&json!("$1,234.5"), FieldType::CurrencyInput), "1234.50");
        assert_eq!(coerce(&json!("2.345"), FieldType::CurrencyInput), "2.35");
        assert_eq!(coerce(&json!("-0.005"), FieldType::CurrencyInput), "-0.01");
        assert_eq!(coerce(&json!("free"), FieldType::CurrencyInput), "0.00");
        assert_eq!(coerce(&json!(7), FieldType::CurrencyInput), "7.00");
        assert_eq!(coerce(&json!("12.5-3"), FieldType::CurrencyInput), "12.50");
        assert_eq!(coerce(&json!(".5"), FieldType::CurrencyInput), "0.50");
        assert_eq!(coerce(&json!("1.2.3"), FieldType::CurrencyInput), "1.20");
    }

    #[test]
    fn currency_beyond_decimal_range_passes_through() {
        let huge = "9".repeat(40_000);
        assert_eq!(coerce(&json!(huge.clone()), FieldType::CurrencyInput), huge);

        let priced = format!("${}", "9".repeat(29));
        assert_eq!(coerce(&json!(priced.clone()), FieldType::CurrencyInput), priced);
    }

    #[test]
    fn misc_types() {
        assert_eq!(coerce(&json!("7"), FieldType::Rating), "5");
        assert_eq!(coerce(&json!("-1"), FieldType::Rating), "0");
        assert_eq!(coerce(&json!("example.com"), FieldType::UrlInput), "http://example.com");
        assert_eq!(coerce(&json!("HTTPS://x.io"), FieldType::UrlInput), "HTTPS://x.io");
        assert_eq!(coerce(&json!("ff00aa"), FieldType::ColorPicker), "#FF00AA");
        let hashed = coerce(&json!("secret"), FieldType::PasswordInput);
        assert!(hashed.starts_with("sha256:"));
        assert_eq!(hashed.len(), "sha256:".len() + 64);
    }

    #[test]
    fn file_values_pass_through() {
        let desc = r#"{"path":"files/a.pdf"}"#;
        assert_eq!(coerce(&json!(desc), FieldType::FileUpload), desc);
        assert_eq!(coerce(&json!("files/a.pdf"), FieldType::DocumentUpload), desc);
        assert_eq!(coerce(&json!(null), FieldType::ImageUpload), "[]");
    }

    #[test]
    fn fixed_format_coercion_is_idempotent() {
        let cases = [
            (json!("2024/03/05"), FieldType::DateInput),
            (json!("09:05"), FieldType::TimeInput),
            (json!("2024-03-05T09:05:00Z"), FieldType::DateTimeInput),
            (json!("yes"), FieldType::Checkbox),
            (json!("no"), FieldType::ToggleSwitch),
            (json!("$1,234.567"), FieldType::CurrencyInput),
            (json!("secret"), FieldType::PasswordInput),
            (json!("ff00aa"), FieldType::ColorPicker),
            (json!("example.com"), FieldType::UrlInput),
            (json!({"lat": 3}), FieldType::LocationPicker),
            (json!("a"), FieldType::MultiSelect),
            (json!("9"), FieldType::Rating),
        ];
        for (raw, t) in cases {
            let once = coerce(&raw, t);
            assert_eq!(coerce(&json!(once), t), once, "{t}");
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        puts: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait::async_trait]
    impl BlobStore for RecordingStore {
        async fn put(&self, dir: &str, ext: &str, bytes: &[u8]) -> Result<String, BlobError> {
            self.puts
                .lock()
                .unwrap()
                .push((dir.to_string(), ext.to_string(), bytes.len()));
            Ok(format!("{}/blob.{}", dir, ext))
        }
    }

    #[tokio::test]
    async fn uploads_go_to_type_directory() {
        let store = RecordingStore::default();
        let upload = SubmittedValue::Upload(Upload {
            bytes: vec![1, 2, 3],
            original_name: "cv.PDF".into(),
            mime_type: "application/pdf".into(),
        });
        let stored = coerce_submitted(&upload, FieldType::DocumentUpload, &store)
            .await
            .unwrap();
        let desc: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(desc["path"], "documents/blob.pdf");
        assert_eq!(desc["size"], 3);
        assert_eq!(desc["extension"], "pdf");
        assert_eq!(desc["original_name"], "cv.PDF");
    }

    #[tokio::test]
    async fn signature_data_url_is_decoded() {
        let store = RecordingStore::default();
        let raw = SubmittedValue::Json(json!("data:image/png;base64,aGVsbG8="));
        let stored = coerce_submitted(&raw, FieldType::SignaturePad, &store)
            .await
            .unwrap();
        let desc: Value = serde_json::from_str(&stored).unwrap();
        assert_eq!(desc["path"], "signatures/blob.png");
        assert_eq!(desc["mime_type"], "image/png");
        assert_eq!(desc["size"], 5);

        let broken = SubmittedValue::Json(json!("data:image/png;base64,@@@"));
        assert_eq!(
            coerce_submitted(&broken, FieldType::SignaturePad, &store).await.unwrap(),
            ""
        );
    }
}
