//! Submitted field values as they arrive over the wire.
//!
//! ```json
//! [
//!   {"field_id": 11, "value": "Ann"},
//!   {"field_id": 12, "file": {"name": "cv.pdf", "mime_type": "application/pdf",
//!                             "content_base64": "JVBERi0..."}}
//! ]
//! ```
//!
//! An object keyed by field id (`{"11": "Ann"}`) is accepted as well.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use formflow_engine::{SubmittedValue, Upload};
use formflow_interchange::Id;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct FieldValueInput {
    #[serde(alias = "fieldId")]
    pub field_id: Id,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub file: Option<FileInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileInput {
    pub name: String,
    #[serde(default, alias = "mimeType")]
    pub mime_type: String,
    #[serde(alias = "contentBase64")]
    pub content_base64: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldValues {
    List(Vec<FieldValueInput>),
    ById(BTreeMap<String, Value>),
}

impl Default for FieldValues {
    fn default() -> Self {
        FieldValues::List(Vec::new())
    }
}

impl FieldValues {
    /// Decode into engine values. Later duplicates of a field id win.
    pub fn into_submitted(self) -> Result<BTreeMap<Id, SubmittedValue>, String> {
        let mut out = BTreeMap::new();
        match self {
            FieldValues::List(items) => {
                for item in items {
                    let value = match item.file {
                        Some(file) => SubmittedValue::Upload(decode_file(item.field_id, file)?),
                        None => SubmittedValue::Json(item.value),
                    };
                    out.insert(item.field_id, value);
                }
            }
            FieldValues::ById(map) => {
                for (key, value) in map {
                    let id: Id = key
                        .trim()
                        .parse()
                        .map_err(|_| format!("'{}' is not a field id", key))?;
                    out.insert(id, SubmittedValue::Json(value));
                }
            }
        }
        Ok(out)
    }
}

fn decode_file(field_id: Id, file: FileInput) -> Result<Upload, String> {
    let bytes = BASE64
        .decode(file.content_base64.trim())
        .map_err(|e| format!("field {}: invalid base64 content: {}", field_id, e))?;
    Ok(Upload {
        bytes,
        original_name: file.name,
        mime_type: file.mime_type,
    })
}
