//! `{{variable}}` substitution for action props.
//!
//! Literal replacement in a single left-to-right pass: substituted text is
//! never rescanned, unknown tokens are left as written, nothing is escaped.

use std::collections::BTreeMap;

use formflow_interchange::Id;
use formflow_storage::EntryRecord;
use serde_json::Value;

use crate::dates::{format_datetime, parse_datetime};
use crate::types::FormVersion;

/// Who the entry is attributed to in messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submitter {
    pub name: String,
    pub email: String,
}

/// Substitution map, keyed by token name without braces.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    map: BTreeMap<String, String>,
}

impl Variables {
    /// Variables describing an entry. `submitter` is the entry's creator,
    /// or the acting identity when the entry has none.
    pub fn for_entry(
        public_base_url: &str,
        form: &FormVersion,
        entry: &EntryRecord,
        values: &BTreeMap<Id, String>,
        submitter: Option<&Submitter>,
    ) -> Self {
        let mut vars = Variables::default();
        vars.insert(
            "entry_link",
            format!(
                "{}/enduser/entries/{}",
                public_base_url.trim_end_matches('/'),
                entry.public_identifier
            ),
        );
        vars.insert("form_name", form.form_name.clone());
        vars.insert(
            "user_name",
            submitter.map_or_else(|| "Unknown".to_string(), |s| s.name.clone()),
        );
        vars.insert(
            "user_email",
            submitter.map(|s| s.email.clone()).unwrap_or_default(),
        );
        vars.insert("entry_id", entry.id.to_string());
        vars.insert("public_identifier", entry.public_identifier.clone());
        vars.insert(
            "current_stage",
            form.get_stage(entry.current_stage_id)
                .map(|s| s.name.clone())
                .unwrap_or_default(),
        );
        vars.insert(
            "created_at",
            parse_datetime(&entry.created_at)
                .map(|dt| format_datetime(&dt))
                .unwrap_or_else(|| entry.created_at.clone()),
        );
        for (field_id, value) in values {
            if let Some(field) = form.get_field(*field_id) {
                vars.insert(&field_token(&field.label), value.clone());
            }
        }
        vars
    }

    pub fn insert(&mut self, name: &str, value: String) {
        self.map.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }

    /// Replace every known `{{name}}` in `text`.
    pub fn apply(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => match self.map.get(&after[..end]) {
                    Some(value) => {
                        out.push_str(value);
                        rest = &after[end + 2..];
                    }
                    None => {
                        out.push('{');
                        rest = &rest[start + 1..];
                    }
                },
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }

    /// Apply to every string inside a JSON structure.
    pub fn apply_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.apply(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.apply_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.apply_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// `field_<label>` with the label lowercased and spaces turned into `_`.
pub fn field_token(label: &str) -> String {
    format!("field_{}", label.to_lowercase().replace(' ', "_"))
}
