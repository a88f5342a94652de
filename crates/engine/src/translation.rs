//! Localized display text for the read paths.
//!
//! Only the default-language text lives in the form document; other
//! languages are looked up per item and fall back to the document text.

use std::collections::HashMap;

use formflow_interchange::Id;
use serde::{Deserialize, Serialize};

use crate::identity::Identity;

/// A translatable string of a form version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TranslationKey {
    /// Keyed by form version id.
    FormName(Id),
    StageName(Id),
    SectionName(Id),
    FieldLabel(Id),
    FieldHelperText(Id),
    FieldDefaultValue(Id),
    TransitionLabel(Id),
}

pub trait Translations: Send + Sync {
    fn get(&self, key: TranslationKey, language_id: Id) -> Option<String>;

    /// `fallback` unless a translation exists for `language_id`.
    fn localize(&self, key: TranslationKey, language_id: Option<Id>, fallback: &str) -> String {
        language_id
            .and_then(|lang| self.get(key, lang))
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// No translations at all; everything falls back.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTranslations;

impl Translations for NoTranslations {
    fn get(&self, _key: TranslationKey, _language_id: Id) -> Option<String> {
        None
    }
}

/// One row of a translation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationEntry {
    pub language_id: Id,
    pub key: TranslationKey,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct MapTranslations {
    entries: HashMap<(TranslationKey, Id), String>,
}

impl MapTranslations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: TranslationKey, language_id: Id, text: impl Into<String>) {
        self.entries.insert((key, language_id), text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<TranslationEntry> for MapTranslations {
    fn from_iter<I: IntoIterator<Item = TranslationEntry>>(iter: I) -> Self {
        let mut out = MapTranslations::new();
        for entry in iter {
            out.insert(entry.key, entry.language_id, entry.text);
        }
        out
    }
}

impl Translations for MapTranslations {
    fn get(&self, key: TranslationKey, language_id: Id) -> Option<String> {
        self.entries.get(&(key, language_id)).cloned()
    }
}

/// Explicit argument first, then the caller's preference, then the
/// configured default.
pub fn resolve_language(
    explicit: Option<Id>,
    identity: Option<&Identity>,
    default: Option<Id>,
) -> Option<Id> {
    explicit
        .or_else(|| identity.and_then(|i| i.default_language_id))
        .or(default)
}
