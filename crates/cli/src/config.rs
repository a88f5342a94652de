//! Server configuration for `formflow serve`.
//!
//! Read from an optional TOML file, then overridden key by key from
//! `FORMFLOW_*` environment variables.
//!
//! # Example
//!
//! ```toml
//! port = 8080
//! forms_dir = "./forms"
//! blob_root = "./storage"
//! public_base_url = "https://forms.example.com"
//! default_language_id = 1
//! webhook_timeout_secs = 30
//! log_filter = "info,formflow_engine=debug"
//!
//! [[users]]
//! id = 5
//! name = "Rita"
//! email = "rita@example.com"
//! roles = [2]
//! permissions = []
//!
//! [[translations]]
//! language_id = 2
//! key = { kind = "stage_name", id = 4 }
//! text = "Révision"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use formflow_engine::directory::DirectoryUser;
use formflow_engine::translation::TranslationEntry;
use formflow_engine::EngineSettings;
use formflow_interchange::Id;
use serde::Deserialize;

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub port: u16,
    /// Directory of `*.json` form-version documents loaded at startup.
    pub forms_dir: Option<PathBuf>,
    pub blob_root: PathBuf,
    pub public_base_url: String,
    pub default_language_id: Option<Id>,
    pub webhook_timeout_secs: u64,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Seed for the in-memory user directory.
    pub users: Vec<DirectoryUser>,
    pub translations: Vec<TranslationEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 8080,
            forms_dir: None,
            blob_root: PathBuf::from("./storage"),
            public_base_url: "http://localhost:8080".to_string(),
            default_language_id: None,
            webhook_timeout_secs: 30,
            log_filter: "info".to_string(),
            users: Vec::new(),
            translations: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("could not parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: '{value}'")]
    Env { key: &'static str, value: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl Config {
    /// Load `path` (if any) and apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let base = match path {
            Some(path) => Config::read(path)?,
            None => Config::default(),
        };
        base.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn read(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FORMFLOW_*` overrides. Empty values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Config, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("FORMFLOW_PORT") {
            self.port = parse_env("FORMFLOW_PORT", &v)?;
        }
        if let Some(v) = get("FORMFLOW_FORMS_DIR") {
            self.forms_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("FORMFLOW_BLOB_ROOT") {
            self.blob_root = PathBuf::from(v);
        }
        if let Some(v) = get("FORMFLOW_PUBLIC_BASE_URL") {
            self.public_base_url = v;
        }
        if let Some(v) = get("FORMFLOW_DEFAULT_LANGUAGE_ID") {
            self.default_language_id = Some(parse_env("FORMFLOW_DEFAULT_LANGUAGE_ID", &v)?);
        }
        if let Some(v) = get("FORMFLOW_WEBHOOK_TIMEOUT_SECS") {
            self.webhook_timeout_secs = parse_env("FORMFLOW_WEBHOOK_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("FORMFLOW_LOG") {
            self.log_filter = v;
        }
        Ok(self)
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            public_base_url: self.public_base_url.clone(),
            default_language_id: self.default_language_id,
            webhook_timeout: Duration::from_secs(self.webhook_timeout_secs.max(1)),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = Config::default().with_overrides(env(&[])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.blob_root, PathBuf::from("./storage"));
        assert_eq!(config.log_filter, "info");
        let settings = config.engine_settings();
        assert_eq!(settings.webhook_timeout, Duration::from_secs(30));
        assert_eq!(settings.public_base_url, "http://localhost:8080");
    }

    #[test]
    fn environment_overrides_file() {
        let file: Config = toml::from_str("port = 9000\nlog_filter = \"warn\"").unwrap();
        let config = file
            .with_overrides(env(&[
                ("FORMFLOW_PORT", "9100"),
                ("FORMFLOW_DEFAULT_LANGUAGE_ID", "2"),
                ("FORMFLOW_LOG", ""),
            ]))
            .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.default_language_id, Some(2));
        assert_eq!(config.log_filter, "warn");
    }

    #[test]
    fn bad_env_value_is_reported() {
        let err = Config::default()
            .with_overrides(env(&[("FORMFLOW_WEBHOOK_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for FORMFLOW_WEBHOOK_TIMEOUT_SECS: 'soon'"
        );
    }

    #[test]
    fn users_and_translations_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [[users]]
            id = 5
            name = "Rita"
            email = "rita@x.io"
            roles = [2]
            permissions = []

            [[translations]]
            language_id = 2
            key = { kind = "stage_name", id = 4 }
            text = "Révision"
            "#,
        )
        .unwrap();
        assert_eq!(config.users[0].email, "rita@x.io");
        assert_eq!(config.translations[0].text, "Révision");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("prot = 1").is_err());
    }
}
