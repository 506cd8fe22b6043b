//! Layered key/value configuration.
//!
//! Layers are consulted newest-first, so a layer added later overrides every
//! layer added before it. The usual stack is:
//!
//! 1. `appsettings.json`
//! 2. `appsettings.{Environment}.json`
//! 3. process environment (`Section__Key=value`)
//!
//! Each layer is parsed by the `config` crate and flattened into
//! `section:key` entries. Keys are case-insensitive and `.`, `:` and `__`
//! are all accepted as the section separator, so `EmailSettings.SmtpHost`,
//! `EmailSettings:SmtpHost` and `EMAILSETTINGS__SMTPHOST` name the same
//! setting. Blank values are treated as unset.

use crate::{ConfigError, Environment};
use config::{Config, File, FileFormat, Map, Source, Value, ValueKind};
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

/// Normalize a configuration key to its canonical `section:key` lowercase form.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .replace("__", ":")
        .replace('.', ":")
        .to_ascii_lowercase()
}

#[derive(Clone, Debug)]
struct ConfigLayer {
    name: String,
    values: HashMap<String, String>,
}

/// Ordered stack of configuration layers.
#[derive(Clone, Debug, Default)]
pub struct LayeredConfig {
    layers: Vec<ConfigLayer>,
}

impl LayeredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard stack rooted at `dir`: base settings file, environment
    /// specific settings file (both optional), then the process environment.
    pub fn load_default(
        dir: impl AsRef<Path>,
        environment: &Environment,
    ) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        let config = Self::new()
            .with_json_file(dir.join("appsettings.json"), false)?
            .with_json_file(
                dir.join(format!("appsettings.{}.json", environment.as_str())),
                false,
            )?
            .with_environment()?;

        debug!(layers = ?config.layer_names(), "Configuration layers loaded");
        Ok(config)
    }

    /// Add an in-memory layer.
    pub fn with_values<I, K, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|(key, value)| (normalize_key(key.as_ref()), value.into()))
            .collect();

        self.layers.push(ConfigLayer {
            name: name.into(),
            values,
        });
        self
    }

    /// Add a layer parsed from a JSON document. Nested objects become
    /// `section:key` entries and array items `section:index`.
    pub fn with_json_str(self, name: impl Into<String>, json: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let values = collect_source(&name, File::from_str(json, FileFormat::Json))?;
        Ok(self.with_values(name, values))
    }

    /// Add a layer from a JSON file. A missing optional file adds nothing.
    pub fn with_json_file(
        self,
        path: impl AsRef<Path>,
        required: bool,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let name = path.display().to_string();

        let source = File::from(path.to_path_buf())
            .format(FileFormat::Json)
            .required(required);
        let values = collect_source(&name, source)?;

        if values.is_empty() && !path.exists() {
            debug!(path = %name, "Optional settings file not present, skipping");
            return Ok(self);
        }

        Ok(self.with_values(name, values))
    }

    /// Add a layer holding a snapshot of the process environment.
    ///
    /// Variables whose name or value is not valid UTF-8 cannot name a
    /// setting and are skipped.
    pub fn with_environment(self) -> Result<Self, ConfigError> {
        let variables: Map<String, String> = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
            .collect();

        let source = config::Environment::default()
            .separator("__")
            .source(Some(variables));
        let values = collect_source("environment", source)?;
        Ok(self.with_values("environment", values))
    }

    /// Look up a value; the most recently added layer wins.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.layers
            .iter()
            .rev()
            .filter_map(|layer| layer.values.get(&key))
            .map(String::as_str)
            .find(|value| !value.trim().is_empty())
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| ConfigError::MissingKey(key.to_string()))
    }

    /// Parse a value, falling back to `default` when the key is unset.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                key: key.to_string(),
                details: e.to_string(),
            }),
        }
    }

    /// Name of the layer that currently supplies `key`.
    pub fn source_of(&self, key: &str) -> Option<&str> {
        let key = normalize_key(key);
        self.layers
            .iter()
            .rev()
            .find(|layer| {
                layer
                    .values
                    .get(&key)
                    .is_some_and(|value| !value.trim().is_empty())
            })
            .map(|layer| layer.name.as_str())
    }

    pub fn layer_names(&self) -> Vec<&str> {
        self.layers.iter().map(|layer| layer.name.as_str()).collect()
    }
}

/// Build a single source and flatten it into `(path, value)` pairs.
fn collect_source<S>(name: &str, source: S) -> Result<Vec<(String, String)>, ConfigError>
where
    S: Source + Send + Sync + 'static,
{
    let to_error = |e: config::ConfigError| ConfigError::Source {
        source_name: name.to_string(),
        details: e.to_string(),
    };

    let table = Config::builder()
        .add_source(source)
        .build()
        .and_then(|config| config.try_deserialize::<Map<String, Value>>())
        .map_err(to_error)?;

    let mut values = Vec::new();
    for (key, value) in table {
        flatten_value(key, value, &mut values);
    }
    Ok(values)
}

fn flatten_value(path: String, value: Value, out: &mut Vec<(String, String)>) {
    match value.kind {
        ValueKind::Table(table) => {
            for (key, child) in table {
                flatten_value(format!("{}:{}", path, key), child, out);
            }
        }
        ValueKind::Array(items) => {
            for (index, child) in items.into_iter().enumerate() {
                flatten_value(format!("{}:{}", path, index), child, out);
            }
        }
        ValueKind::Nil => {}
        scalar => {
            if let Ok(text) = Value::from(scalar).into_string() {
                out.push((path, text));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SETTINGS: &str = r#"{
        "AppSettings": { "BaseUrl": "https://auth.example.com" },
        "EmailSettings": {
            "SmtpHost": "smtp.example.com",
            "SmtpPort": 2525,
            "FromName": ""
        },
        "Hosts": ["a", "b"]
    }"#;

    #[test]
    fn test_normalize_key_accepts_all_separators() {
        assert_eq!(normalize_key("EmailSettings.SmtpHost"), "emailsettings:smtphost");
        assert_eq!(normalize_key("EmailSettings:SmtpHost"), "emailsettings:smtphost");
        assert_eq!(normalize_key("EmailSettings__SmtpHost"), "emailsettings:smtphost");
    }

    #[test]
    fn test_json_layer_is_flattened() {
        let config = LayeredConfig::new().with_json_str("settings", SETTINGS).unwrap();

        assert_eq!(config.get("AppSettings.BaseUrl"), Some("https://auth.example.com"));
        assert_eq!(config.get("emailsettings:smtpport"), Some("2525"));
        assert_eq!(config.get("Hosts:1"), Some("b"));
    }

    #[test]
    fn test_later_layer_overrides_earlier() {
        let config = LayeredConfig::new()
            .with_json_str("settings", SETTINGS)
            .unwrap()
            .with_values("overrides", [("EmailSettings__SmtpHost", "relay.internal")]);

        assert_eq!(config.get("EmailSettings.SmtpHost"), Some("relay.internal"));
        assert_eq!(config.source_of("EmailSettings.SmtpHost"), Some("overrides"));
        assert_eq!(config.source_of("AppSettings.BaseUrl"), Some("settings"));
        assert_eq!(config.layer_names(), vec!["settings", "overrides"]);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let config = LayeredConfig::new().with_json_str("settings", SETTINGS).unwrap();

        assert_eq!(config.get("EmailSettings.FromName"), None);
        assert_eq!(config.get_or("EmailSettings.FromName", "AuthAPI"), "AuthAPI");
    }

    #[test]
    fn test_blank_override_does_not_hide_lower_layer() {
        let config = LayeredConfig::new()
            .with_values("base", [("Key", "value")])
            .with_values("override", [("Key", "")]);

        assert_eq!(config.get("Key"), Some("value"));
    }

    #[test]
    fn test_require_missing_key() {
        let config = LayeredConfig::new();
        let err = config.require("EmailSettings.FromEmail").unwrap_err();
        assert_eq!(err, ConfigError::MissingKey("EmailSettings.FromEmail".to_string()));
    }

    #[test]
    fn test_parse_or() {
        let config = LayeredConfig::new()
            .with_json_str("settings", SETTINGS)
            .unwrap()
            .with_values("bad", [("Broken.Port", "not_a_number")]);

        assert_eq!(config.parse_or::<u16>("EmailSettings.SmtpPort", 587).unwrap(), 2525);
        assert_eq!(config.parse_or::<u16>("Missing.Port", 587).unwrap(), 587);

        let err = config.parse_or::<u16>("Broken.Port", 587).unwrap_err();
        assert!(err.to_string().contains("Broken.Port"));
    }

    #[test]
    fn test_invalid_json_is_a_source_error() {
        let err = LayeredConfig::new().with_json_str("broken", "{ nope").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Source { ref source_name, .. } if source_name == "broken"
        ));

        let err = LayeredConfig::new().with_json_str("array", "[1, 2]").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Source { ref source_name, .. } if source_name == "array"
        ));
    }

    #[test]
    fn test_optional_file_missing_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let config = LayeredConfig::new()
            .with_json_file(dir.path().join("appsettings.json"), false)
            .unwrap();
        assert!(config.layer_names().is_empty());

        let err = LayeredConfig::new()
            .with_json_file(dir.path().join("appsettings.json"), true)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Source { ref source_name, .. } if source_name.ends_with("appsettings.json")
        ));
    }

    #[test]
    fn test_load_default_stacks_files_and_environment() {
        let dir = tempfile::tempdir().unwrap();
        let mut base = std::fs::File::create(dir.path().join("appsettings.json")).unwrap();
        base.write_all(SETTINGS.as_bytes()).unwrap();
        let dev_path = dir.path().join("appsettings.Development.json");
        let mut dev = std::fs::File::create(dev_path).unwrap();
        dev.write_all(br#"{ "EmailSettings": { "SmtpPort": 1025 } }"#).unwrap();

        temp_env::with_var("EmailSettings__SmtpHost", Some("env-relay"), || {
            let config =
                LayeredConfig::load_default(dir.path(), &Environment::Development).unwrap();

            assert_eq!(config.get("EmailSettings.SmtpPort"), Some("1025"));
            assert_eq!(config.get("EmailSettings.SmtpHost"), Some("env-relay"));
            assert_eq!(config.get("AppSettings.BaseUrl"), Some("https://auth.example.com"));
            assert_eq!(config.source_of("EmailSettings.SmtpHost"), Some("environment"));
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_environment_skips_non_utf8_variables() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let garbled = OsStr::from_bytes(b"\xff\xfe");
        temp_env::with_vars(
            [
                ("AUTHAPI_GARBLED_VALUE", Some(garbled)),
                ("EmailSettings__HeloName", Some(OsStr::new("mailer.internal"))),
            ],
            || {
                let config = LayeredConfig::new().with_environment().unwrap();

                assert_eq!(config.get("EmailSettings.HeloName"), Some("mailer.internal"));
                assert_eq!(config.get("AUTHAPI_GARBLED_VALUE"), None);
            },
        );
    }
}
