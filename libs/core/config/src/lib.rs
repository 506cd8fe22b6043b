pub mod layered;
pub mod tracing;

pub use layered::{normalize_key, LayeredConfig};

use std::env;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration key '{0}' is required but not set")]
    MissingKey(String),

    #[error("Failed to parse configuration key '{key}': {details}")]
    ParseError { key: String, details: String },

    #[error("Failed to load configuration source '{source_name}': {details}")]
    Source {
        source_name: String,
        details: String,
    },
}

impl ConfigError {
    /// The configuration key this error refers to, if any.
    pub fn key(&self) -> Option<&str> {
        match self {
            ConfigError::MissingKey(key) | ConfigError::ParseError { key, .. } => Some(key),
            ConfigError::Source { .. } => None,
        }
    }
}

/// Application environment (dev = local, prod = deployed)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        let app_env = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        if app_env.eq_ignore_ascii_case("production") {
            Environment::Production
        } else {
            Environment::Development
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Name used for environment-specific settings files (`appsettings.{name}.json`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "Development",
            Environment::Production => "Production",
        }
    }
}

/// Helper to load an environment variable, treating blank values as unset
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
