//! Resolution of dispatch settings from layered configuration.
//!
//! Precedence:
//! - SMTP password: `EmailSettings__SmtpPassword` environment variable, then
//!   the configuration layers, else [`ConfigError::MissingKey`].
//! - Everything else: configuration layers, then the documented default.
//!   `FromEmail`, `SmtpHost` and `SmtpUsername` have no default.
//!
//! Resolution performs no I/O beyond reading the already-loaded layers and the
//! process environment, so a missing key always fails before the transport is
//! touched.

use core_config::{ConfigError, LayeredConfig, env_optional};
use lettre::Address;
use std::fmt;
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::debug;
use url::Url;

/// Configuration keys read by the resolver.
pub mod keys {
    pub const BASE_URL: &str = "AppSettings.BaseUrl";
    pub const FROM_EMAIL: &str = "EmailSettings.FromEmail";
    pub const FROM_NAME: &str = "EmailSettings.FromName";
    pub const SMTP_HOST: &str = "EmailSettings.SmtpHost";
    pub const SMTP_PORT: &str = "EmailSettings.SmtpPort";
    pub const SMTP_USERNAME: &str = "EmailSettings.SmtpUsername";
    pub const SMTP_PASSWORD: &str = "EmailSettings.SmtpPassword";
    pub const SMTP_SECURITY: &str = "EmailSettings.SmtpSecurity";
    pub const HELO_NAME: &str = "EmailSettings.HeloName";
    pub const CONNECT_TIMEOUT: &str = "EmailSettings.ConnectTimeoutSeconds";
    pub const AUTHENTICATE_TIMEOUT: &str = "EmailSettings.AuthenticateTimeoutSeconds";
    pub const SEND_TIMEOUT: &str = "EmailSettings.SendTimeoutSeconds";

    /// Environment variable consulted before any configuration layer.
    pub const SMTP_PASSWORD_ENV: &str = "EmailSettings__SmtpPassword";
}

pub const DEFAULT_BASE_URL: &str = "https://localhost:7045";
pub const DEFAULT_FROM_NAME: &str = "AuthAPI";
pub const DEFAULT_SMTP_PORT: u16 = 587;
pub const DEFAULT_HELO_NAME: &str = "localhost";

/// How the connection is upgraded to TLS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum SmtpSecurity {
    /// STARTTLS is mandatory; relays that do not offer it are rejected.
    #[default]
    StartTls,
    /// Upgrade when the relay advertises STARTTLS, continue in plaintext otherwise.
    Opportunistic,
}

/// Upper bound for each network stage of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub connect: Duration,
    pub authenticate: Duration,
    pub send: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(30),
            authenticate: Duration::from_secs(30),
            send: Duration::from_secs(60),
        }
    }
}

/// Everything the transport needs to reach and log in to the relay.
#[derive(Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: SmtpSecurity,
    pub helo_name: String,
    pub timeouts: StageTimeouts,
}

impl SmtpSettings {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            security: SmtpSecurity::default(),
            helo_name: DEFAULT_HELO_NAME.to_string(),
            timeouts: StageTimeouts::default(),
        }
    }

    pub fn with_security(mut self, security: SmtpSecurity) -> Self {
        self.security = security;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("security", &self.security)
            .field("helo_name", &self.helo_name)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

/// Validated, read-only settings for composing and delivering messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub from_address: String,
    pub from_name: String,
    pub base_url: String,
    pub smtp: SmtpSettings,
}

/// Builds a [`ResolvedConfig`] from configuration layers.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    source: LayeredConfig,
}

impl ConfigResolver {
    pub fn new(source: LayeredConfig) -> Self {
        Self { source }
    }

    /// Resolve and validate every setting, failing on the first problem.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigError> {
        let from_address = self.source.require(keys::FROM_EMAIL)?;
        from_address
            .parse::<Address>()
            .map_err(|e| ConfigError::ParseError {
                key: keys::FROM_EMAIL.to_string(),
                details: e.to_string(),
            })?;

        let from_name = self.source.get_or(keys::FROM_NAME, DEFAULT_FROM_NAME);
        let base_url = self.base_url()?;

        let host = self.source.require(keys::SMTP_HOST)?;
        let port = self.source.parse_or(keys::SMTP_PORT, DEFAULT_SMTP_PORT)?;
        let username = self.source.require(keys::SMTP_USERNAME)?;
        let password = self.smtp_password()?;
        let security = self.source.parse_or(keys::SMTP_SECURITY, SmtpSecurity::default())?;
        let helo_name = self.source.get_or(keys::HELO_NAME, DEFAULT_HELO_NAME);

        let defaults = StageTimeouts::default();
        let timeouts = StageTimeouts {
            connect: self.timeout(keys::CONNECT_TIMEOUT, defaults.connect)?,
            authenticate: self.timeout(keys::AUTHENTICATE_TIMEOUT, defaults.authenticate)?,
            send: self.timeout(keys::SEND_TIMEOUT, defaults.send)?,
        };

        let config = ResolvedConfig {
            from_address,
            from_name,
            base_url,
            smtp: SmtpSettings {
                host,
                port,
                username,
                password,
                security,
                helo_name,
                timeouts,
            },
        };

        debug!(
            host = %config.smtp.host,
            port = %config.smtp.port,
            security = %config.smtp.security,
            base_url = %config.base_url,
            password_source = self.password_source(),
            "Resolved email configuration"
        );

        Ok(config)
    }

    /// SMTP password: environment override first, then configuration.
    pub fn smtp_password(&self) -> Result<String, ConfigError> {
        env_optional(keys::SMTP_PASSWORD_ENV)
            .or_else(|| self.source.get(keys::SMTP_PASSWORD).map(str::to_string))
            .ok_or_else(|| ConfigError::MissingKey(keys::SMTP_PASSWORD.to_string()))
    }

    fn password_source(&self) -> &str {
        if env_optional(keys::SMTP_PASSWORD_ENV).is_some() {
            "environment"
        } else {
            self.source.source_of(keys::SMTP_PASSWORD).unwrap_or("none")
        }
    }

    /// Callback link root, trailing `/` removed. Must be an absolute
    /// http(s) URL with a host.
    pub fn base_url(&self) -> Result<String, ConfigError> {
        let base_url = self.source.get_or(keys::BASE_URL, DEFAULT_BASE_URL);
        let invalid = |details: String| ConfigError::ParseError {
            key: keys::BASE_URL.to_string(),
            details,
        };

        let parsed = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
        }
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid("URL must have a host".to_string()));
        }

        Ok(base_url.trim().trim_end_matches('/').to_string())
    }

    fn timeout(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let seconds = self.source.parse_or(key, default.as_secs())?;
        if seconds == 0 {
            return Err(ConfigError::ParseError {
                key: key.to_string(),
                details: "timeout must be at least one second".to_string(),
            });
        }
        Ok(Duration::from_secs(seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layers(values: &[(&str, &str)]) -> LayeredConfig {
        LayeredConfig::new().with_values("test", values.iter().copied())
    }

    fn complete() -> Vec<(&'static str, &'static str)> {
        vec![
            (keys::FROM_EMAIL, "no-reply@authapi.test"),
            (keys::SMTP_HOST, "smtp.authapi.test"),
            (keys::SMTP_USERNAME, "mailer"),
            (keys::SMTP_PASSWORD, "config-secret"),
        ]
    }

    #[test]
    fn test_resolve_applies_defaults() {
        temp_env::with_var_unset(keys::SMTP_PASSWORD_ENV, || {
            let config = ConfigResolver::new(layers(&complete())).resolve().unwrap();

            assert_eq!(config.from_address, "no-reply@authapi.test");
            assert_eq!(config.from_name, DEFAULT_FROM_NAME);
            assert_eq!(config.base_url, DEFAULT_BASE_URL);
            assert_eq!(config.smtp.port, 587);
            assert_eq!(config.smtp.password, "config-secret");
            assert_eq!(config.smtp.security, SmtpSecurity::StartTls);
            assert_eq!(config.smtp.helo_name, "localhost");
            assert_eq!(config.smtp.timeouts, StageTimeouts::default());
        });
    }

    #[test]
    fn test_environment_password_wins_over_configuration() {
        temp_env::with_var(keys::SMTP_PASSWORD_ENV, Some("env-secret"), || {
            let resolver = ConfigResolver::new(layers(&complete()));
            assert_eq!(resolver.smtp_password().unwrap(), "env-secret");
            assert_eq!(resolver.resolve().unwrap().smtp.password, "env-secret");
        });
    }

    #[test]
    fn test_missing_password_is_missing_key() {
        temp_env::with_var_unset(keys::SMTP_PASSWORD_ENV, || {
            let mut values = complete();
            values.retain(|(k, _)| *k != keys::SMTP_PASSWORD);

            let err = ConfigResolver::new(layers(&values)).resolve().unwrap_err();
            assert_eq!(err, ConfigError::MissingKey(keys::SMTP_PASSWORD.to_string()));
        });
    }

    #[test]
    fn test_required_keys_have_no_default() {
        temp_env::with_var_unset(keys::SMTP_PASSWORD_ENV, || {
            for required in [keys::FROM_EMAIL, keys::SMTP_HOST, keys::SMTP_USERNAME] {
                let mut values = complete();
                values.retain(|(k, _)| *k != required);

                let err = ConfigResolver::new(layers(&values)).resolve().unwrap_err();
                assert_eq!(err, ConfigError::MissingKey(required.to_string()));
            }
        });
    }

    #[test]
    fn test_overrides_are_honoured() {
        temp_env::with_var_unset(keys::SMTP_PASSWORD_ENV, || {
            let mut values = complete();
            values.extend([
                (keys::BASE_URL, "https://x.test/"),
                (keys::FROM_NAME, "Auth Team"),
                (keys::SMTP_PORT, "2525"),
                (keys::SMTP_SECURITY, "opportunistic"),
                (keys::SEND_TIMEOUT, "5"),
            ]);

            let config = ConfigResolver::new(layers(&values)).resolve().unwrap();
            assert_eq!(config.base_url, "https://x.test");
            assert_eq!(config.from_name, "Auth Team");
            assert_eq!(config.smtp.port, 2525);
            assert_eq!(config.smtp.security, SmtpSecurity::Opportunistic);
            assert_eq!(config.smtp.timeouts.send, Duration::from_secs(5));
        });
    }

    #[test]
    fn test_invalid_values_are_parse_errors() {
        temp_env::with_var_unset(keys::SMTP_PASSWORD_ENV, || {
            let cases = [
                (keys::SMTP_PORT, "not_a_port"),
                (keys::FROM_EMAIL, "not an address"),
                (keys::BASE_URL, "x.test"),
                (keys::BASE_URL, "https://"),
                (keys::BASE_URL, "https://bad host"),
                (keys::BASE_URL, "ftp://x.test"),
                (keys::SMTP_SECURITY, "ssl3"),
                (keys::CONNECT_TIMEOUT, "0"),
            ];
            for (key, value) in cases {
                let config = layers(&complete()).with_values("bad", [(key, value)]);
                let err = ConfigResolver::new(config).resolve().unwrap_err();
                assert_eq!(err.key(), Some(key), "{key}");
                assert!(matches!(err, ConfigError::ParseError { .. }), "{key}");
            }
        });
    }

    #[test]
    fn test_base_url_keeps_path_and_port() {
        let config = layers(&[(keys::BASE_URL, "http://localhost:8080/auth/")]);
        let base_url = ConfigResolver::new(config).base_url().unwrap();
        assert_eq!(base_url, "http://localhost:8080/auth");
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = SmtpSettings::new("smtp.authapi.test", 587, "mailer", "hunter2");
        let debug = format!("{:?}", settings);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
