//! lostboard/crates/configs/src/lib.rs
//!
//! Application settings.
//!
//! Sources, later ones winning:
//! 1. `.env` (loaded into the process environment by `dotenvy`, if present)
//! 2. `config/default.toml`
//! 3. `config/{environment}.toml` (based on `LOSTBOARD_ENV`, default `development`)
//! 4. Environment variables with the `LOSTBOARD__` prefix, e.g.
//!    `LOSTBOARD__SYNC__FETCH_TIMEOUT_SECS=30`

use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const ENV_PREFIX: &str = "LOSTBOARD";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub log: LogSettings,
}

/// Where the hosted backend lives.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// Public (anonymous) API key. Never logged.
    #[serde(default)]
    pub anon_key: Option<SecretString>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncSettings {
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    /// `EnvFilter` directive, e.g. `info,services=debug`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_backend_url() -> String {
    "http://localhost:54321".to_string()
}

const fn default_fetch_timeout_secs() -> u64 {
    15
}

const fn default_notification_limit() -> usize {
    50
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            anon_key: None,
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            notification_limit: default_notification_limit(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Loads settings from the layered sources listed in the crate docs.
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env");
        }
        let env = std::env::var(format!("{ENV_PREFIX}_ENV")).unwrap_or_else(|_| "development".to_string());

        let raw = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(environment())
            .build()?;

        Self::finish(raw)
    }

    /// Loads settings from one file, still honouring environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        Self::finish(raw)
    }

    /// Parses TOML text without consulting the environment.
    pub fn from_toml(text: &str) -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;

        Self::finish(raw)
    }

    fn finish(raw: config::Config) -> Result<Self> {
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.url.trim().is_empty() {
            return Err(SettingsError::Invalid {
                key: "backend.url",
                reason: "must not be empty".into(),
            });
        }
        if self.sync.fetch_timeout_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "sync.fetch_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.sync.notification_limit == 0 {
            return Err(SettingsError::Invalid {
                key: "sync.notification_limit",
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.fetch_timeout_secs)
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_empty_document_uses_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings.fetch_timeout(), Duration::from_secs(15));
        assert_eq!(settings.sync.notification_limit, 50);
        assert_eq!(settings.log.format, LogFormat::Pretty);
        assert!(settings.backend.anon_key.is_none());
    }

    #[test]
    fn test_overrides_and_secret_redaction() {
        let settings = Settings::from_toml(
            r#"
            [backend]
            url = "https://campus.example"
            anon_key = "public-anon-key"

            [sync]
            fetch_timeout_secs = 30

            [log]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(settings.log.format, LogFormat::Json);
        let key = settings.backend.anon_key.as_ref().unwrap();
        assert_eq!(key.expose_secret(), "public-anon-key");
        assert!(!format!("{settings:?}").contains("public-anon-key"));
    }

    #[test]
    fn test_legacy_bucket_key_is_ignored() {
        let settings = Settings::from_toml("[backend]\nurl = \"https://campus.example\"\nbucket = \"avatars\"").unwrap();
        assert_eq!(settings.backend.url, "https://campus.example");
        assert!(!format!("{:?}", settings.backend).contains("avatars"));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = Settings::from_toml("[sync]\nfetch_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { key: "sync.fetch_timeout_secs", .. }));
    }
}
