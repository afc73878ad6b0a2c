//! Settings for kiln-monitor hosts.
//!
//! A TOML file plus `KILN_*` environment variables, credential resolution
//! (env + keyring + plaintext), and translation into the `kiln_api` and
//! `kiln_core` configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use kiln_api::{Credentials, Endpoints, TransportConfig};
use kiln_core::{CoordinatorConfig, MAX_INTERVAL};

/// Keyring service name; the account is the login email.
pub const KEYRING_SERVICE: &str = "kiln-monitor";

const PASSWORD_ENV: &str = "KILN_PASSWORD";
const CONFIG_PATH_ENV: &str = "KILN_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for {}", .email.as_deref().unwrap_or("<unset email>"))]
    NoCredentials { email: Option<String> },

    #[error("failed to serialize settings: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("settings loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Settings ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Kiln Aid account email.
    pub email: Option<String>,

    /// Plaintext password -- prefer the keyring or `KILN_PASSWORD`.
    pub password: Option<String>,

    #[serde(default = "default_update_interval")]
    pub update_interval_minutes: u64,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_min_spacing")]
    pub min_spacing_secs: u64,

    #[serde(default)]
    pub endpoints: EndpointOverrides,
}

/// Optional vendor URL overrides. `base_url` lays out all three paths;
/// the individual fields win over it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointOverrides {
    pub base_url: Option<String>,
    pub login: Option<String>,
    pub settings: Option<String>,
    pub data: Option<String>,
}

fn default_update_interval() -> u64 {
    5
}
fn default_timeout() -> u64 {
    30
}
fn default_min_spacing() -> u64 {
    1
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            email: None,
            password: None,
            update_interval_minutes: default_update_interval(),
            timeout_secs: default_timeout(),
            min_spacing_secs: default_min_spacing(),
            endpoints: EndpointOverrides::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval_minutes < 1 {
            return Err(ConfigError::Validation {
                field: "update_interval_minutes".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.update_interval() > MAX_INTERVAL {
            return Err(ConfigError::Validation {
                field: "update_interval_minutes".into(),
                reason: format!("must be at most {}", MAX_INTERVAL.as_secs() / 60),
            });
        }
        if Duration::from_secs(self.min_spacing_secs) >= self.update_interval() {
            return Err(ConfigError::Validation {
                field: "min_spacing_secs".into(),
                reason: "must be shorter than the update interval".into(),
            });
        }
        if self.timeout_secs < 1 {
            return Err(ConfigError::Validation {
                field: "timeout_secs".into(),
                reason: "must be at least 1".into(),
            });
        }
        if self.email.as_deref().is_some_and(|e| !e.contains('@')) {
            return Err(ConfigError::Validation {
                field: "email".into(),
                reason: "not an email address".into(),
            });
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_minutes.saturating_mul(60))
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::default().with_timeout(Duration::from_secs(self.timeout_secs))
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig::default()
            .with_interval(self.update_interval())
            .with_min_spacing(Duration::from_secs(self.min_spacing_secs))
    }

    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        let overrides = &self.endpoints;
        let mut endpoints = match overrides.base_url.as_deref() {
            Some(base) => Endpoints::from_base(base).map_err(|e| ConfigError::Validation {
                field: "endpoints.base_url".into(),
                reason: e.to_string(),
            })?,
            None => Endpoints::default(),
        };

        if let Some(raw) = overrides.login.as_deref() {
            endpoints.login = parse_url("endpoints.login", raw)?;
        }
        if let Some(raw) = overrides.settings.as_deref() {
            endpoints.settings = parse_url("endpoints.settings", raw)?;
        }
        if let Some(raw) = overrides.data.as_deref() {
            endpoints.data = parse_url("endpoints.data", raw)?;
        }
        Ok(endpoints)
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e: url::ParseError| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Settings file path ──────────────────────────────────────────────

/// `$KILN_CONFIG`, else the platform config dir.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    ProjectDirs::from("com", "kiln-monitor", "kiln-monitor").map_or_else(
        || PathBuf::from(".").join("kiln-monitor.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load and validate settings from the default path plus environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_from(&config_path())
}

/// Defaults, then `path` (if it exists), then `KILN_*` env vars. Nested
/// keys use a double underscore: `KILN_ENDPOINTS__BASE_URL`.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    let settings: Settings = Figment::new()
        .merge(Serialized::defaults(Settings::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("KILN_").split("__"))
        .extract()?;
    settings.validate()?;
    Ok(settings)
}

/// Write settings as TOML, creating parent directories.
pub fn save_settings(settings: &Settings, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve login credentials.
///
/// The password comes from, in order: `KILN_PASSWORD`, the system
/// keyring entry (`kiln-monitor`, `{email}`), the plaintext setting.
pub fn resolve_credentials(settings: &Settings) -> Result<Credentials, ConfigError> {
    let email = settings
        .email
        .clone()
        .ok_or(ConfigError::NoCredentials { email: None })?;

    let password = password_chain(
        std::env::var(PASSWORD_ENV).ok(),
        || keyring_password(&email),
        settings.password.as_deref(),
    )
    .ok_or_else(|| ConfigError::NoCredentials {
        email: Some(email.clone()),
    })?;

    Ok(Credentials::new(email, password))
}

fn keyring_password(email: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, email)
        .ok()?
        .get_password()
        .ok()
}

fn password_chain(
    env: Option<String>,
    keyring: impl FnOnce() -> Option<String>,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    env.filter(|p| !p.is_empty())
        .or_else(keyring)
        .or_else(|| plaintext.map(str::to_owned))
        .map(SecretString::from)
}
