//! Shared configuration for Deckathlon tools.
//!
//! TOML profiles merged with `DECKATHLON_` environment overrides, credential
//! resolution (env + plaintext), and translation into the transport and
//! registry options the data layer is built from.

use std::collections::HashMap;
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

use deckathlon_api::{TlsMode, TransportConfig};
use deckathlon_core::RegistryOptions;

/// Prefix of environment overrides. Nested keys are separated by `__`,
/// e.g. `DECKATHLON_PROFILES__LOCAL__ROOT_URL`.
pub const ENV_PREFIX: &str = "DECKATHLON_";

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    NoProfile { profile: String },

    #[error("invalid schema document {}: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named backend profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// The named profile, else the default one.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .or(self.default_profile.as_deref())
            .unwrap_or("default");
        self.profiles
            .get(name)
            .map(|p| (name.to_owned(), p))
            .ok_or_else(|| ConfigError::NoProfile {
                profile: name.to_owned(),
            })
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default)]
    pub insecure: bool,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            insecure: false,
            timeout: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// A named backend profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// API root, e.g. "https://cards.example.com/api/".
    pub root_url: String,

    /// JSON schema document: either a bare `{type: schema}` map or a full
    /// page configuration with `rootURL`, `schema` and `data`.
    pub schema: Option<PathBuf>,

    /// Username for re-authentication.
    pub username: Option<String>,

    /// Password (plaintext; prefer `DECKATHLON_PASSWORD`).
    pub password: Option<String>,

    /// URL polled for pushed updates.
    pub poll_url: Option<String>,

    pub poll_interval_ms: Option<u64>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout.
    pub timeout: Option<u64>,
}

impl Profile {
    /// Poll URL and interval, if the profile polls at all.
    pub fn poll(&self) -> Option<(String, Duration)> {
        let url = self.poll_url.clone()?;
        let interval = self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        (interval > 0).then(|| (url, Duration::from_millis(interval)))
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("net", "deckathlon", "deckathlon").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("deckathlon");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the full Config from `path` + environment. A missing file is not
/// an error; environment overrides still apply.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credentials ─────────────────────────────────────────────────────

/// Login credentials for the re-authentication flow.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

/// Resolve credentials: `DECKATHLON_USERNAME` / `DECKATHLON_PASSWORD`
/// first, then the profile. `None` unless both parts are found.
pub fn resolve_credentials(profile: &Profile) -> Option<Credentials> {
    let username = std::env::var("DECKATHLON_USERNAME")
        .ok()
        .or_else(|| profile.username.clone())?;
    let password = std::env::var("DECKATHLON_PASSWORD")
        .ok()
        .or_else(|| profile.password.clone())?;
    Some(Credentials {
        username,
        password: SecretString::from(password),
    })
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the HTTP transport configuration for a profile.
pub fn profile_to_transport_config(profile: &Profile, defaults: &Defaults) -> TransportConfig {
    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    TransportConfig {
        tls,
        timeout: Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout)),
        cookie_jar: None,
    }
    .with_cookie_jar()
}

/// Build registry options for a profile: the schema document, if any,
/// with the profile's root URL taking precedence over the document's.
pub fn profile_to_registry_options(profile: &Profile) -> Result<RegistryOptions, ConfigError> {
    url::Url::parse(&profile.root_url).map_err(|e| ConfigError::Validation {
        field: "root_url".into(),
        reason: format!("invalid URL '{}': {e}", profile.root_url),
    })?;

    let options = match profile.schema {
        Some(ref path) => load_schema(path)?,
        None => RegistryOptions::default(),
    };
    Ok(options.with_root_url(profile.root_url.clone()))
}

/// Read a schema document.
pub fn load_schema(path: &Path) -> Result<RegistryOptions, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let invalid = |source| ConfigError::Schema {
        path: path.to_owned(),
        source,
    };

    let document: serde_json::Value = serde_json::from_str(&text).map_err(invalid)?;
    if document.get("schema").is_some() {
        return serde_json::from_value(document).map_err(invalid);
    }
    Ok(RegistryOptions {
        schema: serde_json::from_value(document).map_err(invalid)?,
        ..RegistryOptions::default()
    })
}
