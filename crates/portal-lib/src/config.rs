// ============================
// crates/portal-lib/src/config.rs
// ============================
//! Configuration management.
//!
//! Settings are layered with figment: built-in defaults, then a TOML file,
//! then `TRUENAS_PASSWD_*` environment variables (`__` separates nested
//! keys), then the flat variables the first deployments used
//! (`TRUENAS_HOST`, `SECRET_KEY`, ...).
use std::borrow::Cow;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::AppError;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Prefix of the structured environment variables
pub const ENV_PREFIX: &str = "TRUENAS_PASSWD_";

/// Flat environment variables kept for existing deployments
const LEGACY_ENV_KEYS: [&str; 6] = [
    "TRUENAS_HOST",
    "TRUENAS_PORT",
    "TRUENAS_USE_SSL",
    "TRUENAS_API_KEY",
    "TRUENAS_CLIENT",
    "SECRET_KEY",
];

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Minimum length of the cookie signing key
pub const MIN_SECRET_KEY_LENGTH: usize = 16;

/// A configuration value that must never show up in logs
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Which transport the administrative API client uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// `/api/v2.0` over HTTP(S) with a bearer token
    Rest,
    /// JSON-RPC 2.0 over a WebSocket
    #[serde(alias = "ws")]
    Websocket,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server bind address
    pub bind_addr: SocketAddr,
    /// Log level
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
    /// Key used to sign session cookies
    pub secret_key: Option<Secret>,
    /// Take the client address from `X-Real-IP` / `X-Forwarded-For`
    pub trust_proxy_headers: bool,
    pub session: SessionSettings,
    pub truenas: TrueNasSettings,
    pub smb: SmbSettings,
    pub rate_limit: RateLimitSettings,
}

/// Browser session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session TTL in seconds
    pub ttl_secs: u64,
    /// Mark the session cookie `Secure`
    pub cookie_secure: bool,
}

/// Remote management service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrueNasSettings {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    /// Reject self-signed certificates
    pub verify_tls: bool,
    /// Long-lived administrative API key
    pub api_key: Option<Secret>,
    pub client: ClientKind,
    /// Path of the JSON-RPC WebSocket endpoint
    pub ws_path: String,
    pub timeout_secs: u64,
}

/// SMB probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbSettings {
    pub enabled: bool,
    pub port: u16,
    /// NTLM domain sent with the probe; empty for local accounts
    pub domain: String,
    pub timeout_secs: u64,
}

/// Login throttling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Failed logins from one address before it is locked out
    pub max_attempts: u32,
    /// Lockout duration in seconds
    pub lockout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            secret_key: None,
            trust_proxy_headers: false,
            session: SessionSettings::default(),
            truenas: TrueNasSettings::default(),
            smb: SmbSettings::default(),
            rate_limit: RateLimitSettings::default(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 60 * 60,
            cookie_secure: false,
        }
    }
}

impl Default for TrueNasSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 443,
            use_ssl: true,
            verify_tls: false,
            api_key: None,
            client: ClientKind::Rest,
            ws_path: "/websocket".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for SmbSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 445,
            domain: String::new(),
            timeout_secs: 5,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_secs: 5 * 60,
        }
    }
}

impl TrueNasSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `https://host:port` or `http://host:port`
    pub fn http_base(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.authority_host(), self.port)
    }

    /// IPv6 literals need brackets inside a URL
    fn authority_host(&self) -> Cow<'_, str> {
        if self.host.contains(':') && !self.host.starts_with('[') {
            Cow::Owned(format!("[{}]", self.host))
        } else {
            Cow::Borrowed(&self.host)
        }
    }

    /// `wss://host:port/path` or `ws://host:port/path`
    pub fn ws_url(&self) -> String {
        let scheme = if self.use_ssl { "wss" } else { "ws" };
        let path = if self.ws_path.starts_with('/') {
            self.ws_path.clone()
        } else {
            format!("/{}", self.ws_path)
        };
        format!("{scheme}://{}:{}{path}", self.authority_host(), self.port)
    }

    /// The admin key, or an empty string when unset
    pub fn api_key(&self) -> &str {
        self.api_key.as_ref().map_or("", Secret::expose)
    }
}

impl SmbSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Settings {
    /// The layered figment for an optional config file
    pub fn figment(config_file: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_file.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .merge(
                Env::raw()
                    .only(&LEGACY_ENV_KEYS)
                    .map(|key| legacy_key(key.as_str()).into()),
            )
    }

    /// Load settings from `config.toml` and the environment
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load settings from the given file and the environment, then validate
    pub fn load_from(config_file: impl AsRef<Path>) -> Result<Self, AppError> {
        let settings: Settings = Self::figment(config_file)
            .extract()
            .map_err(|e| AppError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(AppError::Config(format!(
                "log_level must be one of {VALID_LOG_LEVELS:?}"
            )));
        }

        match &self.secret_key {
            Some(key) if key.expose().len() >= MIN_SECRET_KEY_LENGTH => {},
            _ => {
                return Err(AppError::Config(format!(
                    "secret_key must be set and at least {MIN_SECRET_KEY_LENGTH} bytes long"
                )))
            },
        }

        if self.session.ttl_secs == 0 {
            return Err(AppError::Config("session.ttl_secs must be positive".into()));
        }

        if self.truenas.host.trim().is_empty() {
            return Err(AppError::Config("truenas.host must not be empty".into()));
        }

        if self.truenas.port == 0 {
            return Err(AppError::Config("truenas.port must not be 0".into()));
        }

        if self.truenas.api_key.as_ref().map_or(true, Secret::is_empty) {
            return Err(AppError::Config("truenas.api_key must be set".into()));
        }

        if self.truenas.timeout_secs == 0 {
            return Err(AppError::Config("truenas.timeout_secs must be positive".into()));
        }

        if self.smb.enabled && (self.smb.port == 0 || self.smb.timeout_secs == 0) {
            return Err(AppError::Config(
                "smb.port and smb.timeout_secs must be positive when smb is enabled".into(),
            ));
        }

        if self.rate_limit.max_attempts == 0 {
            return Err(AppError::Config("rate_limit.max_attempts must be positive".into()));
        }

        Ok(())
    }
}

/// Map a flat legacy variable onto its nested settings key
fn legacy_key(env_key: &str) -> String {
    match env_key.to_ascii_uppercase().as_str() {
        "SECRET_KEY" => "secret_key".to_string(),
        other => match other.strip_prefix("TRUENAS_") {
            Some(rest) => format!("truenas.{}", rest.to_ascii_lowercase()),
            None => other.to_ascii_lowercase(),
        },
    }
}
