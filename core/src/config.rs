//! Application configuration.
//!
//! Only the keys read by the context and session machinery are modelled.
//! Field names serialize to the conventional upper-case keys
//! (`SESSION_COOKIE_NAME`, `SERVER_NAME`, ...), so a configuration can be
//! loaded from any serde format or from environment variables.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A key held a value that could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Configuration key
        key: &'static str,
        /// Offending raw value
        value: String,
    },

    /// The document could not be parsed at all.
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

/// The `SameSite` attribute of the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=None`
    None,
}

impl SameSite {
    /// Attribute value as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl std::str::FromStr for SameSite {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: "SESSION_COOKIE_SAMESITE",
                value: s.to_string(),
            }),
        }
    }
}

/// Secret key used to sign session cookies.
///
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    /// Wrap a secret.
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// An empty secret is treated as "not configured".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(**redacted**)")
    }
}

impl From<&str> for SecretKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Configuration consumed by the context and session subsystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Key used to sign session cookies. Sessions are disabled without one.
    #[serde(rename = "SECRET_KEY", skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<SecretKey>,

    /// Name of the session cookie.
    ///
    /// Default: `"session"`
    #[serde(rename = "SESSION_COOKIE_NAME")]
    pub session_cookie_name: String,

    /// Explicit cookie domain. When unset the domain is derived from `server_name`.
    #[serde(rename = "SESSION_COOKIE_DOMAIN")]
    pub session_cookie_domain: Option<String>,

    /// Explicit cookie path. When unset `application_root` is used.
    #[serde(rename = "SESSION_COOKIE_PATH")]
    pub session_cookie_path: Option<String>,

    /// Path the application is mounted at.
    ///
    /// Default: `"/"`
    #[serde(rename = "APPLICATION_ROOT")]
    pub application_root: Option<String>,

    /// Whether the session cookie carries `HttpOnly`.
    ///
    /// Default: `true`
    #[serde(rename = "SESSION_COOKIE_HTTPONLY")]
    pub session_cookie_httponly: bool,

    /// Whether the session cookie carries `Secure`.
    ///
    /// Default: `false`
    #[serde(rename = "SESSION_COOKIE_SECURE")]
    pub session_cookie_secure: bool,

    /// `SameSite` attribute, omitted when unset.
    #[serde(rename = "SESSION_COOKIE_SAMESITE")]
    pub session_cookie_samesite: Option<SameSite>,

    /// Re-issue the cookie of a permanent session on every request.
    ///
    /// Default: `true`
    #[serde(rename = "SESSION_REFRESH_EACH_REQUEST")]
    pub session_refresh_each_request: bool,

    /// Host (and optional port) the application is served from.
    #[serde(rename = "SERVER_NAME")]
    pub server_name: Option<String>,

    /// Lifetime of a permanent session, also the max age of any signed cookie.
    ///
    /// Default: 31 days. Serialized as whole seconds.
    #[serde(rename = "PERMANENT_SESSION_LIFETIME", with = "lifetime_seconds")]
    pub permanent_session_lifetime: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            session_cookie_name: "session".to_string(),
            session_cookie_domain: None,
            session_cookie_path: None,
            application_root: Some("/".to_string()),
            session_cookie_httponly: true,
            session_cookie_secure: false,
            session_cookie_samesite: None,
            session_refresh_each_request: true,
            server_name: None,
            permanent_session_lifetime: Duration::days(31),
        }
    }
}

impl AppConfig {
    /// Create a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document keyed by the upper-case configuration names.
    ///
    /// Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the document is not valid JSON or a
    /// key holds a value of the wrong type.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a key is present but cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("SECRET_KEY") {
            config.secret_key = Some(SecretKey::new(v));
        }
        if let Some(v) = lookup("SESSION_COOKIE_NAME") {
            config.session_cookie_name = v;
        }
        if let Some(v) = lookup("SESSION_COOKIE_DOMAIN") {
            config.session_cookie_domain = Some(v);
        }
        if let Some(v) = lookup("SESSION_COOKIE_PATH") {
            config.session_cookie_path = Some(v);
        }
        if let Some(v) = lookup("APPLICATION_ROOT") {
            config.application_root = Some(v);
        }
        if let Some(v) = lookup("SESSION_COOKIE_HTTPONLY") {
            config.session_cookie_httponly = parse_bool("SESSION_COOKIE_HTTPONLY", &v)?;
        }
        if let Some(v) = lookup("SESSION_COOKIE_SECURE") {
            config.session_cookie_secure = parse_bool("SESSION_COOKIE_SECURE", &v)?;
        }
        if let Some(v) = lookup("SESSION_COOKIE_SAMESITE") {
            config.session_cookie_samesite = Some(v.parse()?);
        }
        if let Some(v) = lookup("SESSION_REFRESH_EACH_REQUEST") {
            config.session_refresh_each_request = parse_bool("SESSION_REFRESH_EACH_REQUEST", &v)?;
        }
        if let Some(v) = lookup("SERVER_NAME") {
            config.server_name = Some(v);
        }
        if let Some(v) = lookup("PERMANENT_SESSION_LIFETIME") {
            config.permanent_session_lifetime = v
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "PERMANENT_SESSION_LIFETIME",
                    value: v.clone(),
                })?;
        }

        Ok(config)
    }

    /// Set the signing secret.
    #[must_use]
    pub fn with_secret_key(mut self, secret: impl Into<SecretKey>) -> Self {
        self.secret_key = Some(secret.into());
        self
    }

    /// Set the session cookie name.
    #[must_use]
    pub fn with_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.session_cookie_name = name.into();
        self
    }

    /// Set an explicit cookie domain.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: impl Into<String>) -> Self {
        self.session_cookie_domain = Some(domain.into());
        self
    }

    /// Set an explicit cookie path.
    #[must_use]
    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.session_cookie_path = Some(path.into());
        self
    }

    /// Set the application mount root.
    #[must_use]
    pub fn with_application_root(mut self, root: impl Into<String>) -> Self {
        self.application_root = Some(root.into());
        self
    }

    /// Set the `HttpOnly` flag.
    #[must_use]
    pub const fn with_httponly(mut self, httponly: bool) -> Self {
        self.session_cookie_httponly = httponly;
        self
    }

    /// Set the `Secure` flag.
    #[must_use]
    pub const fn with_secure(mut self, secure: bool) -> Self {
        self.session_cookie_secure = secure;
        self
    }

    /// Set the `SameSite` attribute.
    #[must_use]
    pub const fn with_samesite(mut self, samesite: SameSite) -> Self {
        self.session_cookie_samesite = Some(samesite);
        self
    }

    /// Set whether permanent sessions are refreshed on every request.
    #[must_use]
    pub const fn with_refresh_each_request(mut self, refresh: bool) -> Self {
        self.session_refresh_each_request = refresh;
        self
    }

    /// Set the server name.
    #[must_use]
    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    /// Set the permanent session lifetime.
    #[must_use]
    pub const fn with_permanent_session_lifetime(mut self, lifetime: Duration) -> Self {
        self.permanent_session_lifetime = lifetime;
        self
    }

    /// The configured secret, ignoring an empty one.
    #[must_use]
    pub fn signing_secret(&self) -> Option<&SecretKey> {
        self.secret_key.as_ref().filter(|k| !k.is_empty())
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

mod lifetime_seconds {
    use chrono::Duration;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        Duration::try_seconds(seconds)
            .ok_or_else(|| D::Error::custom(format!("lifetime of {seconds}s is out of range")))
    }
}
