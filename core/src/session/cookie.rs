//! Session cookie attribute resolution.
//!
//! Pure functions over [`AppConfig`]; the application caches the domain
//! result so the warnings below are reported once per application.

use crate::config::AppConfig;
use chrono::{DateTime, Duration, Utc};
use std::net::IpAddr;

/// A non-fatal problem found while deriving the cookie domain from `SERVER_NAME`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieDomainWarning {
    /// The host has no dot (e.g. `localhost`); browsers reject such domains,
    /// so no `Domain` attribute is sent.
    MissingDot {
        /// The offending host
        host: String,
    },
    /// The host is an IP address; it is used, but some browsers ignore it.
    IpAddress {
        /// The offending host
        host: String,
    },
}

impl std::fmt::Display for CookieDomainWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDot { host } => write!(
                f,
                "{host:?} is not a valid cookie domain, it must contain a \".\". Add an entry \
                 to your hosts file, for example \"{host}.localdomain\", and use that instead."
            ),
            Self::IpAddress { .. } => f.write_str(
                "The session cookie domain is an IP address. This may not work as intended in \
                 some browsers. Add an entry to your hosts file, for example \
                 \"localhost.localdomain\", and use that instead.",
            ),
        }
    }
}

/// Outcome of cookie domain resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DomainResolution {
    /// The `Domain` attribute to send, if any
    pub domain: Option<String>,
    /// Problem encountered on the way, if any
    pub warning: Option<CookieDomainWarning>,
}

/// Resolve the session cookie domain.
///
/// An explicit `SESSION_COOKIE_DOMAIN` wins (an empty one means "none").
/// Otherwise `SERVER_NAME` is stripped of its port and leading dots; a host
/// without a dot yields no domain, an IP address is kept as-is, and any other
/// host gets a leading dot when the cookie path is `/` so subdomains match.
#[must_use]
pub fn resolve_cookie_domain(config: &AppConfig, cookie_path: &str) -> DomainResolution {
    if let Some(explicit) = &config.session_cookie_domain {
        return DomainResolution {
            domain: Some(explicit.clone()).filter(|d| !d.is_empty()),
            warning: None,
        };
    }

    let Some(server_name) = config.server_name.as_deref().filter(|s| !s.is_empty()) else {
        return DomainResolution::default();
    };

    let host = server_name
        .rsplit_once(':')
        .map_or(server_name, |(host, _port)| host)
        .trim_start_matches('.');

    if !host.contains('.') {
        return DomainResolution {
            domain: None,
            warning: Some(CookieDomainWarning::MissingDot {
                host: host.to_string(),
            }),
        };
    }

    if is_ip(host) {
        return DomainResolution {
            domain: Some(host.to_string()),
            warning: Some(CookieDomainWarning::IpAddress {
                host: host.to_string(),
            }),
        };
    }

    let domain = if cookie_path == "/" {
        format!(".{host}")
    } else {
        host.to_string()
    };

    DomainResolution {
        domain: Some(domain),
        warning: None,
    }
}

/// `SESSION_COOKIE_PATH`, else `APPLICATION_ROOT`, else `/`.
#[must_use]
pub fn resolve_cookie_path(config: &AppConfig) -> String {
    config
        .session_cookie_path
        .as_deref()
        .filter(|p| !p.is_empty())
        .or_else(|| config.application_root.as_deref().filter(|p| !p.is_empty()))
        .unwrap_or("/")
        .to_string()
}

/// `now + lifetime` for a permanent session, `None` for a browser-session cookie.
///
/// A lifetime reaching past the representable range also yields `None`.
#[must_use]
pub fn expiration_time(
    now: DateTime<Utc>,
    lifetime: Duration,
    permanent: bool,
) -> Option<DateTime<Utc>> {
    if !permanent {
        return None;
    }
    let expires = now.checked_add_signed(lifetime);
    if expires.is_none() {
        tracing::warn!(
            lifetime_secs = lifetime.num_seconds(),
            "PERMANENT_SESSION_LIFETIME overflows the cookie expiry; sending a browser-session cookie"
        );
    }
    expires
}

fn is_ip(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok()
}
