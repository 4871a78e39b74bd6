//! Opening and saving sessions.
//!
//! [`SessionInterface`] is the seam between the application and the session
//! storage. The default, [`SecureCookieSessionInterface`], keeps the whole
//! session in a signed cookie.

use super::cookie::{expiration_time, resolve_cookie_domain, resolve_cookie_path};
use super::signer::TimedSerializer;
use super::value::Session;
use crate::app::App;
use crate::config::SameSite;
use crate::http::{SessionCookie, SessionRequest, SessionResponse};
use chrono::{DateTime, Utc};

/// Salt mixed into the secret key for session cookie signatures.
pub const SESSION_SALT: &str = "cookie-session";

/// Loads a session at request start and persists it at request end.
///
/// Only [`open_session`](Self::open_session) and
/// [`save_session`](Self::save_session) are required; the cookie attribute
/// methods default to the values derived from the application configuration.
pub trait SessionInterface: Send + Sync {
    /// Load the session for `request`.
    ///
    /// Returns `None` when sessions cannot work at all (no secret key); the
    /// application then substitutes [`make_null_session`](Self::make_null_session).
    fn open_session(&self, app: &App, request: &dyn SessionRequest) -> Option<Session>;

    /// Write `session` into `response`.
    fn save_session(&self, app: &App, session: &Session, response: &mut dyn SessionResponse);

    /// The stand-in session used when [`open_session`](Self::open_session) returns `None`.
    fn make_null_session(&self, _app: &App) -> Session {
        Session::null()
    }

    /// Whether `session` is the stand-in null session. Null sessions are never saved.
    fn is_null_session(&self, session: &Session) -> bool {
        session.is_null()
    }

    /// `Domain` attribute, resolved once per application.
    fn cookie_domain(&self, app: &App) -> Option<String> {
        let path = self.cookie_path(app);
        app.cached_cookie_domain(|| resolve_cookie_domain(app.config(), &path))
    }

    /// `Path` attribute.
    fn cookie_path(&self, app: &App) -> String {
        resolve_cookie_path(app.config())
    }

    /// `HttpOnly` flag.
    fn cookie_httponly(&self, app: &App) -> bool {
        app.config().session_cookie_httponly
    }

    /// `Secure` flag.
    fn cookie_secure(&self, app: &App) -> bool {
        app.config().session_cookie_secure
    }

    /// `SameSite` attribute.
    fn cookie_samesite(&self, app: &App) -> Option<SameSite> {
        app.config().session_cookie_samesite
    }

    /// Absolute expiry of the cookie, `None` for a browser-session cookie.
    fn expiration_time(&self, app: &App, session: &Session) -> Option<DateTime<Utc>> {
        expiration_time(
            app.now(),
            app.config().permanent_session_lifetime,
            session.permanent(),
        )
    }

    /// Whether a `Set-Cookie` is needed for a non-empty session.
    ///
    /// True if the session was modified, or if it is permanent and
    /// `SESSION_REFRESH_EACH_REQUEST` is on.
    fn should_set_cookie(&self, app: &App, session: &Session) -> bool {
        session.modified() || (session.permanent() && app.config().session_refresh_each_request)
    }
}

/// Stores the session in a cookie signed with the application's secret key.
///
/// A cookie that fails verification for any reason (tampering, a rotated
/// key, expiry, garbage) opens as an empty session. The reason is logged at
/// debug level and never reaches the caller.
#[derive(Debug, Clone)]
pub struct SecureCookieSessionInterface {
    salt: String,
}

impl Default for SecureCookieSessionInterface {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureCookieSessionInterface {
    /// Create the interface with the standard salt.
    #[must_use]
    pub fn new() -> Self {
        Self {
            salt: SESSION_SALT.to_string(),
        }
    }

    /// Use a different salt, e.g. to keep two applications sharing a secret apart.
    #[must_use]
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    fn serializer<'a>(&'a self, app: &'a App) -> Option<TimedSerializer<'a>> {
        app.config()
            .signing_secret()
            .map(|secret| TimedSerializer::new(secret.as_bytes(), self.salt.as_bytes()))
    }
}

impl SessionInterface for SecureCookieSessionInterface {
    fn open_session(&self, app: &App, request: &dyn SessionRequest) -> Option<Session> {
        let serializer = self.serializer(app)?;

        let config = app.config();
        let Some(cookie) = request
            .cookie(&config.session_cookie_name)
            .filter(|value| !value.is_empty())
        else {
            return Some(Session::new());
        };

        match serializer.loads(cookie, config.permanent_session_lifetime, app.now()) {
            Ok(payload) => Some(Session::from_payload(payload).unwrap_or_else(|| {
                tracing::debug!(app = app.name(), "Discarding session cookie: unexpected payload shape");
                Session::new()
            })),
            Err(error) => {
                tracing::debug!(app = app.name(), %error, "Discarding session cookie");
                Some(Session::new())
            }
        }
    }

    fn save_session(&self, app: &App, session: &Session, response: &mut dyn SessionResponse) {
        let name = app.config().session_cookie_name.as_str();
        let domain = self.cookie_domain(app);
        let path = self.cookie_path(app);

        if session.is_empty() {
            if session.modified() {
                response.delete_cookie(name, domain.as_deref(), &path);
            }
            return;
        }

        if session.accessed() {
            response.add_vary("Cookie");
        }

        if !self.should_set_cookie(app, session) {
            return;
        }

        let Some(serializer) = self.serializer(app) else {
            tracing::warn!(app = app.name(), "Cannot save session without a secret key");
            return;
        };

        let value = match serializer.dumps(&session.to_payload(), app.now()) {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(app = app.name(), %error, "Failed to sign session");
                return;
            }
        };

        response.set_cookie(SessionCookie {
            name: name.to_string(),
            value,
            expires: self.expiration_time(app, session),
            httponly: self.cookie_httponly(app),
            domain,
            path,
            secure: self.cookie_secure(app),
            samesite: self.cookie_samesite(app),
        });
    }
}
