//! The application collaborator.
//!
//! [`App`] bundles the configuration, the clock, the session interface and
//! the signal bus. It is a cheap, clonable handle; two handles are the same
//! application iff [`App::ptr_eq`] holds.

use crate::config::{AppConfig, SecretKey};
use crate::context::{AppContext, RequestContext};
use crate::environment::{Clock, SystemClock};
use crate::http::{Request, SessionRequest, SessionResponse};
use crate::session::{DomainResolution, SecureCookieSessionInterface, Session, SessionInterface};
use crate::signals::SignalBus;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, OnceLock};

/// Handle to an application.
#[derive(Clone)]
pub struct App {
    inner: Arc<AppInner>,
}

struct AppInner {
    name: String,
    config: AppConfig,
    clock: Arc<dyn Clock>,
    session_interface: Arc<dyn SessionInterface>,
    signals: SignalBus,
    cookie_domain: OnceLock<Option<String>>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl App {
    /// Create an application with the system clock and signed cookie sessions.
    #[must_use]
    pub fn new(name: impl Into<String>, config: AppConfig) -> Self {
        Self::builder(name, config).build()
    }

    /// Start building an application with custom collaborators.
    #[must_use]
    pub fn builder(name: impl Into<String>, config: AppConfig) -> AppBuilder {
        AppBuilder {
            name: name.into(),
            config,
            clock: None,
            session_interface: None,
            signals: None,
        }
    }

    /// Application name, used as the signal sender and in log fields.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    /// Signing secret, if one is configured.
    #[must_use]
    pub fn secret_key(&self) -> Option<&SecretKey> {
        self.inner.config.signing_secret()
    }

    /// Name of the session cookie.
    #[must_use]
    pub fn session_cookie_name(&self) -> &str {
        &self.inner.config.session_cookie_name
    }

    /// Lifetime of permanent sessions.
    #[must_use]
    pub fn permanent_session_lifetime(&self) -> Duration {
        self.inner.config.permanent_session_lifetime
    }

    /// Current time according to the application clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Lifecycle signal bus.
    #[must_use]
    pub fn signals(&self) -> &SignalBus {
        &self.inner.signals
    }

    /// The session interface.
    #[must_use]
    pub fn session_interface(&self) -> &dyn SessionInterface {
        self.inner.session_interface.as_ref()
    }

    /// Whether both handles refer to the same application.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// A fresh application context with its own scratch mapping.
    #[must_use]
    pub fn app_context(&self) -> Arc<AppContext> {
        AppContext::new(self.clone())
    }

    /// A request context for `request`.
    #[must_use]
    pub fn request_context(&self, request: Request) -> Arc<RequestContext> {
        RequestContext::new(self.clone(), request)
    }

    /// Open the session for `request`, substituting the null session when the
    /// interface cannot provide one.
    #[must_use]
    pub fn open_session(&self, request: &dyn SessionRequest) -> Session {
        let interface = self.session_interface();
        interface
            .open_session(self, request)
            .unwrap_or_else(|| interface.make_null_session(self))
    }

    /// Save `session` into `response`. Null sessions are skipped.
    pub fn save_session(&self, session: &Session, response: &mut dyn SessionResponse) {
        let interface = self.session_interface();
        if !interface.is_null_session(session) {
            interface.save_session(self, session, response);
        }
    }

    /// The cookie domain, resolved by `resolve` on first use and cached for the
    /// lifetime of the application. A resolution warning is logged once.
    pub fn cached_cookie_domain<F>(&self, resolve: F) -> Option<String>
    where
        F: FnOnce() -> DomainResolution,
    {
        self.inner
            .cookie_domain
            .get_or_init(|| {
                let resolution = resolve();
                if let Some(warning) = &resolution.warning {
                    tracing::warn!(app = self.name(), "{warning}");
                }
                resolution.domain
            })
            .clone()
    }
}

/// Builder for [`App`].
#[must_use]
pub struct AppBuilder {
    name: String,
    config: AppConfig,
    clock: Option<Arc<dyn Clock>>,
    session_interface: Option<Arc<dyn SessionInterface>>,
    signals: Option<SignalBus>,
}

impl AppBuilder {
    /// Use `clock` for signing timestamps and cookie expiry.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Replace the signed cookie session interface.
    pub fn with_session_interface(mut self, interface: impl SessionInterface + 'static) -> Self {
        self.session_interface = Some(Arc::new(interface));
        self
    }

    /// Publish lifecycle signals on an existing bus.
    pub fn with_signals(mut self, signals: SignalBus) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Finish building.
    pub fn build(self) -> App {
        App {
            inner: Arc::new(AppInner {
                name: self.name,
                config: self.config,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                session_interface: self
                    .session_interface
                    .unwrap_or_else(|| Arc::new(SecureCookieSessionInterface::new())),
                signals: self.signals.unwrap_or_default(),
                cookie_domain: OnceLock::new(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::CookieDomainWarning;

    #[test]
    fn test_handles_compare_by_identity() {
        let a = App::new("a", AppConfig::new());
        let b = App::new("a", AppConfig::new());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_cookie_domain_resolved_once() {
        let app = App::new("app", AppConfig::new());
        let mut calls = 0;
        let first = app.cached_cookie_domain(|| {
            calls += 1;
            DomainResolution {
                domain: None,
                warning: Some(CookieDomainWarning::MissingDot {
                    host: "localhost".to_string(),
                }),
            }
        });
        let second = app.cached_cookie_domain(|| {
            calls += 1;
            DomainResolution {
                domain: Some(".other.com".to_string()),
                warning: None,
            }
        });
        assert_eq!(first, None);
        assert_eq!(second, None);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_no_secret_opens_null_session() {
        let app = App::new("app", AppConfig::new());
        let session = app.open_session(&Request::default());
        assert!(session.is_null());
    }

    #[test]
    fn test_secret_opens_real_session() {
        let app = App::new("app", AppConfig::new().with_secret_key("s3cr3t"));
        let session = app.open_session(&Request::default());
        assert!(!session.is_null());
        assert!(session.is_empty());
    }
}
