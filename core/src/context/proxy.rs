//! Proxies to the objects bound by the active contexts.
//!
//! A proxy holds no state; every access looks the object up again on the
//! current task's (or thread's) stacks.
//!
//! ```
//! use sigil_core::{App, AppConfig, Request, REQUEST, SESSION};
//!
//! let app = App::new("docs", AppConfig::new().with_secret_key("s3cr3t"));
//! assert!(REQUEST.get().is_err());
//!
//! let guard = app.request_context(Request::default()).push();
//! assert_eq!(REQUEST.get().map(|r| r.path().to_string()).ok().as_deref(), Some("/"));
//! assert!(SESSION.get().is_ok_and(|s| s.insert("seen", true).is_ok()));
//! drop(guard);
//!
//! assert!(SESSION.try_get().is_none());
//! ```

use super::app::Globals;
use super::stack::{APP_STACK, REQUEST_STACK};
use crate::app::App;
use crate::error::{ContextError, ContextKind, Result};
use crate::http::Request;
use crate::session::SessionHandle;
use std::sync::Arc;

/// Stateless handle that resolves to an object of the active context.
pub struct LocalProxy<T: 'static> {
    kind: ContextKind,
    name: &'static str,
    lookup: fn() -> Option<T>,
}

impl<T: 'static> std::fmt::Debug for LocalProxy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProxy")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl<T: 'static> LocalProxy<T> {
    /// Create a proxy that resolves through `lookup`.
    #[must_use]
    pub const fn new(kind: ContextKind, name: &'static str, lookup: fn() -> Option<T>) -> Self {
        Self { kind, name, lookup }
    }

    /// Name of the proxied object.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Context kind the proxy needs.
    #[must_use]
    pub const fn kind(&self) -> ContextKind {
        self.kind
    }

    /// Resolve the proxied object.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ContextUnavailable`] if no context of the
    /// required kind is active.
    pub fn get(&self) -> Result<T> {
        (self.lookup)().ok_or(ContextError::unavailable(self.kind))
    }

    /// Resolve the proxied object, or `None` outside its context.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        (self.lookup)()
    }

    /// Run `f` against the proxied object.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ContextUnavailable`] if no context of the
    /// required kind is active.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.get().map(|value| f(&value))
    }

    /// Whether a context of the required kind is active.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        (self.lookup)().is_some()
    }
}

fn lookup_app() -> Option<App> {
    APP_STACK.top().map(|ctx| ctx.app().clone())
}

fn lookup_g() -> Option<Globals> {
    APP_STACK.top().map(|ctx| ctx.g().clone())
}

fn lookup_request() -> Option<Arc<Request>> {
    REQUEST_STACK.top().map(|ctx| Arc::clone(ctx.request()))
}

fn lookup_session() -> Option<SessionHandle> {
    REQUEST_STACK.top().map(|ctx| ctx.session())
}

/// The application of the active application context.
pub static CURRENT_APP: LocalProxy<App> =
    LocalProxy::new(ContextKind::Application, "current_app", lookup_app);

/// The scratch mapping of the active application context.
pub static G: LocalProxy<Globals> = LocalProxy::new(ContextKind::Application, "g", lookup_g);

/// The request of the active request context.
pub static REQUEST: LocalProxy<Arc<Request>> =
    LocalProxy::new(ContextKind::Request, "request", lookup_request);

/// The session of the active request context.
pub static SESSION: LocalProxy<SessionHandle> =
    LocalProxy::new(ContextKind::Request, "session", lookup_session);

/// Shorthand for [`CURRENT_APP`]`.get()`.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside an application context.
pub fn current_app() -> Result<App> {
    CURRENT_APP.get()
}

/// Shorthand for [`G`]`.get()`.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside an application context.
pub fn g() -> Result<Globals> {
    G.get()
}

/// Shorthand for [`REQUEST`]`.get()`.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside a request context.
pub fn request() -> Result<Arc<Request>> {
    REQUEST.get()
}

/// Shorthand for [`SESSION`]`.get()`.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside a request context.
pub fn session() -> Result<SessionHandle> {
    SESSION.get()
}

/// Whether an application context is active.
#[must_use]
pub fn has_app_context() -> bool {
    !APP_STACK.is_empty()
}

/// Whether a request context is active.
#[must_use]
pub fn has_request_context() -> bool {
    !REQUEST_STACK.is_empty()
}
