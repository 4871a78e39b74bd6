//! Request contexts.

use super::app::AppContextGuard;
use super::stack::{APP_STACK, REQUEST_STACK};
use crate::app::App;
use crate::error::{ContextError, ContextKind, Result};
use crate::http::{Request, SessionResponse};
use crate::session::SessionHandle;
use crate::signals::Signal;
use std::sync::{Arc, OnceLock};

/// Binds one request, and its session, to the current task or thread.
///
/// The session is opened the first time it is needed (at the latest when the
/// context is pushed) and lives as long as the context.
#[derive(Debug)]
pub struct RequestContext {
    app: App,
    request: Arc<Request>,
    session: OnceLock<SessionHandle>,
}

impl RequestContext {
    pub(crate) fn new(app: App, request: Request) -> Arc<Self> {
        Arc::new(Self {
            app,
            request: Arc::new(request),
            session: OnceLock::new(),
        })
    }

    /// The application handling this request.
    #[must_use]
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// The request.
    #[must_use]
    pub const fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// The session, opening it on first use.
    #[must_use]
    pub fn session(&self) -> SessionHandle {
        self.session
            .get_or_init(|| SessionHandle::new(self.app.open_session(self.request.as_ref())))
            .clone()
    }

    /// Open the session now unless it is already open.
    pub fn ensure_session_open(&self) {
        self.session
            .get_or_init(|| SessionHandle::new(self.app.open_session(self.request.as_ref())));
    }

    /// Whether the session has been opened yet.
    #[must_use]
    pub fn is_session_open(&self) -> bool {
        self.session.get().is_some()
    }

    /// Persist the session into `response`.
    ///
    /// Does nothing if the session was never opened.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`] if a session holder panicked.
    pub fn save_session(&self, response: &mut dyn SessionResponse) -> Result<()> {
        match self.session.get() {
            Some(session) => session.with(|session| self.app.save_session(session, response)),
            None => Ok(()),
        }
    }

    /// Push onto the request stack.
    ///
    /// If the application context on top of the stack belongs to a different
    /// application (or there is none), a fresh one is pushed first and popped
    /// again after this context.
    #[must_use = "dropping the guard pops the context immediately"]
    pub fn push(self: &Arc<Self>) -> RequestContextGuard {
        let implicit_app = match APP_STACK.top() {
            Some(top) if top.app().ptr_eq(&self.app) => None,
            _ => Some(self.app.app_context().push()),
        };

        REQUEST_STACK.push(Arc::clone(self));
        self.ensure_session_open();

        tracing::debug!(
            app = self.app.name(),
            method = %self.request.method(),
            path = self.request.path(),
            implicit_app = implicit_app.is_some(),
            "Pushed request context"
        );

        RequestContextGuard {
            context: Some(Arc::clone(self)),
            implicit_app,
        }
    }
}

/// Pops its request context, and any application context it created, when
/// dropped.
#[derive(Debug)]
pub struct RequestContextGuard {
    context: Option<Arc<RequestContext>>,
    implicit_app: Option<AppContextGuard>,
}

impl RequestContextGuard {
    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> Option<&Arc<RequestContext>> {
        self.context.as_ref()
    }

    /// Whether pushing this context also pushed an application context.
    #[must_use]
    pub const fn created_app_context(&self) -> bool {
        self.implicit_app.is_some()
    }

    /// Pop now and report pairing errors instead of logging them.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyStack`] or [`ContextError::ContextMismatch`]
    /// if either context is not on top of its stack.
    pub fn pop(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let mut result = Ok(());

        if let Some(context) = self.context.take() {
            let app = context.app();
            app.signals().send(app.name(), Signal::RequestTearingDown);
            match REQUEST_STACK.pop_if(|top| Arc::ptr_eq(top, &context)) {
                Ok(_) => tracing::debug!(app = app.name(), "Popped request context"),
                Err(error) => result = Err(error),
            }
        }

        if let Some(app_guard) = self.implicit_app.take() {
            let popped = app_guard.pop();
            if result.is_ok() {
                result = popped;
            }
        }

        result
    }
}

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            tracing::warn!(%error, "Request context guard dropped out of order");
        }
    }
}

/// The request context on top of the stack.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside a request context.
pub fn current_request_context() -> Result<Arc<RequestContext>> {
    REQUEST_STACK
        .top()
        .ok_or(ContextError::unavailable(ContextKind::Request))
}

/// Capture the active request context for use elsewhere.
///
/// The returned closure pushes the captured context (sharing its session)
/// around `f`, so it can run on another thread or in a spawned task.
///
/// # Errors
///
/// Returns [`ContextError::ContextUnavailable`] outside a request context.
/// The closure itself fails if the pushed context is not on top when `f`
/// returns.
pub fn copy_current_request_context<F, R>(f: F) -> Result<impl FnOnce() -> Result<R>>
where
    F: FnOnce() -> R,
{
    let context = current_request_context()?;
    Ok(move || {
        let guard = context.push();
        let output = f();
        guard.pop()?;
        Ok(output)
    })
}
