//! Application contexts and the `g` scratch mapping.

use super::stack::APP_STACK;
use crate::app::App;
use crate::error::Result;
use crate::signals::Signal;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

type Slot = Arc<dyn Any + Send + Sync>;

/// Scratch mapping scoped to one application context.
///
/// Values of any `Send + Sync` type can be stored; reads downcast back to the
/// stored type and return `None` on a type mismatch.
#[derive(Clone, Default)]
pub struct Globals(Arc<Mutex<HashMap<String, Slot>>>);

impl std::fmt::Debug for Globals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0.lock() {
            Ok(map) => f.debug_set().entries(map.keys()).finish(),
            Err(_) => f.write_str("Globals(<poisoned>)"),
        }
    }
}

impl Globals {
    /// Store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`](crate::ContextError::LockPoisoned)
    /// if a previous holder panicked.
    pub fn set<T: Any + Send + Sync>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.0.lock()?.insert(key.into(), Arc::new(value));
        Ok(())
    }

    /// The value under `key`, if present and of type `T`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`](crate::ContextError::LockPoisoned)
    /// if a previous holder panicked.
    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
        let slot = self.0.lock()?.get(key).cloned();
        Ok(slot.and_then(|value| value.downcast::<T>().ok()))
    }

    /// Whether `key` is present.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`](crate::ContextError::LockPoisoned)
    /// if a previous holder panicked.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.0.lock()?.contains_key(key))
    }

    /// Remove `key`, returning whether it was present.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::LockPoisoned`](crate::ContextError::LockPoisoned)
    /// if a previous holder panicked.
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.0.lock()?.remove(key).is_some())
    }
}

/// Binds an application to the current task or thread.
#[derive(Debug)]
pub struct AppContext {
    app: App,
    g: Globals,
}

impl AppContext {
    pub(crate) fn new(app: App) -> Arc<Self> {
        Arc::new(Self {
            app,
            g: Globals::default(),
        })
    }

    /// The bound application.
    #[must_use]
    pub const fn app(&self) -> &App {
        &self.app
    }

    /// The scratch mapping of this context.
    #[must_use]
    pub const fn g(&self) -> &Globals {
        &self.g
    }

    /// Push onto the application stack. The context is popped when the guard
    /// is dropped or [`AppContextGuard::pop`] is called.
    #[must_use = "dropping the guard pops the context immediately"]
    pub fn push(self: &Arc<Self>) -> AppContextGuard {
        APP_STACK.push(Arc::clone(self));
        self.app.signals().send(self.app.name(), Signal::AppContextPushed);
        tracing::debug!(app = self.app.name(), depth = APP_STACK.len(), "Pushed application context");
        AppContextGuard {
            context: Some(Arc::clone(self)),
        }
    }
}

/// Pops its application context when dropped.
#[derive(Debug)]
pub struct AppContextGuard {
    context: Option<Arc<AppContext>>,
}

impl AppContextGuard {
    /// The guarded context.
    #[must_use]
    pub fn context(&self) -> Option<&Arc<AppContext>> {
        self.context.as_ref()
    }

    /// Pop now and report pairing errors instead of logging them.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EmptyStack`](crate::ContextError::EmptyStack) or
    /// [`ContextError::ContextMismatch`](crate::ContextError::ContextMismatch)
    /// if the context is not on top of the stack.
    pub fn pop(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(context) = self.context.take() else {
            return Ok(());
        };
        let app = context.app();
        app.signals().send(app.name(), Signal::AppContextTearingDown);
        APP_STACK.pop_if(|top| Arc::ptr_eq(top, &context))?;
        app.signals().send(app.name(), Signal::AppContextPopped);
        tracing::debug!(app = app.name(), depth = APP_STACK.len(), "Popped application context");
        Ok(())
    }
}

impl Drop for AppContextGuard {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            tracing::warn!(%error, "Application context guard dropped out of order");
        }
    }
}
