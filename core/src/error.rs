//! Error types for context and session operations.

use thiserror::Error;

/// Result type alias for context and session operations.
pub type Result<T> = std::result::Result<T, ContextError>;

/// Which kind of context a stack or proxy refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// The application context (`current_app`, `g`).
    Application,
    /// The request context (`request`, `session`).
    Request,
}

impl ContextKind {
    /// Short name used in log fields and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Request => "request",
        }
    }

    /// Human-readable explanation of how to establish this context.
    #[must_use]
    pub const fn hint(self) -> &'static str {
        match self {
            Self::Application => {
                "This typically means that you attempted to use functionality that needed \
                 to interface with the current application object. Push an application \
                 context first with `app.app_context().push()`."
            }
            Self::Request => {
                "This typically means that you attempted to use functionality that needed \
                 an active HTTP request. Serve the handler through the session layer, or \
                 push one manually with `app.request_context(request).push()`."
            }
        }
    }
}

impl std::fmt::Display for ContextKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by context stacks, proxies and sessions.
///
/// Cookie verification failures are deliberately absent: a tampered or
/// expired cookie degrades to an empty session and never surfaces here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// A proxy was accessed while no context of the required kind was active.
    #[error("Working outside of {kind} context. {}", .kind.hint())]
    ContextUnavailable {
        /// The missing context kind
        kind: ContextKind,
    },

    /// `pop` was called on an empty stack.
    #[error("Cannot pop from the empty {stack} context stack")]
    EmptyStack {
        /// The stack that was empty
        stack: ContextKind,
    },

    /// A guard tried to pop a context that is not on top of its stack.
    #[error("Popped wrong {stack} context")]
    ContextMismatch {
        /// The stack whose top did not match
        stack: ContextKind,
    },

    /// A write was attempted on the null session.
    #[error(
        "The session is unavailable because no secret key was set. Set the secret_key \
         on the application to something unique and secret."
    )]
    SessionUnavailable,

    /// A lock guarding shared context state was poisoned by a panicking holder.
    #[error("Context state lock poisoned")]
    LockPoisoned,
}

impl ContextError {
    /// Shorthand for [`ContextError::ContextUnavailable`].
    #[must_use]
    pub const fn unavailable(kind: ContextKind) -> Self {
        Self::ContextUnavailable { kind }
    }

    /// Returns `true` if this error indicates a push/pop pairing bug in the caller.
    #[must_use]
    pub const fn is_pairing_bug(&self) -> bool {
        matches!(self, Self::EmptyStack { .. } | Self::ContextMismatch { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for ContextError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}
