//! # Sigil Core
//!
//! Context-local application and request state, and client-side sessions
//! kept in signed cookies.
//!
//! ## Core Concepts
//!
//! - **App**: configuration, clock, session interface and signal bus
//! - **Application context**: binds an [`App`] and a scratch mapping (`g`) to
//!   the current task or thread
//! - **Request context**: binds a [`Request`] and its [`Session`]; pushing one
//!   provisions an application context when needed
//! - **Proxies**: [`CURRENT_APP`], [`G`], [`REQUEST`] and [`SESSION`] resolve
//!   against the top of the current stacks on every access
//! - **Session interface**: opens a session from the request cookie and
//!   writes it back as a signed `Set-Cookie`
//!
//! ## Example
//!
//! ```
//! use sigil_core::{session, App, AppConfig, Request};
//!
//! let app = App::new("example", AppConfig::new().with_secret_key("s3cr3t"));
//! let guard = app.request_context(Request::default()).push();
//!
//! session()?.insert("user_id", 42)?;
//! assert_eq!(session()?.get_as::<u32>("user_id")?, Some(42));
//!
//! guard.pop()?;
//! # Ok::<(), sigil_core::ContextError>(())
//! ```
//!
//! ## Isolation
//!
//! Every tokio task sees its own stacks, even when the scheduler moves it
//! between worker threads. Code outside the runtime gets one stack per
//! thread. [`scope`] gives a future fresh stacks of its own, and [`spawn`]
//! starts a task inside one.

pub mod app;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod http;
pub mod session;
pub mod signals;

pub use app::{App, AppBuilder};
pub use config::{AppConfig, ConfigError, SameSite, SecretKey};
pub use context::{
    copy_current_request_context, current_app, current_request_context, g, has_app_context,
    has_request_context, request, scope, session, spawn, sync_scope, AppContext, AppContextGuard,
    Globals, LocalProxy, RequestContext, RequestContextGuard, CURRENT_APP, G, REQUEST, SESSION,
};
pub use environment::{Clock, SystemClock};
pub use error::{ContextError, ContextKind, Result};
pub use self::http::{Request, SessionCookie, SessionRequest, SessionResponse};
pub use session::{SecureCookieSessionInterface, Session, SessionHandle, SessionInterface};
pub use signals::{Signal, SignalBus, SignalEvent};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
