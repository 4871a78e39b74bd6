//! Application and request contexts.
//!
//! - [`stack`]: the per-task/per-thread stacks and the scopes that isolate them
//! - [`app`]: [`AppContext`], its guard and the `g` scratch mapping
//! - [`request`]: [`RequestContext`] and its guard
//! - [`proxy`]: [`LocalProxy`] and the `current_app`, `g`, `request` and `session` proxies

pub mod app;
pub mod proxy;
pub mod request;
pub mod stack;

pub use app::{AppContext, AppContextGuard, Globals};
pub use proxy::{
    current_app, g, has_app_context, has_request_context, request, session, LocalProxy,
    CURRENT_APP, G, REQUEST, SESSION,
};
pub use request::{
    copy_current_request_context, current_request_context, RequestContext, RequestContextGuard,
};
pub use stack::{scope, spawn, sync_scope, ContextStack, APP_STACK, REQUEST_STACK};
