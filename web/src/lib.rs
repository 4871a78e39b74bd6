//! Axum web framework integration for Sigil.
//!
//! This crate runs every request inside a Sigil request context and keeps
//! the session in a signed cookie.
//!
//! # Request Flow
//!
//! 1. **HTTP Request** arrives at the [`SessionLayer`]
//! 2. **Parse cookies** and build a request context from the request parts
//! 3. **Push** the context (and an application context, if needed) within a task-local scope
//! 4. **Handler** runs; it reaches the session through `sigil_core::session()`
//!    or the [`SessionExtractor`]
//! 5. **Save** the session into `Set-Cookie` and `Vary` headers
//! 6. **Pop** the contexts and return the response
//!
//! # Example
//!
//! ```ignore
//! use axum::{routing::get, Router};
//! use sigil_core::{App, AppConfig};
//! use sigil_web::{session_layer, AppError};
//!
//! async fn index() -> Result<String, AppError> {
//!     let session = sigil_core::session()?;
//!     let visits = session.get_as::<u64>("visits")?.unwrap_or(0) + 1;
//!     session.insert("visits", visits)?;
//!     Ok(format!("visit #{visits}"))
//! }
//!
//! let app = App::new("demo", AppConfig::from_env()?);
//! let router = Router::new()
//!     .route("/", get(index))
//!     .layer(session_layer(app));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod response;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{CurrentRequest, SessionExtractor};
pub use middleware::{session_layer, SessionLayer, SessionMiddleware};
pub use response::ResponseCookies;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
