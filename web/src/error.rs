//! Error types for web handlers.
//!
//! [`AppError`] turns context and session failures into JSON error
//! responses, so handlers can use `?` on anything from `sigil_core`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sigil_core::ContextError;
use std::fmt;

/// Application error type for web handlers.
///
/// Every variant of [`ContextError`] is a server-side problem (a handler ran
/// without the session layer, or the application has no secret key), so all
/// of them answer 500 with a machine-readable code.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<String, AppError> {
///     let session = sigil_core::session()?;
///     session.insert("visited", true)?;
///     Ok("ok".to_string())
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    source: ContextError,
}

impl AppError {
    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// The context error behind this response.
    #[must_use]
    pub const fn context_error(&self) -> &ContextError {
        &self.source
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.source)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                error = %self.source,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.source.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<ContextError> for AppError {
    fn from(source: ContextError) -> Self {
        let code = match &source {
            ContextError::ContextUnavailable { .. } => "CONTEXT_UNAVAILABLE",
            ContextError::SessionUnavailable => "SESSION_UNAVAILABLE",
            error if error.is_pairing_bug() => "CONTEXT_STACK_ERROR",
            _ => "INTERNAL_SERVER_ERROR",
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code,
            source,
        }
    }
}
