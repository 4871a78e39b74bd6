//! Custom Axum extractors.
//!
//! Both extractors read the request context that [`SessionLayer`] stored in
//! the request extensions, so handlers can use the context explicitly
//! instead of going through the task-local proxies.
//!
//! # Examples
//!
//! ```ignore
//! use sigil_web::extractors::{CurrentRequest, SessionExtractor};
//!
//! async fn handler(
//!     CurrentRequest(ctx): CurrentRequest,
//!     SessionExtractor(session): SessionExtractor,
//! ) -> Result<String, AppError> {
//!     session.insert("last_path", ctx.request().path())?;
//!     Ok("ok".to_string())
//! }
//! ```
//!
//! [`SessionLayer`]: crate::middleware::SessionLayer

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use sigil_core::{ContextError, ContextKind, RequestContext, SessionHandle};
use std::sync::Arc;

use crate::error::AppError;

/// The request context of the current request.
///
/// Rejects with a 500 if the session layer is not installed.
#[derive(Debug, Clone)]
pub struct CurrentRequest(pub Arc<RequestContext>);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentRequest
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Arc<RequestContext>>()
            .cloned()
            .map(Self)
            .ok_or_else(|| ContextError::unavailable(ContextKind::Request).into())
    }
}

/// The session of the current request.
///
/// # Example
///
/// ```ignore
/// async fn handler(SessionExtractor(session): SessionExtractor) -> Result<String, AppError> {
///     let user: Option<String> = session.get_as("user")?;
///     Ok(user.unwrap_or_default())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionExtractor(pub SessionHandle);

#[async_trait]
impl<S> FromRequestParts<S> for SessionExtractor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentRequest(context) = CurrentRequest::from_request_parts(parts, state).await?;
        Ok(Self(context.session()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use sigil_testing::secret_app;

    #[tokio::test]
    async fn test_missing_layer_is_rejected() {
        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        let rejection = CurrentRequest::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(rejection.code(), "CONTEXT_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_session_comes_from_the_stored_context() {
        let context = secret_app().request_context(sigil_core::Request::default());
        context.session().insert("user", "ada").unwrap();

        let (mut parts, ()) = Request::builder().uri("/").body(()).unwrap().into_parts();
        parts.extensions.insert(Arc::clone(&context));

        let SessionExtractor(session) = SessionExtractor::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(session.get_as::<String>("user").unwrap().as_deref(), Some("ada"));
    }
}
