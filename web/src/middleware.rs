//! Axum middleware that runs every request inside a request context.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use sigil_web::middleware::session_layer;
//!
//! let app = Router::new()
//!     .route("/", get(index))
//!     .layer(session_layer(sigil_app));
//! ```
//!
//! # Flow
//!
//! 1. **Parse** the `Cookie` header and build a request context from the request parts
//! 2. **Store** the context handle in request extensions for handler access
//! 3. **Push** the context within a fresh task-local scope and open the session
//! 4. **Call** the inner service within a tracing span
//! 5. **Save** the session into the response (`Set-Cookie`, `Vary`)
//! 6. **Pop** the context, on the error path too

use axum::{
    extract::Request,
    http::{header::COOKIE, HeaderMap},
    response::Response,
};
use cookie::Cookie;
use sigil_core::{App, RequestContext, Signal};
use std::collections::HashMap;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;

use crate::response::ResponseCookies;

/// Create a layer that binds a request context for `app` to every request.
#[must_use]
pub fn session_layer(app: App) -> SessionLayer {
    SessionLayer::new(app)
}

/// Layer for request contexts and cookie sessions.
#[derive(Clone, Debug)]
pub struct SessionLayer {
    app: App,
}

impl SessionLayer {
    /// Serve requests on behalf of `app`.
    #[must_use]
    pub const fn new(app: App) -> Self {
        Self { app }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            app: self.app.clone(),
            inner,
        }
    }
}

/// Middleware service for request contexts and cookie sessions.
#[derive(Clone, Debug)]
pub struct SessionMiddleware<S> {
    app: App,
    inner: S,
}

impl<S> Service<Request> for SessionMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let cookies = parse_cookies(req.headers());
        let (parts, body) = req.into_parts();
        let context = self
            .app
            .request_context(sigil_core::Request::from_parts(&parts, cookies));

        let mut req = Request::from_parts(parts, body);
        req.extensions_mut().insert(Arc::clone(&context));

        let span = tracing::info_span!(
            "http_request",
            app = self.app.name(),
            method = %req.method(),
            uri = %req.uri(),
        );

        // The polled-ready service handles this request; its clone takes the next.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(sigil_core::scope(run(context, inner, req)).instrument(span))
    }
}

async fn run<S>(context: Arc<RequestContext>, mut inner: S, req: Request) -> Result<Response, S::Error>
where
    S: Service<Request, Response = Response>,
{
    let app = context.app().clone();
    let guard = context.push();
    app.signals().send(app.name(), Signal::RequestStarted);

    let result = inner.call(req).await;

    if let Ok(response) = &result {
        let status = response.status();
        if status.is_server_error() {
            app.signals().send(
                app.name(),
                Signal::GotRequestException {
                    message: status.to_string(),
                },
            );
        }
    }

    let result = result.map(|mut response| {
        if let Err(error) = context.save_session(&mut ResponseCookies::new(response.headers_mut())) {
            tracing::error!(%error, "Failed to save session");
        }
        app.signals().send(
            app.name(),
            Signal::RequestFinished {
                status: response.status().as_u16(),
            },
        );
        response
    });

    if let Err(error) = guard.pop() {
        tracing::warn!(%error, "Request context was not on top at teardown");
    }
    result
}

/// Cookies of a request, first occurrence of each name wins.
fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for header in headers.get_all(COOKIE) {
        let Ok(header) = header.to_str() else {
            continue;
        };
        for cookie in Cookie::split_parse(header).flatten() {
            cookies
                .entry(cookie.name().to_string())
                .or_insert_with(|| cookie.value().to_string());
        }
    }
    cookies
}
