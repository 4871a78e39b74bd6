//! Visit counter kept in a signed cookie session.
//!
//! - `GET /` counts the visit and reports the total
//! - `POST /remember` makes the session outlive the browser
//! - `GET /whoami` shows the request path and visit count via the extractors
//! - `POST /logout` forgets everything

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sigil_core::App;
use sigil_web::{session_layer, CurrentRequest, SessionExtractor, WebResult};

/// Session key holding the visit count.
pub const VISITS_KEY: &str = "visits";

/// Response body of the counter endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visits {
    /// Visits in this session, including the current one where counted
    pub visits: u64,
    /// Whether the session cookie survives browser restarts
    pub permanent: bool,
}

/// Response body of `GET /whoami`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    /// Path of the request
    pub path: String,
    /// Handling application
    pub app: String,
    /// Visits so far
    pub visits: u64,
}

/// The demo routes wrapped in the session layer for `app`.
pub fn router(app: App) -> Router {
    Router::new()
        .route("/", get(count))
        .route("/remember", post(remember))
        .route("/whoami", get(whoami))
        .route("/logout", post(logout))
        .layer(session_layer(app))
}

async fn count() -> WebResult<Json<Visits>> {
    let session = sigil_core::session()?;
    let visits = session.get_as::<u64>(VISITS_KEY)?.unwrap_or(0) + 1;
    session.insert(VISITS_KEY, visits)?;
    let permanent = session.with(sigil_core::Session::permanent)?;

    tracing::info!(visits, permanent, "Counted visit");
    Ok(Json(Visits { visits, permanent }))
}

async fn remember() -> WebResult<Json<Visits>> {
    let session = sigil_core::session()?;
    session.set_permanent(true)?;
    let visits = session.get_as::<u64>(VISITS_KEY)?.unwrap_or(0);
    Ok(Json(Visits {
        visits,
        permanent: true,
    }))
}

async fn whoami(
    CurrentRequest(context): CurrentRequest,
    SessionExtractor(session): SessionExtractor,
) -> WebResult<Json<WhoAmI>> {
    Ok(Json(WhoAmI {
        path: context.request().path().to_string(),
        app: context.app().name().to_string(),
        visits: session.get_as::<u64>(VISITS_KEY)?.unwrap_or(0),
    }))
}

async fn logout() -> WebResult<&'static str> {
    sigil_core::session()?.clear()?;
    tracing::info!("Session cleared");
    Ok("logged out")
}
