//! Session counter binary
//!
//! Serves the visit counter. Configuration is read from the environment
//! (`SECRET_KEY`, `SESSION_COOKIE_NAME`, `PERMANENT_SESSION_LIFETIME`, ...);
//! the listen address from `SIGIL_ADDR`.

use sigil_core::{App, AppConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "session_counter=debug,sigil_core=debug,sigil_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    if config.signing_secret().is_none() {
        tracing::warn!("SECRET_KEY is not set; sessions are read-only and writes will fail");
    }

    let app = App::new("session-counter", config);
    let addr = std::env::var("SIGIL_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, session_counter::router(app)).await?;
    Ok(())
}
