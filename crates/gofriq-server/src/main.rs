//! gofr-iq tool-surface server.

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gofriq::GofrIqConfig;
use gofriq_server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; the environment wins.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = GofrIqConfig::from_env().context("configuration")?;
    let addr = config.http_addr.clone();

    let state = AppState::build(config).await.context("startup")?;
    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(%addr, "gofr-iq tool surface listening");

    axum::serve(listener, app).await.context("server")?;
    Ok(())
}
