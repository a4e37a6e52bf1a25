use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rag_chatbot::{config::Settings, routes, state::AppState, telemetry};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env().context("loading configuration")?;
    telemetry::init(&settings.log_directive());

    tracing::info!(app = %settings.app_name, version = %settings.app_version, "starting application");

    let addr = settings.bind_addr();
    let state = Arc::new(AppState::from_settings(settings).await?);
    state.sessions.spawn_purge_task(PURGE_INTERVAL);

    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    tracing::info!("RAG chatbot listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("application stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
