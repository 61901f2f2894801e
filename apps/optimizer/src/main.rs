mod config;
mod errors;
mod lifecycle;
mod models;
mod optimize_client;
mod render;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::lifecycle::JobLifecycleController;
use crate::optimize_client::OptimizeClient;
use crate::render::PageRenderer;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resume Optimizer v{}", env!("CARGO_PKG_VERSION"));

    // Initialize optimization service client
    let client = OptimizeClient::new(&config.optimizer_api_url, config.http_connect_timeout)
        .context("Failed to build optimization service client")?;
    info!("Optimization service: {}", config.optimizer_api_url);

    let poll_settings = config.poll_settings();
    info!(
        "Polling every {:?} (deadline: {:?})",
        poll_settings.interval, poll_settings.deadline
    );
    let controller = JobLifecycleController::new(Arc::new(client), poll_settings);

    let renderer = PageRenderer::new().context("Failed to compile page template")?;

    // Build app state
    let state = AppState::new(controller, renderer, config.clone());
    let controller = state.controller.clone();

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Abandon any in-flight poll before the runtime goes away
    controller.dispose();
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
