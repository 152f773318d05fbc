//! Pulsewatch -- streaming host telemetry with ensemble anomaly detection.
//!
//! Each WebSocket observer gets its own sampling session and detection
//! pipeline: a sliding window of metric vectors scored by ECOD and an
//! isolation forest, an adaptive percentile threshold and a sustain alarm.

pub mod api;
pub mod config;
pub mod detect;
pub mod replay;
pub mod stream;
pub mod telemetry;

use anyhow::{Context, Result};

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::stream::SessionRegistry;

/// Run the streaming server until Ctrl-C, then cancel every live session.
pub async fn serve(config: AppConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    let registry = SessionRegistry::new();
    let state = AppState::with_host_sources(config, registry.clone());
    let app = api::router(state);

    tracing::info!(%addr, "Pulsewatch listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let on_shutdown = registry.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!(
                sessions = on_shutdown.active_count(),
                "shutdown requested, closing sessions"
            );
            // Upgraded sockets outlive the HTTP drain; close them here.
            on_shutdown.shutdown();
        })
        .await?;

    registry.shutdown();
    tracing::info!("Pulsewatch stopped");
    Ok(())
}
