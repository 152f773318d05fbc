//! API route definitions.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use super::state::AppState;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/broadcast", post(broadcast))
}

/// Flat health document polled by dashboards.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "active_connections": state.registry.active_count(),
        "config": {
            "sample_interval": state.config.server.sample_interval,
            "include_scores": state.config.detector.enabled,
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "active_sessions": state.registry.active_count(),
            "detection_enabled": state.config.detector.enabled,
            "uptime_sec": (chrono::Utc::now() - state.started_at).num_seconds().max(0),
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn list_sessions(State(state): State<AppState>) -> Json<Value> {
    let sessions = state.registry.sessions();
    Json(json!({ "data": sessions, "meta": { "total": sessions.len() } }))
}

async fn broadcast(State(state): State<AppState>, Json(body): Json<Value>) -> Json<Value> {
    let report = state.registry.broadcast(&body.to_string());
    Json(json!({ "data": report }))
}
