// GET handlers: version, health, last scrape

use axum::{extract::State, response::IntoResponse};

use super::AppState;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version from Cargo.toml.
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /health: always 200; `lastScrape` is null until a cycle succeeds.
pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let latest = state.latest.read().await;
    axum::Json(serde_json::json!({
        "status": "ok",
        "lastScrape": latest.captured_at,
        "channels": latest.points.len(),
    }))
}

/// GET /api/channels: points from the last successful cycle.
pub(super) async fn channels_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.latest.read().await.clone())
}
