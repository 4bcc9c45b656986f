// HTTP status routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::models::LatestScrape;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) latest: Arc<RwLock<LatestScrape>>,
}

pub fn app(latest: Arc<RwLock<LatestScrape>>) -> Router {
    let state = AppState { latest };
    Router::new()
        .route("/", get(|| async { "modem-scraper" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/health", get(http::health_handler)) // GET /health
        .route("/api/channels", get(http::channels_handler)) // GET /api/channels
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
