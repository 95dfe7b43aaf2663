//! API Routes
//!
//! All endpoints are nested under `/api/v1`:
//! - `/intelligence/...` - Investigation lifecycle (start, respond, status, report)
//! - `/health` - Health checks
//! - `/ws/{session_id}` - Live investigation updates

pub mod extract;
pub mod health;
pub mod intelligence;
pub mod websocket;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

pub const API_PREFIX: &str = "/api/v1";

/// Create the investigation API router
pub fn create_router(state: AppState) -> Router {
    info!("Creating API router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    let api_router = Router::new()
        .merge(intelligence::router(state.clone()))
        .merge(websocket::router(state.clone()))
        .merge(health::router(state));

    Router::new()
        .nest(API_PREFIX, api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
