use axum::{extract::State, routing::get, Json, Router};

use crate::models::{AppState, HealthComponents, HealthResponse};

pub const SERVICE_NAME: &str = "Intelligence Gathering API";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/detailed", get(detailed_health_check))
        .with_state(state)
}

fn base_response() -> HealthResponse {
    HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        components: None,
    }
}

async fn health_check() -> Json<HealthResponse> {
    Json(base_response())
}

async fn detailed_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let llm = &state.config.llm;
    let api_key = if llm.active_api_key().is_some() {
        "configured"
    } else {
        "missing"
    };

    Json(HealthResponse {
        components: Some(HealthComponents {
            llm_provider: llm.provider.to_string(),
            llm_model: llm.default_model.clone(),
            llm_api_key: api_key.to_string(),
            active_sessions: state.service.session_count().await,
        }),
        ..base_response()
    })
}
