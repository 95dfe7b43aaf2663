//! Chat frontend service.
//!
//! A separate web app that serves the chat page and relays messages to the
//! investigation API, keeping no state of its own: the browser holds the
//! session id.

pub mod client;
pub mod page;
pub mod present;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::middleware::cors_layer;
use crate::report::report_file_name;
use crate::types::{AppError, AppResult};

pub use client::ApiClient;
pub use present::{ChatReply, ReportData};

#[derive(Clone)]
pub struct FrontendState {
    pub api: Arc<ApiClient>,
}

impl FrontendState {
    pub fn new(api: ApiClient) -> Self {
        Self { api: Arc::new(api) }
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateReportRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn create_frontend_router(state: FrontendState, config: &Config) -> Router {
    info!("Creating frontend router");
    Router::new()
        .route("/", get(index))
        .route("/send_message", post(send_message))
        .route("/generate_report", post(generate_report))
        .route("/download_report/{session_id}", get(download_report))
        .with_state(state)
        .layer(cors_layer(&config.server.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}

fn session_from(raw: Option<&str>) -> Option<Uuid> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| Uuid::parse_str(s).ok())
}

async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

fn chat_error(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn report_error(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "status": "error", "message": message }))).into_response()
}

async fn send_message(
    State(state): State<FrontendState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return chat_error(&rejection.body_text()),
    };
    let message = request.message.trim();
    if message.is_empty() {
        return chat_error("Please enter a message");
    }

    let result = match session_from(request.session_id.as_deref()) {
        Some(session_id) => {
            info!(session_id = %session_id, "Relaying response to investigation");
            state.api.respond(session_id, message).await
        }
        None => {
            info!("Starting new investigation from chat");
            state.api.start(message).await
        }
    };

    match result {
        Ok(investigation) => Json(ChatReply::from_state(&investigation)).into_response(),
        Err(e) => {
            error!(error = %e, "Chat request failed");
            Json(ChatReply::error(&e.to_string())).into_response()
        }
    }
}

async fn generate_report(
    State(state): State<FrontendState>,
    body: Result<Json<GenerateReportRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => return report_error(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    let Some(session_id) = session_from(request.session_id.as_deref()) else {
        return report_error(
            StatusCode::BAD_REQUEST,
            "No active investigation session".to_string(),
        );
    };

    match state.api.report(session_id).await {
        Ok(report) => Json(json!({
            "status": "success",
            "message": "Intelligence report generated successfully",
            "report_data": ReportData::from_report(&report),
            "agent_status": "Report Ready",
        }))
        .into_response(),
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Report generation failed");
            report_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to generate report: {}", e),
            )
        }
    }
}

async fn download_report(
    State(state): State<FrontendState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session_id = session_from(Some(&session_id))
        .ok_or_else(|| AppError::NotFound(format!("Investigation {} not found", session_id)))?;
    let bytes = state.api.report_pdf(session_id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report_file_name(session_id)),
            ),
        ],
        bytes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router_for(api_url: &str) -> Router {
        let mut config = Config::default();
        config.frontend.api_url = api_url.to_string();
        let api = ApiClient::new(&config.frontend).unwrap();
        create_frontend_router(FrontendState::new(api), &config)
    }

    async fn post_json(router: Router, uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        post_raw(router, uri, body.to_string()).await
    }

    async fn post_raw(router: Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_index_serves_chat_page() {
        let response = router_for("http://127.0.0.1:9")
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Generate Report"));
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let (status, body) =
            post_json(router_for("http://127.0.0.1:9"), "/send_message", json!({ "message": "  " })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], json!("Please enter a message"));
    }

    #[tokio::test]
    async fn test_api_failure_becomes_chat_error_and_clears_session() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/investigate")
            .with_status(500)
            .with_body(r#"{"detail": "boom"}"#)
            .create_async()
            .await;

        let (status, body) =
            post_json(router_for(&server.url()), "/send_message", json!({ "message": "Who is Jane Doe?" })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["agent_status"], json!("Error"));
        assert!(body["session_id"].is_null());
        assert!(body["response"].as_str().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_report_requires_session() {
        let (status, body) =
            post_json(router_for("http://127.0.0.1:9"), "/generate_report", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], json!("error"));
    }

    #[tokio::test]
    async fn test_malformed_bodies_keep_page_error_shape() {
        let (status, body) =
            post_raw(router_for("http://127.0.0.1:9"), "/send_message", "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) =
            post_raw(router_for("http://127.0.0.1:9"), "/generate_report", "[1, 2]".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], json!("error"));
        assert!(body["message"].is_string());
    }
}
