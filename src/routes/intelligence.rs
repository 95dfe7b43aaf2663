//! Investigation lifecycle endpoints under `/intelligence`.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::models::{
    AppState, IntelligenceQueryRequest, IntelligenceReport, InvestigationState,
    InvestigationSummary, MessageResponse, RespondRequest,
};
use crate::report::{render_report_pdf, report_file_name};
use crate::routes::extract::ValidatedJson;
use crate::types::{AppError, AppResult};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/intelligence/investigate", post(start_investigation))
        .route(
            "/intelligence/{session_id}",
            get(get_investigation).delete(close_investigation),
        )
        .route("/intelligence/{session_id}/respond", post(respond))
        .route("/intelligence/{session_id}/report", get(get_report))
        .route("/intelligence/{session_id}/report/pdf", get(download_report_pdf))
        .route("/intelligence/{session_id}/summary", get(get_summary))
        .with_state(state)
}

/// Malformed ids can never name a session, so they are reported as missing.
fn parse_session_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound(format!("Investigation {} not found", raw)))
}

async fn start_investigation(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<IntelligenceQueryRequest>,
) -> AppResult<Json<InvestigationState>> {
    info!(query_len = request.query.len(), priority = %request.priority, "Investigation requested");
    let investigation = state.service.start(request).await?;
    Ok(Json(investigation))
}

async fn respond(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    ValidatedJson(request): ValidatedJson<RespondRequest>,
) -> AppResult<Json<InvestigationState>> {
    let session_id = parse_session_id(&session_id)?;
    let investigation = state.service.respond(session_id, &request.response).await?;
    Ok(Json(investigation))
}

async fn get_investigation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<InvestigationState>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.service.get(session_id).await?))
}

async fn get_summary(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<InvestigationSummary>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.service.summary(session_id).await?))
}

async fn get_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<IntelligenceReport>> {
    let session_id = parse_session_id(&session_id)?;
    Ok(Json(state.service.report(session_id).await?))
}

async fn download_report_pdf(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let session_id = parse_session_id(&session_id)?;
    let (report, history) = state.service.report_with_history(session_id).await?;

    let bytes = tokio::task::spawn_blocking(move || render_report_pdf(&report, &history))
        .await
        .map_err(|e| AppError::Internal(format!("PDF task failed: {}", e)))??;

    info!(session_id = %session_id, size = bytes.len(), "Serving report PDF");
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

async fn close_investigation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    let session_id = parse_session_id(&session_id)?;
    state.service.close(session_id).await?;
    Ok(Json(MessageResponse {
        message: "Investigation closed successfully".to_string(),
    }))
}
