//! End-to-end tests for the investigation API router.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use intel_gather::create_router;

fn app() -> Router {
    create_router(common::offline_state())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, method, uri, body).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn start(app: &Router) -> String {
    let (status, body) = send_json(
        app,
        "POST",
        "/api/v1/intelligence/investigate",
        Some(json!({ "query": "Investigate Acme Holdings Inc and its links to John Smith" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["session_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_start_investigation_waits_for_input() {
    let app = app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/intelligence/investigate",
        Some(json!({ "query": "Investigate Acme Holdings Inc in Berlin" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("waiting_for_input"));
    assert!(!body["target_entities"].as_array().unwrap().is_empty());
    assert!(!body["current_questions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_blank_query_is_rejected() {
    let app = app();
    let (status, body) = send_json(
        &app,
        "POST",
        "/api/v1/intelligence/investigate",
        Some(json!({ "query": "   " })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_respond_records_user_turn() {
    let app = app();
    let id = start(&app).await;

    let (status, body) = send_json(
        &app,
        "POST",
        &format!("/api/v1/intelligence/{}/respond", id),
        Some(json!({ "response": "John Smith has been a director since 2015." })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let history = body["conversation_history"].as_array().unwrap();
    assert!(history
        .iter()
        .any(|m| m["agent_name"] == json!("User")
            && m["message"] == json!("John Smith has been a director since 2015.")));
    assert!(!body["evidence_pool"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_report_is_stable_until_state_changes() {
    let app = app();
    let id = start(&app).await;
    let uri = format!("/api/v1/intelligence/{}/report", id);

    let (status, first) = send_json(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send_json(&app, "GET", &uri, None).await;

    assert_eq!(first["generated_at"], second["generated_at"]);
    assert_eq!(first["metadata"]["generation_method"], json!("fallback"));
}

#[tokio::test]
async fn test_unknown_and_malformed_ids_are_not_found() {
    let app = app();
    let (status, body) = send_json(
        &app,
        "GET",
        &format!("/api/v1/intelligence/{}", uuid::Uuid::new_v4()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["detail"].is_string());

    let (status, _) = send_json(&app, "GET", "/api/v1/intelligence/not-a-uuid/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_summary_counts() {
    let app = app();
    let id = start(&app).await;

    let (status, body) =
        send_json(&app, "GET", &format!("/api/v1/intelligence/{}/summary", id), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], json!(id));
    assert_eq!(body["conversation_turns"], json!(0));
    assert!(body["entities_identified"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_close_removes_investigation() {
    let app = app();
    let id = start(&app).await;
    let uri = format!("/api/v1/intelligence/{}", id);

    let (status, body) = send_json(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Investigation closed successfully"));

    let (status, _) = send_json(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app();
    let (status, body) = send_json(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("healthy"));
    assert!(body.get("components").is_none());

    start(&app).await;
    let (status, body) = send_json(&app, "GET", "/api/v1/health/detailed", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["llm_api_key"], json!("missing"));
    assert_eq!(body["components"]["active_sessions"], json!(1));
}

#[tokio::test]
async fn test_report_pdf_download() {
    let app = app();
    let id = start(&app).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/intelligence/{}/report/pdf", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/pdf");
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains(&format!("report_{}.pdf", id)));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}
