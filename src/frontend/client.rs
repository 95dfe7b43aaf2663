// HTTP client for the investigation API, used by the chat frontend

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::FrontendConfig;
use crate::models::{IntelligenceReport, InvestigationState};
use crate::types::{AppError, AppResult};

#[derive(Deserialize)]
struct ErrorBody {
    detail: String,
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    chat_timeout: Duration,
    report_timeout: Duration,
}

impl ApiClient {
    pub fn new(config: &FrontendConfig) -> AppResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, config))
    }

    pub fn with_client(http: Client, config: &FrontendConfig) -> Self {
        Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            chat_timeout: Duration::from_secs(config.chat_timeout_secs),
            report_timeout: Duration::from_secs(config.report_timeout_secs),
        }
    }

    pub async fn start(&self, query: &str) -> AppResult<InvestigationState> {
        let response = self
            .http
            .post(format!("{}/investigate", self.base_url))
            .timeout(self.chat_timeout)
            .json(&json!({ "query": query }))
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }

    pub async fn respond(&self, session_id: Uuid, answer: &str) -> AppResult<InvestigationState> {
        let response = self
            .http
            .post(format!("{}/{}/respond", self.base_url, session_id))
            .timeout(self.chat_timeout)
            .json(&json!({ "response": answer }))
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }

    pub async fn report(&self, session_id: Uuid) -> AppResult<IntelligenceReport> {
        let response = self
            .http
            .get(format!("{}/{}/report", self.base_url, session_id))
            .timeout(self.report_timeout)
            .send()
            .await
            .map_err(request_failed)?;
        decode(response).await
    }

    pub async fn report_pdf(&self, session_id: Uuid) -> AppResult<Vec<u8>> {
        let response = self
            .http
            .get(format!("{}/{}/report/pdf", self.base_url, session_id))
            .timeout(self.report_timeout)
            .send()
            .await
            .map_err(request_failed)?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read report PDF: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

fn request_failed(e: reqwest::Error) -> AppError {
    warn!(error = %e, "Intelligence API request failed");
    AppError::Internal(format!("Intelligence API unreachable: {}", e))
}

async fn check_status(response: Response) -> AppResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .map(|e| e.detail)
        .unwrap_or(body);
    debug!(status = %status, detail = %detail, "Intelligence API returned an error");
    Err(match status {
        StatusCode::NOT_FOUND => AppError::NotFound(detail),
        StatusCode::BAD_REQUEST => AppError::InvalidRequest(detail),
        _ => AppError::Internal(format!("Intelligence API error ({}): {}", status, detail)),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> AppResult<T> {
    check_status(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::Internal(format!("Invalid response from intelligence API: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::InvestigationStatus;

    fn config(url: &str) -> FrontendConfig {
        FrontendConfig {
            port: 5000,
            host: "127.0.0.1".to_string(),
            api_url: format!("{}/api/v1/intelligence/", url),
            chat_timeout_secs: 5,
            report_timeout_secs: 5,
        }
    }

    #[tokio::test]
    async fn test_start_posts_query() {
        let mut server = mockito::Server::new_async().await;
        let state = InvestigationState::new("Who runs Acme Corp?");
        let mock = server
            .mock("POST", "/api/v1/intelligence/investigate")
            .match_body(mockito::Matcher::PartialJson(json!({ "query": "Who runs Acme Corp?" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&state).unwrap())
            .create_async()
            .await;

        let client = ApiClient::new(&config(&server.url())).unwrap();
        let started = client.start("Who runs Acme Corp?").await.unwrap();

        assert_eq!(started.session_id, state.session_id);
        assert_eq!(started.status, InvestigationStatus::Pending);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_detail_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let _mock = server
            .mock("POST", format!("/api/v1/intelligence/{}/respond", id).as_str())
            .with_status(404)
            .with_body(r#"{"detail": "Not found: Investigation gone"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&config(&server.url())).unwrap();
        let err = client.respond(id, "hello").await.unwrap_err();

        match err {
            AppError::NotFound(detail) => assert_eq!(detail, "Not found: Investigation gone"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pdf_bytes_are_returned() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let _mock = server
            .mock("GET", format!("/api/v1/intelligence/{}/report/pdf", id).as_str())
            .with_status(200)
            .with_header("content-type", "application/pdf")
            .with_body("%PDF-1.5 fake")
            .create_async()
            .await;

        let client = ApiClient::new(&config(&server.url())).unwrap();
        let bytes = client.report_pdf(id).await.unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }
}
