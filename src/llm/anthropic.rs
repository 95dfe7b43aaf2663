// Anthropic Messages API adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::provider::{require_api_key, LLMAdapter};
use crate::types::{AppError, AppResult, LLMRequest, LLMResponse, TokenUsage};

pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
// The Messages API requires max_tokens on every request.
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    api_base: String,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl AnthropicAdapter {
    pub fn with_api_base(api_key: &str, api_base: &str) -> Self {
        Self::with_client(Client::new(), api_key, api_base)
    }

    pub fn with_client(client: Client, api_key: &str, api_base: &str) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LLMAdapter for AnthropicAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        require_api_key(&self.api_key, "anthropic")?;

        let url = format!("{}/v1/messages", self.api_base);

        // System turns travel in the top-level `system` field.
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(system) = &request.system_instruction {
            system_parts.push(system);
        }
        let mut messages = Vec::with_capacity(request.messages.len());
        for message in &request.messages {
            if message.role == "system" {
                system_parts.push(&message.content);
            } else {
                messages.push(Message {
                    role: &message.role,
                    content: &message.content,
                });
            }
        }

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("Anthropic request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(AppError::LLMApi(format!(
                "Anthropic API error ({}): {}",
                status, detail
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::LLMApi(format!("Failed to parse Anthropic response: {}", e)))?;

        let content: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
                total_tokens: u.input_tokens + u.output_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content,
            finish_reason: parsed.stop_reason.unwrap_or_else(|| "end_turn".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    #[tokio::test]
    async fn test_messages_request_shape_and_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "anthropic-key")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "claude-3-5-sonnet-latest",
                "max_tokens": 4096,
                "system": "Be precise.",
                "messages": [{ "role": "user", "content": "Summarize." }]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "content": [{ "type": "text", "text": "Summary " }, { "type": "text", "text": "done" }],
                    "stop_reason": "end_turn",
                    "usage": { "input_tokens": 10, "output_tokens": 3 }
                }"#,
            )
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_api_base("anthropic-key", &server.url());
        let request = LLMRequest {
            model: "claude-3-5-sonnet-latest".to_string(),
            messages: vec![LLMMessage::user("Summarize.")],
            max_tokens: None,
            temperature: None,
            system_instruction: Some("Be precise.".to_string()),
        };
        let response = adapter.create_chat_completion(&request).await.unwrap();

        assert_eq!(response.content, "Summary done");
        assert_eq!(response.usage.total_tokens, 13);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_body_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body(r#"{ "type": "error", "error": { "type": "overloaded_error", "message": "Overloaded" } }"#)
            .create_async()
            .await;

        let adapter = AnthropicAdapter::with_api_base("anthropic-key", &server.url());
        let request = LLMRequest {
            model: "claude".to_string(),
            messages: vec![LLMMessage::user("hi")],
            max_tokens: Some(10),
            temperature: None,
            system_instruction: None,
        };
        let err = adapter.create_chat_completion(&request).await.unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }
}
