// OpenAI-compatible chat completions adapter.
// Also serves Groq and OpenRouter, which expose the same wire format.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::provider::{require_api_key, LLMAdapter};
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse, TokenUsage};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
const OPENROUTER_API_BASE: &str = "https://openrouter.ai/api/v1";

pub fn default_api_base(provider: LLMProvider) -> &'static str {
    match provider {
        LLMProvider::Groq => GROQ_API_BASE,
        LLMProvider::OpenRouter => OPENROUTER_API_BASE,
        _ => OPENAI_API_BASE,
    }
}

pub struct OpenAIAdapter {
    client: Client,
    api_key: String,
    api_base: String,
    provider: LLMProvider,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl OpenAIAdapter {
    pub fn with_api_base(api_key: &str, api_base: &str) -> Self {
        Self::with_client(Client::new(), api_key, api_base, LLMProvider::OpenAI)
    }

    pub fn with_client(client: Client, api_key: &str, api_base: &str, provider: LLMProvider) -> Self {
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            provider,
        }
    }
}

#[async_trait]
impl LLMAdapter for OpenAIAdapter {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        require_api_key(&self.api_key, &self.provider.to_string())?;

        let url = format!("{}/chat/completions", self.api_base);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system_instruction {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: &m.role,
            content: &m.content,
        }));

        let body = ChatRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::LLMApi(format!("{} request failed: {}", self.provider, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                return Err(AppError::LLMApi(format!(
                    "{} API error ({}): {}",
                    self.provider, status, error_response.error.message
                )));
            }
            return Err(AppError::LLMApi(format!(
                "{} API error ({}): {}",
                self.provider, status, error_text
            )));
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            AppError::LLMApi(format!("Failed to parse {} response: {}", self.provider, e))
        })?;

        let choice = chat_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AppError::LLMApi(format!("{} returned no choices", self.provider)))?;

        let usage = chat_response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(LLMResponse {
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LLMMessage;

    fn request() -> LLMRequest {
        LLMRequest {
            model: "gpt-4o".to_string(),
            messages: vec![LLMMessage::user("Who is John Smith?")],
            max_tokens: Some(256),
            temperature: Some(0.2),
            system_instruction: Some("You are an analyst.".to_string()),
        }
    }

    #[test]
    fn test_default_api_bases() {
        assert_eq!(default_api_base(LLMProvider::OpenAI), OPENAI_API_BASE);
        assert_eq!(default_api_base(LLMProvider::Groq), GROQ_API_BASE);
        assert_eq!(default_api_base(LLMProvider::OpenRouter), OPENROUTER_API_BASE);
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "You are an analyst." },
                    { "role": "user", "content": "Who is John Smith?" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "choices": [{ "message": { "role": "assistant", "content": "{\"ok\": true}" }, "finish_reason": "stop" }],
                    "usage": { "prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16 }
                }"#,
            )
            .create_async()
            .await;

        let adapter = OpenAIAdapter::with_api_base("test-key", &server.url());
        let response = adapter.create_chat_completion(&request()).await.unwrap();

        assert_eq!(response.content, "{\"ok\": true}");
        assert_eq!(response.finish_reason, "stop");
        assert_eq!(response.usage.total_tokens, 16);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body(r#"{ "error": { "message": "Invalid API key" } }"#)
            .create_async()
            .await;

        let adapter = OpenAIAdapter::with_api_base("bad-key", &server.url());
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();
        match err {
            AppError::LLMApi(message) => assert!(message.contains("Invalid API key")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_skips_network() {
        let adapter = OpenAIAdapter::with_api_base("", "http://127.0.0.1:9");
        let err = adapter.create_chat_completion(&request()).await.unwrap_err();
        assert!(matches!(err, AppError::LLMApi(_)));
    }
}
