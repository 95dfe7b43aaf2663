use async_trait::async_trait;
use std::time::Duration;

use crate::config::LLMConfig;
use crate::types::{AppError, AppResult, LLMProvider, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

pub struct LLM {
    adapter: Box<dyn LLMAdapter>,
    provider_name: String,
}

impl LLM {
    /// Builds the adapter for the configured provider. A missing API key is
    /// not an error here; calls fail with `AppError::LLMApi` instead so
    /// agents can run their fallbacks.
    pub fn from_config(config: &LLMConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        let api_key = config.active_api_key().unwrap_or_default();
        let api_base = config.api_base.clone();

        let adapter: Box<dyn LLMAdapter> = match config.provider {
            LLMProvider::OpenAI | LLMProvider::Groq | LLMProvider::OpenRouter => {
                let base = api_base.unwrap_or_else(|| {
                    crate::llm::openai::default_api_base(config.provider).to_string()
                });
                Box::new(crate::llm::openai::OpenAIAdapter::with_client(
                    client,
                    &api_key,
                    &base,
                    config.provider,
                ))
            }
            LLMProvider::Anthropic => {
                let base = api_base
                    .unwrap_or_else(|| crate::llm::anthropic::ANTHROPIC_API_BASE.to_string());
                Box::new(crate::llm::anthropic::AnthropicAdapter::with_client(
                    client, &api_key, &base,
                ))
            }
            LLMProvider::Google => {
                let base =
                    api_base.unwrap_or_else(|| crate::llm::google::GOOGLE_API_BASE.to_string());
                Box::new(crate::llm::google::GoogleAdapter::with_client(
                    client, &api_key, &base,
                ))
            }
        };

        Ok(Self {
            adapter,
            provider_name: config.provider.to_string(),
        })
    }

    pub fn from_adapter(adapter: Box<dyn LLMAdapter>, provider_name: impl Into<String>) -> Self {
        Self {
            adapter,
            provider_name: provider_name.into(),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }
}

pub(crate) fn require_api_key(api_key: &str, provider: &str) -> AppResult<()> {
    if api_key.trim().is_empty() {
        return Err(AppError::LLMApi(format!(
            "No API key configured for provider {}",
            provider
        )));
    }
    Ok(())
}
