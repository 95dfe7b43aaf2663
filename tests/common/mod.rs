//! Shared setup for router tests: an LLM that is always unreachable, so
//! every agent takes its fallback path.

use async_trait::async_trait;
use std::sync::Arc;

use intel_gather::agents::AgentContext;
use intel_gather::config::Config;
use intel_gather::llm::{LLMAdapter, LLMRequest, LLMResponse, LLM};
use intel_gather::services::InvestigationService;
use intel_gather::types::{AppError, AppResult};
use intel_gather::AppState;

struct OfflineAdapter;

#[async_trait]
impl LLMAdapter for OfflineAdapter {
    async fn create_chat_completion(&self, _request: &LLMRequest) -> AppResult<LLMResponse> {
        Err(AppError::LLMApi("connection refused".to_string()))
    }
}

pub fn offline_state() -> AppState {
    let config = Config::default();
    let llm = LLM::from_adapter(Box::new(OfflineAdapter), "offline");
    let agents = AgentContext::new(Arc::new(llm), config.llm.clone());
    let service = InvestigationService::new(agents, config.investigation.clone());
    AppState {
        config,
        service: Arc::new(service),
    }
}
