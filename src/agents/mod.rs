//! Agent System
//!
//! Five prompt-driven agents advance an investigation. Each one formats the
//! current [`InvestigationState`] into a prompt, asks the LLM for a JSON
//! reply, folds the parsed result back into the state and appends one
//! message to the transcript. Agents never fail: when the LLM call errors
//! they run a deterministic fallback instead.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Query
//!   │
//!   ▼
//! ┌────────────────┐
//! │ Query Analysis │  → entities, classification, gaps
//! └────────────────┘
//!   │
//!   ▼
//! ┌────────────────┐
//! │   Planning     │  → strategic plan, phase, objectives
//! └────────────────┘
//!   │
//!   ▼
//! ┌────────────────┐
//! │   Retrieval    │  → questions for the user
//! └────────────────┘
//!   │
//!   ▼  user response
//! ┌────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │     Pivot      │ ──▶ │ Planning: update │ ──▶ │ Retrieval: adapt │ ─┐
//! └────────────────┘     └──────────────────┘     └──────────────────┘  │
//!   ▲                                                                   │
//!   └──────────────────────── next user response ◀──────────────────────┘
//!
//!   on demand
//! ┌────────────────┐
//! │   Synthesis    │  → IntelligenceReport
//! └────────────────┘
//! ```

pub mod parsing;
pub mod query_analysis;
pub mod planning;
pub mod retrieval;
pub mod pivot;
pub mod synthesis;

pub use pivot::{PivotAgent, PivotDigest};
pub use planning::PlanningAgent;
pub use query_analysis::QueryAnalysisAgent;
pub use retrieval::RetrievalAgent;
pub use synthesis::SynthesisAgent;

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::LLMConfig;
use crate::llm::LLM;
use crate::types::{AppResult, LLMMessage, LLMRequest};

/// Which agent is calling, used to pick its model override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    QueryAnalysis,
    Planning,
    Retrieval,
    Pivot,
    Synthesis,
}

impl AgentRole {
    pub fn display_name(&self) -> &'static str {
        match self {
            AgentRole::QueryAnalysis => "Query Analysis Agent",
            AgentRole::Planning => "Planning & Orchestration Agent",
            AgentRole::Retrieval => "Retrieval Agent",
            AgentRole::Pivot => "Pivot Agent",
            AgentRole::Synthesis => "Synthesis & Reporting Agent",
        }
    }
}

/// Shared LLM handle plus generation settings handed to every agent call.
#[derive(Clone)]
pub struct AgentContext {
    llm: Arc<LLM>,
    settings: LLMConfig,
}

impl AgentContext {
    pub fn new(llm: Arc<LLM>, settings: LLMConfig) -> Self {
        Self { llm, settings }
    }

    pub fn settings(&self) -> &LLMConfig {
        &self.settings
    }

    fn model_for(&self, role: AgentRole) -> String {
        let overrides = &self.settings.agent_models;
        let agent_override = match role {
            AgentRole::QueryAnalysis => &overrides.query_analysis,
            AgentRole::Planning => &overrides.planning,
            AgentRole::Retrieval => &overrides.retrieval,
            AgentRole::Pivot => &overrides.pivot,
            AgentRole::Synthesis => &overrides.synthesis,
        };
        self.settings.model_for(agent_override)
    }

    /// Sends one prompt on behalf of `role` and returns the reply text.
    pub async fn complete(&self, role: AgentRole, system: &str, prompt: String) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model_for(role),
            messages: vec![LLMMessage::user(prompt)],
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            system_instruction: Some(system.trim().to_string()),
        };

        match self.llm.create_chat_completion(&request).await {
            Ok(response) => {
                info!(
                    agent = role.display_name(),
                    model = %request.model,
                    response_len = response.content.len(),
                    total_tokens = response.usage.total_tokens,
                    "LLM reply received"
                );
                Ok(response.content)
            }
            Err(e) => {
                warn!(agent = role.display_name(), error = %e, "LLM call failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted LLM used by agent and service tests.

    use super::*;
    use crate::llm::LLMAdapter;
    use crate::types::{AppError, LLMResponse, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replies with the first script entry whose marker occurs in the prompt;
    /// prompts matching nothing fail like an unreachable API.
    pub struct ScriptedAdapter {
        script: Vec<(String, String)>,
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedAdapter {
        pub fn new(script: &[(&str, &str)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(marker, reply)| (marker.to_string(), reply.to_string()))
                    .collect(),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl LLMAdapter for ScriptedAdapter {
        async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
            let prompt = request.prompt().to_string();
            self.calls.lock().unwrap().push(prompt.clone());
            let reply = self
                .script
                .iter()
                .find(|(marker, _)| prompt.contains(marker.as_str()))
                .map(|(_, reply)| reply.clone())
                .ok_or_else(|| AppError::LLMApi("scripted LLM unavailable".to_string()))?;
            Ok(LLMResponse {
                content: reply,
                finish_reason: "stop".to_string(),
                usage: TokenUsage::default(),
            })
        }
    }

    pub fn context(script: &[(&str, &str)]) -> AgentContext {
        let llm = LLM::from_adapter(Box::new(ScriptedAdapter::new(script)), "scripted");
        AgentContext::new(Arc::new(llm), LLMConfig::default())
    }

    /// Context whose every call fails, forcing agent fallbacks.
    pub fn offline_context() -> AgentContext {
        context(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentModels;

    #[test]
    fn test_model_override_per_role() {
        let settings = LLMConfig {
            agent_models: AgentModels {
                synthesis: Some("gemini-2.5-pro-long".to_string()),
                ..AgentModels::default()
            },
            ..LLMConfig::default()
        };
        let llm = LLM::from_config(&settings).unwrap();
        let ctx = AgentContext::new(Arc::new(llm), settings);
        assert_eq!(ctx.model_for(AgentRole::Synthesis), "gemini-2.5-pro-long");
        assert_eq!(ctx.model_for(AgentRole::Pivot), "gemini-2.5-pro");
    }
}
