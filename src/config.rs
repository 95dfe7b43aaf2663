use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::types::LLMProvider;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LLMConfig,
    pub investigation: InvestigationConfig,
    pub frontend: FrontendConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub default_model: String,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub google_api_key: String,
    pub openrouter_api_key: String,
    pub groq_api_key: String,
    /// Overrides the provider's default endpoint (proxies, self-hosted gateways).
    pub api_base: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    pub agent_models: AgentModels,
}

/// Optional per-agent model overrides; unset agents use `LLMConfig::default_model`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentModels {
    pub query_analysis: Option<String>,
    pub planning: Option<String>,
    pub retrieval: Option<String>,
    pub pivot: Option<String>,
    pub synthesis: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvestigationConfig {
    pub min_evidence_items: usize,
    pub confidence_threshold: f64,
    pub max_information_gaps: usize,
    pub max_conversation_turns: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    pub port: u16,
    pub host: String,
    /// Base URL of the investigation API, e.g. `http://localhost:8000/api/v1/intelligence`.
    pub api_url: String,
    pub chat_timeout_secs: u64,
    pub report_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// When set, logs are also written to a daily rolling file in this directory.
    pub dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl LLMConfig {
    /// API key for the configured provider, if one is set.
    pub fn active_api_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::OpenAI => &self.openai_api_key,
            LLMProvider::Anthropic => &self.anthropic_api_key,
            LLMProvider::Google => &self.google_api_key,
            LLMProvider::OpenRouter => &self.openrouter_api_key,
            LLMProvider::Groq => &self.groq_api_key,
        };
        if key.trim().is_empty() {
            None
        } else {
            Some(key.clone())
        }
    }

    pub fn model_for(&self, agent_override: &Option<String>) -> String {
        agent_override
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.default_model.clone())
    }
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Google,
            default_model: "gemini-2.5-pro".to_string(),
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            google_api_key: String::new(),
            openrouter_api_key: String::new(),
            groq_api_key: String::new(),
            api_base: None,
            max_tokens: 4096,
            temperature: 0.4,
            request_timeout_secs: 300,
            agent_models: AgentModels::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            host: "0.0.0.0".to_string(),
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            api_url: "http://localhost:8000/api/v1/intelligence".to_string(),
            chat_timeout_secs: 900,
            report_timeout_secs: 60,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_prefix: "intel_gather.log".to_string(),
        }
    }
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            min_evidence_items: 5,
            confidence_threshold: 0.7,
            max_information_gaps: 3,
            max_conversation_turns: 20,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let provider_id = env::var("LLM_PROVIDER").unwrap_or_else(|_| "google".to_string());
        let provider = LLMProvider::from_id(&provider_id)
            .with_context(|| format!("Unsupported LLM_PROVIDER: {}", provider_id))?;

        let llm_defaults = LLMConfig::default();
        let investigation_defaults = InvestigationConfig::default();

        Ok(Self {
            server: ServerConfig {
                port: parse_var("PORT", 8000)?,
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                cors_allowed_origins: env::var("ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:5000,http://localhost:3000".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            llm: LLMConfig {
                provider,
                default_model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| default_model_for(provider).to_string()),
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                anthropic_api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                google_api_key: env::var("GOOGLE_API_KEY").unwrap_or_default(),
                openrouter_api_key: env::var("OPENROUTER_API_KEY").unwrap_or_default(),
                groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
                api_base: env::var("LLM_API_BASE").ok().filter(|s| !s.trim().is_empty()),
                max_tokens: parse_var("LLM_MAX_TOKENS", llm_defaults.max_tokens)?,
                temperature: parse_var("LLM_TEMPERATURE", llm_defaults.temperature)?,
                request_timeout_secs: parse_var(
                    "LLM_TIMEOUT_SECS",
                    llm_defaults.request_timeout_secs,
                )?,
                agent_models: AgentModels {
                    query_analysis: env::var("QUERY_ANALYSIS_MODEL").ok(),
                    planning: env::var("PLANNING_MODEL").ok(),
                    retrieval: env::var("RETRIEVAL_MODEL").ok(),
                    pivot: env::var("PIVOT_MODEL").ok(),
                    synthesis: env::var("SYNTHESIS_MODEL").ok(),
                },
            },
            investigation: InvestigationConfig {
                min_evidence_items: parse_var(
                    "MIN_EVIDENCE_ITEMS",
                    investigation_defaults.min_evidence_items,
                )?,
                confidence_threshold: parse_var(
                    "CONFIDENCE_THRESHOLD",
                    investigation_defaults.confidence_threshold,
                )?,
                max_information_gaps: parse_var(
                    "MAX_INFORMATION_GAPS",
                    investigation_defaults.max_information_gaps,
                )?,
                max_conversation_turns: parse_var(
                    "MAX_CONVERSATION_TURNS",
                    investigation_defaults.max_conversation_turns,
                )?,
            },
            frontend: FrontendConfig {
                port: parse_var("FRONTEND_PORT", 5000)?,
                host: env::var("FRONTEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                api_url: env::var("INTELLIGENCE_API_URL")
                    .unwrap_or_else(|_| "http://localhost:8000/api/v1/intelligence".to_string()),
                chat_timeout_secs: parse_var("FRONTEND_CHAT_TIMEOUT_SECS", 900)?,
                report_timeout_secs: parse_var("FRONTEND_REPORT_TIMEOUT_SECS", 60)?,
            },
            logging: LoggingConfig {
                dir: env::var("LOG_DIR").ok().filter(|s| !s.trim().is_empty()).map(PathBuf::from),
                file_prefix: env::var("LOG_FILE_PREFIX")
                    .unwrap_or_else(|_| "intel_gather.log".to_string()),
            },
        })
    }
}

fn default_model_for(provider: LLMProvider) -> &'static str {
    match provider {
        LLMProvider::OpenAI => "gpt-4o",
        LLMProvider::Anthropic => "claude-3-5-sonnet-latest",
        LLMProvider::Google => "gemini-2.5-pro",
        LLMProvider::OpenRouter => "openai/gpt-4o",
        LLMProvider::Groq => "llama-3.3-70b-versatile",
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", name, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_api_key_follows_provider() {
        let mut llm = LLMConfig::default();
        assert_eq!(llm.active_api_key(), None);

        llm.google_api_key = "g-key".to_string();
        llm.openai_api_key = "o-key".to_string();
        assert_eq!(llm.active_api_key(), Some("g-key".to_string()));

        llm.provider = LLMProvider::OpenAI;
        assert_eq!(llm.active_api_key(), Some("o-key".to_string()));

        llm.provider = LLMProvider::Groq;
        llm.groq_api_key = "   ".to_string();
        assert_eq!(llm.active_api_key(), None);
    }

    #[test]
    fn test_model_override() {
        let llm = LLMConfig::default();
        assert_eq!(llm.model_for(&None), "gemini-2.5-pro");
        assert_eq!(llm.model_for(&Some("gpt-4-turbo".to_string())), "gpt-4-turbo");
        assert_eq!(llm.model_for(&Some(" ".to_string())), "gemini-2.5-pro");
    }

    #[test]
    fn test_parse_var_default_and_error() {
        assert_eq!(parse_var("INTEL_GATHER_TEST_UNSET_VAR", 42u16).unwrap(), 42);

        std::env::set_var("INTEL_GATHER_TEST_BAD_PORT", "not-a-port");
        assert!(parse_var("INTEL_GATHER_TEST_BAD_PORT", 1u16).is_err());
        std::env::remove_var("INTEL_GATHER_TEST_BAD_PORT");
    }
}
