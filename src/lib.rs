// Intel Gather - multi-agent LLM investigation service with a chat frontend

pub mod agents;
pub mod config;
pub mod frontend;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod report;
pub mod routes;
pub mod services;
pub mod types;
pub mod utils;

use std::sync::Arc;

pub use config::Config;
pub use models::AppState;
pub use routes::create_router;

use agents::AgentContext;
use llm::LLM;
use services::InvestigationService;
use types::AppResult;

/// Wires the configured LLM provider into the agents and the session store.
pub fn build_state(config: Config) -> AppResult<AppState> {
    let llm = LLM::from_config(&config.llm)?;
    let agents = AgentContext::new(Arc::new(llm), config.llm.clone());
    let service = InvestigationService::new(agents, config.investigation.clone());
    Ok(AppState {
        config,
        service: Arc::new(service),
    })
}
