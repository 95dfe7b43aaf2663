//! Investigation orchestration.
//!
//! Owns the in-memory session map and drives each investigation through the
//! agent pipeline. The map lock is only held to look up, insert or remove a
//! session; a per-session mutex serializes requests on the same session for
//! the whole pipeline run.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::agents::{
    AgentContext, PivotAgent, PivotDigest, PlanningAgent, QueryAnalysisAgent, RetrievalAgent,
    SynthesisAgent,
};
use crate::config::InvestigationConfig;
use crate::models::{
    AgentMessage, IntelligenceQueryRequest, IntelligenceReport, InvestigationState,
    InvestigationStatus, InvestigationSummary, InvestigationUpdate, MessageType, Phase,
    PHASE_STATUS_ON_TRACK, PIPELINE_AGENT_NAME, SYSTEM_AGENT_NAME, USER_AGENT_NAME,
};
use crate::types::{AppError, AppResult};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

struct CachedReport {
    revision: u64,
    report: IntelligenceReport,
}

pub struct Session {
    pub state: InvestigationState,
    report: Option<CachedReport>,
}

pub struct InvestigationService {
    sessions: RwLock<HashMap<Uuid, Arc<Mutex<Session>>>>,
    agents: AgentContext,
    limits: InvestigationConfig,
    updates: broadcast::Sender<InvestigationUpdate>,
}

impl InvestigationService {
    pub fn new(agents: AgentContext, limits: InvestigationConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            agents,
            limits,
            updates,
        }
    }

    /// Live updates for every session; receivers filter by `session_id`.
    pub fn subscribe(&self) -> broadcast::Receiver<InvestigationUpdate> {
        self.updates.subscribe()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn exists(&self, session_id: Uuid) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    async fn session(&self, session_id: Uuid) -> AppResult<Arc<Mutex<Session>>> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Investigation {} not found", session_id)))
    }

    fn publish(&self, state: &InvestigationState, kind: &str) {
        let update = InvestigationUpdate {
            session_id: state.session_id,
            kind: kind.to_string(),
            data: json!(state.summary()),
        };
        // no subscribers is not an error
        let _ = self.updates.send(update);
    }

    /// Runs query analysis, planning and the first round of questions.
    pub async fn start(&self, request: IntelligenceQueryRequest) -> AppResult<InvestigationState> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::InvalidRequest("query must not be empty".to_string()));
        }

        let mut state = InvestigationState::new(query);
        info!(
            session_id = %state.session_id,
            priority = %request.priority,
            has_context = request.context.is_some(),
            "Starting investigation"
        );
        state.status = InvestigationStatus::InProgress;
        state.touch();

        QueryAnalysisAgent::process(&mut state, &self.agents).await;
        state.touch();
        PlanningAgent::process(&mut state, &self.agents).await;
        state.touch();
        RetrievalAgent::process(&mut state, &self.agents).await;

        state.status = InvestigationStatus::WaitingForInput;
        let complexity = state
            .metadata
            .complexity
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let message = format!(
            "Intelligence gathering pipeline initialized. Identified {} target entities with {} complexity. Investigation proceeding in {} phase with strategic questioning approach.",
            state.target_entities.len(),
            complexity,
            state.metadata.current_phase
        );
        state.push_message(AgentMessage::new(PIPELINE_AGENT_NAME, message, MessageType::System));
        state.touch();

        let snapshot = state.clone();
        self.sessions.write().await.insert(
            state.session_id,
            Arc::new(Mutex::new(Session { state, report: None })),
        );
        self.publish(&snapshot, "investigation_started");

        info!(
            session_id = %snapshot.session_id,
            entities = snapshot.target_entities.len(),
            progress = snapshot.progress,
            "Investigation awaiting input"
        );
        Ok(snapshot)
    }

    /// Folds a user answer into the investigation and decides whether to keep
    /// questioning.
    pub async fn respond(&self, session_id: Uuid, response: &str) -> AppResult<InvestigationState> {
        let response = response.trim();
        if response.is_empty() {
            return Err(AppError::InvalidRequest("response must not be empty".to_string()));
        }

        let session = self.session(session_id).await?;
        let mut session = session.lock().await;
        let state = &mut session.state;

        state.status = InvestigationStatus::InProgress;
        state.push_message(AgentMessage::new(USER_AGENT_NAME, response, MessageType::Response));
        state.touch();

        PivotAgent::process(state, response, &self.agents).await;
        state.touch();
        PlanningAgent::update_strategy(state, &self.agents).await;
        state.touch();

        if self.should_continue(state) {
            let adapted = match PivotDigest::from_state(state) {
                Some(digest) => RetrievalAgent::adapt_questions(state, &digest, &self.agents).await,
                None => false,
            };
            if !adapted {
                RetrievalAgent::process(state, &self.agents).await;
            }
            state.status = InvestigationStatus::WaitingForInput;
        } else {
            state.status = InvestigationStatus::Completed;
            state.current_questions.clear();
            let evidence_count = state.evidence_pool.len();
            state.push_message(
                AgentMessage::new(
                    SYSTEM_AGENT_NAME,
                    "Investigation phase complete. Sufficient intelligence gathered for comprehensive analysis.",
                    MessageType::System,
                )
                .with_metadata(json!({
                    "phase": "completion",
                    "evidence_count": evidence_count,
                })),
            );
            info!(session_id = %session_id, evidence = evidence_count, "Investigation complete");
        }
        state.touch();

        let snapshot = state.clone();
        drop(session);
        self.publish(&snapshot, "investigation_updated");
        Ok(snapshot)
    }

    /// Keep asking while evidence, confidence or gaps fall short of the
    /// configured limits and the turn budget is not spent. An on-track
    /// investigation in the exploitation phase always stops.
    pub fn should_continue(&self, state: &InvestigationState) -> bool {
        if state.metadata.current_phase == Phase::Exploitation
            && state.metadata.phase_status_or_default() == PHASE_STATUS_ON_TRACK
        {
            return false;
        }
        let limits = &self.limits;
        let needs_more = state.evidence_pool.len() < limits.min_evidence_items
            || state.confidence_score < limits.confidence_threshold
            || state.information_gaps.len() > limits.max_information_gaps;
        needs_more && state.user_turns() < limits.max_conversation_turns
    }

    pub async fn get(&self, session_id: Uuid) -> AppResult<InvestigationState> {
        let session = self.session(session_id).await?;
        let session = session.lock().await;
        Ok(session.state.clone())
    }

    pub async fn summary(&self, session_id: Uuid) -> AppResult<InvestigationSummary> {
        let session = self.session(session_id).await?;
        let session = session.lock().await;
        Ok(session.state.summary())
    }

    /// Generates the report, or returns the cached one while the state has
    /// not changed since it was produced.
    pub async fn report(&self, session_id: Uuid) -> AppResult<IntelligenceReport> {
        let session = self.session(session_id).await?;
        let mut session = session.lock().await;

        if let Some(cached) = &session.report {
            if cached.revision == session.state.revision {
                return Ok(cached.report.clone());
            }
        }

        let report = SynthesisAgent::generate_report(&session.state, &self.agents).await;

        let state = &mut session.state;
        state.push_message(
            AgentMessage::new(
                SYSTEM_AGENT_NAME,
                format!(
                    "Comprehensive intelligence report generated with {} key findings and confidence score of {:.2}",
                    report.key_findings.len(),
                    report.confidence_score
                ),
                MessageType::Report,
            )
            .with_metadata(json!({ "report_id": format!("report_{}", session_id) })),
        );
        state.status = InvestigationStatus::Completed;
        state.touch();

        let snapshot = state.clone();
        session.report = Some(CachedReport {
            revision: snapshot.revision,
            report: report.clone(),
        });
        drop(session);
        self.publish(&snapshot, "report_generated");
        Ok(report)
    }

    /// Report together with the transcript it was generated from, for export.
    pub async fn report_with_history(
        &self,
        session_id: Uuid,
    ) -> AppResult<(IntelligenceReport, Vec<AgentMessage>)> {
        let report = self.report(session_id).await?;
        let history = self.get(session_id).await?.conversation_history;
        Ok((report, history))
    }

    pub async fn close(&self, session_id: Uuid) -> AppResult<()> {
        let removed = self.sessions.write().await.remove(&session_id);
        let Some(session) = removed else {
            warn!(session_id = %session_id, "Close requested for unknown investigation");
            return Err(AppError::NotFound(format!("Investigation {} not found", session_id)));
        };
        let state = session.lock().await.state.clone();
        self.publish(&state, "investigation_closed");
        info!(session_id = %session_id, "Investigation closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::models::{Evidence, EvidenceType};

    fn limits() -> InvestigationConfig {
        InvestigationConfig {
            min_evidence_items: 5,
            confidence_threshold: 0.7,
            max_information_gaps: 3,
            max_conversation_turns: 20,
        }
    }

    fn offline_service() -> InvestigationService {
        InvestigationService::new(testing::offline_context(), limits())
    }

    #[tokio::test]
    async fn test_start_waits_for_input() {
        let service = offline_service();
        let state = service
            .start(IntelligenceQueryRequest::new("Investigate John Smith from Acme Corp in Berlin"))
            .await
            .unwrap();

        assert_eq!(state.status, InvestigationStatus::WaitingForInput);
        assert_eq!(state.target_entities.len(), 3);
        assert!(!state.current_questions.is_empty());
        assert!(state.progress > 0);
        let last = state.conversation_history.last().unwrap();
        assert_eq!(last.agent_name, PIPELINE_AGENT_NAME);
        assert!(last.message.contains("Identified 3 target entities with moderate complexity"));
        assert_eq!(service.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_blank_query_rejected() {
        let service = offline_service();
        let err = service
            .start(IntelligenceQueryRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
        assert_eq!(service.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let service = offline_service();
        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();

        let fetched = service.get(started.session_id).await.unwrap();
        assert_eq!(fetched.session_id, started.session_id);
        assert_eq!(fetched.query, "Who runs Acme Corp?");
        assert_eq!(fetched.revision, started.revision);

        let missing = service.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_respond_records_answer_and_asks_again() {
        let service = offline_service();
        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();

        let state = service
            .respond(started.session_id, "The CEO is Jane Doe.")
            .await
            .unwrap();

        assert_eq!(state.status, InvestigationStatus::WaitingForInput);
        assert_eq!(state.user_turns(), 1);
        assert_eq!(state.evidence_pool.len(), 1);
        assert!(state.revision > started.revision);
        assert!(state
            .conversation_history
            .iter()
            .any(|m| m.is_from_user() && m.message == "The CEO is Jane Doe."));
    }

    #[tokio::test]
    async fn test_respond_validation() {
        let service = offline_service();
        let err = service.respond(Uuid::new_v4(), "answer").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let err = service.respond(Uuid::new_v4(), " ").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[test]
    fn test_should_continue_rules() {
        let service = offline_service();
        let mut state = InvestigationState::new("q");
        assert!(service.should_continue(&state));

        for i in 0..5 {
            state.evidence_pool.push(Evidence::new(
                format!("fact {}", i),
                "user_interview",
                EvidenceType::Testimony,
                0.9,
            ));
        }
        state.confidence_score = 0.8;
        assert!(!service.should_continue(&state));

        state.information_gaps = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        assert!(service.should_continue(&state));

        state.metadata.current_phase = Phase::Exploitation;
        assert!(!service.should_continue(&state));

        state.metadata.phase_status = Some("behind".into());
        assert!(service.should_continue(&state));

        for _ in 0..20 {
            state.push_message(AgentMessage::new(USER_AGENT_NAME, "x", MessageType::Response));
        }
        assert!(!service.should_continue(&state));
    }

    #[tokio::test]
    async fn test_report_is_idempotent_until_state_changes() {
        let service = offline_service();
        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();
        let id = started.session_id;

        let first = service.report(id).await.unwrap();
        let second = service.report(id).await.unwrap();
        assert_eq!(first.generated_at, second.generated_at);
        assert_eq!(first.executive_summary, second.executive_summary);

        let state = service.get(id).await.unwrap();
        assert_eq!(state.status, InvestigationStatus::Completed);
        let report_messages = state
            .conversation_history
            .iter()
            .filter(|m| m.message_type == MessageType::Report)
            .count();
        assert_eq!(report_messages, 1);

        service.respond(id, "More detail on the board.").await.unwrap();
        let third = service.report(id).await.unwrap();
        assert_eq!(third.evidence_count, 1);
        assert_ne!(third.generated_at, first.generated_at);
    }

    #[tokio::test]
    async fn test_updates_are_broadcast() {
        let service = offline_service();
        let mut updates = service.subscribe();

        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.session_id, started.session_id);
        assert_eq!(update.kind, "investigation_started");
        assert_eq!(update.data["status"], json!("waiting_for_input"));
    }

    #[tokio::test]
    async fn test_close_removes_session() {
        let service = offline_service();
        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();

        service.close(started.session_id).await.unwrap();
        assert_eq!(service.session_count().await, 0);
        assert!(matches!(
            service.close(started.session_id).await.unwrap_err(),
            AppError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_responses_are_serialized() {
        let service = Arc::new(offline_service());
        let started = service
            .start(IntelligenceQueryRequest::new("Who runs Acme Corp?"))
            .await
            .unwrap();
        let id = started.session_id;

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let service = service.clone();
                tokio::spawn(async move { service.respond(id, &format!("answer {}", i)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let state = service.get(id).await.unwrap();
        assert_eq!(state.user_turns(), 4);
        assert_eq!(state.evidence_pool.len(), 4);
    }
}
