//! Turns an investigation record into what the chat page shows: the reply
//! text, a status label and the key-facts panel.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::agents::AgentRole;
use crate::models::{IntelligenceReport, InvestigationState};
use crate::utils::{lenient, truncate_chars};

const MAX_ENTITY_FACTS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub agent_status: String,
    pub key_facts: Vec<String>,
    pub progress: u8,
    pub session_id: Option<Uuid>,
}

impl ChatReply {
    pub fn from_state(state: &InvestigationState) -> Self {
        Self {
            response: response_text(state),
            agent_status: state.status.label().to_string(),
            key_facts: key_facts(state),
            progress: state.progress,
            session_id: Some(state.session_id),
        }
    }

    /// Reply shown when the API call failed; the client drops its session.
    pub fn error(detail: &str) -> Self {
        Self {
            response: format!(
                "I encountered an error processing your request: {}. Please try again.",
                detail
            ),
            agent_status: "Error".to_string(),
            key_facts: Vec::new(),
            progress: 0,
            session_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportData {
    pub title: String,
    pub summary: String,
    pub key_findings: Vec<String>,
    pub confidence_score: f64,
    pub download_link: String,
}

impl ReportData {
    pub fn from_report(report: &IntelligenceReport) -> Self {
        Self {
            title: format!("Intelligence Report - Session {}", report.session_id),
            summary: report.executive_summary.clone(),
            key_findings: report
                .key_findings
                .iter()
                .map(|f| f.finding.clone())
                .collect(),
            confidence_score: report.confidence_score,
            download_link: format!("/download_report/{}", report.session_id),
        }
    }
}

/// Open questions when there are any, otherwise the latest agent message.
pub fn response_text(state: &InvestigationState) -> String {
    if !state.current_questions.is_empty() {
        return state.current_questions.join("\n");
    }
    state
        .conversation_history
        .iter()
        .rev()
        .find(|m| !m.is_from_user())
        .map(|m| m.message.clone())
        .unwrap_or_else(|| "Investigation in progress...".to_string())
}

fn latest_metadata<'a>(state: &'a InvestigationState, role: AgentRole, key: &str) -> Option<&'a Value> {
    state
        .conversation_history
        .iter()
        .rev()
        .filter(|m| m.agent_name == role.display_name())
        .find_map(|m| m.metadata.get(key))
}

fn metadata_count(state: &InvestigationState, role: AgentRole, key: &str) -> usize {
    latest_metadata(state, role, key)
        .and_then(lenient::as_f64)
        .map(|n| n.max(0.0) as usize)
        .unwrap_or(0)
}

pub fn key_facts(state: &InvestigationState) -> Vec<String> {
    let mut facts = Vec::new();

    for entity in state.target_entities.iter().take(MAX_ENTITY_FACTS) {
        facts.push(format!(
            "Target: {} ({}) - Priority: {}, Confidence: {:.1}",
            entity.name, entity.entity_type, entity.priority, entity.confidence_score
        ));
        let clues = entity
            .metadata
            .get("context_clues")
            .map(lenient::as_string_list)
            .unwrap_or_default();
        if !clues.is_empty() {
            facts.push(format!("Context for {}: {}", entity.name, clues[..clues.len().min(2)].join(", ")));
        }
        let aliases = entity
            .metadata
            .get("potential_aliases")
            .map(lenient::as_string_list)
            .unwrap_or_default();
        if !aliases.is_empty() {
            facts.push(format!("Possible aliases for {}: {}", entity.name, aliases[..aliases.len().min(2)].join(", ")));
        }
    }

    let mut strong: Vec<_> = state
        .evidence_pool
        .iter()
        .filter(|e| e.confidence_score > 0.7)
        .collect();
    strong.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
    for evidence in strong.into_iter().take(3) {
        facts.push(format!(
            "Evidence ({}): {} (Confidence: {:.1})",
            evidence.evidence_type.as_str(),
            truncate_chars(&evidence.content, 60),
            evidence.confidence_score
        ));
    }
    if state.evidence_pool.len() > 3 {
        facts.push(format!("Total evidence collected: {} items", state.evidence_pool.len()));
    }

    let new_angles = metadata_count(state, AgentRole::Pivot, "new_angles_count");
    if new_angles > 0 {
        facts.push(format!("New investigation angles from last response: {}", new_angles));
    }
    let extracted = metadata_count(state, AgentRole::Pivot, "evidence_extracted");
    if extracted > 0 {
        facts.push(format!("Evidence extracted from last response: {}", extracted));
    }

    if let Some(complexity) = &state.metadata.complexity {
        facts.push(format!("Investigation complexity: {}", complexity));
    }
    let primary = metadata_count(state, AgentRole::QueryAnalysis, "primary_entities");
    if primary > 0 {
        facts.push(format!("High-priority targets: {}", primary));
    }

    if state.metadata.strategic_plan.is_some() {
        facts.push(format!("Current phase: {}", state.metadata.current_phase));
        if !state.metadata.primary_objectives.is_empty() {
            facts.push(format!("Planned objectives: {}", state.metadata.primary_objectives.len()));
        }
    }

    if !state.investigation_focus.is_empty() {
        let focus: Vec<&str> = state.investigation_focus.iter().take(2).map(String::as_str).collect();
        facts.push(format!("Current focus: {}", focus.join(", ")));
    }
    if !state.information_gaps.is_empty() {
        facts.push(format!("Information gaps identified: {}", state.information_gaps.len()));
    }
    if let Some(sensitivity) = &state.metadata.sensitivity_level {
        facts.push(format!("Sensitivity level: {}", sensitivity));
    }
    if let Some(status) = &state.metadata.phase_status {
        facts.push(format!("Phase status: {}", status));
    }

    if facts.is_empty() {
        facts.push("Investigation initialized".to_string());
        facts.push("Awaiting intelligence gathering".to_string());
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AgentMessage, Entity, EntityType, Evidence, EvidenceType, InvestigationStatus, MessageType,
    };
    use serde_json::json;

    #[test]
    fn test_empty_state_has_default_facts() {
        let state = InvestigationState::new("q");
        assert_eq!(
            key_facts(&state),
            vec!["Investigation initialized", "Awaiting intelligence gathering"]
        );
    }

    #[test]
    fn test_facts_cover_entities_and_evidence() {
        let mut state = InvestigationState::new("q");
        let mut entity = Entity::new("Acme Corp", EntityType::Organization, 0.8);
        entity.priority = "high".to_string();
        entity
            .metadata
            .insert("context_clues".into(), json!(["shell company", "Malta", "2019"]));
        state.target_entities.push(entity);
        for (content, confidence) in [("weak", 0.3), ("Acme wired funds to Malta", 0.9)] {
            state.evidence_pool.push(Evidence::new(
                content,
                "user_interview",
                EvidenceType::Testimony,
                confidence,
            ));
        }
        state.push_message(
            AgentMessage::new(AgentRole::Pivot.display_name(), "done", MessageType::Analysis)
                .with_metadata(json!({ "new_angles_count": 2, "evidence_extracted": 1 })),
        );

        let facts = key_facts(&state);

        assert_eq!(facts[0], "Target: Acme Corp (organization) - Priority: high, Confidence: 0.8");
        assert_eq!(facts[1], "Context for Acme Corp: shell company, Malta");
        assert!(facts.contains(&"Evidence (testimony): Acme wired funds to Malta (Confidence: 0.9)".to_string()));
        assert!(!facts.iter().any(|f| f.contains("weak")));
        assert!(facts.contains(&"New investigation angles from last response: 2".to_string()));
    }

    #[test]
    fn test_response_prefers_open_questions() {
        let mut state = InvestigationState::new("q");
        state.push_message(AgentMessage::new("System", "Investigation phase complete.", MessageType::System));
        assert_eq!(response_text(&state), "Investigation phase complete.");

        state.current_questions = vec!["Who?".to_string(), "Where?".to_string()];
        assert_eq!(response_text(&state), "Who?\nWhere?");
    }

    #[test]
    fn test_chat_reply_labels_status() {
        let mut state = InvestigationState::new("q");
        state.status = InvestigationStatus::WaitingForInput;
        let reply = ChatReply::from_state(&state);
        assert_eq!(reply.agent_status, "Waiting for Your Input");
        assert_eq!(reply.session_id, Some(state.session_id));

        let error = ChatReply::error("connection refused");
        assert!(error.session_id.is_none());
        assert_eq!(error.agent_status, "Error");
    }
}
