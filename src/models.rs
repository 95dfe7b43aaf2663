use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::config::Config;
use crate::services::InvestigationService;
use crate::utils::lenient;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub service: Arc<InvestigationService>,
}

pub const USER_AGENT_NAME: &str = "User";
pub const SYSTEM_AGENT_NAME: &str = "System";
pub const PIPELINE_AGENT_NAME: &str = "Intelligence Pipeline";

// Investigation record

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
    Event,
    Relationship,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
            EntityType::Event => "event",
            EntityType::Relationship => "relationship",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "person" | "individual" => Some(EntityType::Person),
            "organization" | "organisation" | "company" => Some(EntityType::Organization),
            "location" | "place" => Some(EntityType::Location),
            "event" => Some(EntityType::Event),
            "relationship" => Some(EntityType::Relationship),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub entity_type: EntityType,
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub confidence_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: EntityType, confidence_score: f64) -> Self {
        Self {
            name: name.into(),
            entity_type,
            priority: "medium".to_string(),
            description: None,
            confidence_score: confidence_score.clamp(0.0, 1.0),
            metadata: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Testimony,
    Document,
    Intelligence,
    Observation,
    Analysis,
    Verification,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceType::Testimony => "testimony",
            EvidenceType::Document => "document",
            EvidenceType::Intelligence => "intelligence",
            EvidenceType::Observation => "observation",
            EvidenceType::Analysis => "analysis",
            EvidenceType::Verification => "verification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub content: String,
    pub source: String,
    pub evidence_type: EvidenceType,
    pub timestamp: DateTime<Utc>,
    pub confidence_score: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub entity_mentions: Vec<String>,
}

impl Evidence {
    pub fn new(
        content: impl Into<String>,
        source: impl Into<String>,
        evidence_type: EvidenceType,
        confidence_score: f64,
    ) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            evidence_type,
            timestamp: Utc::now(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            metadata: Map::new(),
            entity_mentions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Info,
    Analysis,
    Planning,
    Question,
    Response,
    Adaptation,
    StrategyUpdate,
    Warning,
    System,
    Report,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub agent_name: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentMessage {
    pub fn new(
        agent_name: impl Into<String>,
        message: impl Into<String>,
        message_type: MessageType,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            message: message.into(),
            timestamp: Utc::now(),
            message_type,
            requires_response: false,
            metadata: Map::new(),
        }
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    /// Attaches metadata; non-object values are ignored.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        if let Value::Object(map) = metadata {
            self.metadata = map;
        }
        self
    }

    pub fn is_from_user(&self) -> bool {
        self.agent_name == USER_AGENT_NAME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    Pending,
    InProgress,
    WaitingForInput,
    Completed,
    Failed,
}

impl InvestigationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Pending => "pending",
            InvestigationStatus::InProgress => "in_progress",
            InvestigationStatus::WaitingForInput => "waiting_for_input",
            InvestigationStatus::Completed => "completed",
            InvestigationStatus::Failed => "failed",
        }
    }

    /// Human-readable label shown by the chat frontend.
    pub fn label(&self) -> &'static str {
        match self {
            InvestigationStatus::Pending => "Pending Investigation",
            InvestigationStatus::InProgress => "Investigation in Progress",
            InvestigationStatus::WaitingForInput => "Waiting for Your Input",
            InvestigationStatus::Completed => "Investigation Complete",
            InvestigationStatus::Failed => "Investigation Failed",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Immediate,
    Development,
    Exploitation,
    Synthesis,
}

impl Phase {
    pub fn next(self) -> Self {
        match self {
            Phase::Immediate => Phase::Development,
            Phase::Development => Phase::Exploitation,
            Phase::Exploitation | Phase::Synthesis => Phase::Synthesis,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Immediate => "immediate",
            Phase::Development => "development",
            Phase::Exploitation => "exploitation",
            Phase::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const PHASE_STATUS_ON_TRACK: &str = "on_track";

/// Strategy state written by the agents as the investigation advances.
/// Free-form plan sections are kept as JSON since their shape is model-defined.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestigationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensitivity_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investigation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_scope: Option<String>,
    pub information_categories: Vec<String>,
    pub specific_questions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategic_plan: Option<Value>,
    pub primary_objectives: Vec<String>,
    pub success_criteria: Vec<String>,
    pub current_phase: Phase,
    pub current_objectives: Vec<String>,
    pub expected_outcomes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interview_strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordination_plan: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase_status: Option<String>,
    pub completed_objectives: Vec<String>,
    pub blocked_objectives: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactical_adjustments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_phase_readiness: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questioning_strategy: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tactical_considerations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub questioning_adaptation: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_method: Option<String>,
}

impl InvestigationMetadata {
    /// Phase status as last reported by a strategy update; `on_track` until then.
    pub fn phase_status_or_default(&self) -> &str {
        self.phase_status.as_deref().unwrap_or(PHASE_STATUS_ON_TRACK)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationState {
    pub session_id: Uuid,
    pub query: String,
    pub status: InvestigationStatus,
    pub target_entities: Vec<Entity>,
    pub evidence_pool: Vec<Evidence>,
    pub conversation_history: Vec<AgentMessage>,
    pub current_questions: Vec<String>,
    pub information_gaps: Vec<String>,
    pub investigation_focus: Vec<String>,
    pub confidence_score: f64,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: InvestigationMetadata,
    /// Bumped on every mutation; a report is reused while this is unchanged.
    pub revision: u64,
}

impl InvestigationState {
    pub fn new(query: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            query: query.into(),
            status: InvestigationStatus::Pending,
            target_entities: Vec::new(),
            evidence_pool: Vec::new(),
            conversation_history: Vec::new(),
            current_questions: Vec::new(),
            information_gaps: Vec::new(),
            investigation_focus: Vec::new(),
            confidence_score: 0.0,
            progress: 0,
            created_at: now,
            updated_at: now,
            metadata: InvestigationMetadata::default(),
            revision: 0,
        }
    }

    pub fn push_message(&mut self, message: AgentMessage) {
        self.conversation_history.push(message);
    }

    pub fn user_turns(&self) -> usize {
        self.conversation_history
            .iter()
            .filter(|m| m.is_from_user())
            .count()
    }

    /// Records a mutation: clamps confidence, recomputes progress and bumps the revision.
    pub fn touch(&mut self) {
        self.confidence_score = if self.confidence_score.is_finite() {
            self.confidence_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.progress = crate::services::progress::calculate_progress(self);
        self.revision += 1;
        self.updated_at = Utc::now();
    }

    pub fn summary(&self) -> InvestigationSummary {
        InvestigationSummary {
            session_id: self.session_id,
            status: self.status,
            entities_identified: self.target_entities.len(),
            evidence_collected: self.evidence_pool.len(),
            confidence_score: self.confidence_score,
            information_gaps: self.information_gaps.len(),
            conversation_turns: self.user_turns(),
            current_phase: self.metadata.current_phase,
            complexity: self
                .metadata
                .complexity
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// Report

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyFinding {
    #[serde(deserialize_with = "lenient::string")]
    pub finding: String,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub confidence_score: f64,
    #[serde(deserialize_with = "lenient::string_list")]
    pub supporting_evidence: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub significance: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityProfile {
    #[serde(alias = "name", deserialize_with = "lenient::string")]
    pub entity_name: String,
    #[serde(alias = "type", deserialize_with = "lenient::string")]
    pub entity_type: String,
    #[serde(deserialize_with = "lenient::string")]
    pub profile_summary: String,
    pub key_attributes: Map<String, Value>,
    #[serde(deserialize_with = "lenient::string_list")]
    pub relationships: Vec<String>,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub confidence_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConnection {
    #[serde(deserialize_with = "lenient::string")]
    pub pattern: String,
    #[serde(deserialize_with = "lenient::string_list")]
    pub entities_involved: Vec<String>,
    #[serde(deserialize_with = "lenient::string")]
    pub significance: String,
    #[serde(deserialize_with = "lenient::f64_or_zero")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemainingGap {
    #[serde(deserialize_with = "lenient::string")]
    pub gap_description: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,
    #[serde(deserialize_with = "lenient::string")]
    pub recommended_approach: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategicRecommendation {
    #[serde(deserialize_with = "lenient::string")]
    pub recommendation: String,
    #[serde(deserialize_with = "lenient::string")]
    pub rationale: String,
    #[serde(deserialize_with = "lenient::string")]
    pub priority: String,
    #[serde(deserialize_with = "lenient::string")]
    pub timeline: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceAssessment {
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub overall_confidence: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub information_quality: Option<String>,
    #[serde(deserialize_with = "lenient::opt_f64")]
    pub coverage_completeness: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    pub reliability_assessment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportMetadata {
    pub entity_profiles: Vec<EntityProfile>,
    pub patterns_and_connections: Vec<PatternConnection>,
    pub remaining_gaps: Vec<RemainingGap>,
    pub strategic_recommendations: Vec<StrategicRecommendation>,
    pub intelligence_assessment: IntelligenceAssessment,
    pub appendices: Map<String, Value>,
    /// `llm`, `parse_fallback` or `fallback`.
    pub generation_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limitations: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceReport {
    pub session_id: Uuid,
    pub executive_summary: String,
    pub key_findings: Vec<KeyFinding>,
    pub confidence_score: f64,
    pub evidence_count: usize,
    pub generated_at: DateTime<Utc>,
    pub metadata: ReportMetadata,
}

// API payloads

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("must not be empty".into());
        return Err(error);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IntelligenceQueryRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub query: String,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub context: Option<Map<String, Value>>,
}

fn default_priority() -> String {
    "medium".to_string()
}

impl IntelligenceQueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            priority: default_priority(),
            context: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RespondRequest {
    #[serde(default)]
    #[validate(custom(function = "not_blank"))]
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationSummary {
    pub session_id: Uuid,
    pub status: InvestigationStatus,
    pub entities_identified: usize,
    pub evidence_collected: usize,
    pub confidence_score: f64,
    pub information_gaps: usize,
    pub conversation_turns: usize,
    pub current_phase: Phase,
    pub complexity: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub service: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<HealthComponents>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthComponents {
    pub llm_provider: String,
    pub llm_model: String,
    pub llm_api_key: String,
    pub active_sessions: usize,
}

// Live updates

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationUpdate {
    pub session_id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

/// Frame sent over `/ws/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl WebSocketMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_phase_progression() {
        assert_eq!(Phase::Immediate.next(), Phase::Development);
        assert_eq!(Phase::Development.next(), Phase::Exploitation);
        assert_eq!(Phase::Exploitation.next(), Phase::Synthesis);
        assert_eq!(Phase::Synthesis.next(), Phase::Synthesis);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let value = serde_json::to_value(InvestigationStatus::WaitingForInput).unwrap();
        assert_eq!(value, json!("waiting_for_input"));
        let value = serde_json::to_value(MessageType::StrategyUpdate).unwrap();
        assert_eq!(value, json!("strategy_update"));
    }

    #[test]
    fn test_touch_clamps_and_bumps_revision() {
        let mut state = InvestigationState::new("Who runs Acme Corp?");
        state.confidence_score = 1.7;
        state.touch();
        assert_eq!(state.confidence_score, 1.0);
        assert_eq!(state.revision, 1);

        state.confidence_score = f64::NAN;
        state.touch();
        assert_eq!(state.confidence_score, 0.0);
        assert_eq!(state.revision, 2);
    }

    #[test]
    fn test_user_turns_counts_only_user_messages() {
        let mut state = InvestigationState::new("q");
        state.push_message(AgentMessage::new(USER_AGENT_NAME, "a", MessageType::Response));
        state.push_message(AgentMessage::new("Pivot Agent", "b", MessageType::Analysis));
        state.push_message(AgentMessage::new(USER_AGENT_NAME, "c", MessageType::Response));
        assert_eq!(state.user_turns(), 2);
    }

    #[test]
    fn test_blank_query_fails_validation() {
        assert!(IntelligenceQueryRequest::new("   ").validate().is_err());
        assert!(IntelligenceQueryRequest::new("Investigate Acme").validate().is_ok());

        let request: RespondRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_report_sections_tolerate_drift() {
        let profile: EntityProfile = serde_json::from_value(json!({
            "name": "Acme Corp",
            "type": "organization",
            "confidence_score": "0.8",
            "relationships": "Parent of Acme Labs"
        }))
        .unwrap();
        assert_eq!(profile.entity_name, "Acme Corp");
        assert_eq!(profile.entity_type, "organization");
        assert_eq!(profile.confidence_score, 0.8);
        assert_eq!(profile.relationships.len(), 1);
    }
}
