//! Pivot Agent
//!
//! Scores each user answer, turns what it revealed into evidence and points
//! the investigation at the new angles it opened.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agents::parsing::{extract_json, section};
use crate::agents::{AgentContext, AgentRole};
use crate::models::{
    AgentMessage, Evidence, EvidenceType, InvestigationState, MessageType,
};
use crate::utils::{lenient, truncate_chars};

const SYSTEM_PROMPT: &str = r#"
You are an intelligence analyst reviewing interview answers. Judge how
credible and specific each answer is, extract actionable facts and
revelations, and identify the new investigative angles and gaps it opens.
Answer with a single JSON object.
"#;

const DEFAULT_CREDIBILITY: f64 = 0.5;
const FALLBACK_CONFIDENCE: f64 = 0.6;
const EVIDENCE_SOURCE: &str = "user_interview";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IntelligenceValue {
    #[serde(deserialize_with = "lenient::opt_f64")]
    credibility_score: Option<f64>,
    #[serde(deserialize_with = "lenient::opt_string")]
    information_density: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    key_revelations: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PivotOpportunities {
    #[serde(deserialize_with = "lenient::string_list")]
    new_investigation_angles: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    information_gaps_identified: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EvidenceAssessment {
    #[serde(deserialize_with = "lenient::string_list")]
    actionable_intelligence: Vec<String>,
}

/// What the last pivot analysis found, handed to question adaptation.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotDigest {
    pub credibility: f64,
    pub angles: Vec<String>,
    pub gaps: Vec<String>,
    pub next_focus: Vec<String>,
}

impl PivotDigest {
    /// Built from the most recent Pivot Agent analysis message. `None` when
    /// the last answer was only recorded by the fallback.
    pub fn from_state(state: &InvestigationState) -> Option<Self> {
        let pivot_name = AgentRole::Pivot.display_name();
        let message = state
            .conversation_history
            .iter()
            .rev()
            .find(|m| m.agent_name == pivot_name)?;
        if message.message_type != MessageType::Analysis {
            return None;
        }
        let credibility = message
            .metadata
            .get("credibility_score")
            .and_then(lenient::as_f64)?;
        let angles = message
            .metadata
            .get("new_angles")
            .map(lenient::as_string_list)
            .unwrap_or_default()
            .into_iter()
            .take(3)
            .collect();

        let gaps_from = state.information_gaps.len().saturating_sub(3);
        Some(Self {
            credibility,
            angles,
            gaps: state.information_gaps[gaps_from..].to_vec(),
            next_focus: state.investigation_focus.iter().take(2).cloned().collect(),
        })
    }
}

pub struct PivotAgent;

impl PivotAgent {
    pub async fn process(state: &mut InvestigationState, response: &str, ctx: &AgentContext) {
        info!(session_id = %state.session_id, response_len = response.len(), "Analyzing user response");

        let prompt = Self::pivot_prompt(state, response);
        match ctx.complete(AgentRole::Pivot, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => Self::apply_analysis(state, &reply),
            Err(_) => Self::fallback_analysis(state, response),
        }
    }

    fn pivot_prompt(state: &InvestigationState, response: &str) -> String {
        let entities = state
            .target_entities
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Analyze this interview response for intelligence value.

QUERY: {query}
TARGET ENTITIES: {entities}
QUESTIONS ASKED:
{questions}
CURRENT FOCUS: {focus}
KNOWN GAPS: {gaps}

USER RESPONSE:
"{response}"

Respond with ONLY this JSON structure:
{{
  "intelligence_value": {{
    "credibility_score": 0.0,
    "information_density": "low|medium|high",
    "key_revelations": ["revelation"]
  }},
  "pivot_opportunities": {{
    "new_investigation_angles": ["angle"],
    "information_gaps_identified": ["gap"]
  }},
  "evidence_assessment": {{
    "actionable_intelligence": ["fact"],
    "verification_needed": ["claim"]
  }}
}}"#,
            query = state.query,
            entities = entities,
            questions = state.current_questions.join("\n"),
            focus = state.investigation_focus.join("; "),
            gaps = state.information_gaps.join("; "),
            response = response,
        )
    }

    fn apply_analysis(state: &mut InvestigationState, reply: &str) {
        let root = extract_json(reply).unwrap_or_else(|| {
            warn!(session_id = %state.session_id, "Pivot reply had no JSON, using defaults");
            json!({})
        });

        let value: IntelligenceValue = section(&root, "intelligence_value");
        let opportunities: PivotOpportunities = section(&root, "pivot_opportunities");
        let assessment: EvidenceAssessment = section(&root, "evidence_assessment");

        let credibility = value
            .credibility_score
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_CREDIBILITY)
            .clamp(0.0, 1.0);

        let before = state.evidence_pool.len();
        for fact in assessment.actionable_intelligence {
            Self::record_evidence(state, fact, EvidenceType::Testimony, credibility);
        }
        for revelation in value.key_revelations {
            Self::record_evidence(state, revelation, EvidenceType::Intelligence, credibility);
        }
        let extracted = state.evidence_pool.len() - before;

        let angles = opportunities.new_investigation_angles;
        if !angles.is_empty() {
            state.investigation_focus = angles.iter().take(3).cloned().collect();
        }
        let new_gaps = opportunities.information_gaps_identified.len();
        state
            .information_gaps
            .extend(opportunities.information_gaps_identified);

        state.confidence_score = (state.confidence_score + 0.1 * credibility).min(1.0);

        let mut parts = vec![format!("Credibility: {:.2}", credibility)];
        if !angles.is_empty() {
            parts.push(format!("{} new investigation angles identified", angles.len()));
        }
        if new_gaps > 0 {
            parts.push(format!("{} information gaps identified", new_gaps));
        }

        state.push_message(
            AgentMessage::new(
                AgentRole::Pivot.display_name(),
                format!("Pivot analysis complete: {}", parts.join(", ")),
                MessageType::Analysis,
            )
            .with_metadata(json!({
                "credibility_score": credibility,
                "information_density": value.information_density,
                "new_angles": angles,
                "new_angles_count": angles.len(),
                "evidence_extracted": extracted,
            })),
        );

        info!(
            session_id = %state.session_id,
            credibility,
            evidence_extracted = extracted,
            new_angles = angles.len(),
            "Pivot analysis complete"
        );
    }

    fn record_evidence(
        state: &mut InvestigationState,
        content: String,
        evidence_type: EvidenceType,
        confidence: f64,
    ) {
        if content.trim().is_empty() {
            return;
        }
        let mut evidence = Evidence::new(content, EVIDENCE_SOURCE, evidence_type, confidence);
        let lowered = evidence.content.to_lowercase();
        evidence.entity_mentions = state
            .target_entities
            .iter()
            .filter(|e| lowered.contains(&e.name.to_lowercase()))
            .map(|e| e.name.clone())
            .collect();
        evidence
            .metadata
            .insert("extraction_method".into(), Value::from("pivot_analysis"));
        state.evidence_pool.push(evidence);
    }

    fn fallback_analysis(state: &mut InvestigationState, response: &str) {
        let mut evidence = Evidence::new(
            truncate_chars(response, 200),
            EVIDENCE_SOURCE,
            EvidenceType::Testimony,
            FALLBACK_CONFIDENCE,
        );
        evidence
            .metadata
            .insert("extraction_method".into(), Value::from("fallback"));
        state.evidence_pool.push(evidence);

        state.push_message(
            AgentMessage::new(
                AgentRole::Pivot.display_name(),
                "Basic pivot analysis completed. Response recorded as evidence.",
                MessageType::Warning,
            )
            .with_metadata(json!({ "fallback_used": true, "evidence_extracted": 1 })),
        );
    }
}
