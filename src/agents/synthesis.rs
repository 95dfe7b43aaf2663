//! Synthesis & Reporting Agent
//!
//! Condenses the whole investigation record into an [`IntelligenceReport`].

use chrono::Utc;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

use crate::agents::parsing::{extract_json, section, section_items};
use crate::agents::{AgentContext, AgentRole};
use crate::models::{
    EntityProfile, Evidence, EvidenceType, IntelligenceAssessment, IntelligenceReport,
    InvestigationState, KeyFinding, RemainingGap, ReportMetadata,
};
use crate::utils::truncate_chars;

const SYSTEM_PROMPT: &str = r#"
You are a senior intelligence analyst writing a final assessment. Synthesize
all collected evidence into clear findings with calibrated confidence, profile
each target, surface patterns and connections, and state what remains unknown.
Answer with a single JSON object.
"#;

const PARSE_FAILURE_SUMMARY: &str =
    "Report generation encountered parsing issues. Raw analysis available in appendices.";
const HIGH_CONFIDENCE: f64 = 0.7;

pub struct SynthesisAgent;

impl SynthesisAgent {
    pub async fn generate_report(state: &InvestigationState, ctx: &AgentContext) -> IntelligenceReport {
        info!(
            session_id = %state.session_id,
            evidence = state.evidence_pool.len(),
            "Generating intelligence report"
        );

        let prompt = Self::report_prompt(state);
        let report = match ctx.complete(AgentRole::Synthesis, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => Self::parse_report(state, &reply),
            Err(_) => Self::fallback_report(state),
        };

        info!(
            session_id = %state.session_id,
            findings = report.key_findings.len(),
            confidence = report.confidence_score,
            method = %report.metadata.generation_method,
            "Report generated"
        );
        report
    }

    fn report_prompt(state: &InvestigationState) -> String {
        let entities = state
            .target_entities
            .iter()
            .map(|e| {
                format!(
                    "- {} ({}, priority {}, confidence {:.2})",
                    e.name, e.entity_type, e.priority, e.confidence_score
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let gaps_from = state.information_gaps.len().saturating_sub(10);

        format!(
            r#"Generate an intelligence report from this investigation.

QUERY: {query}
OVERALL CONFIDENCE: {confidence:.2}
INVESTIGATION FOCUS: {focus}

TARGET ENTITIES:
{entities}

EVIDENCE BY TYPE:
{evidence}

AGENT ACTIVITY:
{conversation}

OUTSTANDING INFORMATION GAPS:
{gaps}

OPEN QUESTIONS:
{questions}

Respond with ONLY this JSON structure:
{{
  "executive_summary": "summary",
  "key_findings": [
    {{ "finding": "finding", "confidence_score": 0.0, "supporting_evidence": ["evidence"], "significance": "high|medium|low" }}
  ],
  "entity_profiles": [
    {{ "entity_name": "name", "entity_type": "type", "profile_summary": "summary", "key_attributes": {{}}, "relationships": ["relationship"], "confidence_score": 0.0 }}
  ],
  "intelligence_assessment": {{
    "overall_confidence": 0.0,
    "information_quality": "low|medium|high",
    "coverage_completeness": 0.0,
    "reliability_assessment": "assessment"
  }},
  "patterns_and_connections": [
    {{ "pattern": "pattern", "entities_involved": ["entity"], "significance": "significance", "confidence": 0.0 }}
  ],
  "remaining_gaps": [
    {{ "gap_description": "gap", "priority": "high|medium|low", "recommended_approach": "approach" }}
  ],
  "strategic_recommendations": [
    {{ "recommendation": "action", "rationale": "why", "priority": "high|medium|low", "timeline": "when" }}
  ],
  "appendices": {{}}
}}"#,
            query = state.query,
            confidence = state.confidence_score,
            focus = state.investigation_focus.join("; "),
            entities = entities,
            evidence = Self::evidence_digest(&state.evidence_pool),
            conversation = Self::conversation_digest(state),
            gaps = state.information_gaps[gaps_from..].join("\n"),
            questions = state.current_questions.join("\n"),
        )
    }

    /// Evidence grouped by type with average confidence and the three
    /// strongest items per group.
    fn evidence_digest(pool: &[Evidence]) -> String {
        if pool.is_empty() {
            return "No evidence collected".to_string();
        }
        let mut groups: BTreeMap<EvidenceType, Vec<&Evidence>> = BTreeMap::new();
        for evidence in pool {
            groups.entry(evidence.evidence_type).or_default().push(evidence);
        }

        let mut out = Vec::new();
        for (kind, mut items) in groups {
            let average =
                items.iter().map(|e| e.confidence_score).sum::<f64>() / items.len() as f64;
            out.push(format!(
                "{} ({} items, average confidence {:.2}):",
                kind.as_str().to_uppercase(),
                items.len(),
                average
            ));
            items.sort_by(|a, b| b.confidence_score.total_cmp(&a.confidence_score));
            for item in items.iter().take(3) {
                out.push(format!(
                    "- {} (confidence {:.2})",
                    truncate_chars(&item.content, 100),
                    item.confidence_score
                ));
            }
        }
        out.join("\n")
    }

    fn conversation_digest(state: &InvestigationState) -> String {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, (usize, &str)> = HashMap::new();
        for message in &state.conversation_history {
            let name = message.agent_name.as_str();
            let entry = latest.entry(name).or_insert_with(|| {
                order.push(name);
                (0, "")
            });
            entry.0 += 1;
            entry.1 = message.message.as_str();
        }
        order
            .into_iter()
            .filter_map(|name| {
                latest.get(name).map(|(count, last)| {
                    format!("- {}: {} messages, latest: {}", name, count, truncate_chars(last, 150))
                })
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn parse_report(state: &InvestigationState, reply: &str) -> IntelligenceReport {
        let Some(root) = extract_json(reply) else {
            warn!(session_id = %state.session_id, "Report reply had no JSON");
            let mut appendices = Map::new();
            appendices.insert(
                "raw_response".into(),
                Value::from(reply.chars().take(1000).collect::<String>()),
            );
            return Self::report(
                state,
                PARSE_FAILURE_SUMMARY.to_string(),
                Vec::new(),
                0.5,
                ReportMetadata {
                    intelligence_assessment: IntelligenceAssessment {
                        overall_confidence: Some(0.5),
                        ..IntelligenceAssessment::default()
                    },
                    appendices,
                    generation_method: "parse_fallback".to_string(),
                    ..ReportMetadata::default()
                },
            );
        };

        let executive_summary = root
            .get("executive_summary")
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("Intelligence report for: {}", state.query));
        let assessment: IntelligenceAssessment = section(&root, "intelligence_assessment");
        let confidence = assessment
            .overall_confidence
            .filter(|c| c.is_finite())
            .unwrap_or(state.confidence_score);
        let appendices = root
            .get("appendices")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let key_findings = section_items::<KeyFinding>(&root, "key_findings")
            .into_iter()
            .filter(|f| !f.finding.trim().is_empty())
            .collect();

        Self::report(
            state,
            executive_summary,
            key_findings,
            confidence,
            ReportMetadata {
                entity_profiles: section_items(&root, "entity_profiles"),
                patterns_and_connections: section_items(&root, "patterns_and_connections"),
                remaining_gaps: section_items(&root, "remaining_gaps"),
                strategic_recommendations: section_items(&root, "strategic_recommendations"),
                intelligence_assessment: assessment,
                appendices,
                generation_method: "llm".to_string(),
                limitations: None,
            },
        )
    }

    fn fallback_report(state: &InvestigationState) -> IntelligenceReport {
        let summary = format!(
            "Investigation conducted for query: {}. Collected {} pieces of evidence. Analyzed {} target entities.",
            state.query,
            state.evidence_pool.len(),
            state.target_entities.len()
        );

        let key_findings = state
            .evidence_pool
            .iter()
            .filter(|e| e.confidence_score > HIGH_CONFIDENCE)
            .take(5)
            .map(|e| KeyFinding {
                finding: truncate_chars(&e.content, 100),
                confidence_score: e.confidence_score,
                supporting_evidence: vec![e.source.clone()],
                significance: "medium".to_string(),
            })
            .collect();

        let entity_profiles = state
            .target_entities
            .iter()
            .map(|e| EntityProfile {
                entity_name: e.name.clone(),
                entity_type: e.entity_type.to_string(),
                profile_summary: e
                    .description
                    .clone()
                    .unwrap_or_else(|| format!("{} identified during query analysis", e.entity_type)),
                confidence_score: e.confidence_score,
                ..EntityProfile::default()
            })
            .collect();

        let remaining_gaps = state
            .information_gaps
            .iter()
            .map(|gap| RemainingGap {
                gap_description: gap.clone(),
                priority: "medium".to_string(),
                recommended_approach: "Follow-up interview".to_string(),
            })
            .collect();

        Self::report(
            state,
            summary,
            key_findings,
            state.confidence_score,
            ReportMetadata {
                entity_profiles,
                remaining_gaps,
                intelligence_assessment: IntelligenceAssessment {
                    overall_confidence: Some(state.confidence_score),
                    ..IntelligenceAssessment::default()
                },
                generation_method: "fallback".to_string(),
                limitations: Some(
                    "Automated synthesis was unavailable; findings are limited to high-confidence evidence."
                        .to_string(),
                ),
                ..ReportMetadata::default()
            },
        )
    }

    fn report(
        state: &InvestigationState,
        executive_summary: String,
        key_findings: Vec<KeyFinding>,
        confidence: f64,
        metadata: ReportMetadata,
    ) -> IntelligenceReport {
        IntelligenceReport {
            session_id: state.session_id,
            executive_summary,
            key_findings,
            confidence_score: confidence.clamp(0.0, 1.0),
            evidence_count: state.evidence_pool.len(),
            generated_at: Utc::now(),
            metadata,
        }
    }
}
