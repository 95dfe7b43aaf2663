//! Query Analysis Agent
//!
//! Decomposes the customer's request into target entities, a classification
//! (complexity, sensitivity, type, scope) and initial information
//! requirements. Without an LLM it falls back to pattern-based entity
//! extraction over the raw query.

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::agents::parsing::{extract_json, raw_section, section, section_items};
use crate::agents::{AgentContext, AgentRole};
use crate::models::{AgentMessage, Entity, EntityType, InvestigationState, MessageType};
use crate::utils::lenient;

const SYSTEM_PROMPT: &str = r#"
You are an intelligence analyst specialised in query decomposition and entity recognition.
Identify every target entity (people, organizations, locations), the kinds of information
requested, and the scope, sensitivity and complexity of the request. Consider explicit
targets as well as implied or related ones. Answer with a single JSON object.
"#;

const PRIMARY_CONFIDENCE: f64 = 0.8;
const SECONDARY_CONFIDENCE: f64 = 0.6;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Classification {
    #[serde(deserialize_with = "lenient::opt_string")]
    complexity: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    sensitivity_level: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    investigation_type: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    estimated_scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    #[serde(deserialize_with = "lenient::string")]
    name: String,
    #[serde(rename = "type", alias = "entity_type", default, deserialize_with = "lenient::string")]
    kind: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    priority: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    context_clues: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    potential_aliases: Vec<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    relationship_to_primary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InformationRequirements {
    #[serde(deserialize_with = "lenient::string_list")]
    primary_objectives: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    information_categories: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    specific_questions: Vec<String>,
}

pub struct QueryAnalysisAgent;

impl QueryAnalysisAgent {
    pub async fn process(state: &mut InvestigationState, ctx: &AgentContext) {
        info!(session_id = %state.session_id, query_len = state.query.len(), "Analyzing query");

        let prompt = Self::analysis_prompt(&state.query);
        match ctx.complete(AgentRole::QueryAnalysis, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => Self::apply_analysis(state, &reply),
            Err(_) => Self::fallback_analysis(state),
        }
    }

    fn analysis_prompt(query: &str) -> String {
        format!(
            r#"Analyze this intelligence request:
"{query}"

Respond with ONLY this JSON structure:
{{
  "query_classification": {{
    "complexity": "simple|moderate|complex|highly_complex",
    "sensitivity_level": "low|medium|high|critical",
    "investigation_type": "person|organization|location|multi-target|relationship_mapping",
    "estimated_scope": "narrow|broad|comprehensive"
  }},
  "primary_entities": [
    {{
      "name": "entity name",
      "type": "person|organization|location|event|relationship",
      "priority": "critical|high|medium|low",
      "confidence": 0.0,
      "context_clues": ["clue"],
      "potential_aliases": ["alias"]
    }}
  ],
  "secondary_entities": [
    {{
      "name": "related entity",
      "type": "person|organization|location|event|relationship",
      "relationship_to_primary": "description",
      "priority": "high|medium|low"
    }}
  ],
  "information_requirements": {{
    "primary_objectives": ["objective"],
    "information_categories": ["financial", "operational", "personal", "legal", "relationships"],
    "specific_questions": ["question"]
  }},
  "collection_strategy": {{
    "recommended_approaches": ["interview", "document_review"],
    "potential_sources": ["source type"],
    "risk_considerations": ["risk"]
  }}
}}"#,
            query = query
        )
    }

    fn apply_analysis(state: &mut InvestigationState, reply: &str) {
        let root = extract_json(reply).unwrap_or_else(|| {
            warn!(session_id = %state.session_id, "Query analysis reply had no JSON, using defaults");
            json!({})
        });

        let entities = Self::collect_entities(&root);
        state.target_entities = entities;

        let classification: Classification = section(&root, "query_classification");
        let meta = &mut state.metadata;
        meta.complexity = Some(classification.complexity.unwrap_or_else(|| "moderate".to_string()));
        meta.sensitivity_level =
            Some(classification.sensitivity_level.unwrap_or_else(|| "medium".to_string()));
        meta.investigation_type =
            Some(classification.investigation_type.unwrap_or_else(|| "multi-target".to_string()));
        meta.estimated_scope =
            Some(classification.estimated_scope.unwrap_or_else(|| "broad".to_string()));

        if root.get("information_requirements").is_some() {
            let requirements: InformationRequirements = section(&root, "information_requirements");
            state.information_gaps = requirements.primary_objectives;
            state.metadata.information_categories = requirements.information_categories;
            state.metadata.specific_questions = requirements.specific_questions;
        }

        if let Some(strategy) = raw_section(&root, "collection_strategy") {
            state.metadata.collection_strategy = Some(strategy);
        }

        let categories: HashSet<EntityType> =
            state.target_entities.iter().map(|e| e.entity_type).collect();
        let high_priority = state
            .target_entities
            .iter()
            .filter(|e| matches!(e.priority.as_str(), "critical" | "high"))
            .count();
        let complexity = state.metadata.complexity.clone().unwrap_or_default();
        let sensitivity = state.metadata.sensitivity_level.clone().unwrap_or_default();

        let message = AgentMessage::new(
            AgentRole::QueryAnalysis.display_name(),
            format!(
                "Query analysis complete. Identified {} entities across {} categories. Investigation classified as {} complexity with {} sensitivity.",
                state.target_entities.len(),
                categories.len(),
                complexity,
                sensitivity
            ),
            MessageType::Analysis,
        )
        .with_metadata(json!({
            "entities_count": state.target_entities.len(),
            "primary_entities": high_priority,
            "complexity": complexity,
            "sensitivity": sensitivity,
        }));
        state.push_message(message);

        info!(
            session_id = %state.session_id,
            entities = state.target_entities.len(),
            complexity = %complexity,
            "Query analysis complete"
        );
    }

    fn collect_entities(root: &serde_json::Value) -> Vec<Entity> {
        let mut entities = Vec::new();

        for raw in section_items::<RawEntity>(root, "primary_entities") {
            if let Some(mut entity) = Self::to_entity(&raw, PRIMARY_CONFIDENCE, "medium") {
                entity
                    .metadata
                    .insert("context_clues".into(), json!(raw.context_clues));
                entity
                    .metadata
                    .insert("potential_aliases".into(), json!(raw.potential_aliases));
                entity.metadata.insert("entity_category".into(), json!("primary"));
                entities.push(entity);
            }
        }

        for raw in section_items::<RawEntity>(root, "secondary_entities") {
            // secondary entities always carry the lower fixed confidence
            let mut raw = raw;
            raw.confidence = None;
            if let Some(mut entity) = Self::to_entity(&raw, SECONDARY_CONFIDENCE, "low") {
                entity.metadata.insert(
                    "relationship_to_primary".into(),
                    json!(raw
                        .relationship_to_primary
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string())),
                );
                entity.metadata.insert("entity_category".into(), json!("secondary"));
                entities.push(entity);
            }
        }

        entities
    }

    fn to_entity(raw: &RawEntity, default_confidence: f64, default_priority: &str) -> Option<Entity> {
        let name = raw.name.trim();
        if name.is_empty() {
            return None;
        }
        let Some(entity_type) = EntityType::from_label(&raw.kind) else {
            warn!(entity = %name, entity_type = %raw.kind, "Skipping entity with unknown type");
            return None;
        };
        let mut entity = Entity::new(
            name,
            entity_type,
            raw.confidence.unwrap_or(default_confidence),
        );
        entity.priority = raw
            .priority
            .clone()
            .unwrap_or_else(|| default_priority.to_string())
            .to_lowercase();
        entity.description = raw.description.clone();
        Some(entity)
    }

    fn fallback_analysis(state: &mut InvestigationState) {
        warn!(session_id = %state.session_id, "Using pattern-based fallback analysis");

        let entities = extract_entities(&state.query);
        state.target_entities = entities;

        let meta = &mut state.metadata;
        meta.complexity = Some("moderate".to_string());
        meta.sensitivity_level = Some("medium".to_string());
        meta.investigation_type = Some("multi-target".to_string());
        meta.extraction_method = Some("enhanced_fallback".to_string());

        let count = state.target_entities.len();
        let message = AgentMessage::new(
            AgentRole::QueryAnalysis.display_name(),
            format!(
                "Fallback analysis complete. Identified {} potential entities using pattern matching.",
                count
            ),
            MessageType::Warning,
        )
        .with_metadata(json!({ "fallback_used": true, "entities_extracted": count }));
        state.push_message(message);
    }
}

fn organization_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b[A-Z][\w&.-]*(?:\s+[A-Z][\w&.-]*)*\s+(?i:corporation|company|corp|inc|llc|ltd|organization|agency|department)\b",
        )
        .expect("valid regex")
    })
}

fn location_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:in|at|from)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").expect("valid regex")
    })
}

fn proper_noun_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("valid regex"))
}

/// Capitalized words that start requests rather than name anything.
const LEADING_STOP_WORDS: &[&str] = &[
    "investigate", "find", "what", "who", "where", "when", "why", "how", "tell", "research",
    "look", "check", "gather", "search", "please", "the", "a", "an", "is", "are", "does", "do",
    "can", "could", "i", "we", "provide", "identify", "give", "show", "get", "analyze", "any",
    "all", "about", "information", "intelligence", "on",
];

fn strip_leading_stop_words(name: &str) -> Option<String> {
    let words: Vec<&str> = name.split_whitespace().collect();
    let start = words
        .iter()
        .position(|w| !LEADING_STOP_WORDS.contains(&w.to_lowercase().as_str()))?;
    Some(words[start..].join(" "))
}

/// Pattern-based entity extraction: organizations (corporate suffix), then
/// locations (`in|at|from` + capitalized words), then remaining proper-noun
/// runs of at most three words as persons. Never returns an empty list.
pub fn extract_entities(query: &str) -> Vec<Entity> {
    let mut entities: Vec<Entity> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut push = |entities: &mut Vec<Entity>, name: String, entity_type, confidence, pattern| {
        if seen.insert(name.to_lowercase()) {
            let mut entity = Entity::new(name, entity_type, confidence);
            entity.metadata.insert("extraction_method".into(), json!("pattern_matching"));
            entity.metadata.insert("pattern_type".into(), json!(pattern));
            entities.push(entity);
        }
    };

    for m in organization_pattern().find_iter(query) {
        if let Some(name) = strip_leading_stop_words(m.as_str()) {
            push(&mut entities, name, EntityType::Organization, 0.7, "organization");
        }
    }

    for caps in location_pattern().captures_iter(query) {
        if let Some(name) = caps.get(1).and_then(|m| strip_leading_stop_words(m.as_str())) {
            push(&mut entities, name, EntityType::Location, 0.6, "location");
        }
    }

    for m in proper_noun_pattern().find_iter(query) {
        let Some(name) = strip_leading_stop_words(m.as_str()) else {
            continue;
        };
        if name.split_whitespace().count() <= 3 {
            push(&mut entities, name, EntityType::Person, 0.5, "proper_noun");
        }
    }

    if entities.is_empty() {
        let mut unknown = Entity::new("Unknown Target", EntityType::Person, 0.3);
        unknown
            .metadata
            .insert("extraction_method".into(), json!("fallback_default"));
        entities.push(unknown);
    }

    entities
}
