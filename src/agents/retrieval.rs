//! Retrieval Agent
//!
//! Formulates the questions put to the user. The first round comes from the
//! plan; later rounds are rewritten from the pivot digest of the latest
//! answer.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agents::parsing::{extract_json, raw_section, section, section_items};
use crate::agents::{AgentContext, AgentRole, PivotDigest};
use crate::models::{AgentMessage, EntityType, InvestigationState, MessageType};
use crate::utils::{lenient, truncate_chars};

const SYSTEM_PROMPT: &str = r#"
You are an expert intelligence interviewer. Ask clear, non-leading questions
that build rapport, verify earlier claims and close the most important
information gaps first. Answer with a single JSON object.
"#;

const MAX_QUESTIONS: usize = 4;
const MAX_FALLBACK_QUESTIONS: usize = 3;
const NO_QUESTIONS_MESSAGE: &str =
    "I need to gather more information to continue our investigation effectively.";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct QuestionStrategy {
    #[serde(deserialize_with = "lenient::opt_string")]
    primary_approach: Option<String>,
    #[serde(deserialize_with = "lenient::opt_string")]
    questioning_phase: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionItem {
    #[serde(alias = "question", deserialize_with = "lenient::string")]
    question_text: String,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    priority: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdaptationStrategy {
    #[serde(deserialize_with = "lenient::opt_string")]
    pivot_response: Option<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    new_priorities: Vec<String>,
}

fn priority_rank(priority: Option<&str>) -> u8 {
    match priority.map(|p| p.trim().to_lowercase()).as_deref() {
        Some("critical") => 0,
        Some("high") => 1,
        Some("low") => 3,
        _ => 2,
    }
}

/// Question strings from a list whose items are plain strings or
/// `{question_text}` objects.
fn question_texts(value: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Object(map) => map
                .get("question_text")
                .or_else(|| map.get("question"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .filter(|q| !q.trim().is_empty())
        .collect()
}

fn lead_in(phase: &str) -> &'static str {
    match phase {
        "opening" => "Let me start by understanding the basics:",
        "probing" => "I need to probe deeper into some specific aspects:",
        "verification" => "Let me verify some important details:",
        _ => "Now I'd like to explore some key areas in more detail:",
    }
}

/// Lead-in followed by the questions, numbered when there is more than one.
fn format_questions(lead: &str, questions: &[String]) -> String {
    match questions {
        [] => NO_QUESTIONS_MESSAGE.to_string(),
        [single] => format!("{}\n\n{}", lead, single),
        many => {
            let numbered = many
                .iter()
                .enumerate()
                .map(|(i, q)| format!("{}. {}", i + 1, q))
                .collect::<Vec<_>>()
                .join("\n\n");
            format!("{}\n\n{}", lead, numbered)
        }
    }
}

pub struct RetrievalAgent;

impl RetrievalAgent {
    pub async fn process(state: &mut InvestigationState, ctx: &AgentContext) {
        info!(session_id = %state.session_id, phase = %state.metadata.current_phase, "Formulating questions");

        let prompt = Self::question_prompt(state);
        match ctx.complete(AgentRole::Retrieval, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => Self::apply_questions(state, &reply),
            Err(_) => Self::fallback_questions(state),
        }
    }

    /// Rewrites the open questions around what the last answer revealed.
    /// Returns `false`, leaving the state untouched, when no adapted
    /// questions could be produced.
    pub async fn adapt_questions(
        state: &mut InvestigationState,
        digest: &PivotDigest,
        ctx: &AgentContext,
    ) -> bool {
        let prompt = Self::adapt_prompt(state, digest);
        let reply = match ctx.complete(AgentRole::Retrieval, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Question adaptation skipped");
                return false;
            }
        };
        let Some(root) = extract_json(&reply) else {
            warn!(session_id = %state.session_id, "Adaptation reply had no JSON");
            return false;
        };

        let mut questions: Vec<String> = section_items::<QuestionItem>(&root, "adapted_questions")
            .into_iter()
            .map(|q| q.question_text)
            .filter(|q| !q.trim().is_empty())
            .collect();
        let follow_ups = root
            .get("follow_up_strategy")
            .and_then(|s| s.get("immediate_follow_ups"));
        questions.extend(question_texts(follow_ups).into_iter().take(2));
        questions.truncate(MAX_QUESTIONS);

        if questions.is_empty() {
            warn!(session_id = %state.session_id, "Adaptation produced no questions");
            return false;
        }

        let strategy: AdaptationStrategy = section(&root, "adaptation_strategy");
        if let Some(raw) = raw_section(&root, "adaptation_strategy") {
            state.metadata.questioning_adaptation = Some(raw);
        }

        let mut summary = Vec::new();
        if let Some(pivot) = &strategy.pivot_response {
            summary.push(format!("Strategy: {}", pivot));
        }
        summary.push(format!("{} questions adapted", questions.len()));
        if !strategy.new_priorities.is_empty() {
            summary.push(format!(
                "New priorities: {}",
                strategy
                    .new_priorities
                    .iter()
                    .take(2)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }

        let count = questions.len();
        state.current_questions = questions;
        state.push_message(
            AgentMessage::new(
                AgentRole::Retrieval.display_name(),
                format!("Questions adapted based on pivot analysis: {}", summary.join(", ")),
                MessageType::Adaptation,
            )
            .requiring_response()
            .with_metadata(json!({
                "questions_count": count,
                "credibility_score": digest.credibility,
                "adaptation_strategy": strategy.pivot_response,
            })),
        );

        info!(session_id = %state.session_id, questions = count, "Questions adapted");
        true
    }

    fn question_prompt(state: &InvestigationState) -> String {
        let entities = state
            .target_entities
            .iter()
            .map(|e| format!("- {} ({})", e.name, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");
        let recent = state
            .conversation_history
            .iter()
            .rev()
            .take(3)
            .rev()
            .map(|m| format!("{}: {}", m.agent_name, truncate_chars(&m.message, 200)))
            .collect::<Vec<_>>()
            .join("\n");
        let approach = state
            .metadata
            .interview_strategy
            .as_ref()
            .and_then(|s| s.get("questioning_approach"))
            .and_then(Value::as_str)
            .unwrap_or("adaptive");

        format!(
            r#"Formulate strategic questions for the next interview round.

QUERY: {query}
CURRENT PHASE: {phase}
CURRENT OBJECTIVES: {objectives}
QUESTIONING APPROACH: {approach}
EVIDENCE COLLECTED: {evidence}
INFORMATION GAPS: {gaps}
INVESTIGATION FOCUS: {focus}

TARGET ENTITIES:
{entities}

RECENT CONVERSATION:
{recent}

Respond with ONLY this JSON structure:
{{
  "question_strategy": {{
    "primary_approach": "approach",
    "questioning_phase": "opening|development|probing|verification",
    "information_priority": ["priority"]
  }},
  "questions": [
    {{ "question_text": "question", "priority": "critical|high|medium|low", "purpose": "why" }}
  ],
  "questioning_sequence": {{
    "opening_questions": ["question"],
    "core_questions": ["question"],
    "verification_questions": ["question"]
  }},
  "tactical_considerations": {{
    "sensitivity_notes": ["note"],
    "follow_up_triggers": ["trigger"]
  }}
}}"#,
            query = state.query,
            phase = state.metadata.current_phase,
            objectives = state.metadata.current_objectives.join("; "),
            approach = approach,
            evidence = state.evidence_pool.len(),
            gaps = state.information_gaps.join("; "),
            focus = state.investigation_focus.join("; "),
            entities = entities,
            recent = recent,
        )
    }

    fn adapt_prompt(state: &InvestigationState, digest: &PivotDigest) -> String {
        format!(
            r#"Adapt the questioning strategy to the latest pivot analysis.

QUERY: {query}
CURRENT QUESTIONS: {current}

PIVOT ANALYSIS:
RESPONSE CREDIBILITY: {credibility:.2}
NEW ANGLES: {angles}
NEW GAPS: {gaps}
RECOMMENDED FOCUS: {focus}

Respond with ONLY this JSON structure:
{{
  "adaptation_strategy": {{
    "pivot_response": "how questioning changes",
    "new_priorities": ["priority"]
  }},
  "adapted_questions": [
    {{ "question_text": "question", "adaptation_reason": "why" }}
  ],
  "follow_up_strategy": {{
    "immediate_follow_ups": ["question"]
  }}
}}"#,
            query = state.query,
            current = state.current_questions.join(" | "),
            credibility = digest.credibility,
            angles = digest.angles.join("; "),
            gaps = digest.gaps.join("; "),
            focus = digest.next_focus.join("; "),
        )
    }

    fn apply_questions(state: &mut InvestigationState, reply: &str) {
        let root = extract_json(reply).unwrap_or_else(|| {
            warn!(session_id = %state.session_id, "Retrieval reply had no JSON");
            json!({})
        });

        let strategy: QuestionStrategy = section(&root, "question_strategy");
        let mut items: Vec<QuestionItem> = section_items(&root, "questions");
        items.retain(|q| !q.question_text.trim().is_empty());
        items.sort_by_key(|q| priority_rank(q.priority.as_deref()));
        let mut questions: Vec<String> = items
            .into_iter()
            .take(MAX_QUESTIONS)
            .map(|q| q.question_text)
            .collect();

        if questions.is_empty() {
            if let Some(sequence) = root.get("questioning_sequence") {
                for key in ["opening_questions", "core_questions", "verification_questions"] {
                    questions.extend(question_texts(sequence.get(key)).into_iter().take(2));
                }
                questions.truncate(MAX_QUESTIONS);
            }
        }

        let phase = strategy.questioning_phase.clone().unwrap_or_else(|| {
            let default_phase = if state.user_turns() == 0 { "opening" } else { "development" };
            default_phase.to_string()
        });

        state.metadata.questioning_strategy = raw_section(&root, "question_strategy");
        state.metadata.tactical_considerations = raw_section(&root, "tactical_considerations");

        let text = format_questions(lead_in(&phase.to_lowercase()), &questions);
        let count = questions.len();
        state.current_questions = questions;
        state.push_message(
            AgentMessage::new(AgentRole::Retrieval.display_name(), text, MessageType::Question)
                .requiring_response()
                .with_metadata(json!({
                    "questions_count": count,
                    "questioning_phase": phase,
                    "primary_approach": strategy.primary_approach,
                })),
        );

        info!(session_id = %state.session_id, questions = count, phase = %phase, "Questions formulated");
    }

    fn fallback_questions(state: &mut InvestigationState) {
        let mut questions = Vec::new();

        if let Some(entity) = state.target_entities.first() {
            let name = &entity.name;
            questions.push(format!(
                "Could you tell me more about {}? What's your relationship or connection to them?",
                name
            ));
            match entity.entity_type {
                EntityType::Person => {
                    questions.push(format!(
                        "What do you know about {}'s current activities or whereabouts?",
                        name
                    ));
                    questions.push(format!(
                        "Are there any people or organizations closely associated with {}?",
                        name
                    ));
                }
                EntityType::Organization => {
                    questions.push(format!(
                        "What can you tell me about {}'s operations or business activities?",
                        name
                    ));
                    questions.push(format!("Who are the key people involved with {}?", name));
                }
                _ => {}
            }
        }

        for gap in state.information_gaps.iter().take(2) {
            questions.push(format!(
                "Regarding {}, what information can you share?",
                gap.to_lowercase()
            ));
        }

        if questions.is_empty() {
            questions.push(
                "Could you provide more context about what you're looking for and why?".to_string(),
            );
        }
        questions.truncate(MAX_FALLBACK_QUESTIONS);

        let text = format_questions(
            "Let me ask some key questions to better understand the situation:",
            &questions,
        );
        state.current_questions = questions;
        state.push_message(
            AgentMessage::new(AgentRole::Retrieval.display_name(), text, MessageType::Question)
                .requiring_response()
                .with_metadata(json!({ "fallback_used": true })),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing;
    use crate::models::Entity;

    fn state_with_target(entity_type: EntityType) -> InvestigationState {
        let mut state = InvestigationState::new("Who is behind Acme Corp?");
        state
            .target_entities
            .push(Entity::new("Acme Corp", entity_type, 0.8));
        state
    }

    #[tokio::test]
    async fn test_questions_sorted_by_priority_and_capped() {
        let reply = r#"{
            "question_strategy": { "primary_approach": "rapport", "questioning_phase": "probing" },
            "questions": [
                { "question_text": "Low one", "priority": "low" },
                { "question_text": "Critical one", "priority": "critical" },
                { "question_text": "Medium one" },
                { "question_text": "High one", "priority": "HIGH" },
                { "question_text": "Another critical", "priority": "critical" }
            ]
        }"#;
        let ctx = testing::context(&[("Formulate strategic questions", reply)]);
        let mut state = state_with_target(EntityType::Organization);

        RetrievalAgent::process(&mut state, &ctx).await;

        assert_eq!(
            state.current_questions,
            vec!["Critical one", "Another critical", "High one", "Medium one"]
        );
        let message = state.conversation_history.last().unwrap();
        assert_eq!(message.message_type, MessageType::Question);
        assert!(message.requires_response);
        assert!(message
            .message
            .starts_with("I need to probe deeper into some specific aspects:\n\n1. Critical one"));
    }

    #[tokio::test]
    async fn test_questioning_sequence_used_when_no_questions() {
        let reply = r#"{
            "questioning_sequence": {
                "opening_questions": ["O1", "O2", "O3"],
                "core_questions": ["C1", "C2"],
                "verification_questions": ["V1"]
            }
        }"#;
        let ctx = testing::context(&[("Formulate strategic questions", reply)]);
        let mut state = state_with_target(EntityType::Organization);

        RetrievalAgent::process(&mut state, &ctx).await;

        assert_eq!(state.current_questions, vec!["O1", "O2", "C1", "C2"]);
        let message = state.conversation_history.last().unwrap();
        assert!(message.message.starts_with("Let me start by understanding the basics:"));
    }

    #[tokio::test]
    async fn test_single_question_is_not_numbered() {
        let reply = r#"{ "questions": [{ "question_text": "Where is the head office?" }] }"#;
        let ctx = testing::context(&[("Formulate strategic questions", reply)]);
        let mut state = state_with_target(EntityType::Organization);

        RetrievalAgent::process(&mut state, &ctx).await;

        let message = state.conversation_history.last().unwrap();
        assert_eq!(
            message.message,
            "Let me start by understanding the basics:\n\nWhere is the head office?"
        );
    }

    #[tokio::test]
    async fn test_fallback_questions_for_person() {
        let ctx = testing::offline_context();
        let mut state = state_with_target(EntityType::Person);
        state.information_gaps = vec!["Financial Ties".to_string()];

        RetrievalAgent::process(&mut state, &ctx).await;

        assert_eq!(state.current_questions.len(), MAX_FALLBACK_QUESTIONS);
        assert!(state.current_questions[0].starts_with("Could you tell me more about Acme Corp?"));
        assert!(state.current_questions[1].contains("current activities"));
        let message = state.conversation_history.last().unwrap();
        assert_eq!(message.metadata["fallback_used"], json!(true));
    }

    #[tokio::test]
    async fn test_fallback_uses_gaps_when_no_entities() {
        let ctx = testing::offline_context();
        let mut state = InvestigationState::new("something odd");
        state.information_gaps = vec!["Funding Sources".to_string(), "Timeline".to_string()];

        RetrievalAgent::process(&mut state, &ctx).await;

        assert_eq!(
            state.current_questions,
            vec![
                "Regarding funding sources, what information can you share?",
                "Regarding timeline, what information can you share?",
            ]
        );
    }

    #[tokio::test]
    async fn test_adapt_questions_from_digest() {
        let reply = r#"{
            "adaptation_strategy": { "pivot_response": "press on finances", "new_priorities": ["banks", "shell firms", "press"] },
            "adapted_questions": [{ "question_text": "Which bank handles payroll?" }],
            "follow_up_strategy": { "immediate_follow_ups": ["Since when?", "Who signs?", "Anything else?"] }
        }"#;
        let ctx = testing::context(&[("Adapt the questioning strategy", reply)]);
        let mut state = state_with_target(EntityType::Organization);
        let digest = PivotDigest {
            credibility: 0.8,
            angles: vec!["offshore".to_string()],
            gaps: vec![],
            next_focus: vec![],
        };

        assert!(RetrievalAgent::adapt_questions(&mut state, &digest, &ctx).await);

        assert_eq!(
            state.current_questions,
            vec!["Which bank handles payroll?", "Since when?", "Who signs?"]
        );
        let message = state.conversation_history.last().unwrap();
        assert_eq!(message.message_type, MessageType::Adaptation);
        assert_eq!(
            message.message,
            "Questions adapted based on pivot analysis: Strategy: press on finances, 3 questions adapted, New priorities: banks, shell firms"
        );
    }

    #[tokio::test]
    async fn test_adapt_without_llm_leaves_questions() {
        let ctx = testing::offline_context();
        let mut state = state_with_target(EntityType::Organization);
        state.current_questions = vec!["Original?".to_string()];
        let digest = PivotDigest {
            credibility: 0.5,
            angles: vec![],
            gaps: vec![],
            next_focus: vec![],
        };

        assert!(!RetrievalAgent::adapt_questions(&mut state, &digest, &ctx).await);
        assert_eq!(state.current_questions, vec!["Original?"]);
        assert!(state.conversation_history.is_empty());
    }
}
