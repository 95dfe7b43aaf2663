//! Planning & Orchestration Agent
//!
//! Turns the query analysis into a phased collection plan and revisits that
//! plan after every user response.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::agents::parsing::{extract_json, raw_section, section};
use crate::agents::{AgentContext, AgentRole};
use crate::models::{AgentMessage, InvestigationState, MessageType, Phase};
use crate::utils::{lenient, truncate_chars};

const SYSTEM_PROMPT: &str = r#"
You are a senior intelligence operations planner. Build phased collection
strategies that prioritise critical information requirements, sequence
questioning for rapport and verification, and adapt as new information
arrives. Answer with a single JSON object.
"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MissionAnalysis {
    #[serde(deserialize_with = "lenient::string_list")]
    primary_objectives: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    success_criteria: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    critical_information_requirements: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PhasePlan {
    #[serde(deserialize_with = "lenient::string_list")]
    objectives: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    expected_outcomes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InterviewStrategy {
    #[serde(deserialize_with = "lenient::opt_string")]
    questioning_approach: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectiveCompletion {
    #[serde(deserialize_with = "lenient::string_list")]
    completed: Vec<String>,
    #[serde(deserialize_with = "lenient::string_list")]
    blocked: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StrategyAssessment {
    #[serde(deserialize_with = "lenient::opt_string")]
    current_phase_status: Option<String>,
    objective_completion: ObjectiveCompletion,
    #[serde(deserialize_with = "lenient::string_list")]
    new_opportunities: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TacticalAdjustments {
    #[serde(deserialize_with = "lenient::string_list")]
    focus_shifts: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NextPhasePreparation {
    #[serde(deserialize_with = "lenient::opt_string")]
    readiness_assessment: Option<String>,
}

/// Plan key holding the objectives for `phase`, if the plan has one.
fn plan_key(phase: Phase) -> Option<&'static str> {
    match phase {
        Phase::Immediate => Some("phase_1_immediate"),
        Phase::Development => Some("phase_2_development"),
        Phase::Exploitation => Some("phase_3_exploitation"),
        Phase::Synthesis => None,
    }
}

pub struct PlanningAgent;

impl PlanningAgent {
    /// Builds the initial strategic plan and enters the `immediate` phase.
    pub async fn process(state: &mut InvestigationState, ctx: &AgentContext) {
        info!(session_id = %state.session_id, "Developing investigation plan");

        let prompt = Self::plan_prompt(state);
        match ctx.complete(AgentRole::Planning, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => Self::apply_plan(state, &reply),
            Err(_) => Self::fallback_plan(state),
        }
    }

    /// Re-assesses the plan after new evidence. Leaves the state untouched
    /// when the LLM is unavailable.
    pub async fn update_strategy(state: &mut InvestigationState, ctx: &AgentContext) {
        let prompt = Self::update_prompt(state);
        let reply = match ctx.complete(AgentRole::Planning, SYSTEM_PROMPT, prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(session_id = %state.session_id, error = %e, "Strategy update skipped");
                return;
            }
        };
        let Some(root) = extract_json(&reply) else {
            warn!(session_id = %state.session_id, "Strategy update reply had no JSON, keeping plan");
            return;
        };

        let assessment: StrategyAssessment = section(&root, "strategy_assessment");
        let adjustments: TacticalAdjustments = section(&root, "tactical_adjustments");
        let preparation: NextPhasePreparation = section(&root, "next_phase_preparation");

        let meta = &mut state.metadata;
        if let Some(status) = assessment.current_phase_status {
            meta.phase_status = Some(status);
        }
        meta.completed_objectives = assessment.objective_completion.completed;
        meta.blocked_objectives = assessment.objective_completion.blocked;
        if let Some(raw) = raw_section(&root, "tactical_adjustments") {
            meta.tactical_adjustments = Some(raw);
        }

        let new_opportunities = assessment.new_opportunities.len();
        state.information_gaps.extend(assessment.new_opportunities);

        if !adjustments.focus_shifts.is_empty() {
            state.investigation_focus = adjustments.focus_shifts.into_iter().take(3).collect();
        }

        if let Some(readiness) = preparation.readiness_assessment {
            let ready = readiness.trim().eq_ignore_ascii_case("ready");
            state.metadata.next_phase_readiness = Some(readiness);
            if ready {
                Self::advance_phase(state);
            }
        }

        let mut summary = vec![format!(
            "Phase status: {}",
            state.metadata.phase_status_or_default()
        )];
        if new_opportunities > 0 {
            summary.push(format!("{} new opportunities identified", new_opportunities));
        }
        if state.metadata.tactical_adjustments.is_some() {
            summary.push("Tactical adjustments applied".to_string());
        }

        let phase_status = state.metadata.phase_status_or_default().to_string();
        state.push_message(
            AgentMessage::new(
                AgentRole::Planning.display_name(),
                format!("Strategy updated: {}", summary.join(", ")),
                MessageType::StrategyUpdate,
            )
            .with_metadata(json!({
                "phase_status": phase_status,
                "new_opportunities": new_opportunities,
                "current_phase": state.metadata.current_phase,
            })),
        );

        info!(
            session_id = %state.session_id,
            phase = %state.metadata.current_phase,
            phase_status = %phase_status,
            "Strategy updated"
        );
    }

    fn advance_phase(state: &mut InvestigationState) {
        let previous = state.metadata.current_phase;
        let next = previous.next();
        if next == previous {
            return;
        }
        state.metadata.current_phase = next;

        let objectives = plan_key(next).and_then(|key| {
            state
                .metadata
                .strategic_plan
                .as_ref()
                .map(|plan| section::<PhasePlan>(&plan["collection_strategy"], key))
        });
        if let Some(plan) = objectives {
            state.metadata.current_objectives = plan.objectives;
            state.metadata.expected_outcomes = plan.expected_outcomes;
        }

        info!(session_id = %state.session_id, from = %previous, to = %next, "Advanced investigation phase");
    }

    fn plan_prompt(state: &InvestigationState) -> String {
        let entities = state
            .target_entities
            .iter()
            .map(|e| format!("- {} ({}, priority {})", e.name, e.entity_type, e.priority))
            .collect::<Vec<_>>()
            .join("\n");
        let gaps = state
            .information_gaps
            .iter()
            .map(|g| format!("- {}", g))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            r#"Develop an intelligence gathering strategy for this investigation.

QUERY: {query}
COMPLEXITY: {complexity}
SENSITIVITY: {sensitivity}

TARGET ENTITIES:
{entities}

INFORMATION REQUIREMENTS:
{gaps}

Respond with ONLY this JSON structure:
{{
  "mission_analysis": {{
    "primary_objectives": ["objective"],
    "success_criteria": ["criterion"],
    "critical_information_requirements": ["requirement"]
  }},
  "collection_strategy": {{
    "phase_1_immediate": {{ "objectives": ["objective"], "expected_outcomes": ["outcome"] }},
    "phase_2_development": {{ "objectives": ["objective"], "expected_outcomes": ["outcome"] }},
    "phase_3_exploitation": {{ "objectives": ["objective"], "expected_outcomes": ["outcome"] }}
  }},
  "interview_strategy": {{
    "questioning_approach": "direct|indirect|mixed",
    "rapport_building": ["technique"],
    "verification_methods": ["method"]
  }},
  "coordination_plan": {{
    "agent_priorities": ["priority"],
    "decision_points": ["decision point"]
  }}
}}"#,
            query = state.query,
            complexity = state.metadata.complexity.as_deref().unwrap_or("unknown"),
            sensitivity = state.metadata.sensitivity_level.as_deref().unwrap_or("unknown"),
            entities = if entities.is_empty() { "- none identified".to_string() } else { entities },
            gaps = if gaps.is_empty() { "- none recorded".to_string() } else { gaps },
        )
    }

    fn update_prompt(state: &InvestigationState) -> String {
        let recent_evidence = state
            .evidence_pool
            .iter()
            .rev()
            .take(3)
            .map(|e| {
                format!(
                    "- [{}] {} (confidence {:.2})",
                    e.evidence_type.as_str(),
                    truncate_chars(&e.content, 150),
                    e.confidence_score
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let last_response = state
            .conversation_history
            .iter()
            .rev()
            .find(|m| m.is_from_user())
            .map(|m| truncate_chars(&m.message, 500))
            .unwrap_or_default();

        format!(
            r#"Update the investigation strategy based on recent progress.

QUERY: {query}
CURRENT PHASE: {phase}
CURRENT OBJECTIVES: {objectives}
EVIDENCE COLLECTED: {evidence_count}
OVERALL CONFIDENCE: {confidence:.2}
OPEN INFORMATION GAPS: {gaps}

RECENT EVIDENCE:
{recent_evidence}

LATEST USER RESPONSE:
{last_response}

Respond with ONLY this JSON structure:
{{
  "strategy_assessment": {{
    "current_phase_status": "on_track|behind|ahead|blocked",
    "objective_completion": {{ "completed": ["objective"], "blocked": ["objective"] }},
    "new_opportunities": ["opportunity"]
  }},
  "tactical_adjustments": {{
    "focus_shifts": ["area"],
    "questioning_modifications": ["modification"]
  }},
  "next_phase_preparation": {{
    "readiness_assessment": "ready|not_ready",
    "required_actions": ["action"]
  }}
}}"#,
            query = state.query,
            phase = state.metadata.current_phase,
            objectives = state.metadata.current_objectives.join("; "),
            evidence_count = state.evidence_pool.len(),
            confidence = state.confidence_score,
            gaps = state.information_gaps.join("; "),
        )
    }

    fn apply_plan(state: &mut InvestigationState, reply: &str) {
        let Some(root) = extract_json(reply) else {
            warn!(session_id = %state.session_id, "Planning reply had no JSON, using basic plan");
            Self::fallback_plan(state);
            return;
        };

        let mission: MissionAnalysis = section(&root, "mission_analysis");
        let first_phase: PhasePlan = root
            .get("collection_strategy")
            .map(|strategy| section(strategy, "phase_1_immediate"))
            .unwrap_or_default();
        let interview: InterviewStrategy = section(&root, "interview_strategy");

        let phases_planned = root
            .get("collection_strategy")
            .and_then(Value::as_object)
            .map(|phases| phases.keys().filter(|k| k.starts_with("phase_")).count())
            .unwrap_or(0);
        let approach = interview
            .questioning_approach
            .unwrap_or_else(|| "adaptive".to_string());

        let objectives_count = mission.primary_objectives.len();
        let meta = &mut state.metadata;
        meta.primary_objectives = mission.primary_objectives;
        meta.success_criteria = mission.success_criteria;
        meta.current_phase = Phase::Immediate;
        meta.current_objectives = first_phase.objectives;
        meta.expected_outcomes = first_phase.expected_outcomes;
        meta.interview_strategy = raw_section(&root, "interview_strategy");
        meta.coordination_plan = raw_section(&root, "coordination_plan");
        meta.strategic_plan = Some(root);

        if !mission.critical_information_requirements.is_empty() {
            state.information_gaps = mission.critical_information_requirements;
        }

        let summary = format!(
            "{} primary objectives, {} phases planned, {} questioning approach, starting with {} phase",
            objectives_count,
            phases_planned,
            approach,
            Phase::Immediate
        );
        state.push_message(
            AgentMessage::new(
                AgentRole::Planning.display_name(),
                format!("Strategic investigation plan developed: {}", summary),
                MessageType::Planning,
            )
            .with_metadata(json!({
                "phases_planned": phases_planned,
                "objectives_count": objectives_count,
                "current_phase": Phase::Immediate,
            })),
        );

        info!(
            session_id = %state.session_id,
            objectives = objectives_count,
            phases = phases_planned,
            "Strategic plan created"
        );
    }

    fn fallback_plan(state: &mut InvestigationState) {
        let names = state
            .target_entities
            .iter()
            .map(|e| e.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let names = if names.is_empty() { "the query subject".to_string() } else { names };
        let objective = format!("Gather intelligence on {}", names);

        let plan = json!({
            "mission_analysis": { "primary_objectives": [objective] },
            "collection_strategy": {
                "phase_1_immediate": {
                    "objectives": [objective],
                    "expected_outcomes": ["Baseline facts about each target"]
                }
            },
            "interview_strategy": { "questioning_approach": "direct" }
        });

        let meta = &mut state.metadata;
        meta.primary_objectives = vec![objective.clone()];
        meta.current_phase = Phase::Immediate;
        meta.current_objectives = vec![objective];
        meta.expected_outcomes = vec!["Baseline facts about each target".to_string()];
        meta.interview_strategy = plan.get("interview_strategy").cloned();
        meta.strategic_plan = Some(plan);

        state.push_message(
            AgentMessage::new(
                AgentRole::Planning.display_name(),
                format!(
                    "Basic strategic plan created focusing on {}. Using direct questioning approach.",
                    names
                ),
                MessageType::Planning,
            )
            .with_metadata(json!({ "fallback_used": true, "plan_focus": names })),
        );
    }
}
