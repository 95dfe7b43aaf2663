//! Investigation progress score.
//!
//! Progress is a weighted sum of capped sub-scores, clamped to `0..=100`:
//!
//! | sub-score    | weight                                    | cap |
//! |--------------|-------------------------------------------|-----|
//! | entities     | 8 per entity                              | 25  |
//! | evidence     | 7 per evidence item                       | 35  |
//! | conversation | 4 per user response                       | 20  |
//! | analysis     | 5 per agent with analysis/planning/adaptation messages | 15 |
//! | phase        | development 3, exploitation and synthesis 5 | 5 |
//! | confidence   | `floor(10 * confidence)`                  | 10  |

use std::collections::HashSet;

use crate::models::{InvestigationState, MessageType, Phase};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressBreakdown {
    pub entities: u32,
    pub evidence: u32,
    pub conversation: u32,
    pub analysis: u32,
    pub phase: u32,
    pub confidence_bonus: u32,
}

impl ProgressBreakdown {
    pub fn total(&self) -> u8 {
        let sum = self.entities
            + self.evidence
            + self.conversation
            + self.analysis
            + self.phase
            + self.confidence_bonus;
        sum.min(100) as u8
    }
}

fn capped(count: usize, weight: u32, cap: u32) -> u32 {
    u32::try_from(count)
        .unwrap_or(u32::MAX)
        .saturating_mul(weight)
        .min(cap)
}

pub fn breakdown(state: &InvestigationState) -> ProgressBreakdown {
    let analysing_agents: HashSet<&str> = state
        .conversation_history
        .iter()
        .filter(|m| !m.is_from_user())
        .filter(|m| {
            matches!(
                m.message_type,
                MessageType::Analysis | MessageType::Planning | MessageType::Adaptation
            )
        })
        .map(|m| m.agent_name.as_str())
        .collect();

    // Synthesis keeps the exploitation score so advancing never lowers progress.
    let phase = match state.metadata.current_phase {
        Phase::Immediate => 0,
        Phase::Development => 3,
        Phase::Exploitation | Phase::Synthesis => 5,
    };

    let confidence = if state.confidence_score.is_finite() {
        state.confidence_score.clamp(0.0, 1.0)
    } else {
        0.0
    };

    ProgressBreakdown {
        entities: capped(state.target_entities.len(), 8, 25),
        evidence: capped(state.evidence_pool.len(), 7, 35),
        conversation: capped(state.user_turns(), 4, 20),
        analysis: capped(analysing_agents.len(), 5, 15),
        phase,
        confidence_bonus: (confidence * 10.0).floor() as u32,
    }
}

pub fn calculate_progress(state: &InvestigationState) -> u8 {
    let parts = breakdown(state);
    let total = parts.total();
    tracing::debug!(
        session_id = %state.session_id,
        progress = total,
        entities = parts.entities,
        evidence = parts.evidence,
        conversation = parts.conversation,
        analysis = parts.analysis,
        phase = parts.phase,
        confidence_bonus = parts.confidence_bonus,
        "Progress calculated"
    );
    total
}
