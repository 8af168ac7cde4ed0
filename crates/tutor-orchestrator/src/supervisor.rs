//! Supervisor routing (§4.8): picks one of the four sub-agents for a
//! `final_transcript`. Navigation commands always win; otherwise questions
//! in `teaching` interrupt into `answering`.

use crate::navigation::{parse_navigation_command, NavCommand};
use crate::state::OrchestratorState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentChoice {
    Teaching,
    Qa,
    Assessment,
    Navigation(NavCommand),
}

const QUESTION_WORDS: &[&str] = &["what", "why", "how", "when", "where", "who", "which", "can you explain", "is it"];
const ASSESSMENT_WORDS: &[&str] = &["quiz me", "test me", "ask me a question", "give me a question"];

pub fn route(state: OrchestratorState, text: &str) -> AgentChoice {
    if let Some(cmd) = parse_navigation_command(text) {
        return AgentChoice::Navigation(cmd);
    }

    let lower = text.to_lowercase();
    if ASSESSMENT_WORDS.iter().any(|w| lower.contains(w)) {
        return AgentChoice::Assessment;
    }

    if looks_like_question(&lower) {
        return AgentChoice::Qa;
    }

    match state {
        OrchestratorState::Teaching | OrchestratorState::Idle | OrchestratorState::WaitingForUser => AgentChoice::Teaching,
        OrchestratorState::Answering | OrchestratorState::Ended => AgentChoice::Qa,
    }
}

fn looks_like_question(lower: &str) -> bool {
    lower.trim_end().ends_with('?') || QUESTION_WORDS.iter().any(|w| lower.starts_with(w) || lower.contains(&format!(" {w} ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn navigation_command_wins_regardless_of_state() {
        assert_eq!(route(OrchestratorState::Answering, "pause"), AgentChoice::Navigation(NavCommand::Pause));
    }

    #[test]
    fn question_in_teaching_interrupts_to_qa() {
        assert_eq!(route(OrchestratorState::Teaching, "what is a Kalman filter?"), AgentChoice::Qa);
    }

    #[test]
    fn non_question_in_teaching_stays_teaching() {
        assert_eq!(route(OrchestratorState::Teaching, "okay that makes sense"), AgentChoice::Teaching);
    }

    #[test]
    fn assessment_keyword_routes_to_assessment_agent() {
        assert_eq!(route(OrchestratorState::Teaching, "quiz me on this module"), AgentChoice::Assessment);
    }
}
