//! Orchestrator state machine shape (§4.8): states, the teaching cursor a
//! resumed session must restore, and the repeated-failure window.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    Teaching,
    WaitingForUser,
    Answering,
    Ended,
}

impl From<OrchestratorState> for tutor_protocol::voice::VoiceState {
    fn from(s: OrchestratorState) -> Self {
        match s {
            OrchestratorState::Idle => tutor_protocol::voice::VoiceState::Idle,
            OrchestratorState::Teaching => tutor_protocol::voice::VoiceState::Teaching,
            OrchestratorState::WaitingForUser => tutor_protocol::voice::VoiceState::WaitingForUser,
            OrchestratorState::Answering => tutor_protocol::voice::VoiceState::Answering,
            OrchestratorState::Ended => tutor_protocol::voice::VoiceState::Ended,
        }
    }
}

/// Where in the current topic's content teaching was interrupted, so an
/// interrupting question resumes at the interrupted position rather than
/// restarting the segment (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeachingPosition {
    pub module_id: String,
    pub topic_id: String,
    pub cursor_chars: usize,
}

/// Sliding window over recent component failures (STT/LLM/TTS), used to end
/// a session once failures exceed the §4.8 threshold (default 3 in 60s).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FailureWindow {
    /// Unix millis of each failure still inside the window.
    timestamps_ms: Vec<i64>,
}

impl FailureWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure at `now_ms` and report whether the count within
    /// `window_ms` now meets or exceeds `threshold`.
    pub fn record(&mut self, now_ms: i64, window_ms: i64, threshold: usize) -> bool {
        self.timestamps_ms.push(now_ms);
        self.timestamps_ms.retain(|&t| now_ms - t <= window_ms);
        self.timestamps_ms.len() >= threshold
    }
}

/// Full recoverable state for one voice session, checkpointed to the hot
/// cache and DRS on every transition (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub course_id: Option<String>,
    pub state: OrchestratorState,
    pub position: Option<TeachingPosition>,
    pub failures: FailureWindow,
}

impl Checkpoint {
    pub fn new(session_id: impl Into<String>, course_id: Option<String>) -> Self {
        Self {
            session_id: session_id.into(),
            course_id,
            state: OrchestratorState::Idle,
            position: None,
            failures: FailureWindow::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_window_trips_at_threshold_within_window() {
        let mut window = FailureWindow::new();
        assert!(!window.record(0, 60_000, 3));
        assert!(!window.record(10_000, 60_000, 3));
        assert!(window.record(20_000, 60_000, 3));
    }

    #[test]
    fn failure_window_forgets_failures_outside_window() {
        let mut window = FailureWindow::new();
        window.record(0, 60_000, 3);
        window.record(10_000, 60_000, 3);
        assert!(!window.record(100_000, 60_000, 3));
    }

    #[test]
    fn checkpoint_round_trips_through_json() {
        let checkpoint = Checkpoint::new("session-1", Some("course-1".to_string()));
        let json = serde_json::to_string(&checkpoint).unwrap();
        let restored: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.session_id, "session-1");
        assert_eq!(restored.state, OrchestratorState::Idle);
    }
}
