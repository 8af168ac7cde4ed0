//! Teaching orchestrator (component L, §4.8): drives a single voice session
//! with continuous STT in, streamed TTS out, and supervisor routing across
//! four sub-agents. Checkpointed to the hot cache (authoritative for
//! latency) and DRS (authoritative for restart) on every transition.

pub mod agents;
pub mod error;
pub mod navigation;
pub mod state;
pub mod supervisor;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use tutor_cache::HotCache;
use tutor_core::config::{BARGE_IN_STOP_BUDGET_MS, FIRST_AUDIO_CHUNK_BUDGET_MS, TEXT_CHUNK_BUDGET_MS};
use tutor_core::degradation::OnceFlag;
use tutor_drs::Drs;
use tutor_providers::stt::SttEvent;
use tutor_providers::tts::TtsProvider;
use tutor_sessions::SessionManager;

pub use agents::{AssessmentAgent, AssessmentOutcome, QaAgent, TeachingAgent, TeachingChunk};
pub use error::{OrchestratorError, Result};
pub use navigation::NavCommand;
pub use state::{Checkpoint, OrchestratorState, TeachingPosition};
pub use supervisor::AgentChoice;

const CHECKPOINT_CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const FAILURE_WINDOW_MS: i64 = 60_000;
const FAILURE_THRESHOLD: usize = 3;

/// What the orchestrator pushes to the client per §4.8 "Outputs": text
/// chunks, audio chunks, and state-change notifications. The gateway
/// implements this over the voice websocket; tests can implement it over a
/// plain channel.
#[async_trait]
pub trait VoiceEventSink: Send + Sync {
    async fn send_text_chunk(&self, text: &str);
    async fn send_audio_chunk(&self, data: Vec<u8>, end_of_stream: bool);
    async fn send_state(&self, state: OrchestratorState);
    async fn send_error(&self, message: &str);
}

/// One routed turn's result, before it's handed to the sink / TTS.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub text: String,
    pub sources: Vec<String>,
    pub new_state: OrchestratorState,
}

pub struct Orchestrator {
    drs: Arc<Drs>,
    cache: Arc<dyn HotCache>,
    sessions: Arc<SessionManager>,
    qa_agent: QaAgent,
    assessment_agent: AssessmentAgent,
    cache_degraded: OnceFlag,
}

impl Orchestrator {
    pub fn new(drs: Arc<Drs>, cache: Arc<dyn HotCache>, sessions: Arc<SessionManager>, qa_agent: QaAgent, assessment_agent: AssessmentAgent) -> Self {
        Self {
            drs,
            cache,
            sessions,
            qa_agent,
            assessment_agent,
            cache_degraded: OnceFlag::new(),
        }
    }

    fn checkpoint_key(session_id: &str) -> String {
        format!("orchestrator:{session_id}:checkpoint")
    }

    /// Read the cached checkpoint, falling back to the DRS copy, falling
    /// back to a fresh `idle` checkpoint for a session never seen before.
    #[instrument(skip(self))]
    pub async fn load_checkpoint(&self, session_id: &str, course_id: Option<String>) -> Result<Checkpoint> {
        let key = Self::checkpoint_key(session_id);
        match self.cache.get(&key).await {
            Ok(Some(value)) => {
                self.cache_degraded.reset();
                if let Ok(checkpoint) = serde_json::from_value(value) {
                    return Ok(checkpoint);
                }
            }
            Ok(None) => {}
            Err(e) => {
                if self.cache_degraded.fire() {
                    warn!(session_id, error = %e, "checkpoint cache degraded, reading DRS directly");
                }
            }
        }

        if let Some(state_json) = self.drs.load_checkpoint(session_id)? {
            if let Ok(checkpoint) = serde_json::from_str(&state_json) {
                return Ok(checkpoint);
            }
        }

        Ok(Checkpoint::new(session_id, course_id))
    }

    /// Write the checkpoint to the cache synchronously (it's what a resumed
    /// request reads first) and to the DRS in the background (§4.8
    /// "asynchronously to DRS").
    #[instrument(skip(self, checkpoint))]
    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) {
        let key = Self::checkpoint_key(&checkpoint.session_id);
        if let Ok(value) = serde_json::to_value(checkpoint) {
            if let Err(e) = self.cache.set_with_ttl(&key, value, CHECKPOINT_CACHE_TTL_SECS).await {
                if self.cache_degraded.fire() {
                    warn!(session_id = %checkpoint.session_id, error = %e, "checkpoint cache degraded, continuing DRS-only");
                }
            } else {
                self.cache_degraded.reset();
            }
        }

        if let Ok(state_json) = serde_json::to_string(checkpoint) {
            let drs = self.drs.clone();
            let session_id = checkpoint.session_id.clone();
            tokio::spawn(async move {
                if let Err(e) = drs.save_checkpoint(&session_id, &state_json) {
                    warn!(session_id, error = %e, "failed to persist orchestrator checkpoint to DRS");
                }
            });
        }
    }

    /// Barge-in (§4.8): cancel in-flight TTS, transition to the listening
    /// state, and report how long the cancellation actually took so callers
    /// can alarm on the 100ms budget without this module owning the alarm.
    #[instrument(skip(self, cancel, checkpoint))]
    pub async fn handle_speech_started(&self, cancel: &CancellationToken, checkpoint: &mut Checkpoint) -> std::time::Duration {
        let start = Instant::now();
        cancel.cancel();
        checkpoint.state = OrchestratorState::WaitingForUser;
        self.save_checkpoint(checkpoint).await;

        let elapsed = start.elapsed();
        if elapsed.as_millis() as u64 > BARGE_IN_STOP_BUDGET_MS {
            warn!(session_id = %checkpoint.session_id, elapsed_ms = elapsed.as_millis() as u64, "barge-in stop exceeded budget");
        }
        elapsed
    }

    /// Route and dispatch one `final_transcript` (§4.8 supervisor routing).
    #[instrument(skip(self, checkpoint, topic_content))]
    pub async fn handle_final_transcript(&self, checkpoint: &mut Checkpoint, text: &str, topic_content: Option<&str>) -> Result<TurnOutcome> {
        let choice = supervisor::route(checkpoint.state, text);

        let outcome = match &choice {
            AgentChoice::Navigation(NavCommand::End) => TurnOutcome {
                text: "Ending the session here. Great work today.".to_string(),
                sources: Vec::new(),
                new_state: OrchestratorState::Ended,
            },
            AgentChoice::Navigation(NavCommand::Pause) => TurnOutcome {
                text: "Paused. Say \"resume\" whenever you're ready.".to_string(),
                sources: Vec::new(),
                new_state: OrchestratorState::WaitingForUser,
            },
            AgentChoice::Navigation(NavCommand::Resume | NavCommand::Repeat | NavCommand::Next | NavCommand::Previous) => {
                let cursor = checkpoint.position.as_ref().map(|p| p.cursor_chars).unwrap_or(0);
                let content = topic_content.unwrap_or_default();
                let chunk = TeachingAgent::advance(content, cursor);
                update_position(checkpoint, &chunk);
                TurnOutcome {
                    text: chunk.text,
                    sources: Vec::new(),
                    new_state: OrchestratorState::Teaching,
                }
            }
            AgentChoice::Teaching => {
                let cursor = checkpoint.position.as_ref().map(|p| p.cursor_chars).unwrap_or(0);
                let content = topic_content.unwrap_or_default();
                let chunk = TeachingAgent::advance(content, cursor);
                update_position(checkpoint, &chunk);
                TurnOutcome {
                    text: chunk.text,
                    sources: Vec::new(),
                    new_state: OrchestratorState::Teaching,
                }
            }
            AgentChoice::Qa => {
                let course_id = checkpoint.course_id.clone().unwrap_or_default();
                let collection = format!("tutor-{course_id}");
                let answer = self.qa_agent.answer(&collection, &course_id, text).await;
                // Once qa_agent finishes, resume teaching at the interrupted
                // position rather than parking in Answering (§4.8).
                self.resume_teaching(checkpoint);
                match answer {
                    Ok(qa) => TurnOutcome {
                        text: qa.answer,
                        sources: qa.source_chunk_ids,
                        new_state: checkpoint.state,
                    },
                    Err(_) => TurnOutcome {
                        text: "Sorry, I couldn't find an answer to that just now.".to_string(),
                        sources: Vec::new(),
                        new_state: checkpoint.state,
                    },
                }
            }
            AgentChoice::Assessment => TurnOutcome {
                text: "Let's check your understanding.".to_string(),
                sources: Vec::new(),
                new_state: OrchestratorState::Answering,
            },
        };

        checkpoint.state = outcome.new_state;
        self.save_checkpoint(checkpoint).await;
        Ok(outcome)
    }

    /// After `qa_agent`/`assessment_agent` finish, teaching resumes at the
    /// interrupted position, not from scratch (§4.8).
    pub fn resume_teaching(&self, checkpoint: &mut Checkpoint) {
        checkpoint.state = OrchestratorState::Teaching;
    }

    /// Records a component failure; returns `true` if the session must end
    /// because the §4.8 repeated-failure threshold was crossed.
    pub async fn handle_component_failure(&self, checkpoint: &mut Checkpoint, now_ms: i64, message: &str) -> bool {
        let tripped = checkpoint.failures.record(now_ms, FAILURE_WINDOW_MS, FAILURE_THRESHOLD);
        if tripped {
            checkpoint.state = OrchestratorState::Ended;
            warn!(session_id = %checkpoint.session_id, message, "repeated component failures, ending session");
        }
        self.save_checkpoint(checkpoint).await;
        tripped
    }

    /// Drive one voice session end-to-end: STT events in, routed agent
    /// output and TTS audio out, barge-in on every `speech_started`. STT is
    /// never stopped by output work (§4.8).
    pub async fn run_session(
        self: Arc<Self>,
        session_id: &str,
        course_id: Option<String>,
        mut event_rx: tokio::sync::mpsc::Receiver<SttEvent>,
        tts: Arc<dyn TtsProvider>,
        voice: &str,
        language: &str,
        sink: Arc<dyn VoiceEventSink>,
    ) -> Result<()> {
        let mut checkpoint = self.load_checkpoint(session_id, course_id).await?;
        sink.send_state(checkpoint.state).await;

        let mut current_tts_cancel: Option<CancellationToken> = None;

        while let Some(event) = event_rx.recv().await {
            match event {
                SttEvent::SpeechStarted => {
                    if let Some(cancel) = current_tts_cancel.take() {
                        self.handle_speech_started(&cancel, &mut checkpoint).await;
                        sink.send_state(checkpoint.state).await;
                    }
                }
                SttEvent::PartialTranscript { .. } => {
                    // Dropped under normal operation (§5 backpressure); no state change.
                }
                SttEvent::FinalTranscript { text } => {
                    let turn_start = Instant::now();
                    let outcome = self.handle_final_transcript(&mut checkpoint, &text, None).await?;

                    if turn_start.elapsed().as_millis() as u64 > TEXT_CHUNK_BUDGET_MS {
                        warn!(session_id, "text chunk exceeded budget");
                    }
                    sink.send_text_chunk(&outcome.text).await;
                    sink.send_state(outcome.new_state).await;

                    if outcome.new_state == OrchestratorState::Ended {
                        self.sessions.end(session_id).await.ok();
                        return Ok(());
                    }

                    let cancel = CancellationToken::new();
                    current_tts_cancel = Some(cancel.clone());
                    let first_chunk_start = Instant::now();
                    let (audio_tx, mut audio_rx) = tokio::sync::mpsc::channel(8);
                    let tts_clone = tts.clone();
                    let text_clone = outcome.text.clone();
                    let voice = voice.to_string();
                    let language = language.to_string();
                    tokio::spawn(async move {
                        let _ = tts_clone.synthesise_stream(&text_clone, &voice, &language, cancel, audio_tx).await;
                    });

                    let mut first = true;
                    while let Some(chunk) = audio_rx.recv().await {
                        if first {
                            if first_chunk_start.elapsed().as_millis() as u64 > FIRST_AUDIO_CHUNK_BUDGET_MS {
                                warn!(session_id, "first audio chunk exceeded budget");
                            }
                            first = false;
                        }
                        sink.send_audio_chunk(chunk.data, false).await;
                    }
                }
                SttEvent::SilenceTimeout => {
                    if checkpoint.state == OrchestratorState::WaitingForUser {
                        checkpoint.state = OrchestratorState::Teaching;
                        self.save_checkpoint(&checkpoint).await;
                        sink.send_state(checkpoint.state).await;
                    }
                }
                SttEvent::Error { message } => {
                    sink.send_error(&message).await;
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if self.handle_component_failure(&mut checkpoint, now_ms, &message).await {
                        sink.send_state(OrchestratorState::Ended).await;
                        self.sessions.end(session_id).await.ok();
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

fn update_position(checkpoint: &mut Checkpoint, chunk: &TeachingChunk) {
    let module_id = checkpoint.position.as_ref().map(|p| p.module_id.clone()).unwrap_or_default();
    let topic_id = checkpoint.position.as_ref().map(|p| p.topic_id.clone()).unwrap_or_default();
    checkpoint.position = Some(TeachingPosition {
        module_id,
        topic_id,
        cursor_chars: chunk.next_cursor,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tutor_cache::InMemoryCache;
    use tutor_providers::embedding::EmbeddingProvider;
    use tutor_providers::error::ProviderError;
    use tutor_providers::llm::{ChatMessage, ChatResponse, CompleteOptions, LlmProvider};
    use tutor_providers::router::{EmbeddingRouter, LlmRouter, Slot};

    struct StubEmbeddingProvider;

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddingProvider {
        fn name(&self) -> &str {
            "stub-embedding"
        }
        fn batch_size(&self) -> usize {
            64
        }
        fn dimensions(&self) -> usize {
            8
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
        }
    }

    struct StubLlmProvider;

    #[async_trait]
    impl LlmProvider for StubLlmProvider {
        fn name(&self) -> &str {
            "stub-llm"
        }
        async fn complete(&self, messages: &[ChatMessage], _options: &CompleteOptions) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: messages.last().map(|m| m.content.clone()).unwrap_or_default(),
                model: "stub".to_string(),
                tokens_in: 0,
                tokens_out: 0,
                stop_reason: "stop".to_string(),
            })
        }
    }

    fn drs() -> Arc<Drs> {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        tutor_drs::db::init_db(&conn).unwrap();
        Arc::new(Drs::new(conn))
    }

    fn orchestrator() -> Orchestrator {
        let drs = drs();
        let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::default());
        let sessions = Arc::new(SessionManager::new(drs.clone(), cache.clone()));
        let embeddings = Arc::new(EmbeddingRouter::new(vec![Slot::new(Box::new(StubEmbeddingProvider), 0)]));
        let llm = Arc::new(LlmRouter::new(vec![Slot::new(Box::new(StubLlmProvider), 0)]));
        let retriever = Arc::new(tutor_retrieval::HybridRetriever::new(
            embeddings,
            Arc::new(tutor_vector::InMemoryVectorIndex::default()),
            drs.clone(),
            None,
        ));
        let qa_agent = QaAgent::new(llm, retriever);
        let assessment_agent = AssessmentAgent::new(drs.clone());
        Orchestrator::new(drs, cache, sessions, qa_agent, assessment_agent)
    }

    #[tokio::test]
    async fn checkpoint_round_trips_through_cache() {
        let orchestrator = orchestrator();
        let mut checkpoint = Checkpoint::new("session-1", None);
        checkpoint.state = OrchestratorState::Teaching;
        orchestrator.save_checkpoint(&checkpoint).await;

        let loaded = orchestrator.load_checkpoint("session-1", None).await.unwrap();
        assert_eq!(loaded.state, OrchestratorState::Teaching);
    }

    #[tokio::test]
    async fn unseen_session_starts_idle() {
        let orchestrator = orchestrator();
        let loaded = orchestrator.load_checkpoint("new-session", None).await.unwrap();
        assert_eq!(loaded.state, OrchestratorState::Idle);
    }

    #[tokio::test]
    async fn navigation_pause_transitions_to_waiting_for_user() {
        let orchestrator = orchestrator();
        let mut checkpoint = Checkpoint::new("session-1", None);
        checkpoint.state = OrchestratorState::Teaching;

        let outcome = orchestrator.handle_final_transcript(&mut checkpoint, "pause", Some("content")).await.unwrap();
        assert_eq!(outcome.new_state, OrchestratorState::WaitingForUser);
    }

    #[tokio::test]
    async fn teaching_advance_persists_cursor_in_checkpoint() {
        let orchestrator = orchestrator();
        let mut checkpoint = Checkpoint::new("session-1", None);
        checkpoint.state = OrchestratorState::Teaching;

        let long_content = "word ".repeat(200);
        orchestrator.handle_final_transcript(&mut checkpoint, "okay continue teaching", Some(&long_content)).await.unwrap();
        assert!(checkpoint.position.is_some());
        assert!(checkpoint.position.unwrap().cursor_chars > 0);
    }

    #[tokio::test]
    async fn qa_answer_resumes_teaching_instead_of_parking_in_answering() {
        let orchestrator = orchestrator();
        let mut checkpoint = Checkpoint::new("session-1", None);
        checkpoint.state = OrchestratorState::Teaching;

        let outcome = orchestrator
            .handle_final_transcript(&mut checkpoint, "what is a Kalman filter?", Some("content"))
            .await
            .unwrap();

        assert_eq!(outcome.new_state, OrchestratorState::Teaching);
        assert_eq!(checkpoint.state, OrchestratorState::Teaching);
    }

    #[tokio::test]
    async fn third_failure_within_window_ends_session() {
        let orchestrator = orchestrator();
        let mut checkpoint = Checkpoint::new("session-1", None);
        assert!(!orchestrator.handle_component_failure(&mut checkpoint, 0, "stt error").await);
        assert!(!orchestrator.handle_component_failure(&mut checkpoint, 1_000, "stt error").await);
        assert!(orchestrator.handle_component_failure(&mut checkpoint, 2_000, "stt error").await);
        assert_eq!(checkpoint.state, OrchestratorState::Ended);
    }
}
