use serde::{Deserialize, Serialize};

/// Orchestrator state pushed as `EventFrame { event: "state", .. }` (§4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    Idle,
    Teaching,
    WaitingForUser,
    Answering,
    Ended,
}

/// Client → server: one chunk of captured microphone audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkIn {
    /// Base64-encoded PCM/opus frame; codec is a deployment detail outside the core.
    pub audio_base64: String,
    pub seq: u64,
}

/// Client → server: STT finished a segment (mirrors the STT capability's
/// `final_transcript` event being relayed to the client for barge-in UX).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalTranscriptIn {
    pub text: String,
}

/// Server → client: a chunk of generated speech audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunkOut {
    pub audio_base64: String,
    pub seq: u64,
    pub end_of_stream: bool,
}

/// Server → client: a chunk of generated text, paired with the audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChunkOut {
    pub text: String,
    pub seq: u64,
}

/// Server → client: current orchestrator state plus the active topic segment,
/// if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateOut {
    pub state: VoiceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_segment_id: Option<String>,
}
