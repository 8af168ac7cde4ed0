use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// STT event set the orchestrator consumes (§4.8). `SpeechStarted` is the
/// barge-in signal and must be emitted within 300ms of voice onset.
#[derive(Debug, Clone)]
pub enum SttEvent {
    SpeechStarted,
    PartialTranscript { text: String },
    FinalTranscript { text: String },
    SilenceTimeout,
    Error { message: String },
}

/// A single open STT session: push audio in, pull transcription events out.
pub struct SttStream {
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    pub event_rx: mpsc::Receiver<SttEvent>,
}

/// `open(language) -> { send(audio), recv() }` (§6.1).
#[async_trait]
pub trait SttProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self, language: &str) -> Result<SttStream, ProviderError>;
}
