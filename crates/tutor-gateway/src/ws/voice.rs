use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::warn;

use tutor_orchestrator::{OrchestratorState, VoiceEventSink};
use tutor_protocol::voice::{AudioChunkIn, AudioChunkOut, FinalTranscriptIn, StateOut, TextChunkOut, VoiceState};
use tutor_providers::stt::SttEvent;

use crate::app::AppState;

#[derive(Debug, Deserialize)]
struct VoiceQuery {
    session_id: String,
    #[serde(default)]
    course_id: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

/// Inbound client frame, tagged by which field is present — the wire shape
/// the teacher's WS handshake used a discriminated `type` field for; here a
/// two-variant untagged enum is simpler since the two DTOs don't overlap.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClientFrame {
    Audio(AudioChunkIn),
    Transcript(FinalTranscriptIn),
}

struct WsSink {
    tx: AsyncMutex<mpsc::UnboundedSender<Message>>,
}

fn to_json_message<T: serde::Serialize>(value: &T) -> Option<Message> {
    serde_json::to_string(value).ok().map(Message::Text)
}

#[async_trait]
impl VoiceEventSink for WsSink {
    async fn send_text_chunk(&self, text: &str) {
        if let Some(msg) = to_json_message(&TextChunkOut { text: text.to_string(), seq: 0 }) {
            let _ = self.tx.lock().await.send(msg);
        }
    }

    async fn send_audio_chunk(&self, data: Vec<u8>, end_of_stream: bool) {
        let frame = AudioChunkOut {
            audio_base64: BASE64.encode(data),
            seq: 0,
            end_of_stream,
        };
        if let Some(msg) = to_json_message(&frame) {
            let _ = self.tx.lock().await.send(msg);
        }
    }

    async fn send_state(&self, state: OrchestratorState) {
        let voice_state = match state {
            OrchestratorState::Idle => VoiceState::Idle,
            OrchestratorState::Teaching => VoiceState::Teaching,
            OrchestratorState::WaitingForUser => VoiceState::WaitingForUser,
            OrchestratorState::Answering => VoiceState::Answering,
            OrchestratorState::Ended => VoiceState::Ended,
        };
        if let Some(msg) = to_json_message(&StateOut {
            state: voice_state,
            topic_segment_id: None,
        }) {
            let _ = self.tx.lock().await.send(msg);
        }
    }

    async fn send_error(&self, message: &str) {
        let body = serde_json::json!({ "event": "error", "message": message });
        if let Ok(text) = serde_json::to_string(&body) {
            let _ = self.tx.lock().await.send(Message::Text(text));
        }
    }
}

pub async fn voice_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VoiceQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

/// Bridges the WS frame protocol onto `Orchestrator::run_session`'s STT
/// event channel. Audio chunks with `seq == 0` signal utterance start for
/// barge-in purposes; no STT provider is wired up in this deployment, so
/// speech-to-text itself runs client-side and arrives as `FinalTranscriptIn`.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, query: VoiceQuery) {
    let Some(tts) = state.tts.clone() else {
        let mut socket = socket;
        let _ = socket
            .send(Message::Text(r#"{"event":"error","message":"no tts provider configured"}"#.to_string()))
            .await;
        return;
    };

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let forward = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let sink: Arc<dyn VoiceEventSink> = Arc::new(WsSink {
        tx: AsyncMutex::new(out_tx),
    });

    let (event_tx, event_rx) = mpsc::channel::<SttEvent>(32);
    let orchestrator = state.orchestrator.clone();
    let session_id = query.session_id.clone();
    let course_id = query.course_id.clone();
    let voice = query.voice.clone().unwrap_or_else(|| "default".to_string());
    let language = query.language.clone().unwrap_or_else(|| "en".to_string());
    let sink_for_run = sink.clone();
    let run_task = tokio::spawn(async move {
        if let Err(e) = orchestrator
            .run_session(&session_id, course_id, event_rx, tts, &voice, &language, sink_for_run)
            .await
        {
            warn!(error = %e, "voice session ended with error");
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let frame: ClientFrame = match serde_json::from_str(&text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "dropping malformed voice frame");
                continue;
            }
        };

        let event = match frame {
            ClientFrame::Audio(chunk) if chunk.seq == 0 => Some(SttEvent::SpeechStarted),
            ClientFrame::Audio(_) => None,
            ClientFrame::Transcript(t) => Some(SttEvent::FinalTranscript { text: t.text }),
        };

        if let Some(event) = event {
            if event_tx.send(event).await.is_err() {
                break;
            }
        }
    }

    drop(event_tx);
    run_task.abort();
    forward.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_frame_with_seq_zero_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"audio_base64":"AA==","seq":0}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Audio(AudioChunkIn { seq: 0, .. })));
    }

    #[test]
    fn transcript_frame_parses() {
        let frame: ClientFrame = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert!(matches!(frame, ClientFrame::Transcript(FinalTranscriptIn { .. })));
    }
}
