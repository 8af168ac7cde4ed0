use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use tutor_chat::{ChatTurnResult, Source};
use tutor_core::TutorError;
use tutor_protocol::http::{ChatAudioResponse, ChatRequest, ChatResponse, SourceDto};
use tutor_sessions::ClientInfo;

use crate::app::AppState;
use crate::error::ApiError;

fn sources_to_dto(sources: Vec<Source>) -> Vec<SourceDto> {
    sources
        .into_iter()
        .map(|s| SourceDto {
            chunk_id: s.chunk_id,
            document_title: s.document_id,
            score: Some(s.score as f64),
        })
        .collect()
}

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let client_info = ClientInfo::default();
    let ChatTurnResult {
        answer,
        session_id,
        route_label,
        confidence,
        sources,
    } = state.chat.chat(&req.user_id, &req.message, &client_info, req.course_id.as_deref()).await?;

    Ok(Json(ChatResponse {
        answer,
        session_id,
        route_label,
        confidence: confidence as f64,
        sources: sources_to_dto(sources),
    }))
}

/// Same pipeline as `chat_handler`, then synthesises the answer as speech
/// and returns it base64-encoded rather than streaming it (§6.2's plain-HTTP
/// surface; the streamed equivalent is the `/voice` websocket).
pub async fn chat_audio_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatAudioResponse>, ApiError> {
    let tts = state
        .tts
        .clone()
        .ok_or_else(|| ApiError(TutorError::Degraded("no tts provider configured".to_string())))?;

    let client_info = ClientInfo::default();
    let ChatTurnResult {
        answer,
        session_id,
        route_label,
        confidence,
        sources,
    } = state.chat.chat(&req.user_id, &req.message, &client_info, req.course_id.as_deref()).await?;

    let language = req.language.as_deref().unwrap_or("en");
    let (tx, mut rx) = tokio::sync::mpsc::channel(16);
    let cancel = tokio_util::sync::CancellationToken::new();
    let synth_text = answer.clone();
    let tts_clone = tts.clone();
    let synth_language = language.to_string();
    let synth = tokio::spawn(async move {
        tts_clone
            .synthesise_stream(&synth_text, "default", &synth_language, cancel, tx)
            .await
    });

    let mut audio = Vec::new();
    while let Some(chunk) = rx.recv().await {
        audio.extend_from_slice(&chunk.data);
    }
    synth.await.ok();

    Ok(Json(ChatAudioResponse {
        answer,
        audio_base64: BASE64.encode(audio),
        session_id,
        route_label,
        confidence: confidence as f64,
        sources: sources_to_dto(sources),
    }))
}
