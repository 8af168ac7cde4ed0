use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use tutor_protocol::http::{
    MessageDto, SessionCheckRequest, SessionCheckResponse, SessionCreateRequest, SessionCreateResponse,
    SessionEndRequest, SessionEndResponse, SessionHistoryQuery, SessionHistoryResponse,
};
use tutor_sessions::ClientInfo;

use crate::app::AppState;
use crate::error::ApiError;

fn client_info_from_dto(dto: Option<tutor_protocol::http::ClientInfoDto>) -> ClientInfo {
    match dto {
        Some(dto) => ClientInfo {
            ip: dto.ip,
            user_agent: dto.user_agent,
            device_class: dto.device_class,
        },
        None => ClientInfo::default(),
    }
}

pub async fn check_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionCheckRequest>,
) -> Result<Json<SessionCheckResponse>, ApiError> {
    let existing = state.drs.get_active_session_for_user(&req.user_id)?;
    Ok(Json(match existing {
        Some(session) => SessionCheckResponse {
            has_session: true,
            session_id: Some(session.session_id),
            message_count: Some(session.message_count as usize),
        },
        None => SessionCheckResponse {
            has_session: false,
            session_id: None,
            message_count: None,
        },
    }))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionCreateRequest>,
) -> Result<Json<SessionCreateResponse>, ApiError> {
    let client_info = client_info_from_dto(req.client_info);
    let session = state.sessions.get_or_create(&req.user_id, &client_info).await?;
    Ok(Json(SessionCreateResponse {
        session_id: session.session_id,
        started_at: session.started_at,
    }))
}

pub async fn end_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionEndRequest>,
) -> Result<Json<SessionEndResponse>, ApiError> {
    state.sessions.end(&req.session_id).await?;
    Ok(Json(SessionEndResponse { session_id: req.session_id }))
}

pub async fn history_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SessionHistoryQuery>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let limit = req.limit.unwrap_or(tutor_core::config::CHAT_HISTORY_TURNS * 2);
    let messages = state.sessions.history(&req.session_id, limit).await?;
    let messages = messages
        .into_iter()
        .map(|m| MessageDto {
            role: m.role.to_string(),
            content: m.content,
            created_at: m.created_at,
        })
        .collect();
    Ok(Json(SessionHistoryResponse { messages }))
}
