use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::app::AppState;

/// Liveness/readiness probe: reports which optional providers are wired up
/// rather than a bare 200, mirroring the teacher's provider-health endpoint.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "providers": {
            "embedding": true,
            "llm": true,
            "tts": state.tts.is_some(),
        },
    }))
}
