use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::Json;

use tutor_core::TutorError;
use tutor_drs::types::IngestTaskState;
use tutor_ingest::{IngestFile, IngestRequest};
use tutor_protocol::http::{IngestUploadResponse, TaskState, TaskStatusResponse};

use crate::app::AppState;
use crate::error::ApiError;

const INGEST_QUEUE: &str = "ingest";
const INGEST_PRIORITY: i64 = 0;
const DEFAULT_OWNER_ID: &str = "gateway";
const DEFAULT_COUNTRY: &str = "US";

/// Multipart fields: `course_title` (required), `language` (optional,
/// default "en"), and one or more `file` parts with the raw bytes to ingest
/// (§6.2 "ingest upload").
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<IngestUploadResponse>, ApiError> {
    let mut course_title: Option<String> = None;
    let mut language = "en".to_string();
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError(TutorError::InvalidInput(e.to_string())))?
    {
        match field.name() {
            Some("course_title") => {
                course_title = Some(field.text().await.map_err(|e| ApiError(TutorError::InvalidInput(e.to_string())))?);
            }
            Some("language") => {
                language = field.text().await.map_err(|e| ApiError(TutorError::InvalidInput(e.to_string())))?;
            }
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload.bin").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError(TutorError::InvalidInput(e.to_string())))?;
                files.push(IngestFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            _ => {}
        }
    }

    let course_title = course_title.ok_or_else(|| ApiError(TutorError::InvalidInput("missing course_title field".to_string())))?;
    if files.is_empty() {
        return Err(ApiError(TutorError::InvalidInput("at least one file is required".to_string())));
    }

    let request = IngestRequest {
        owner_id: DEFAULT_OWNER_ID.to_string(),
        course_id: None,
        title: course_title,
        language,
        country: DEFAULT_COUNTRY.to_string(),
        files,
        expand_content: true,
    };

    let task_id = state.broker.enqueue(INGEST_QUEUE, serde_json::json!({}), INGEST_PRIORITY)?;
    state.drs.record_task_seen(&task_id, &task_id, INGEST_PRIORITY)?;
    state.ingest_requests.put(task_id.clone(), request);

    Ok(Json(IngestUploadResponse {
        task_id: task_id.clone(),
        job_id: task_id,
    }))
}

pub async fn task_status_handler(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let record = state
        .drs
        .get_task(&task_id)?
        .ok_or_else(|| ApiError(TutorError::NotFound(format!("task {task_id}"))))?;

    let broker_task = state.broker.get_task(&task_id)?;
    let dead_lettered = matches!(
        broker_task.map(|t| t.status),
        Some(tutor_broker::TaskStatus::DeadLettered)
    );

    let state_dto = if dead_lettered {
        TaskState::DeadLettered
    } else {
        match record.state {
            IngestTaskState::Pending => TaskState::Queued,
            IngestTaskState::Running | IngestTaskState::Retrying | IngestTaskState::CancelRequested => TaskState::Running,
            IngestTaskState::Succeeded => TaskState::Succeeded,
            IngestTaskState::Failed => TaskState::Failed,
        }
    };

    Ok(Json(TaskStatusResponse {
        state: state_dto,
        progress_percent: record.progress_percent.unwrap_or(0).clamp(0, 100) as u8,
        progress_message: record.progress_message,
        error: record.error_summary,
    }))
}
