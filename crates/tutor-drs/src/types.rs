use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// §3 "Course". `course_id` is the stable referent; `course_number` exists
/// solely for human ergonomics and is assigned atomically on first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub course_id: String,
    pub course_number: i64,
    pub title: String,
    pub description: String,
    pub language: String,
    pub country: String,
    pub owner_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// §3 "Module" — ordered child of a course; `week` is unique within its course.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    pub module_id: String,
    pub course_id: String,
    pub week: i64,
    pub title: String,
    pub description: String,
    pub objectives: Vec<String>,
}

/// §3 "Topic" — ordered child of a module; `order_index` is unique within its module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: String,
    pub module_id: String,
    pub order_index: i64,
    pub title: String,
    pub content: String,
    pub estimated_duration_minutes: Option<i64>,
}

/// §3 "Document chunk" — indexing-only record. The embedding itself lives in
/// the vector index; the DRS keeps the text and metadata so BM25 lexical
/// search and idempotent re-ingest checks don't depend on the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub course_id: String,
    pub module_id: Option<String>,
    pub topic_id: Option<String>,
    pub page: Option<i64>,
    pub char_start: i64,
    pub char_end: i64,
    pub text: String,
    pub language: String,
}

/// §3 "Session" — a per-user conversation envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub current_course_id: Option<String>,
    pub client_ip: Option<String>,
    pub client_user_agent: Option<String>,
    pub client_device_class: Option<String>,
    pub message_count: i64,
    pub started_at: String,
    pub last_activity_at: String,
    pub expires_at: Option<String>,
    pub ended_at: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = crate::error::DrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            other => Err(crate::error::DrsError::InvalidInput(format!("unknown role: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Voice,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Text => write!(f, "text"),
            MessageType::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for MessageType {
    type Err = crate::error::DrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "voice" => Ok(MessageType::Voice),
            other => Err(crate::error::DrsError::InvalidInput(format!("unknown message_type: {other}"))),
        }
    }
}

/// §3 "Message" — a single conversation turn. Totally ordered within a
/// session by `(created_at, id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub user_id: String,
    pub role: MessageRole,
    pub content: String,
    pub message_type: MessageType,
    pub course_id: Option<String>,
    pub module_id: Option<String>,
    pub topic_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizType {
    Module,
    Course,
}

impl std::fmt::Display for QuizType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuizType::Module => write!(f, "module"),
            QuizType::Course => write!(f, "course"),
        }
    }
}

impl std::str::FromStr for QuizType {
    type Err = crate::error::DrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "module" => Ok(QuizType::Module),
            "course" => Ok(QuizType::Course),
            other => Err(crate::error::DrsError::InvalidInput(format!("unknown quiz type: {other}"))),
        }
    }
}

/// §3 "Quiz" — a per-course or per-module structured test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quiz {
    pub quiz_id: String,
    pub course_id: String,
    pub module_id: Option<String>,
    pub title: String,
    pub quiz_type: QuizType,
    pub passing_score: i64,
    pub time_limit_minutes: Option<i64>,
}

/// §3 "QuizQuestion" — `correct_answer` is a single-letter key into `options`.
///
/// Multi-select / free-text answers are out of scope here — the source this
/// is derived from only ever assumed single-letter keys (§9 open questions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub quiz_id: String,
    pub question_number: i64,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: Option<String>,
    pub difficulty: Option<String>,
}

/// §3 "QuizResponse" — a user's submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResponse {
    pub quiz_id: String,
    pub user_id: String,
    pub answers: HashMap<i64, String>,
    pub score: i64,
    pub total_questions: i64,
    pub time_taken_seconds: Option<i64>,
    pub submitted_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestTaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Retrying,
    /// Set by the external cancel API (§4.2); the worker checks for this
    /// between pipeline phases and aborts with `nack(retryable=false)`.
    CancelRequested,
}

impl std::fmt::Display for IngestTaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IngestTaskState::Pending => "pending",
            IngestTaskState::Running => "running",
            IngestTaskState::Succeeded => "succeeded",
            IngestTaskState::Failed => "failed",
            IngestTaskState::Retrying => "retrying",
            IngestTaskState::CancelRequested => "cancel_requested",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for IngestTaskState {
    type Err = crate::error::DrsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IngestTaskState::Pending),
            "running" => Ok(IngestTaskState::Running),
            "succeeded" => Ok(IngestTaskState::Succeeded),
            "failed" => Ok(IngestTaskState::Failed),
            "retrying" => Ok(IngestTaskState::Retrying),
            "cancel_requested" => Ok(IngestTaskState::CancelRequested),
            other => Err(crate::error::DrsError::InvalidInput(format!("unknown task state: {other}"))),
        }
    }
}

/// §3 "Ingest task record" — mirrored into the DRS for observability; the
/// broker (component E) is the source of truth for delivery/visibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestTaskRecord {
    pub task_id: String,
    pub job_id: String,
    pub priority: i64,
    pub state: IngestTaskState,
    pub attempt_count: i64,
    pub first_seen_at: String,
    pub last_heartbeat_at: Option<String>,
    pub error_summary: Option<String>,
    pub progress_percent: Option<i64>,
    pub progress_message: Option<String>,
}
