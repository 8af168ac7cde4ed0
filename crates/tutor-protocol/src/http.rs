use serde::{Deserialize, Serialize};

/// Metadata accompanying an `/ingest/upload` multipart body. The core owns
/// only this struct; multipart decoding is the gateway's job (§6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestUploadMeta {
    pub course_title: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestUploadResponse {
    pub task_id: String,
    pub job_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    DeadLettered,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub state: TaskState,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCheckResponse {
    pub has_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfoDto {
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateRequest {
    pub user_id: String,
    #[serde(default)]
    pub client_info: Option<ClientInfoDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
    pub started_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEndResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistoryQuery {
    pub session_id: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub role: String,
    pub content: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub messages: Vec<MessageDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub language: Option<String>,
    /// Sets the session's current course before routing; required for a
    /// `course_query` classification to have a course to retrieve against.
    #[serde(default)]
    pub course_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDto {
    pub chunk_id: String,
    pub document_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub session_id: String,
    pub route_label: String,
    pub confidence: f64,
    pub sources: Vec<SourceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatAudioResponse {
    pub answer: String,
    pub audio_base64: String,
    pub session_id: String,
    pub route_label: String,
    pub confidence: f64,
    pub sources: Vec<SourceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSummaryDto {
    pub course_id: String,
    pub course_number: i64,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicDto {
    pub topic_id: String,
    pub title: String,
    pub order_index: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDto {
    pub module_id: String,
    pub week: i64,
    pub title: String,
    pub topics: Vec<TopicDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseDetailDto {
    pub course_id: String,
    pub course_number: i64,
    pub title: String,
    pub modules: Vec<ModuleDto>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizGenerateScope {
    Module,
    Course,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizGenerateRequest {
    pub course_ref: String,
    #[serde(default)]
    pub module_week: Option<i64>,
}

/// One choice of a question, labelled with its single-letter key ("A", "B", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiceDto {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestionDto {
    pub question_id: String,
    pub prompt: String,
    pub choices: Vec<ChoiceDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizDto {
    pub quiz_id: String,
    pub questions: Vec<QuizQuestionDto>,
}

/// `answers` maps `question_number` (as a string) to the submitted choice's
/// single-letter key (§3 "`correct_answer` is a single-letter key into options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSubmitRequest {
    pub quiz_id: String,
    pub user_id: String,
    pub answers: std::collections::HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizSubmitResponse {
    pub score: u32,
    pub total: u32,
    pub correct: Vec<String>,
}
