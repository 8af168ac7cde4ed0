use thiserror::Error;

/// Errors surfaced by the job queue broker (§4.1).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: String },

    /// `heartbeat`/`ack`/`nack` called by a worker that doesn't currently
    /// own the task's visibility lease (§4.1).
    #[error("task {task_id} is not owned by worker {worker_id}")]
    NotOwner { task_id: String, worker_id: String },

    /// The broker itself could not be reached; callers must surface this
    /// to the user rather than retry silently (§4.1).
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;

impl From<BrokerError> for tutor_core::TutorError {
    fn from(e: BrokerError) -> Self {
        match e {
            BrokerError::Database(e) => tutor_core::TutorError::Database(e.to_string()),
            BrokerError::TaskNotFound { task_id } => {
                tutor_core::TutorError::NotFound(format!("task {task_id}"))
            }
            BrokerError::NotOwner { task_id, worker_id } => tutor_core::TutorError::Conflict(
                format!("task {task_id} not owned by {worker_id}"),
            ),
            BrokerError::BrokerUnavailable(m) => tutor_core::TutorError::Transient(m),
        }
    }
}
