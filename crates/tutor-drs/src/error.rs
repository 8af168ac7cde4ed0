use thiserror::Error;

/// Errors surfaced by the durable record store (§3, §7).
#[derive(Debug, Error)]
pub enum DrsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DrsError>;

impl From<DrsError> for tutor_core::TutorError {
    fn from(e: DrsError) -> Self {
        match e {
            DrsError::NotFound(m) => tutor_core::TutorError::NotFound(m),
            DrsError::Conflict(m) => tutor_core::TutorError::Conflict(m),
            DrsError::InvalidInput(m) => tutor_core::TutorError::InvalidInput(m),
            DrsError::Database(e) => tutor_core::TutorError::Database(e.to_string()),
        }
    }
}
