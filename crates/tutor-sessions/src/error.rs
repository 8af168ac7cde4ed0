use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Drs(#[from] tutor_drs::DrsError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

impl From<SessionError> for tutor_core::TutorError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Drs(e) => e.into(),
        }
    }
}
