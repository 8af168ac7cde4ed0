use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Drs(#[from] tutor_drs::DrsError),
    #[error(transparent)]
    Session(#[from] tutor_sessions::SessionError),
    #[error(transparent)]
    Provider(#[from] tutor_providers::error::ProviderError),
    #[error(transparent)]
    Core(#[from] tutor_core::TutorError),
    #[error("repeated component failures, session ended")]
    RepeatedFailures,
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl From<OrchestratorError> for tutor_core::TutorError {
    fn from(e: OrchestratorError) -> Self {
        match e {
            OrchestratorError::Drs(e) => e.into(),
            OrchestratorError::Session(e) => e.into(),
            OrchestratorError::Provider(e) => e.into(),
            OrchestratorError::Core(e) => e,
            OrchestratorError::RepeatedFailures => tutor_core::TutorError::Conflict("repeated component failures".to_string()),
        }
    }
}
