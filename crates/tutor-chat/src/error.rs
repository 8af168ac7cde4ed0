use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Session(#[from] tutor_sessions::SessionError),
    #[error(transparent)]
    Provider(#[from] tutor_providers::error::ProviderError),
    #[error(transparent)]
    Drs(#[from] tutor_drs::DrsError),
    #[error(transparent)]
    Core(#[from] tutor_core::TutorError),
    #[error("turn deadline exceeded")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, ChatError>;

impl From<ChatError> for tutor_core::TutorError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::Session(e) => e.into(),
            ChatError::Provider(e) => e.into(),
            ChatError::Drs(e) => e.into(),
            ChatError::Core(e) => e,
            ChatError::Timeout => tutor_core::TutorError::Timeout {
                ms: tutor_core::config::CHAT_TURN_TIMEOUT_MS,
            },
        }
    }
}
