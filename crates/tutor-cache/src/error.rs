use thiserror::Error;

/// Errors surfaced by the hot cache (§6.1 "Hot cache"). The cache is an
/// optional accelerator — callers are expected to fall back to the DRS on
/// `Unavailable` rather than fail the request (§4.5 "absence must not
/// degrade correctness").
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl From<CacheError> for tutor_core::TutorError {
    fn from(e: CacheError) -> Self {
        match e {
            CacheError::Unavailable(m) => tutor_core::TutorError::Transient(m),
            CacheError::Serialization(m) => tutor_core::TutorError::InvalidInput(m),
        }
    }
}
