/// Error classification shared by every capability client (§6.1).
///
/// Callers match on the variant, not the message, to decide retry policy —
/// the same split `tutor_core::TutorError` encodes as `Transient` vs
/// `ProviderPermanent`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Transient failures are retried with backoff by the caller (§7 `Transient`).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Http(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable(_)
        )
    }

    /// A 4xx that indicates a coding or config bug, never retried (§7 `ProviderPermanent`).
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::Api { status, .. } if *status >= 400 && *status < 500)
    }
}

impl From<ProviderError> for tutor_core::TutorError {
    fn from(e: ProviderError) -> Self {
        match &e {
            ProviderError::RateLimited { .. } => tutor_core::TutorError::Transient(e.to_string()),
            _ if e.is_permanent() => tutor_core::TutorError::ProviderPermanent(e.to_string()),
            _ if e.is_transient() => tutor_core::TutorError::Transient(e.to_string()),
            _ => tutor_core::TutorError::Internal(e.to_string()),
        }
    }
}
