use thiserror::Error;

/// Error taxonomy shared by every crate in the workspace (spec §7).
///
/// Each variant carries the propagation policy in its doc comment rather
/// than in code — callers match on `code()` to decide retry/surface
/// behaviour, the same way `SkynetError::code()` drives WS error frames.
#[derive(Debug, Error)]
pub enum TutorError {
    /// Malformed payload, oversize upload, unsupported file type. Non-retryable.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown course, session, or quiz. Non-retryable.
    #[error("not found: {0}")]
    NotFound(String),

    /// E.g. ending an already-ended session. Non-retryable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Network timeouts, cache miss loops, LLM 5xx, broker hiccups. Retried with backoff.
    #[error("transient error: {0}")]
    Transient(String),

    /// Memory cap, provider quota. Retryable with backoff; worker may self-exit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// 4xx from a provider indicating a coding or config bug. Non-retryable, dead-lettered.
    #[error("provider permanent error: {0}")]
    ProviderPermanent(String),

    /// A component is down (reranker, cache, BM25). Never surfaced to the user;
    /// logged once and the feature degrades per its documented ladder.
    #[error("degraded: {0}")]
    Degraded(String),

    /// LLM output failed a sanity check (spec §7 heuristics).
    #[error("garbage output: {0}")]
    GarbageOutput(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timeout after {ms}ms")]
    Timeout { ms: u64 },

    #[error("internal error: {0}")]
    Internal(String),
}

impl TutorError {
    /// Short error-kind string, suitable for the `{error_kind, message, ...}`
    /// structured response described in spec §7.
    pub fn code(&self) -> &'static str {
        match self {
            TutorError::InvalidInput(_) => "INVALID_INPUT",
            TutorError::NotFound(_) => "NOT_FOUND",
            TutorError::Conflict(_) => "CONFLICT",
            TutorError::Transient(_) => "TRANSIENT",
            TutorError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            TutorError::ProviderPermanent(_) => "PROVIDER_PERMANENT",
            TutorError::Degraded(_) => "DEGRADED",
            TutorError::GarbageOutput(_) => "GARBAGE_OUTPUT",
            TutorError::Database(_) => "DATABASE_ERROR",
            TutorError::Serialization(_) => "SERIALIZATION_ERROR",
            TutorError::Timeout { .. } => "TIMEOUT",
            TutorError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller should retry this error per spec §7's propagation policy.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TutorError::Transient(_) | TutorError::ResourceExhausted(_) | TutorError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;
