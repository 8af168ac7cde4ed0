use thiserror::Error;

/// Per-file ingest failure, accumulated rather than aborting the whole
/// upload (§4.3 "partial failure: one bad file must not fail the batch").
#[derive(Debug, Error, Clone)]
pub enum IngestError {
    #[error("unrecognised file type for {filename}")]
    UnknownFileType { filename: String },

    #[error("failed to extract text from {filename}: {reason}")]
    ExtractFailed { filename: String, reason: String },

    #[error("document produced no extractable text: {filename}")]
    EmptyDocument { filename: String },

    #[error("curriculum synthesis returned invalid structure: {reason}")]
    SchemaViolation { reason: String },

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("vector index upsert failed: {0}")]
    VectorIndex(String),

    #[error("durable record store error: {0}")]
    Drs(String),

    #[error("transient failure: {0}")]
    Transient(String),

    /// The worker observed `state=cancel_requested` between pipeline
    /// phases and aborted (§4.2 "checks between phases... aborts with
    /// nack(retryable=false)").
    #[error("ingest task cancelled")]
    Cancelled,
}

impl IngestError {
    /// Whether the stage that produced this error should be retried (§4.3
    /// "per-stage retry policy"). Parse/schema errors are deterministic and
    /// retrying them wastes the attempt budget; transient/provider errors
    /// are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            IngestError::UnknownFileType { .. }
            | IngestError::ExtractFailed { .. }
            | IngestError::EmptyDocument { .. }
            | IngestError::Cancelled => false,
            IngestError::SchemaViolation { .. } => true,
            IngestError::Embedding(_) | IngestError::VectorIndex(_) | IngestError::Drs(_) | IngestError::Transient(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

impl From<tutor_drs::DrsError> for IngestError {
    fn from(e: tutor_drs::DrsError) -> Self {
        IngestError::Drs(e.to_string())
    }
}

impl From<IngestError> for tutor_core::TutorError {
    fn from(e: IngestError) -> Self {
        match e {
            IngestError::UnknownFileType { .. } | IngestError::ExtractFailed { .. } | IngestError::EmptyDocument { .. } => {
                tutor_core::TutorError::InvalidInput(e.to_string())
            }
            IngestError::SchemaViolation { .. } => tutor_core::TutorError::GarbageOutput(e.to_string()),
            IngestError::Embedding(m) | IngestError::VectorIndex(m) | IngestError::Drs(m) => tutor_core::TutorError::Transient(m),
            IngestError::Transient(m) => tutor_core::TutorError::Transient(m),
            IngestError::Cancelled => tutor_core::TutorError::Conflict("ingest task cancelled".to_string()),
        }
    }
}
