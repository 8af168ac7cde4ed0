use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tutor_core::TutorError;

/// Thin wrapper so every handler can just return `Result<Json<_>, ApiError>`
/// and let `TutorError::code()` pick the status the same way the teacher's
/// WS error frames used `SkynetError::code()` (§7).
pub struct ApiError(pub TutorError);

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            TutorError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            TutorError::NotFound(_) => StatusCode::NOT_FOUND,
            TutorError::Conflict(_) => StatusCode::CONFLICT,
            TutorError::Transient(_) | TutorError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            TutorError::ResourceExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            TutorError::ProviderPermanent(_) | TutorError::GarbageOutput(_) => StatusCode::BAD_GATEWAY,
            TutorError::Degraded(_) => StatusCode::OK,
            TutorError::Database(_) | TutorError::Serialization(_) | TutorError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            error: self.0.code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl<E> From<E> for ApiError
where
    E: Into<TutorError>,
{
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}
