use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use parley_core::errors::ChatError;
use parley_identity::IdentityError;
use parley_store::StoreError;

/// HTTP-facing wrapper over the operation taxonomy. Every failure leaves
/// the service as one envelope shape:
/// `{"error": {"kind": "...", "message": "..."}}`.
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        ApiError(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let mapped = match e {
            StoreError::NotFound(m) => ChatError::NotFound(m),
            StoreError::Conflict(m) => ChatError::Conflict(m),
            StoreError::Invalid(m) => ChatError::InvalidInput(m),
            other => ChatError::PersistenceFailed(other.to_string()),
        };
        ApiError(mapped)
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        let mapped = match e {
            IdentityError::Validation(m) => ChatError::InvalidInput(m),
            IdentityError::Authenticity(m) => ChatError::Authenticity(m),
            IdentityError::Store(e) => return ApiError::from(e),
        };
        ApiError(mapped)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ChatError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            ChatError::InvalidInput(_)
            | ChatError::InvalidIdentifier(_)
            | ChatError::Authenticity(_) => StatusCode::BAD_REQUEST,
            ChatError::NotFound(_) => StatusCode::NOT_FOUND,
            ChatError::Conflict(_) => StatusCode::CONFLICT,
            ChatError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
            ChatError::PersistenceFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": {
                "kind": self.0.error_kind(),
                "message": self.0.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
