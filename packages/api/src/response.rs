// ABOUTME: Standard API response envelope and error mapping
// ABOUTME: Domain errors become HTTP statuses; storage internals never leak

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson},
};
use serde::Serialize;
use tracing::error;

use sammati_consents::EngineError;

/// Standard API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> ApiResponse<()> {
        ApiResponse {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Newtype so engine errors can carry an HTTP mapping out of this crate.
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self.0 {
            EngineError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            EngineError::Conflict(_) => (StatusCode::CONFLICT, self.0.to_string()),
            EngineError::Forbidden(_) => (StatusCode::FORBIDDEN, self.0.to_string()),
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            EngineError::ExpiredState(_) => (StatusCode::GONE, self.0.to_string()),
            EngineError::Storage(e) => {
                error!("Storage error surfaced to API: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
        };

        let response = ApiResponse::<()>::error(message);
        (status, ResponseJson(response)).into_response()
    }
}
