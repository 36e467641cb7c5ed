use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chat_core::ChatError;
use serde_json::json;
use tracing;

/// A [`ChatError`] rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError(pub ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ChatError::Forbidden(_) => StatusCode::FORBIDDEN,
        ChatError::NotFound(_) => StatusCode::NOT_FOUND,
        ChatError::BadUserInput(_) => StatusCode::BAD_REQUEST,
        ChatError::FailedPrecondition(_) => StatusCode::CONFLICT,
        ChatError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ChatError::Internal(cause) = &self.0 {
            tracing::error!("Request failed: {:#}", cause);
        }

        let body = json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.public_message(),
            }
        });
        (status_for(&self.0), Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
