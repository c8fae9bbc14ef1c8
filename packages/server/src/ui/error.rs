//! Mapping of core errors onto HTTP responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{infrastructure::dto::http::ErrorResponse, usecase::ChatError};

#[derive(Debug)]
pub enum ApiError {
    /// No usable identity headers
    Unauthorized(String),
    Chat(ChatError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Chat(err) => match err {
                ChatError::Validation(_) => StatusCode::BAD_REQUEST,
                ChatError::AccessDenied(_) => StatusCode::FORBIDDEN,
                ChatError::NotFound(_) => StatusCode::NOT_FOUND,
                ChatError::Conflict(_) => StatusCode::CONFLICT,
                ChatError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ChatError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    fn body(&self) -> ErrorResponse {
        match self {
            ApiError::Unauthorized(message) => ErrorResponse {
                error: "unauthorized".to_string(),
                message: message.clone(),
            },
            ApiError::Chat(err) => ErrorResponse {
                error: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        ApiError::Chat(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = ?self, "request failed");
        } else {
            tracing::debug!(%status, error = ?self, "request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
