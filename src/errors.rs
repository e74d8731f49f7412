use crate::services::video_service::ServiceError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;
use tracing::error;

/// An HTTP-facing error: a status plus the plain-text body sent to the caller.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Generic 500; internal detail stays in the logs.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Parameter and not-found errors keep their message; everything else is
/// logged here and collapsed into a generic 500.
impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::MissingParameter(_)
            | ServiceError::InvalidVideoId(_)
            | ServiceError::InvalidAction(_) => AppError::bad_request(err.to_string()),
            ServiceError::MetadataNotFound(_) | ServiceError::SummaryNotFound(_) => {
                AppError::not_found(err.to_string())
            }
            other => {
                error!("Request failed: {}", other);
                AppError::internal()
            }
        }
    }
}
