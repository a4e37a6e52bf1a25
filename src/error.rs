// src/error.rs
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::message::{ApiResponse, ErrorBody};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    DocumentNotFound(String),
    #[error("{0}")]
    RagProcessing(String),
    #[error("{0}")]
    LlmService(String),
    #[error("{0}")]
    RateLimit(String),
    #[error("{0}")]
    DocumentProcessing(String),
    #[error("{0}")]
    InvalidFileFormat(String),
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        AppError::Internal(err.to_string())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidFileFormat(_) => StatusCode::BAD_REQUEST,
            AppError::DocumentNotFound(_) => StatusCode::NOT_FOUND,
            AppError::LlmService(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::RateLimit(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::RagProcessing(_)
            | AppError::DocumentProcessing(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BadRequest",
            AppError::DocumentNotFound(_) => "DocumentNotFoundError",
            AppError::RagProcessing(_) => "RAGProcessingError",
            AppError::LlmService(_) => "LLMServiceError",
            AppError::RateLimit(_) => "RateLimitError",
            AppError::DocumentProcessing(_) => "DocumentProcessingError",
            AppError::InvalidFileFormat(_) => "InvalidFileFormatError",
            AppError::Internal(_) => "InternalServerError",
        }
    }

    /// Internal details stay in the logs; callers get a generic message.
    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            AppError::Internal(_) => "An internal server error occurred".to_string(),
            other => other.to_string(),
        };
        ErrorBody {
            kind: self.kind().to_string(),
            message,
            status_code: self.status_code().as_u16(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            tracing::error!(error = %detail, "unhandled error");
        }
        let status = self.status_code();
        let body: ApiResponse<()> = ApiResponse::failure(self.to_body(), None);
        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        AppError::BadRequest(format!("Invalid multipart payload: {}", err.body_text()))
    }
}
