use crate::{
    services::{blob_store::BlobError, file_error::FileError},
    validation::FieldErrors,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

pub const SERVER_FAULT_MESSAGE: &str = "Oops, something went wrong! Try again later.";

/// An HTTP-facing error: status, a message safe to show, and per-field
/// messages for validation failures.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub fields: Option<FieldErrors>,
}

impl AppError {
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            fields: None,
        }
    }

    /// 500 with the generic message. `detail` goes to the log only.
    pub fn internal(detail: impl fmt::Display) -> Self {
        tracing::error!("server fault: {}", detail);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, SERVER_FAULT_MESSAGE)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn validation(fields: FieldErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "Some fields are invalid".into(),
            fields: Some(fields),
        }
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
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(fields) = self.fields {
            body["fields"] = json!(fields);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<FileError> for AppError {
    fn from(err: FileError) -> Self {
        match err {
            FileError::NotFound | FileError::ParentNotFound => AppError::not_found(err.to_string()),
            FileError::Conflict(_) => AppError::new(StatusCode::CONFLICT, err.to_string()),
            FileError::ValidationFailed(fields) => AppError::validation(fields),
            FileError::SizeLimitExceeded { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, err.to_string())
            }
            FileError::StorageFailure(inner) => {
                tracing::error!("file storage failure: {}", inner);
                AppError::new(
                    StatusCode::BAD_GATEWAY,
                    "File storage is unavailable. Try again later.",
                )
            }
            FileError::ServerFault(detail) => AppError::internal(detail),
        }
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::BadSignature => AppError::new(StatusCode::FORBIDDEN, err.to_string()),
            BlobError::NotFound(_) | BlobError::InvalidPath(_) => {
                AppError::not_found("File Not Found!")
            }
            BlobError::Io(inner) => AppError::internal(inner),
        }
    }
}
