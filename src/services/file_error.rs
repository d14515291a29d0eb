//! Error kinds reported by the file-tree services.

use crate::{
    services::{blob_store::BlobError, tree_store::TreeError},
    validation::FieldErrors,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    /// Missing, not owned, or not (validly) shared. Deliberately one kind.
    #[error("File Not Found!")]
    NotFound,
    #[error("An entry named `{0}` already exists in the same folder!")]
    Conflict(String),
    #[error("Parent folder not found!")]
    ParentNotFound,
    #[error("validation failed")]
    ValidationFailed(FieldErrors),
    #[error("Too large file! File size cannot exceed {limit} bytes, got {actual}")]
    SizeLimitExceeded { limit: u64, actual: u64 },
    #[error("file storage failure: {0}")]
    StorageFailure(#[from] BlobError),
    /// Unexpected store or transaction failure; the detail is never shown.
    #[error("server fault: {0}")]
    ServerFault(String),
}

pub type FileResult<T> = Result<T, FileError>;

impl FileError {
    /// A validation failure on a single field.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), message.into());
        FileError::ValidationFailed(errors)
    }
}

impl From<TreeError> for FileError {
    fn from(err: TreeError) -> Self {
        match err {
            TreeError::NotFound => FileError::NotFound,
            TreeError::Conflict(name) => FileError::Conflict(name),
            TreeError::ForeignKey => FileError::ParentNotFound,
            TreeError::Constraint(detail) => FileError::ServerFault(detail),
            TreeError::Sqlx(err) => FileError::ServerFault(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for FileError {
    fn from(err: sqlx::Error) -> Self {
        FileError::ServerFault(err.to_string())
    }
}
