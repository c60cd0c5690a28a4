use serde::Serialize;
use thiserror::Error;

use crate::domains::document::file_storage::FileStorageError;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("DbError", 2)?;
        let kind = match self {
            DbError::Sqlx(_) => "Sqlx",
            DbError::Transaction(_) => "Transaction",
            DbError::Migration(_) => "Migration",
        };
        state.serialize_field("type", kind)?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Errors raised by the ingestion and export pipeline.
#[derive(Debug, Error, Serialize)]
pub enum DomainError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Unsupported media kind for file '{0}'")]
    UnsupportedMediaKind(String),

    #[error("Failed to transcode '{filename}': {reason}")]
    TranscodeFailure { filename: String, reason: String },

    #[error("Storage write failure: {0}")]
    StorageWriteFailure(String),

    #[error("Entity not found: {0} with ID {1}")]
    NotFound(String, String),

    #[error("Ingestion failed: {0}")]
    IngestionFailed(#[source] Box<DomainError>),

    #[error("Invalid or expired download link")]
    CapabilityInvalid,

    #[error("Archive error: {0}")]
    ArchiveFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn transcode(filename: &str, reason: impl std::fmt::Display) -> Self {
        DomainError::TranscodeFailure {
            filename: filename.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        DomainError::NotFound(entity.to_string(), id.to_string())
    }

    /// The innermost error for wrapped ingestion failures.
    pub fn root_cause(&self) -> &DomainError {
        match self {
            DomainError::IngestionFailed(inner) => inner.root_cause(),
            other => other,
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(error: sqlx::Error) -> Self {
        DomainError::Database(DbError::Sqlx(error))
    }
}

impl From<FileStorageError> for DomainError {
    fn from(error: FileStorageError) -> Self {
        match error {
            FileStorageError::NotFound(path) => DomainError::NotFound("file".to_string(), path),
            other => DomainError::StorageWriteFailure(other.to_string()),
        }
    }
}

/// Service-level errors surfaced at the pipeline entrypoints.
#[derive(Debug, Error, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Export queue unavailable: {0}")]
    QueueUnavailable(String),
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        ServiceError::Domain(DomainError::Database(error))
    }
}

impl ServiceError {
    /// HTTP-style status a request layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Domain(domain) => match domain.root_cause() {
                DomainError::CapabilityInvalid => 401,
                DomainError::NotFound(..) => 404,
                DomainError::UnsupportedMediaKind(_) | DomainError::TranscodeFailure { .. } => 422,
                _ => 500,
            },
            ServiceError::Validation(_) => 400,
            ServiceError::QueueUnavailable(_) => 503,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_root_cause() {
        let wrapped = ServiceError::from(DomainError::IngestionFailed(Box::new(
            DomainError::UnsupportedMediaKind("notes.docx".to_string()),
        )));
        assert_eq!(wrapped.status_code(), 422);

        assert_eq!(ServiceError::from(DomainError::CapabilityInvalid).status_code(), 401);
        assert_eq!(
            ServiceError::from(DomainError::not_found("stored_documents", 7)).status_code(),
            404
        );
        assert_eq!(
            ServiceError::from(DomainError::ArchiveFailure("disk full".to_string())).status_code(),
            500
        );
    }

    #[test]
    fn test_storage_error_conversion() {
        let missing: DomainError = FileStorageError::NotFound("documents/a.avif".to_string()).into();
        assert!(matches!(missing, DomainError::NotFound(_, ref path) if path == "documents/a.avif"));

        let denied: DomainError =
            FileStorageError::PermissionDenied("outside base path".to_string()).into();
        assert!(matches!(denied, DomainError::StorageWriteFailure(_)));
    }
}
