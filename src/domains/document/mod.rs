pub mod file_storage;
pub mod ingestion;
pub mod repository;
pub mod service;
pub mod store;
pub mod types;

pub use file_storage::{FileStorageService, LocalFileStorageService, StorageArea};
pub use ingestion::IngestionCoordinator;
pub use repository::{SqliteStoredDocumentRepository, StoredDocumentRepository};
pub use service::{DocumentService, DocumentServiceImpl};
pub use store::{DocumentFiles, DocumentStore};
pub use types::{DocumentFileResponse, DocumentVariant, NewStoredDocument, StoredDocument, StoredDocumentRow};
