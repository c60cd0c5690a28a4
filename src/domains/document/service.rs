use async_trait::async_trait;
use sqlx::{Pool, Sqlite};

use crate::domains::document::ingestion::IngestionCoordinator;
use crate::domains::document::store::DocumentStore;
use crate::domains::document::types::{DocumentFileResponse, DocumentVariant, StoredDocument};
use crate::domains::transcode::UploadedFile;
use crate::errors::{DbError, DomainError, DomainResult, ServiceError, ServiceResult};
use crate::types::{DocumentId, EntryId, OneOrMany, UserId};

// --- Document Service Trait ---
#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Store one or many uploads for an entry. All or nothing.
    async fn upload_documents(
        &self,
        entry_id: EntryId,
        files: OneOrMany<UploadedFile>,
        actor: UserId,
    ) -> ServiceResult<Vec<StoredDocument>>;

    async fn get_document(&self, id: DocumentId) -> ServiceResult<StoredDocument>;

    async fn list_entry_documents(&self, entry_id: EntryId) -> ServiceResult<Vec<StoredDocument>>;

    /// File to serve for one variant of a document.
    async fn get_document_file(&self, id: DocumentId, variant: DocumentVariant) -> ServiceResult<DocumentFileResponse>;

    async fn delete_document(&self, id: DocumentId, actor: UserId) -> ServiceResult<()>;
}

pub struct DocumentServiceImpl {
    pool: Pool<Sqlite>,
    ingestion: IngestionCoordinator,
}

impl DocumentServiceImpl {
    pub fn new(pool: Pool<Sqlite>, ingestion: IngestionCoordinator) -> Self {
        Self { pool, ingestion }
    }

    fn store(&self) -> &DocumentStore {
        self.ingestion.store()
    }

    async fn ensure_entry_exists(&self, entry_id: EntryId) -> DomainResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE id = ? AND deleted_at IS NULL")
            .bind(entry_id)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::from)?;
        if count == 0 {
            return Err(DomainError::not_found("entry", entry_id));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentService for DocumentServiceImpl {
    async fn upload_documents(
        &self,
        entry_id: EntryId,
        files: OneOrMany<UploadedFile>,
        actor: UserId,
    ) -> ServiceResult<Vec<StoredDocument>> {
        if files.is_empty() {
            return Err(ServiceError::Validation("At least one file is required".to_string()));
        }
        self.ensure_entry_exists(entry_id).await?;

        let docs = self.ingestion.ingest(entry_id, files, actor).await?;
        Ok(docs)
    }

    async fn get_document(&self, id: DocumentId) -> ServiceResult<StoredDocument> {
        Ok(self.store().retrieve(id).await?)
    }

    async fn list_entry_documents(&self, entry_id: EntryId) -> ServiceResult<Vec<StoredDocument>> {
        Ok(self.store().list_for_owner(entry_id).await?)
    }

    async fn get_document_file(&self, id: DocumentId, variant: DocumentVariant) -> ServiceResult<DocumentFileResponse> {
        Ok(self.store().file_response(id, variant).await?)
    }

    async fn delete_document(&self, id: DocumentId, actor: UserId) -> ServiceResult<()> {
        self.store().soft_delete(id, actor).await?;
        log::info!("Document {} deleted by user {}", id, actor);
        Ok(())
    }
}
