use sqlx::{Sqlite, Transaction};

use crate::domains::document::store::{DocumentFiles, DocumentStore};
use crate::domains::document::types::StoredDocument;
use crate::domains::transcode::{DocumentTranscoder, UploadedFile};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{EntryId, OneOrMany, UserId};

/// Stores a batch of uploads for one entry as a single unit.
#[derive(Clone)]
pub struct IngestionCoordinator {
    transcoder: DocumentTranscoder,
    store: DocumentStore,
}

impl IngestionCoordinator {
    pub fn new(transcoder: DocumentTranscoder, store: DocumentStore) -> Self {
        Self { transcoder, store }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    /// Ingest inside the caller's transaction.
    ///
    /// Files are processed in order and fail fast. On error every file written
    /// by this batch is removed before `IngestionFailed` is returned; rolling back
    /// the metadata is left to the owner of `tx`.
    pub async fn ingest_with_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entry_id: EntryId,
        files: OneOrMany<UploadedFile>,
        actor: UserId,
    ) -> DomainResult<Vec<StoredDocument>> {
        let files = files.into_vec();
        let mut created: Vec<StoredDocument> = Vec::new();

        for file in files {
            let filename = file.original_filename.clone();
            if let Err(e) = self.process_file(tx, entry_id, file, actor, &mut created).await {
                log::warn!(
                    "Ingestion for entry {} failed at '{}': {}; removing {} stored document(s)",
                    entry_id,
                    filename,
                    e,
                    created.len()
                );
                self.rollback_files(&created).await;
                return Err(DomainError::IngestionFailed(Box::new(e)));
            }
        }

        log::info!("Ingested {} document(s) for entry {}", created.len(), entry_id);
        Ok(created)
    }

    async fn process_file(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entry_id: EntryId,
        file: UploadedFile,
        actor: UserId,
        created: &mut Vec<StoredDocument>,
    ) -> DomainResult<()> {
        // Everything is transcoded before the first write for this file.
        let pages = self.transcoder.transcode(file.clone()).await?;

        for page in &pages {
            let doc = self
                .store
                .save_with_tx(
                    tx,
                    entry_id,
                    DocumentFiles {
                        original: &file.bytes,
                        original_filename: &file.original_filename,
                        document: &page.document.bytes,
                        thumbnail: &page.thumbnail.bytes,
                        page_number: page.page_number,
                    },
                    actor,
                )
                .await?;
            created.push(doc);
        }
        Ok(())
    }

    /// Ingest in a transaction of its own; commits on success.
    pub async fn ingest(
        &self,
        entry_id: EntryId,
        files: OneOrMany<UploadedFile>,
        actor: UserId,
    ) -> DomainResult<Vec<StoredDocument>> {
        let mut tx = self.store.pool().begin().await.map_err(DbError::from)?;

        let created = match self.ingest_with_tx(&mut tx, entry_id, files, actor).await {
            Ok(created) => created,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            self.rollback_files(&created).await;
            return Err(DomainError::IngestionFailed(Box::new(DbError::from(e).into())));
        }
        Ok(created)
    }

    async fn rollback_files(&self, created: &[StoredDocument]) {
        for doc in created {
            self.store.remove_files(doc).await;
        }
    }
}
