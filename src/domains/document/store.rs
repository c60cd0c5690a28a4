use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{Pool, Sqlite, Transaction};

use crate::domains::document::file_storage::{FileStorageService, StorageArea};
use crate::domains::document::repository::StoredDocumentRepository;
use crate::domains::document::types::{DocumentFileResponse, DocumentVariant, NewStoredDocument, StoredDocument};
use crate::domains::transcode::types::{file_extension, OutputCodec};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{DocumentId, EntryId, UserId};
use crate::utils::content_type_for;

static FILENAME_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The three payloads of one stored page.
#[derive(Debug, Clone, Copy)]
pub struct DocumentFiles<'a> {
    pub original: &'a [u8],
    pub original_filename: &'a str,
    pub document: &'a [u8],
    pub thumbnail: &'a [u8],
    pub page_number: u32,
}

/// Persists stored documents: files on disk, metadata in `stored_documents`.
#[derive(Clone)]
pub struct DocumentStore {
    pool: Pool<Sqlite>,
    storage: Arc<dyn FileStorageService>,
    repo: Arc<dyn StoredDocumentRepository>,
    codec: OutputCodec,
}

impl DocumentStore {
    pub fn new(
        pool: Pool<Sqlite>,
        storage: Arc<dyn FileStorageService>,
        repo: Arc<dyn StoredDocumentRepository>,
        codec: OutputCodec,
    ) -> Self {
        Self {
            pool,
            storage,
            repo,
            codec,
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Collision-resistant stem: time, a process-wide sequence and the name, hashed.
    fn unique_stem(original_filename: &str) -> String {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let sequence = FILENAME_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(nanos.to_le_bytes());
        hasher.update(sequence.to_le_bytes());
        hasher.update(original_filename.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Save one page inside the caller's transaction.
    /// Files written by this call are removed again if a later step fails.
    pub async fn save_with_tx(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        entry_id: EntryId,
        files: DocumentFiles<'_>,
        actor: UserId,
    ) -> DomainResult<StoredDocument> {
        self.storage.ensure_layout().await?;

        let stem = Self::unique_stem(files.original_filename);
        let original_ext = file_extension(files.original_filename).unwrap_or_else(|| "bin".to_string());
        let variant_ext = self.codec.extension();

        let targets = [
            (StorageArea::Originals, format!("{}.{}", stem, original_ext), files.original),
            (StorageArea::Documents, format!("{}.{}", stem, variant_ext), files.document),
            (StorageArea::Thumbnails, format!("{}.{}", stem, variant_ext), files.thumbnail),
        ];

        let mut written: Vec<String> = Vec::with_capacity(targets.len());
        for (area, filename, data) in &targets {
            match self.storage.write_new_file(*area, filename, data).await {
                Ok(path) => written.push(path),
                Err(e) => {
                    self.remove_paths(written.as_slice()).await;
                    return Err(e.into());
                }
            }
        }

        let new_doc = NewStoredDocument {
            entry_id,
            original_path: written[0].clone(),
            document_path: written[1].clone(),
            thumbnail_path: written[2].clone(),
            original_filename: files.original_filename.to_string(),
            page_number: files.page_number,
            actor,
        };

        match self.repo.create_with_tx(&new_doc, tx).await {
            Ok(doc) => {
                log::debug!(
                    "Stored document {} (page {}) for entry {}",
                    doc.id,
                    doc.page_number,
                    entry_id
                );
                Ok(doc)
            }
            Err(e) => {
                self.remove_paths(written.as_slice()).await;
                Err(e)
            }
        }
    }

    /// Save one page in its own transaction.
    pub async fn save(&self, entry_id: EntryId, files: DocumentFiles<'_>, actor: UserId) -> DomainResult<StoredDocument> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let doc = match self.save_with_tx(&mut tx, entry_id, files, actor).await {
            Ok(doc) => doc,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };
        if let Err(e) = tx.commit().await {
            self.remove_files(&doc).await;
            return Err(DbError::from(e).into());
        }
        Ok(doc)
    }

    pub async fn retrieve(&self, id: DocumentId) -> DomainResult<StoredDocument> {
        self.repo.find_by_id(id).await
    }

    /// Marks the document deleted; its files stay on disk.
    pub async fn soft_delete(&self, id: DocumentId, actor: UserId) -> DomainResult<()> {
        self.repo.soft_delete(id, actor).await
    }

    pub async fn list_for_owner(&self, entry_id: EntryId) -> DomainResult<Vec<StoredDocument>> {
        self.repo.find_by_entry(entry_id).await
    }

    /// Absolute path of one variant. Missing files are reported as `NotFound`.
    pub async fn resolve_file(&self, id: DocumentId, variant: DocumentVariant) -> DomainResult<PathBuf> {
        let doc = self.retrieve(id).await?;
        self.resolve_existing(&doc, variant).await
    }

    pub async fn resolve_existing(&self, doc: &StoredDocument, variant: DocumentVariant) -> DomainResult<PathBuf> {
        let relative = doc.path_for(variant);
        if !self.storage.file_exists(relative).await {
            log::warn!(
                "Stored document {} has metadata but no {} file at {}",
                doc.id,
                variant.as_str(),
                relative
            );
            return Err(DomainError::not_found("file", relative));
        }
        Ok(self.storage.get_absolute_path(relative))
    }

    /// Path, content type and download name for serving one variant.
    pub async fn file_response(&self, id: DocumentId, variant: DocumentVariant) -> DomainResult<DocumentFileResponse> {
        let doc = self.retrieve(id).await?;
        let path = self.resolve_existing(&doc, variant).await?;
        let relative = doc.path_for(variant);

        let download_name = match variant {
            DocumentVariant::Original => doc.original_filename.clone(),
            _ => {
                let stem = std::path::Path::new(&doc.original_filename)
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("document");
                match file_extension(relative) {
                    Some(ext) => format!("{}.{}", stem, ext),
                    None => stem.to_string(),
                }
            }
        };

        Ok(DocumentFileResponse {
            content_type: content_type_for(relative).to_string(),
            path,
            download_name,
        })
    }

    /// Best-effort removal of all three files. Used on rollback paths only.
    pub async fn remove_files(&self, doc: &StoredDocument) {
        self.remove_paths(&doc.paths()).await;
    }

    async fn remove_paths<S: AsRef<str>>(&self, paths: &[S]) {
        for path in paths {
            if let Err(e) = self.storage.delete_file(path.as_ref()).await {
                log::error!("Failed to remove {} during rollback: {}", path.as_ref(), e);
            }
        }
    }
}
