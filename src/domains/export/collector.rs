//! Copies the document variants of exported entries into the staging tree.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::fs;
use tokio::task;

use crate::domains::document::file_storage::FileStorageService;
use crate::domains::document::types::StoredDocument;
use crate::domains::export::types::{ExportRecord, IntegrityWarning};
use crate::domains::transcode::encoder::encode_jpeg;
use crate::domains::transcode::types::file_extension;
use crate::domains::transcode::{DocumentTranscoder, RasterPage, UploadedFile};
use crate::errors::{DomainError, DomainResult};

/// Longest file or folder name written into an archive, in bytes (the tar header limit).
pub const MAX_ARCHIVE_NAME_LEN: usize = 100;

/// Variant codecs many viewers cannot open; converted to JPEG on request.
const UNCOMMON_FORMATS: &[&str] = &["webp", "avif", "bmp", "svg"];

/// Rasterized originals by original path. `None` marks an original that could not be rendered.
type RenderedOriginals = HashMap<String, Option<Arc<Vec<RasterPage>>>>;

fn is_allowed_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, 'ä' | 'ö' | 'ü' | 'Ä' | 'Ö' | 'Ü' | 'ß' | '_' | '(' | ')' | '+' | ',' | '.' | '-')
}

fn sanitize_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if is_allowed_name_char(c) { c } else { '_' })
        .collect()
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a character.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// `{entry id}_{category}_{counterparty}_{description}`, sanitized and truncated.
pub fn folder_name(record: &ExportRecord) -> String {
    let raw = format!(
        "{}_{}_{}_{}",
        record.entry_id,
        record.category_name.as_deref().unwrap_or_default(),
        record.recipient_sender,
        record.description.as_deref().unwrap_or_default()
    );
    let sanitized = sanitize_name(&raw);
    truncate_bytes(&sanitized, MAX_ARCHIVE_NAME_LEN).to_string()
}

/// `{document id}_{stem}.{extension}`, with the stem cut so the whole name fits.
pub fn archive_filename(document_id: i64, original_filename: &str, extension: &str) -> String {
    let stem = Path::new(original_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let stem = sanitize_name(stem);

    let prefix = format!("{}_", document_id);
    let suffix = format!(".{}", extension);
    let budget = MAX_ARCHIVE_NAME_LEN.saturating_sub(prefix.len() + suffix.len());
    format!("{}{}{}", prefix, truncate_bytes(&stem, budget), suffix)
}

/// Result of collecting documents into a staging directory.
#[derive(Debug, Default)]
pub struct CollectionOutcome {
    pub collected: usize,
    pub warnings: Vec<IntegrityWarning>,
}

#[derive(Clone)]
pub struct DocumentCollector {
    storage: Arc<dyn FileStorageService>,
    transcoder: DocumentTranscoder,
    jpeg_quality: u8,
}

impl DocumentCollector {
    pub fn new(storage: Arc<dyn FileStorageService>, transcoder: DocumentTranscoder, jpeg_quality: u8) -> Self {
        Self {
            storage,
            transcoder,
            jpeg_quality,
        }
    }

    /// Copy every document of every record into `documents_root/<folder>/`.
    /// Missing files become integrity warnings; staging I/O errors are fatal.
    pub async fn collect(
        &self,
        records: &[ExportRecord],
        documents_root: &Path,
        convert_to_universal: bool,
    ) -> DomainResult<CollectionOutcome> {
        let mut outcome = CollectionOutcome::default();

        for record in records.iter().filter(|r| !r.documents.is_empty()) {
            let folder = documents_root.join(folder_name(record));
            fs::create_dir_all(&folder)
                .await
                .map_err(|e| DomainError::ArchiveFailure(format!("Failed to create {}: {}", folder.display(), e)))?;

            // Pages of one upload share an original and always belong to the same entry.
            let mut rendered = RenderedOriginals::new();
            for doc in &record.documents {
                if let Some(warning) = self.missing_file_warning(record, doc).await {
                    log::warn!(
                        "Skipping document {} of entry {}: {} ({})",
                        warning.document_id,
                        warning.entry_id,
                        warning.reason,
                        warning.path
                    );
                    outcome.warnings.push(warning);
                    continue;
                }

                self.collect_document(doc, &folder, convert_to_universal, &mut rendered)
                    .await?;
                outcome.collected += 1;
            }
        }

        log::debug!(
            "Collected {} document(s), {} integrity warning(s)",
            outcome.collected,
            outcome.warnings.len()
        );
        Ok(outcome)
    }

    async fn missing_file_warning(&self, record: &ExportRecord, doc: &StoredDocument) -> Option<IntegrityWarning> {
        let (path, reason) = if !self.storage.file_exists(&doc.original_path).await {
            (&doc.original_path, "original file missing")
        } else if !self.storage.file_exists(&doc.document_path).await {
            (&doc.document_path, "document file missing")
        } else {
            return None;
        };
        Some(IntegrityWarning {
            entry_id: record.entry_id,
            document_id: doc.id,
            path: path.clone(),
            reason: reason.to_string(),
        })
    }

    async fn collect_document(
        &self,
        doc: &StoredDocument,
        folder: &Path,
        convert_to_universal: bool,
        rendered: &mut RenderedOriginals,
    ) -> DomainResult<()> {
        let variant_ext = file_extension(&doc.document_path).unwrap_or_else(|| "bin".to_string());

        if convert_to_universal && UNCOMMON_FORMATS.contains(&variant_ext.as_str()) {
            if let Some(jpeg) = self.convert_to_jpeg(doc, rendered).await? {
                let target = folder.join(archive_filename(doc.id, &doc.original_filename, "jpg"));
                return fs::write(&target, jpeg)
                    .await
                    .map_err(|e| DomainError::ArchiveFailure(format!("Failed to write {}: {}", target.display(), e)));
            }
        }

        let source = self.storage.get_absolute_path(&doc.document_path);
        let target = folder.join(archive_filename(doc.id, &doc.original_filename, &variant_ext));
        fs::copy(&source, &target)
            .await
            .map_err(|e| DomainError::ArchiveFailure(format!("Failed to copy {}: {}", source.display(), e)))?;
        Ok(())
    }

    /// JPEG bytes for a document, or `None` when it cannot be converted.
    async fn convert_to_jpeg(&self, doc: &StoredDocument, rendered: &mut RenderedOriginals) -> DomainResult<Option<Vec<u8>>> {
        let variant = self.storage.get_file_data(&doc.document_path).await?;
        let quality = self.jpeg_quality;
        let decoded = task::spawn_blocking(move || {
            image::load_from_memory(&variant)
                .ok()
                .and_then(|image| encode_jpeg(&image, quality).ok())
        })
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))?;
        if decoded.is_some() {
            return Ok(decoded);
        }

        // Variant codec not decodable here; render again from the upload, once per original.
        let pages = match rendered.get(&doc.original_path) {
            Some(pages) => pages.clone(),
            None => {
                let pages = self.rasterize_original(doc).await?;
                rendered.insert(doc.original_path.clone(), pages.clone());
                pages
            }
        };
        let Some(pages) = pages else {
            return Ok(None);
        };

        let transcoder = self.transcoder.clone();
        let filename = doc.original_filename.clone();
        let page_number = doc.page_number;
        let document_id = doc.id;
        task::spawn_blocking(move || {
            match transcoder
                .document_page(&filename, &pages, page_number)
                .and_then(|image| encode_jpeg(&image, quality).map_err(|e| DomainError::transcode(&filename, e)))
            {
                Ok(jpeg) => Some(jpeg),
                Err(e) => {
                    log::warn!("Could not convert document {} to JPEG, copying as stored: {}", document_id, e);
                    None
                }
            }
        })
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))
    }

    async fn rasterize_original(&self, doc: &StoredDocument) -> DomainResult<Option<Arc<Vec<RasterPage>>>> {
        let bytes = self.storage.get_file_data(&doc.original_path).await?;
        let original = UploadedFile::new(bytes, doc.original_filename.clone());
        let transcoder = self.transcoder.clone();
        let original_path = doc.original_path.clone();

        task::spawn_blocking(move || match transcoder.rasterize(&original) {
            Ok(pages) => Some(Arc::new(pages)),
            Err(e) => {
                log::warn!("Could not render {}, copying its documents as stored: {}", original_path, e);
                None
            }
        })
        .await
        .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))
    }
}
