use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::{DomainError, DomainResult};
use crate::types::{DocumentId, EntryId, UserId};

/// Which of the three stored files of a document is meant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentVariant {
    Original,
    Document,
    Thumbnail,
}

impl DocumentVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentVariant::Original => "original",
            DocumentVariant::Document => "document",
            DocumentVariant::Thumbnail => "thumbnail",
        }
    }
}

impl FromStr for DocumentVariant {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "original" => Ok(DocumentVariant::Original),
            "document" => Ok(DocumentVariant::Document),
            "thumbnail" => Ok(DocumentVariant::Thumbnail),
            other => Err(DomainError::not_found("document variant", other)),
        }
    }
}

/// One stored page of an upload: original, document variant and thumbnail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub entry_id: EntryId,
    pub original_path: String,
    pub document_path: String,
    pub thumbnail_path: String,
    pub original_filename: String,
    pub page_number: u32,
    pub created_by_user_id: Option<UserId>,
    pub updated_by_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoredDocument {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Relative storage path of one variant.
    pub fn path_for(&self, variant: DocumentVariant) -> &str {
        match variant {
            DocumentVariant::Original => &self.original_path,
            DocumentVariant::Document => &self.document_path,
            DocumentVariant::Thumbnail => &self.thumbnail_path,
        }
    }

    pub fn paths(&self) -> [&str; 3] {
        [&self.original_path, &self.document_path, &self.thumbnail_path]
    }
}

/// Insert payload for a stored document whose files are already written.
#[derive(Debug, Clone)]
pub struct NewStoredDocument {
    pub entry_id: EntryId,
    pub original_path: String,
    pub document_path: String,
    pub thumbnail_path: String,
    pub original_filename: String,
    pub page_number: u32,
    pub actor: UserId,
}

#[derive(Debug, Clone, FromRow)]
pub struct StoredDocumentRow {
    pub id: i64,
    pub entry_id: i64,
    pub original_path: String,
    pub document_path: String,
    pub thumbnail_path: String,
    pub original_filename: String,
    pub page_number: i64,
    pub created_by_user_id: Option<i64>,
    pub updated_by_user_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl StoredDocumentRow {
    /// Convert database row to domain entity
    pub fn into_entity(self) -> DomainResult<StoredDocument> {
        let parse_datetime = |s: &str| -> DomainResult<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DomainError::Internal(format!("Invalid date format: {}", s)))
        };

        Ok(StoredDocument {
            id: self.id,
            entry_id: self.entry_id,
            original_path: self.original_path,
            document_path: self.document_path,
            thumbnail_path: self.thumbnail_path,
            original_filename: self.original_filename,
            page_number: u32::try_from(self.page_number)
                .map_err(|_| DomainError::Internal(format!("Invalid page number: {}", self.page_number)))?,
            created_by_user_id: self.created_by_user_id,
            updated_by_user_id: self.updated_by_user_id,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
            deleted_at: self.deleted_at.as_deref().map(parse_datetime).transpose()?,
        })
    }
}

/// What a request layer needs to stream one stored file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentFileResponse {
    pub path: PathBuf,
    pub content_type: String,
    /// Download name, derived from the original upload name.
    pub download_name: String,
}
