use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{query_as, FromRow, Pool, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;

use crate::domains::document::types::{StoredDocument, StoredDocumentRow};
use crate::domains::export::types::ExportRecord;
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::EntryId;

/// Source of the rows an export writes.
#[async_trait]
pub trait ExportRecordSource: Send + Sync {
    /// Every current (non-deleted) entry in id order. Documents are attached
    /// only when `with_documents` is set; the count is always filled in.
    async fn fetch_records(&self, with_documents: bool) -> DomainResult<Vec<ExportRecord>>;
}

#[derive(Debug, FromRow)]
struct ExportRecordRow {
    id: i64,
    date: String,
    recipient_sender: String,
    description: Option<String>,
    amount: Option<String>,
    is_income: bool,
    payment_method: Option<String>,
    no_invoice: bool,
    category_name: Option<String>,
    document_count: i64,
    created_at: String,
    created_by_username: Option<String>,
    updated_at: String,
    updated_by_username: Option<String>,
}

impl ExportRecordRow {
    fn into_record(self) -> DomainResult<ExportRecord> {
        let parse_datetime = |s: &str| -> DomainResult<DateTime<Utc>> {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DomainError::Internal(format!("Invalid date format: {}", s)))
        };

        let amount = match self.amount.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(
                Decimal::from_str(raw)
                    .map_err(|_| DomainError::Internal(format!("Invalid amount on entry {}: {}", self.id, raw)))?,
            ),
        };

        Ok(ExportRecord {
            entry_id: self.id,
            date: self.date,
            recipient_sender: self.recipient_sender,
            description: self.description,
            amount,
            is_income: self.is_income,
            payment_method: self.payment_method,
            no_invoice: self.no_invoice,
            category_name: self.category_name,
            document_count: self.document_count,
            created_at: parse_datetime(&self.created_at)?,
            created_by_username: self.created_by_username,
            updated_at: parse_datetime(&self.updated_at)?,
            updated_by_username: self.updated_by_username,
            documents: Vec::new(),
        })
    }
}

pub struct SqliteExportRecordSource {
    pool: Pool<Sqlite>,
}

impl SqliteExportRecordSource {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    async fn documents_by_entry(&self) -> DomainResult<HashMap<EntryId, Vec<StoredDocument>>> {
        let rows = query_as::<_, StoredDocumentRow>(
            r#"SELECT d.* FROM stored_documents d
               JOIN entries e ON e.id = d.entry_id AND e.deleted_at IS NULL
               WHERE d.deleted_at IS NULL
               ORDER BY d.entry_id ASC, d.id ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let mut grouped: HashMap<EntryId, Vec<StoredDocument>> = HashMap::new();
        for row in rows {
            let doc = row.into_entity()?;
            grouped.entry(doc.entry_id).or_default().push(doc);
        }
        Ok(grouped)
    }
}

#[async_trait]
impl ExportRecordSource for SqliteExportRecordSource {
    async fn fetch_records(&self, with_documents: bool) -> DomainResult<Vec<ExportRecord>> {
        // Superseded versions of an entry are soft-deleted, so only current rows match.
        let rows = query_as::<_, ExportRecordRow>(
            r#"SELECT
                e.id, e.date, e.recipient_sender, e.description, e.amount,
                e.is_income, e.payment_method, e.no_invoice,
                c.name AS category_name,
                (SELECT COUNT(*) FROM stored_documents d
                    WHERE d.entry_id = e.id AND d.deleted_at IS NULL) AS document_count,
                e.created_at, uc.username AS created_by_username,
                e.updated_at, uu.username AS updated_by_username
            FROM entries e
            LEFT JOIN categories c ON c.id = e.category_id AND c.deleted_at IS NULL
            LEFT JOIN users uc ON uc.id = e.created_by_user_id
            LEFT JOIN users uu ON uu.id = e.updated_by_user_id
            WHERE e.deleted_at IS NULL
            ORDER BY e.id ASC"#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        let mut records = rows
            .into_iter()
            .map(ExportRecordRow::into_record)
            .collect::<DomainResult<Vec<_>>>()?;

        if with_documents {
            let mut documents = self.documents_by_entry().await?;
            for record in &mut records {
                record.documents = documents.remove(&record.entry_id).unwrap_or_default();
            }
        }

        log::debug!("Fetched {} export record(s)", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_category, insert_document_row, insert_entry, insert_user, memory_pool, EntryFixture};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_joins_and_counts() {
        let pool = memory_pool().await;
        let anna = insert_user(&pool, "anna").await;
        let ben = insert_user(&pool, "ben").await;
        let food = insert_category(&pool, "Food", false).await;
        let gone = insert_category(&pool, "Old", true).await;

        let first = insert_entry(
            &pool,
            EntryFixture::new("Bakery")
                .amount("12.50")
                .category(food)
                .created_by(anna)
                .updated_by(ben),
        )
        .await;
        let second = insert_entry(&pool, EntryFixture::new("Client").income().category(gone)).await;
        insert_document_row(&pool, first, "a", false).await;
        insert_document_row(&pool, first, "b", false).await;
        insert_document_row(&pool, first, "c", true).await;

        let source = SqliteExportRecordSource::new(pool.clone());
        let records = source.fetch_records(true).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].entry_id, first);
        assert_eq!(records[0].amount, Some(dec!(12.50)));
        assert_eq!(records[0].category_name.as_deref(), Some("Food"));
        assert_eq!(records[0].created_by_username.as_deref(), Some("anna"));
        assert_eq!(records[0].updated_by_username.as_deref(), Some("ben"));
        assert_eq!(records[0].document_count, 2);
        assert_eq!(records[0].documents.len(), 2);

        assert_eq!(records[1].entry_id, second);
        assert!(records[1].is_income);
        assert_eq!(records[1].category_name, None);
        assert_eq!(records[1].created_by_username, None);
        assert_eq!(records[1].amount, None);
    }

    #[tokio::test]
    async fn test_superseded_versions_are_not_exported() {
        let pool = memory_pool().await;
        let v1 = insert_entry(&pool, EntryFixture::new("Bakery").deleted()).await;
        let v2 = insert_entry(&pool, EntryFixture::new("Bakery & Co").previous_version(v1)).await;

        let source = SqliteExportRecordSource::new(pool.clone());
        let records = source.fetch_records(false).await.unwrap();

        assert_eq!(records.iter().map(|r| r.entry_id).collect::<Vec<_>>(), vec![v2]);
        assert!(records[0].documents.is_empty());
    }
}
