use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, Pool, Sqlite, Transaction};

use crate::domains::document::types::{NewStoredDocument, StoredDocument, StoredDocumentRow};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{DocumentId, EntryId, UserId};

#[async_trait]
pub trait StoredDocumentRepository: Send + Sync {
    async fn create_with_tx(
        &self,
        new_doc: &NewStoredDocument,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> DomainResult<StoredDocument>;

    /// Non-deleted document by id.
    async fn find_by_id(&self, id: DocumentId) -> DomainResult<StoredDocument>;

    /// Non-deleted documents of one entry, in id order.
    async fn find_by_entry(&self, entry_id: EntryId) -> DomainResult<Vec<StoredDocument>>;

    async fn soft_delete_with_tx(
        &self,
        id: DocumentId,
        actor: UserId,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> DomainResult<()>;

    async fn soft_delete(&self, id: DocumentId, actor: UserId) -> DomainResult<()>;
}

pub struct SqliteStoredDocumentRepository {
    pool: Pool<Sqlite>,
}

impl SqliteStoredDocumentRepository {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    fn entity_name() -> &'static str {
        "stored_documents"
    }
}

#[async_trait]
impl StoredDocumentRepository for SqliteStoredDocumentRepository {
    async fn create_with_tx(
        &self,
        new_doc: &NewStoredDocument,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> DomainResult<StoredDocument> {
        let now = Utc::now().to_rfc3339();

        let result = query(
            r#"INSERT INTO stored_documents (
                entry_id, original_path, document_path, thumbnail_path,
                original_filename, page_number,
                created_at, updated_at, created_by_user_id, updated_by_user_id,
                deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)"#,
        )
        .bind(new_doc.entry_id)
        .bind(&new_doc.original_path)
        .bind(&new_doc.document_path)
        .bind(&new_doc.thumbnail_path)
        .bind(&new_doc.original_filename)
        .bind(new_doc.page_number as i64)
        .bind(&now)
        .bind(&now)
        .bind(new_doc.actor)
        .bind(new_doc.actor)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        let id = result.last_insert_rowid();
        query_as::<_, StoredDocumentRow>("SELECT * FROM stored_documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DomainError::not_found(Self::entity_name(), id))?
            .into_entity()
    }

    async fn find_by_id(&self, id: DocumentId) -> DomainResult<StoredDocument> {
        query_as::<_, StoredDocumentRow>("SELECT * FROM stored_documents WHERE id = ? AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?
            .ok_or_else(|| DomainError::not_found(Self::entity_name(), id))?
            .into_entity()
    }

    async fn find_by_entry(&self, entry_id: EntryId) -> DomainResult<Vec<StoredDocument>> {
        let rows = query_as::<_, StoredDocumentRow>(
            "SELECT * FROM stored_documents WHERE entry_id = ? AND deleted_at IS NULL ORDER BY id ASC",
        )
        .bind(entry_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;

        rows.into_iter().map(StoredDocumentRow::into_entity).collect()
    }

    async fn soft_delete_with_tx(
        &self,
        id: DocumentId,
        actor: UserId,
        tx: &mut Transaction<'_, Sqlite>,
    ) -> DomainResult<()> {
        let now = Utc::now().to_rfc3339();

        let result = query(
            "UPDATE stored_documents SET deleted_at = ?, updated_at = ?, updated_by_user_id = ? WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(actor)
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            // Could be already deleted or not found
            Err(DomainError::not_found(Self::entity_name(), id))
        } else {
            Ok(())
        }
    }

    async fn soft_delete(&self, id: DocumentId, actor: UserId) -> DomainResult<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;
        let result = self.soft_delete_with_tx(id, actor, &mut tx).await;
        match result {
            Ok(_) => {
                tx.commit().await.map_err(DbError::from)?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback().await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{insert_entry, insert_user, memory_pool, EntryFixture};

    fn new_doc(entry_id: EntryId, stem: &str, actor: UserId) -> NewStoredDocument {
        NewStoredDocument {
            entry_id,
            original_path: format!("originals/{}.pdf", stem),
            document_path: format!("documents/{}.avif", stem),
            thumbnail_path: format!("thumbnails/{}.avif", stem),
            original_filename: "scan.pdf".to_string(),
            page_number: 1,
            actor,
        }
    }

    #[tokio::test]
    async fn test_create_find_and_soft_delete() {
        let pool = memory_pool().await;
        let user = insert_user(&pool, "anna").await;
        let entry = insert_entry(&pool, EntryFixture::new("Bakery").created_by(user)).await;
        let repo = SqliteStoredDocumentRepository::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        let first = repo.create_with_tx(&new_doc(entry, "a", user), &mut tx).await.unwrap();
        let second = repo.create_with_tx(&new_doc(entry, "b", user), &mut tx).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.created_by_user_id, Some(user));
        assert_eq!(repo.find_by_id(first.id).await.unwrap(), first);

        let listed = repo.find_by_entry(entry).await.unwrap();
        assert_eq!(listed.iter().map(|d| d.id).collect::<Vec<_>>(), vec![first.id, second.id]);

        let other = insert_user(&pool, "ben").await;
        repo.soft_delete(first.id, other).await.unwrap();
        assert!(matches!(repo.find_by_id(first.id).await, Err(DomainError::NotFound(..))));
        assert_eq!(repo.find_by_entry(entry).await.unwrap().len(), 1);

        let stamped: Option<i64> = sqlx::query_scalar("SELECT updated_by_user_id FROM stored_documents WHERE id = ?")
            .bind(first.id)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stamped, Some(other));

        // Deleting twice reports not found.
        assert!(matches!(repo.soft_delete(first.id, other).await, Err(DomainError::NotFound(..))));
    }

    #[tokio::test]
    async fn test_paths_are_unique() {
        let pool = memory_pool().await;
        let user = insert_user(&pool, "anna").await;
        let entry = insert_entry(&pool, EntryFixture::new("Bakery").created_by(user)).await;
        let repo = SqliteStoredDocumentRepository::new(pool.clone());

        let mut tx = pool.begin().await.unwrap();
        repo.create_with_tx(&new_doc(entry, "a", user), &mut tx).await.unwrap();
        let err = repo.create_with_tx(&new_doc(entry, "a", user), &mut tx).await.unwrap_err();
        assert!(matches!(err, DomainError::Database(_)));
    }
}
