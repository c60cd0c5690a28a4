//! Fixtures shared by the unit tests.

use std::io::Cursor;
use std::path::Path;
use std::str::FromStr;

use chrono::{TimeZone, Utc};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use walkdir::WalkDir;

use crate::db_migration;
use crate::domains::document::types::StoredDocument;
use crate::domains::export::types::ExportRecord;
use crate::domains::transcode::{PdfRasterizer, RasterPage};
use crate::errors::DomainResult;
use crate::types::{DocumentId, EntryId, UserId};

/// Single-connection in-memory database with foreign keys enforced and no tables.
pub async fn memory_pool_without_schema() -> Pool<Sqlite> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap().foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap()
}

/// In-memory database with every migration applied.
pub async fn memory_pool() -> Pool<Sqlite> {
    let pool = memory_pool_without_schema().await;
    db_migration::run_migrations(&pool).await.unwrap();
    pool
}

fn now_string() -> String {
    Utc::now().to_rfc3339()
}

pub async fn insert_user(pool: &Pool<Sqlite>, username: &str) -> UserId {
    sqlx::query("INSERT INTO users (username, created_at) VALUES (?, ?)")
        .bind(username)
        .bind(now_string())
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub async fn insert_category(pool: &Pool<Sqlite>, name: &str, deleted: bool) -> i64 {
    let now = now_string();
    sqlx::query("INSERT INTO categories (name, created_at, updated_at, deleted_at) VALUES (?, ?, ?, ?)")
        .bind(name)
        .bind(&now)
        .bind(&now)
        .bind(deleted.then(|| now.clone()))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

/// Builder for one `entries` row.
#[derive(Debug, Clone)]
pub struct EntryFixture {
    recipient_sender: String,
    date: String,
    description: Option<String>,
    amount: Option<String>,
    is_income: bool,
    payment_method: Option<String>,
    no_invoice: bool,
    category_id: Option<i64>,
    created_by: Option<UserId>,
    updated_by: Option<UserId>,
    deleted: bool,
    previous_version_id: Option<EntryId>,
}

impl EntryFixture {
    pub fn new(recipient_sender: &str) -> Self {
        Self {
            recipient_sender: recipient_sender.to_string(),
            date: "2024-01-05".to_string(),
            description: None,
            amount: None,
            is_income: false,
            payment_method: None,
            no_invoice: false,
            category_id: None,
            created_by: None,
            updated_by: None,
            deleted: false,
            previous_version_id: None,
        }
    }

    pub fn amount(mut self, amount: &str) -> Self {
        self.amount = Some(amount.to_string());
        self
    }

    pub fn income(mut self) -> Self {
        self.is_income = true;
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }

    pub fn no_invoice(mut self) -> Self {
        self.no_invoice = true;
        self
    }

    pub fn category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn created_by(mut self, user: UserId) -> Self {
        self.created_by = Some(user);
        self
    }

    pub fn updated_by(mut self, user: UserId) -> Self {
        self.updated_by = Some(user);
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn previous_version(mut self, entry: EntryId) -> Self {
        self.previous_version_id = Some(entry);
        self
    }
}

pub async fn insert_entry(pool: &Pool<Sqlite>, entry: EntryFixture) -> EntryId {
    let now = now_string();
    sqlx::query(
        "INSERT INTO entries (
            previous_version_id, date, recipient_sender, description, amount, is_income,
            payment_method, no_invoice, category_id, created_at, updated_at,
            created_by_user_id, updated_by_user_id, deleted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.previous_version_id)
    .bind(&entry.date)
    .bind(&entry.recipient_sender)
    .bind(&entry.description)
    .bind(&entry.amount)
    .bind(entry.is_income)
    .bind(&entry.payment_method)
    .bind(entry.no_invoice)
    .bind(entry.category_id)
    .bind(&now)
    .bind(&now)
    .bind(entry.created_by)
    .bind(entry.updated_by)
    .bind(entry.deleted.then(|| now.clone()))
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// A `stored_documents` row for `{stem}` with no files behind it.
pub async fn insert_document_row(pool: &Pool<Sqlite>, entry_id: EntryId, stem: &str, deleted: bool) -> DocumentId {
    let now = now_string();
    sqlx::query(
        "INSERT INTO stored_documents (
            entry_id, original_path, document_path, thumbnail_path, original_filename,
            page_number, created_at, updated_at, deleted_at
        ) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?)",
    )
    .bind(entry_id)
    .bind(format!("originals/{}.png", stem))
    .bind(format!("documents/{}.avif", stem))
    .bind(format!("thumbnails/{}.avif", stem))
    .bind(format!("{}.png", stem))
    .bind(&now)
    .bind(&now)
    .bind(deleted.then(|| now.clone()))
    .execute(pool)
    .await
    .unwrap()
    .last_insert_rowid()
}

/// Regular files below `root`, recursively. Zero if `root` does not exist.
pub fn count_files(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageOutputFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Rasterizer that ignores its input and returns `pages` pages; page N is `10 * N` pixels wide.
pub struct FakeRasterizer {
    pages: u32,
}

impl FakeRasterizer {
    pub fn pages(pages: u32) -> Self {
        Self { pages }
    }
}

impl PdfRasterizer for FakeRasterizer {
    fn rasterize(&self, _filename: &str, _pdf: &[u8]) -> DomainResult<Vec<RasterPage>> {
        // Returned out of order on purpose; callers sort by page number.
        Ok((1..=self.pages)
            .rev()
            .map(|page_number| RasterPage {
                page_number,
                image: DynamicImage::new_rgb8(10 * page_number, 10),
            })
            .collect())
    }
}

pub fn export_record(entry_id: EntryId) -> ExportRecord {
    let at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap();
    ExportRecord {
        entry_id,
        date: "2024-01-05".to_string(),
        recipient_sender: "Bakery".to_string(),
        description: None,
        amount: None,
        is_income: false,
        payment_method: None,
        no_invoice: false,
        category_name: Some("Food".to_string()),
        document_count: 0,
        created_at: at,
        created_by_username: None,
        updated_at: at,
        updated_by_username: None,
        documents: Vec::new(),
    }
}

/// Metadata for `originals/{stem}.{original_ext}` and `{documents,thumbnails}/{stem}.{variant_ext}`.
pub fn stored_document(
    id: DocumentId,
    entry_id: EntryId,
    stem: &str,
    original_ext: &str,
    variant_ext: &str,
) -> StoredDocument {
    let at = Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0).unwrap();
    StoredDocument {
        id,
        entry_id,
        original_path: format!("originals/{}.{}", stem, original_ext),
        document_path: format!("documents/{}.{}", stem, variant_ext),
        thumbnail_path: format!("thumbnails/{}.{}", stem, variant_ext),
        original_filename: format!("{}.{}", stem, original_ext),
        page_number: 1,
        created_by_user_id: None,
        updated_by_user_id: None,
        created_at: at,
        updated_at: at,
        deleted_at: None,
    }
}
