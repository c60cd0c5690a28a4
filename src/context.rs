use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::AppConfig;
use crate::db_migration;
use crate::domains::document::{
    DocumentStore, FileStorageService, IngestionCoordinator, LocalFileStorageService, SqliteStoredDocumentRepository,
};
use crate::domains::document::service::{DocumentService, DocumentServiceImpl};
use crate::domains::export::{
    CapabilitySigner, CsvExporter, DocumentCollector, ExportLifecycle, ExportService, ExportServiceImpl,
    SqliteExportRecordSource,
};
use crate::domains::transcode::DocumentTranscoder;
use crate::errors::{DbError, DomainError, DomainResult};

/// Every service of the pipeline, wired once at startup.
pub struct AppContext {
    pub config: AppConfig,
    pub pool: SqlitePool,
    pub storage: Arc<dyn FileStorageService>,
    pub document_service: Arc<dyn DocumentService>,
    pub export_service: Arc<dyn ExportService>,
    pub lifecycle: ExportLifecycle,
}

impl AppContext {
    pub async fn initialize(config: AppConfig) -> DomainResult<Self> {
        log::info!("Initializing with storage root {}", config.storage_root.display());

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| DomainError::Configuration(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true);
        if let Some(parent) = options.get_filename().parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Configuration(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(DbError::from)?;

        Self::with_pool(config, pool).await
    }

    /// Wire the services on top of an existing pool. Migrations run first.
    pub async fn with_pool(config: AppConfig, pool: SqlitePool) -> DomainResult<Self> {
        db_migration::run_migrations(&pool).await?;

        let storage: Arc<dyn FileStorageService> = Arc::new(LocalFileStorageService::new(config.storage_root.clone()));
        storage.ensure_layout().await?;

        let transcoder = DocumentTranscoder::with_ghostscript(config.transcode.clone());
        let store = DocumentStore::new(
            pool.clone(),
            storage.clone(),
            Arc::new(SqliteStoredDocumentRepository::new(pool.clone())),
            config.transcode.codec,
        );
        let ingestion = IngestionCoordinator::new(transcoder.clone(), store);
        let document_service: Arc<dyn DocumentService> = Arc::new(DocumentServiceImpl::new(pool.clone(), ingestion));

        let signer = CapabilitySigner::new(config.signing_key.as_bytes())?;
        let lifecycle = ExportLifecycle::new(config.exports_dir(), signer, config.export.clone());
        let collector = DocumentCollector::new(storage.clone(), transcoder, config.export.universal_jpeg_quality);
        let export_service: Arc<dyn ExportService> = Arc::new(ExportServiceImpl::new(
            Arc::new(SqliteExportRecordSource::new(pool.clone())),
            CsvExporter::new(config.csv.clone()),
            collector,
            lifecycle.clone(),
        ));

        log::info!("Services initialized");
        Ok(Self {
            config,
            pool,
            storage,
            document_service,
            export_service,
            lifecycle,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::export::ExportParams;
    use crate::domains::transcode::{OutputCodec, UploadedFile};
    use crate::test_support::{insert_entry, insert_user, png_bytes, EntryFixture};
    use crate::types::OneOrMany;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> AppConfig {
        let vars: HashMap<&str, String> = [
            ("APP_KEY", "base64:context-test".to_string()),
            ("STORAGE_ROOT", dir.path().display().to_string()),
            ("DOCUMENT_CODEC", "jpeg".to_string()),
        ]
        .into_iter()
        .collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_creates_database_and_layout() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::initialize(config(&dir)).await.unwrap();

        assert!(dir.path().join("bookkeeping.db").is_file());
        for area in ["originals", "documents", "thumbnails", "exports"] {
            assert!(dir.path().join(area).is_dir(), "{}", area);
        }
        assert_eq!(context.config.transcode.codec, OutputCodec::Jpeg);
    }

    #[tokio::test]
    async fn test_upload_then_export_end_to_end() {
        let dir = TempDir::new().unwrap();
        let context = AppContext::initialize(config(&dir)).await.unwrap();
        let user = insert_user(&context.pool, "anna").await;
        let entry = insert_entry(&context.pool, EntryFixture::new("Bakery").amount("3.10").created_by(user)).await;

        context
            .document_service
            .upload_documents(entry, OneOrMany::One(UploadedFile::new(png_bytes(50, 30), "bon.png")), user)
            .await
            .unwrap();

        let link = context
            .export_service
            .export_with_link(ExportParams {
                include_documents: true,
                convert_to_universal_format: true,
                ..ExportParams::default()
            })
            .await
            .unwrap();

        assert!(link.report.filename.contains("_export_documents_jpeg_"));
        assert_eq!(link.report.documents_collected, 1);
        assert!(context
            .lifecycle
            .validate_capability(&link.capability.filename, link.capability.expires_at, &link.capability.signature));
        assert_eq!(context.export_service.list_exports().await.unwrap().len(), 1);
    }
}
