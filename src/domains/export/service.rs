use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::domains::export::archive;
use crate::domains::export::collector::{CollectionOutcome, DocumentCollector};
use crate::domains::export::download::{open_download, DownloadRequest, DownloadResponse};
use crate::domains::export::lifecycle::{name_artifact, ExportLifecycle};
use crate::domains::export::repository::ExportRecordSource;
use crate::domains::export::types::{
    ExportArtifact, ExportLink, ExportParams, ExportReport, RetentionReport, RetentionSweepFailure,
};
use crate::domains::export::writers::CsvExporter;
use crate::errors::{DomainError, DomainResult, ServiceResult};

/// Per-run scratch space lives under this directory of the exports folder.
pub const STAGING_DIR: &str = ".staging";

#[async_trait]
pub trait ExportService: Send + Sync {
    /// Build one archive now and apply retention afterwards.
    async fn run_export(&self, params: ExportParams) -> ServiceResult<ExportReport>;

    /// Like `run_export`, plus a signed download capability for the artifact.
    async fn export_with_link(&self, params: ExportParams) -> ServiceResult<ExportLink>;

    async fn list_exports(&self) -> ServiceResult<Vec<ExportArtifact>>;

    async fn download(&self, request: DownloadRequest) -> ServiceResult<DownloadResponse>;
}

pub struct ExportServiceImpl {
    records: Arc<dyn ExportRecordSource>,
    csv: CsvExporter,
    collector: DocumentCollector,
    lifecycle: ExportLifecycle,
}

impl ExportServiceImpl {
    pub fn new(
        records: Arc<dyn ExportRecordSource>,
        csv: CsvExporter,
        collector: DocumentCollector,
        lifecycle: ExportLifecycle,
    ) -> Self {
        Self {
            records,
            csv,
            collector,
            lifecycle,
        }
    }

    fn io_error(context: &str, path: &Path, e: std::io::Error) -> DomainError {
        DomainError::ArchiveFailure(format!("{} {}: {}", context, path.display(), e))
    }

    /// Everything between creating the staging directory and removing it.
    async fn build_in_staging(&self, params: &ExportParams, staging: &Path) -> DomainResult<ExportReport> {
        let records = Arc::new(self.records.fetch_records(params.include_documents).await?);
        log::info!("Exporting {} record(s)", records.len());

        let csv_path = staging.join(archive::CSV_ENTRY_NAME);
        {
            let csv = self.csv.clone();
            let records = records.clone();
            let csv_path = csv_path.clone();
            task::spawn_blocking(move || csv.export(records.as_slice(), &csv_path))
                .await
                .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
        }

        let (documents_root, outcome) = if params.include_documents {
            let root = staging.join(archive::DOCUMENTS_ENTRY_DIR);
            tokio::fs::create_dir_all(&root)
                .await
                .map_err(|e| Self::io_error("Failed to create", &root, e))?;
            let outcome = self
                .collector
                .collect(records.as_slice(), &root, params.convert_to_universal_format)
                .await?;
            (Some(root), outcome)
        } else {
            (None, CollectionOutcome::default())
        };

        let converted = params.include_documents && params.convert_to_universal_format;
        let filename = name_artifact(params.include_documents, converted, params.archive_format);
        let target = self.lifecycle.exports_dir().join(&filename);

        let artifact_path = {
            let format = params.archive_format;
            let target = target.clone();
            task::spawn_blocking(move || archive::build(&csv_path, documents_root.as_deref(), format, &target))
                .await
                .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??
        };

        Ok(ExportReport {
            filename,
            artifact_path,
            records_exported: records.len(),
            documents_collected: outcome.collected,
            integrity_warnings: outcome.warnings,
            retention: Default::default(),
        })
    }

    /// Retention never fails a run whose artifact is already in place.
    async fn sweep_retention(&self) -> RetentionReport {
        let lifecycle = self.lifecycle.clone();
        let result = task::spawn_blocking(move || lifecycle.sweep_retention())
            .await
            .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))
            .and_then(|swept| swept);
        retention_or_failure(self.lifecycle.exports_dir(), result)
    }

    fn staging_root(&self) -> PathBuf {
        self.lifecycle.exports_dir().join(STAGING_DIR)
    }
}

fn retention_or_failure(exports_dir: &Path, result: DomainResult<RetentionReport>) -> RetentionReport {
    match result {
        Ok(report) => report,
        Err(e) => {
            log::error!("Retention sweep of {} failed: {}", exports_dir.display(), e);
            RetentionReport {
                deleted: Vec::new(),
                failures: vec![RetentionSweepFailure {
                    filename: exports_dir.display().to_string(),
                    reason: e.to_string(),
                }],
            }
        }
    }
}

#[async_trait]
impl ExportService for ExportServiceImpl {
    async fn run_export(&self, params: ExportParams) -> ServiceResult<ExportReport> {
        let staging_root = self.staging_root();
        tokio::fs::create_dir_all(&staging_root)
            .await
            .map_err(|e| Self::io_error("Failed to create", &staging_root, e))?;

        let run_id = Uuid::new_v4();
        let staging = tempfile::Builder::new()
            .prefix(&run_id.to_string())
            .rand_bytes(0)
            .tempdir_in(&staging_root)
            .map_err(|e| Self::io_error("Failed to create staging in", &staging_root, e))?;
        log::debug!("Export run {} staging in {}", run_id, staging.path().display());

        let result = self.build_in_staging(&params, staging.path()).await;

        if let Err(e) = staging.close() {
            log::warn!("Failed to remove staging of export run {}: {}", run_id, e);
        }

        let mut report = match result {
            Ok(report) => report,
            Err(e) => {
                log::error!("Export run {} failed: {}", run_id, e);
                return Err(e.into());
            }
        };

        report.retention = self.sweep_retention().await;

        log::info!(
            "Export run {} wrote {} ({} record(s), {} document(s))",
            run_id,
            report.filename,
            report.records_exported,
            report.documents_collected
        );
        Ok(report)
    }

    async fn export_with_link(&self, params: ExportParams) -> ServiceResult<ExportLink> {
        let report = self.run_export(params).await?;
        let capability = self.lifecycle.issue_capability(&report.filename);
        Ok(ExportLink { report, capability })
    }

    async fn list_exports(&self) -> ServiceResult<Vec<ExportArtifact>> {
        let lifecycle = self.lifecycle.clone();
        let artifacts = task::spawn_blocking(move || lifecycle.list_artifacts())
            .await
            .map_err(|e| DomainError::Internal(format!("Task join error: {}", e)))??;
        Ok(artifacts)
    }

    async fn download(&self, request: DownloadRequest) -> ServiceResult<DownloadResponse> {
        Ok(open_download(&self.lifecycle, &request).await?)
    }
}
