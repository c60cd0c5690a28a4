pub mod archive;
pub mod capability;
pub mod collector;
pub mod csv_record;
pub mod download;
pub mod lifecycle;
pub mod repository;
pub mod service;
pub mod types;
pub mod worker;
pub mod writers;

pub use capability::CapabilitySigner;
pub use collector::DocumentCollector;
pub use csv_record::CsvRecord;
pub use download::{DownloadRequest, DownloadResponse};
pub use lifecycle::{name_artifact, parse_artifact_name, ExportLifecycle};
pub use repository::{ExportRecordSource, SqliteExportRecordSource};
pub use service::{ExportService, ExportServiceImpl};
pub use types::{
    ArchiveFormat, DownloadCapability, ExportArtifact, ExportConfig, ExportLink, ExportParams, ExportRecord,
    ExportReport, IntegrityWarning, RetentionReport,
};
pub use worker::{ExportQueue, ExportWorker, JobHandle, JobStatus};
pub use writers::{CsvConfig, CsvEncoding, CsvExporter};
