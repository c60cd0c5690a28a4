use chrono::{DateTime, Local, NaiveDate, Utc};
use regex::Regex;
use std::cmp::Reverse;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration as StdDuration, SystemTime};

use crate::domains::export::capability::CapabilitySigner;
use crate::domains::export::types::{
    ArchiveFormat, DownloadCapability, ExportArtifact, ExportConfig, RetentionReport, RetentionSweepFailure,
};
use crate::errors::{DomainError, DomainResult};

fn artifact_name_regex() -> &'static Regex {
    static ARTIFACT_NAME_REGEX: OnceLock<Regex> = OnceLock::new();
    ARTIFACT_NAME_REGEX
        .get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})_export_(documents_jpeg_|documents_)?(\d+)\.(zip|tar\.gz)$").unwrap())
}

/// Facets encoded in an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub date: NaiveDate,
    pub contains_documents: bool,
    pub converted_to_universal: bool,
    pub epoch: i64,
    pub format: ArchiveFormat,
}

/// `{YYYY-MM-DD}_export_{documents_|documents_jpeg_|}{epoch}.{zip|tar.gz}`
pub fn name_artifact_at(
    include_documents: bool,
    converted: bool,
    format: ArchiveFormat,
    date: NaiveDate,
    epoch: i64,
) -> String {
    let documents = match (include_documents, converted) {
        (true, true) => "documents_jpeg_",
        (true, false) => "documents_",
        (false, _) => "",
    };
    format!(
        "{}_export_{}{}.{}",
        date.format("%Y-%m-%d"),
        documents,
        epoch,
        format.extension()
    )
}

/// Artifact name for the current local date and time.
pub fn name_artifact(include_documents: bool, converted: bool, format: ArchiveFormat) -> String {
    let now = Local::now();
    name_artifact_at(include_documents, converted, format, now.date_naive(), now.timestamp())
}

/// Parse a filename produced by [`name_artifact_at`]. Anything else is `None`.
pub fn parse_artifact_name(filename: &str) -> Option<ArtifactName> {
    let captures = artifact_name_regex().captures(filename)?;
    let date = NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y-%m-%d").ok()?;
    let documents = captures.get(2).map(|m| m.as_str());
    let epoch = captures.get(3)?.as_str().parse::<i64>().ok()?;
    let format = captures.get(4)?.as_str().parse::<ArchiveFormat>().ok()?;
    Some(ArtifactName {
        date,
        contains_documents: documents.is_some(),
        converted_to_universal: documents == Some("documents_jpeg_"),
        epoch,
        format,
    })
}

struct ArtifactFile {
    path: PathBuf,
    filename: String,
    name: ArtifactName,
    size: u64,
    modified: SystemTime,
}

/// Names, lists, signs and expires export artifacts in one directory.
#[derive(Debug, Clone)]
pub struct ExportLifecycle {
    exports_dir: PathBuf,
    signer: CapabilitySigner,
    config: ExportConfig,
}

impl ExportLifecycle {
    pub fn new(exports_dir: impl Into<PathBuf>, signer: CapabilitySigner, config: ExportConfig) -> Self {
        Self {
            exports_dir: exports_dir.into(),
            signer,
            config,
        }
    }

    pub fn exports_dir(&self) -> &Path {
        &self.exports_dir
    }

    pub fn issue_capability(&self, filename: &str) -> DownloadCapability {
        self.signer.issue(filename, self.config.link_ttl)
    }

    pub fn validate_capability(&self, filename: &str, expires_at: i64, signature: &str) -> bool {
        self.signer.validate(filename, expires_at, signature)
    }

    /// Recognised artifacts, newest first by modification time.
    fn scan(&self) -> DomainResult<Vec<ArtifactFile>> {
        let read_dir = match fs::read_dir(&self.exports_dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(DomainError::Internal(format!(
                    "Failed to list {}: {}",
                    self.exports_dir.display(),
                    e
                )))
            }
        };

        let mut artifacts = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| DomainError::Internal(format!("Failed to read export entry: {}", e)))?;
            let filename = entry.file_name().to_string_lossy().to_string();
            let Some(name) = parse_artifact_name(&filename) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                Ok(_) => continue,
                Err(e) => {
                    log::warn!("Skipping export {}: {}", filename, e);
                    continue;
                }
            };
            artifacts.push(ArtifactFile {
                path: entry.path(),
                filename,
                name,
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }

        artifacts.sort_by_key(|a| (Reverse(a.modified), Reverse(a.name.epoch), Reverse(a.filename.clone())));
        Ok(artifacts)
    }

    /// Every artifact with a freshly issued download capability.
    pub fn list_artifacts(&self) -> DomainResult<Vec<ExportArtifact>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|file| ExportArtifact {
                capability: self.issue_capability(&file.filename),
                created: DateTime::<Utc>::from(file.modified),
                size: file.size,
                contains_documents: file.name.contains_documents,
                converted_to_universal: file.name.converted_to_universal,
                format: file.name.format,
                filename: file.filename,
            })
            .collect())
    }

    /// Path of an existing artifact. Names that are not artifact names are never resolved.
    pub fn resolve_artifact(&self, filename: &str) -> DomainResult<PathBuf> {
        if parse_artifact_name(filename).is_none() {
            return Err(DomainError::not_found("export", filename));
        }
        let path = self.exports_dir.join(filename);
        if !path.is_file() {
            return Err(DomainError::not_found("export", filename));
        }
        Ok(path)
    }

    /// Apply the configured retention policy.
    pub fn sweep_retention(&self) -> DomainResult<RetentionReport> {
        self.sweep_retention_at(self.config.max_files, self.config.max_age_days, SystemTime::now())
    }

    /// Keep at most `max_files` artifacts, none older than `max_age_days`.
    /// Deletion failures are logged and reported, never raised.
    pub fn sweep_retention_at(&self, max_files: usize, max_age_days: i64, now: SystemTime) -> DomainResult<RetentionReport> {
        let max_age = StdDuration::from_secs((max_age_days.max(0) as u64).saturating_mul(24 * 60 * 60));
        let mut report = RetentionReport::default();

        for (rank, artifact) in self.scan()?.into_iter().enumerate() {
            let age = now.duration_since(artifact.modified).unwrap_or_default();
            if rank < max_files && age <= max_age {
                continue;
            }

            match fs::remove_file(&artifact.path) {
                Ok(()) => {
                    log::info!("Deleted export {} (rank {}, age {}s)", artifact.filename, rank, age.as_secs());
                    report.deleted.push(artifact.filename);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    log::error!("Failed to delete export {}: {}", artifact.filename, e);
                    report.failures.push(RetentionSweepFailure {
                        filename: artifact.filename,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
