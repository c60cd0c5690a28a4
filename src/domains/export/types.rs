use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::domains::document::types::StoredDocument;
use crate::types::{DocumentId, EntryId};

/// Archive container of an export artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveFormat {
    #[serde(rename = "zip")]
    Zip,
    #[serde(rename = "tar.gz")]
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArchiveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(ArchiveFormat::Zip),
            "tar.gz" | "targz" | "tgz" => Ok(ArchiveFormat::TarGz),
            other => Err(format!("Unknown archive format: {}", other)),
        }
    }
}

/// Parameters of one export run. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportParams {
    pub include_documents: bool,
    pub convert_to_universal_format: bool,
    pub archive_format: ArchiveFormat,
}

impl Default for ExportParams {
    fn default() -> Self {
        Self {
            include_documents: false,
            convert_to_universal_format: false,
            archive_format: ArchiveFormat::Zip,
        }
    }
}

/// Retention and download-link policy.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub max_files: usize,
    pub max_age_days: i64,
    pub link_ttl: Duration,
    pub universal_jpeg_quality: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_age_days: 7,
            link_ttl: Duration::hours(6),
            universal_jpeg_quality: 80,
        }
    }
}

/// One entry with its joined reference data, as written to the CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    pub entry_id: EntryId,
    pub date: String,
    pub recipient_sender: String,
    pub description: Option<String>,
    /// Unsigned magnitude; the sign follows `is_income`.
    pub amount: Option<Decimal>,
    pub is_income: bool,
    pub payment_method: Option<String>,
    pub no_invoice: bool,
    pub category_name: Option<String>,
    pub document_count: i64,
    pub created_at: DateTime<Utc>,
    pub created_by_username: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub updated_by_username: Option<String>,
    /// Non-deleted documents; only loaded when documents are exported.
    pub documents: Vec<StoredDocument>,
}

impl ExportRecord {
    /// Income positive, expense negative.
    pub fn signed_amount(&self) -> Option<Decimal> {
        self.amount.map(|amount| {
            let magnitude = amount.abs();
            if self.is_income || magnitude.is_zero() {
                magnitude
            } else {
                -magnitude
            }
        })
    }
}

/// A document that could not be collected into an export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityWarning {
    pub entry_id: EntryId,
    pub document_id: DocumentId,
    pub path: String,
    pub reason: String,
}

/// A retention deletion that did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetentionSweepFailure {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionReport {
    pub deleted: Vec<String>,
    pub failures: Vec<RetentionSweepFailure>,
}

/// Outcome of a completed export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub filename: String,
    pub artifact_path: PathBuf,
    pub records_exported: usize,
    pub documents_collected: usize,
    pub integrity_warnings: Vec<IntegrityWarning>,
    pub retention: RetentionReport,
}

/// Stateless signed permission to download one artifact until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCapability {
    pub filename: String,
    /// Unix seconds.
    pub expires_at: i64,
    pub signature: String,
}

impl DownloadCapability {
    pub fn query_string(&self) -> String {
        format!(
            "name={}&expires={}&signature={}",
            urlencoding::encode(&self.filename),
            self.expires_at,
            urlencoding::encode(&self.signature)
        )
    }

    /// Relative URL of the download endpoint for this capability.
    pub fn download_path(&self) -> String {
        format!("/api/export/download?{}", self.query_string())
    }
}

/// An archive in the exports directory, with a fresh download capability.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub filename: String,
    pub size: u64,
    pub created: DateTime<Utc>,
    pub contains_documents: bool,
    pub converted_to_universal: bool,
    pub format: ArchiveFormat,
    pub capability: DownloadCapability,
}

/// Result of a run that asked for a link instead of a path.
#[derive(Debug, Clone, Serialize)]
pub struct ExportLink {
    pub report: ExportReport,
    pub capability: DownloadCapability,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn record(amount: Option<Decimal>, is_income: bool) -> ExportRecord {
        ExportRecord {
            entry_id: 1,
            date: "2024-01-05".to_string(),
            recipient_sender: "Bakery".to_string(),
            description: None,
            amount,
            is_income,
            payment_method: None,
            no_invoice: false,
            category_name: None,
            document_count: 0,
            created_at: Utc::now(),
            created_by_username: None,
            updated_at: Utc::now(),
            updated_by_username: None,
            documents: Vec::new(),
        }
    }

    #[test]
    fn test_signed_amount() {
        assert_eq!(record(Some(dec!(12.50)), true).signed_amount(), Some(dec!(12.50)));
        assert_eq!(record(Some(dec!(12.50)), false).signed_amount(), Some(dec!(-12.50)));
        assert_eq!(record(Some(dec!(0)), false).signed_amount(), Some(dec!(0)));
        assert_eq!(record(None, false).signed_amount(), None);
    }

    #[test]
    fn test_archive_format_parsing() {
        assert_eq!("zip".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert_eq!("TAR.GZ".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
        assert!("rar".parse::<ArchiveFormat>().is_err());
        assert_eq!(ArchiveFormat::TarGz.to_string(), "tar.gz");
    }

    #[test]
    fn test_capability_query_is_url_encoded() {
        let capability = DownloadCapability {
            filename: "2024-01-05_export_1700000000.tar.gz".to_string(),
            expires_at: 1_700_021_600,
            signature: "abc123".to_string(),
        };
        assert_eq!(
            capability.download_path(),
            "/api/export/download?name=2024-01-05_export_1700000000.tar.gz&expires=1700021600&signature=abc123"
        );
    }
}
