//! Runtime configuration, read from the environment (and `.env`, if present).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;

use crate::domains::export::types::ExportConfig;
use crate::domains::export::writers::{CsvConfig, CsvEncoding};
use crate::domains::transcode::{OutputCodec, TranscodeConfig};
use crate::errors::{DomainError, DomainResult};

const DEFAULT_STORAGE_ROOT: &str = "storage";
const DEFAULT_LINK_TTL_HOURS: i64 = 6;
const MAX_LINK_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Holds `originals/`, `documents/`, `thumbnails/` and `exports/`.
    pub storage_root: PathBuf,
    pub database_url: String,
    pub signing_key: String,
    pub transcode: TranscodeConfig,
    pub csv: CsvConfig,
    pub export: ExportConfig,
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>, default: T) -> DomainResult<T>
where
    T::Err: std::fmt::Display,
{
    match raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        Some(value) => value
            .parse::<T>()
            .map_err(|e| DomainError::Configuration(format!("Invalid {} '{}': {}", name, value, e))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load `.env` and read the process environment.
    pub fn from_env() -> DomainResult<Self> {
        if let Err(e) = dotenv::dotenv() {
            log::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable lookup.
    pub fn from_lookup<F>(lookup: F) -> DomainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage_root = PathBuf::from(parse_var("STORAGE_ROOT", lookup("STORAGE_ROOT"), DEFAULT_STORAGE_ROOT.to_string())?);
        let database_url = parse_var(
            "DATABASE_URL",
            lookup("DATABASE_URL"),
            format!("sqlite://{}", storage_root.join("bookkeeping.db").display()),
        )?;

        let signing_key = lookup("APP_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| DomainError::Configuration("APP_KEY must be set".to_string()))?;

        let transcode_defaults = TranscodeConfig::default();
        let transcode = TranscodeConfig {
            codec: parse_var::<OutputCodec>("DOCUMENT_CODEC", lookup("DOCUMENT_CODEC"), transcode_defaults.codec)?,
            quality: parse_var("DOCUMENT_QUALITY", lookup("DOCUMENT_QUALITY"), transcode_defaults.quality)?,
            document_max_dimension: parse_var(
                "DOCUMENT_MAX_DIMENSION",
                lookup("DOCUMENT_MAX_DIMENSION"),
                transcode_defaults.document_max_dimension,
            )?,
            thumbnail_max_dimension: parse_var(
                "THUMBNAIL_MAX_DIMENSION",
                lookup("THUMBNAIL_MAX_DIMENSION"),
                transcode_defaults.thumbnail_max_dimension,
            )?,
            ghostscript_path: parse_var(
                "GHOSTSCRIPT_PATH",
                lookup("GHOSTSCRIPT_PATH"),
                transcode_defaults.ghostscript_path.clone(),
            )?,
            ..transcode_defaults
        };
        if transcode.quality == 0 || transcode.quality > 100 {
            return Err(DomainError::Configuration(format!(
                "DOCUMENT_QUALITY must be between 1 and 100, got {}",
                transcode.quality
            )));
        }

        let csv_defaults = CsvConfig::default();
        let delimiter = match lookup("CSV_DELIMITER") {
            Some(raw) if !raw.is_empty() => match raw.as_bytes() {
                [byte] if byte.is_ascii() => *byte,
                _ => {
                    return Err(DomainError::Configuration(format!(
                        "CSV_DELIMITER must be a single ASCII character, got '{}'",
                        raw
                    )))
                }
            },
            _ => csv_defaults.delimiter,
        };
        let csv = CsvConfig {
            delimiter,
            encoding: parse_var::<CsvEncoding>("CSV_ENCODING", lookup("CSV_ENCODING"), csv_defaults.encoding)?,
            yes_label: parse_var("CSV_YES_LABEL", lookup("CSV_YES_LABEL"), csv_defaults.yes_label.clone())?,
            no_label: parse_var("CSV_NO_LABEL", lookup("CSV_NO_LABEL"), csv_defaults.no_label.clone())?,
            ..csv_defaults
        };

        let export_defaults = ExportConfig::default();
        let ttl_hours: i64 = parse_var("EXPORT_LINK_TTL_HOURS", lookup("EXPORT_LINK_TTL_HOURS"), DEFAULT_LINK_TTL_HOURS)?;
        let link_ttl = Some(ttl_hours)
            .filter(|hours| (1..=MAX_LINK_TTL_HOURS).contains(hours))
            .and_then(Duration::try_hours)
            .ok_or_else(|| {
                DomainError::Configuration(format!(
                    "EXPORT_LINK_TTL_HOURS must be between 1 and {}, got {}",
                    MAX_LINK_TTL_HOURS, ttl_hours
                ))
            })?;
        let max_age_days: i64 = parse_var("EXPORT_MAX_DAYS", lookup("EXPORT_MAX_DAYS"), export_defaults.max_age_days)?;
        if max_age_days < 0 {
            return Err(DomainError::Configuration(format!(
                "EXPORT_MAX_DAYS must not be negative, got {}",
                max_age_days
            )));
        }
        let export = ExportConfig {
            max_files: parse_var("EXPORT_MAX_FILES", lookup("EXPORT_MAX_FILES"), export_defaults.max_files)?,
            max_age_days,
            link_ttl,
            ..export_defaults
        };

        Ok(Self {
            storage_root,
            database_url,
            signing_key,
            transcode,
            csv,
            export,
        })
    }

    pub fn exports_dir(&self) -> PathBuf {
        self.storage_root.join("exports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> DomainResult<AppConfig> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AppConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[("APP_KEY", "secret")]).unwrap();
        assert_eq!(config.storage_root, PathBuf::from("storage"));
        assert_eq!(config.database_url, "sqlite://storage/bookkeeping.db");
        assert_eq!(config.transcode.codec, OutputCodec::Avif);
        assert_eq!(config.transcode.quality, 50);
        assert_eq!(config.transcode.document_max_dimension, 1920);
        assert_eq!(config.transcode.thumbnail_max_dimension, 128);
        assert_eq!(config.csv.delimiter, b';');
        assert_eq!(config.csv.encoding, CsvEncoding::Latin9);
        assert_eq!(config.export.max_files, 10);
        assert_eq!(config.export.max_age_days, 7);
        assert_eq!(config.export.link_ttl, Duration::hours(6));
        assert_eq!(config.exports_dir(), PathBuf::from("storage").join("exports"));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("APP_KEY", "secret"),
            ("STORAGE_ROOT", "/srv/books"),
            ("DOCUMENT_CODEC", "jpeg"),
            ("DOCUMENT_QUALITY", "85"),
            ("CSV_DELIMITER", ","),
            ("CSV_ENCODING", "utf-8"),
            ("EXPORT_MAX_FILES", "3"),
            ("EXPORT_LINK_TTL_HOURS", "1"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "sqlite:///srv/books/bookkeeping.db");
        assert_eq!(config.transcode.codec, OutputCodec::Jpeg);
        assert_eq!(config.transcode.quality, 85);
        assert_eq!(config.csv.delimiter, b',');
        assert_eq!(config.csv.encoding, CsvEncoding::Utf8);
        assert_eq!(config.export.max_files, 3);
        assert_eq!(config.export.link_ttl, Duration::hours(1));
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(matches!(config(&[]), Err(DomainError::Configuration(_))));
        for (name, value) in [
            ("DOCUMENT_CODEC", "gif"),
            ("DOCUMENT_QUALITY", "0"),
            ("CSV_DELIMITER", ";;"),
            ("CSV_ENCODING", "utf-16"),
            ("EXPORT_MAX_FILES", "-1"),
            ("EXPORT_LINK_TTL_HOURS", "0"),
            ("EXPORT_LINK_TTL_HOURS", "9000000000000"),
            ("EXPORT_LINK_TTL_HOURS", "8761"),
            ("EXPORT_MAX_DAYS", "-1"),
        ] {
            let result = config(&[("APP_KEY", "secret"), (name, value)]);
            assert!(matches!(result, Err(DomainError::Configuration(_))), "{} = {}", name, value);
        }
    }
}
