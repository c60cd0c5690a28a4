use csv::ByteRecord;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domains::export::csv_record::{CsvCell, CsvRecord};
use crate::errors::{DomainError, DomainResult};

use super::encoding::CsvEncoding;

#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub delimiter: u8,
    pub quote_char: u8,
    pub encoding: CsvEncoding,
    pub yes_label: String,
    pub no_label: String,
}

impl Default for CsvConfig {
    fn default() -> Self {
        Self {
            delimiter: b';',
            quote_char: b'"',
            encoding: CsvEncoding::Latin9,
            yes_label: "Yes".to_string(),
            no_label: "No".to_string(),
        }
    }
}

/// Writes a header row plus one row per record to a file.
#[derive(Debug, Clone, Default)]
pub struct CsvExporter {
    config: CsvConfig,
}

impl CsvExporter {
    pub fn new(config: CsvConfig) -> Self {
        Self { config }
    }

    fn encode_row<'a, I>(&self, cells: I) -> ByteRecord
    where
        I: IntoIterator<Item = &'a CsvCell>,
    {
        let mut record = ByteRecord::new();
        for cell in cells {
            let text = match cell {
                CsvCell::Text(text) => text.as_str(),
                CsvCell::Bool(true) => self.config.yes_label.as_str(),
                CsvCell::Bool(false) => self.config.no_label.as_str(),
            };
            record.push_field(&self.config.encoding.encode(text));
        }
        record
    }

    /// Create (or truncate) `path` and write all records. The file is left in place.
    pub fn export<T: CsvRecord>(&self, records: &[T], path: &Path) -> DomainResult<PathBuf> {
        let to_error = |e: csv::Error| DomainError::ArchiveFailure(format!("CSV write error: {}", e));

        let file = File::create(path)
            .map_err(|e| DomainError::ArchiveFailure(format!("Failed to create {}: {}", path.display(), e)))?;
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(self.config.delimiter)
            .quote(self.config.quote_char)
            .from_writer(BufWriter::new(file));

        let headers: Vec<CsvCell> = T::headers().into_iter().map(CsvCell::from).collect();
        wtr.write_byte_record(&self.encode_row(&headers)).map_err(to_error)?;

        for record in records {
            let cells = record.to_csv();
            wtr.write_byte_record(&self.encode_row(&cells)).map_err(to_error)?;
        }

        let mut inner = wtr
            .into_inner()
            .map_err(|e| DomainError::ArchiveFailure(format!("CSV flush error: {}", e)))?;
        inner
            .flush()
            .map_err(|e| DomainError::ArchiveFailure(format!("CSV flush error: {}", e)))?;

        log::debug!("Wrote {} CSV row(s) to {}", records.len(), path.display());
        Ok(path.to_path_buf())
    }
}
