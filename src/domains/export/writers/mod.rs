pub mod csv_writer;
pub mod encoding;

pub use csv_writer::{CsvConfig, CsvExporter};
pub use encoding::CsvEncoding;
