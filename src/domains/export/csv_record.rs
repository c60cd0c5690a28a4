use serde::Serialize;

use crate::domains::export::types::ExportRecord;

/// One typed CSV cell. Booleans are rendered by the writer's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvCell {
    Text(String),
    Bool(bool),
}

impl CsvCell {
    pub fn empty() -> Self {
        CsvCell::Text(String::new())
    }
}

impl From<String> for CsvCell {
    fn from(value: String) -> Self {
        CsvCell::Text(value)
    }
}

impl From<&str> for CsvCell {
    fn from(value: &str) -> Self {
        CsvCell::Text(value.to_string())
    }
}

impl From<bool> for CsvCell {
    fn from(value: bool) -> Self {
        CsvCell::Bool(value)
    }
}

/// Trait for types that can be exported to CSV
pub trait CsvRecord: Serialize {
    /// Get CSV headers for this type
    fn headers() -> Vec<&'static str>;

    /// Convert to CSV row; one cell per header.
    fn to_csv(&self) -> Vec<CsvCell>;
}

// Helper for optional values
pub fn csv_optional_to_string<T: std::fmt::Display>(value: &Option<T>) -> String {
    value.as_ref().map(|v| v.to_string()).unwrap_or_default()
}

const CSV_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl CsvRecord for ExportRecord {
    fn headers() -> Vec<&'static str> {
        vec![
            "Entry ID",
            "Date",
            "Recipient/Sender",
            "Description",
            "Amount",
            "Category Name",
            "Is Income",
            "Payment Method",
            "No Invoice",
            "Attached Document Count",
            "Created At",
            "Username Created",
            "Updated At",
            "Username Updated",
        ]
    }

    fn to_csv(&self) -> Vec<CsvCell> {
        vec![
            self.entry_id.to_string().into(),
            self.date.clone().into(),
            self.recipient_sender.clone().into(),
            csv_optional_to_string(&self.description).into(),
            csv_optional_to_string(&self.signed_amount()).into(),
            csv_optional_to_string(&self.category_name).into(),
            self.is_income.into(),
            csv_optional_to_string(&self.payment_method).into(),
            self.no_invoice.into(),
            self.document_count.to_string().into(),
            self.created_at.format(CSV_DATETIME_FORMAT).to_string().into(),
            csv_optional_to_string(&self.created_by_username).into(),
            self.updated_at.format(CSV_DATETIME_FORMAT).to_string().into(),
            csv_optional_to_string(&self.updated_by_username).into(),
        ]
    }
}
