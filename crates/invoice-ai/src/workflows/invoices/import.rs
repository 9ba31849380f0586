use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use super::domain::{RawAmount, RawInvoiceRecord};

/// Reads header-based invoice CSV (`vendor,total,currency,po_number,body,confidence,date`).
/// Amounts stay raw text so scoring applies the same validation as JSON input.
pub fn read_invoice_records<R: Read>(
    reader: R,
) -> Result<Vec<RawInvoiceRecord>, InvoiceImportError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut records = Vec::new();

    for (index, row) in csv_reader.deserialize::<InvoiceRow>().enumerate() {
        let row = row?;
        // Header is line 1.
        records.push(row.into_record(index + 2)?);
    }

    Ok(records)
}

pub fn read_invoice_file<P: AsRef<Path>>(
    path: P,
) -> Result<Vec<RawInvoiceRecord>, InvoiceImportError> {
    let file = File::open(path)?;
    read_invoice_records(file)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InvoiceRow {
    #[serde(deserialize_with = "empty_string_as_none")]
    vendor: Option<String>,
    #[serde(alias = "amount", deserialize_with = "empty_string_as_none")]
    total: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none")]
    currency: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none")]
    po_number: Option<String>,
    #[serde(alias = "invoice_text", deserialize_with = "empty_string_as_none")]
    body: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none")]
    confidence: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none")]
    date: Option<String>,
}

impl InvoiceRow {
    fn into_record(self, line: usize) -> Result<RawInvoiceRecord, InvoiceImportError> {
        let confidence = self
            .confidence
            .map(|raw| {
                raw.parse::<f64>()
                    .map_err(|_| InvoiceImportError::Confidence { line, raw })
            })
            .transpose()?;

        Ok(RawInvoiceRecord {
            vendor: self.vendor,
            total: self.total.map(RawAmount::Text),
            currency: self.currency,
            po_number: self.po_number,
            body: self.body,
            confidence,
            date: self.date,
        })
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[derive(Debug)]
pub enum InvoiceImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Confidence { line: usize, raw: String },
}

impl std::fmt::Display for InvoiceImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvoiceImportError::Io(err) => write!(f, "failed to read invoice CSV: {}", err),
            InvoiceImportError::Csv(err) => write!(f, "invalid invoice CSV data: {}", err),
            InvoiceImportError::Confidence { line, raw } => {
                write!(f, "line {line}: confidence '{raw}' is not a number")
            }
        }
    }
}

impl std::error::Error for InvoiceImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InvoiceImportError::Io(err) => Some(err),
            InvoiceImportError::Csv(err) => Some(err),
            InvoiceImportError::Confidence { .. } => None,
        }
    }
}

impl From<std::io::Error> for InvoiceImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for InvoiceImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}
