//! Invoice field vocabulary, column schema and basic type coercion.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const CLIENT_NAME: &str = "clientName";
pub const CLIENT_ID: &str = "clientId";
pub const INVOICE_NO: &str = "invoiceNo";
pub const INVOICE_DATE: &str = "invoiceDate";
pub const PERIOD: &str = "period";
pub const PURPOSE: &str = "purpose";
pub const AMOUNT_EXCL_GST: &str = "amountExclGST";
pub const GST_PERCENTAGE: &str = "gstPercentage";
pub const TOTAL_INCL_GST: &str = "totalInclGST";
pub const STATUS: &str = "status";
pub const LINK: &str = "link";

/// Keys whose values are decimal numbers.
pub const NUMERIC_KEYS: &[&str] = &[AMOUNT_EXCL_GST, GST_PERCENTAGE, TOTAL_INCL_GST];

/// Keys that cannot be changed through a text edit.
pub const READ_ONLY_KEYS: &[&str] = &["id", LINK, "fileName"];

/// Fixed export column order.
pub const EXPORT_COLUMNS: [&str; 13] = [
    "SL No.",
    "Client Name",
    "Client ID",
    "Invoice No",
    "Invoice Date",
    "Period",
    "Purpose",
    "Amount (excl. GST)",
    "GST % Used",
    "Total incl. GST",
    "Status",
    "Link",
    "File Name",
];

/// What each export column is filled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSource {
    /// 1-based row number
    SerialNumber,
    /// A field of the record
    Field(&'static str),
    /// The record's source file name
    FileName,
}

/// Sources for [`EXPORT_COLUMNS`], index for index.
pub const COLUMN_SOURCES: [ColumnSource; 13] = [
    ColumnSource::SerialNumber,
    ColumnSource::Field(CLIENT_NAME),
    ColumnSource::Field(CLIENT_ID),
    ColumnSource::Field(INVOICE_NO),
    ColumnSource::Field(INVOICE_DATE),
    ColumnSource::Field(PERIOD),
    ColumnSource::Field(PURPOSE),
    ColumnSource::Field(AMOUNT_EXCL_GST),
    ColumnSource::Field(GST_PERCENTAGE),
    ColumnSource::Field(TOTAL_INCL_GST),
    ColumnSource::Field(STATUS),
    ColumnSource::Field(LINK),
    ColumnSource::FileName,
];

/// Columns handed to the extraction service. File name is provenance, not
/// something read from the document.
pub fn extraction_columns() -> Vec<String> {
    EXPORT_COLUMNS[..EXPORT_COLUMNS.len() - 1]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    /// Not present in the document or cleared by the user
    Absent,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce loosely typed JSON from an extraction reply.
    ///
    /// Numeric keys accept numbers and numeric strings ("1,250.50"); other
    /// keys take strings, with numbers and booleans rendered as text.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Self {
        use serde_json::Value;

        let numeric = NUMERIC_KEYS.contains(&key);
        match value {
            Value::Null => FieldValue::Absent,
            Value::Number(n) if numeric => n.as_f64().map_or(FieldValue::Absent, FieldValue::Number),
            Value::Number(n) => FieldValue::Text(n.to_string()),
            Value::String(s) if numeric => parse_decimal(s).map_or_else(
                || {
                    if s.trim().is_empty() {
                        FieldValue::Absent
                    } else {
                        FieldValue::Text(s.clone())
                    }
                },
                FieldValue::Number,
            ),
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Bool(b) => FieldValue::Text(b.to_string()),
            other => FieldValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Absent => Ok(()),
        }
    }
}

/// Field name to value. Keys use the camelCase vocabulary above.
pub type Fields = BTreeMap<String, FieldValue>;

/// Convert one JSON object from an extraction reply into fields.
pub fn fields_from_json(object: &serde_json::Map<String, serde_json::Value>) -> Fields {
    object
        .iter()
        .map(|(key, value)| (key.clone(), FieldValue::from_json(key, value)))
        .collect()
}

/// Coerce a user's text edit for one field.
///
/// Numeric fields: empty input clears the value, anything else must parse as
/// a decimal. Other fields are stored as given.
///
/// # Errors
///
/// Returns `InvalidInput` for read-only keys or unparsable numbers.
pub fn coerce_edit(key: &str, raw: &str) -> Result<FieldValue, IngestError> {
    if READ_ONLY_KEYS.contains(&key) {
        return Err(IngestError::InvalidInput(format!(
            "Field '{}' cannot be edited",
            key
        )));
    }

    if NUMERIC_KEYS.contains(&key) {
        if raw.trim().is_empty() {
            return Ok(FieldValue::Absent);
        }
        return parse_decimal(raw).map(FieldValue::Number).ok_or_else(|| {
            IngestError::InvalidInput(format!("'{}' is not a number for field '{}'", raw, key))
        });
    }

    Ok(FieldValue::Text(raw.to_string()))
}

fn parse_decimal(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Payment status as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    PartiallyPaid,
    Other(String),
    Unknown,
}

impl PaymentStatus {
    /// Normalize the `status` field of a record.
    pub fn from_fields(fields: &Fields) -> Self {
        match fields.get(STATUS) {
            Some(FieldValue::Text(s)) => match s.trim().to_lowercase().as_str() {
                "paid" => PaymentStatus::Paid,
                "unpaid" | "pending" => PaymentStatus::Unpaid,
                "partially paid" => PaymentStatus::PartiallyPaid,
                "" => PaymentStatus::Unknown,
                _ => PaymentStatus::Other(s.clone()),
            },
            Some(FieldValue::Number(n)) => PaymentStatus::Other(n.to_string()),
            _ => PaymentStatus::Unknown,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Paid => write!(f, "Paid"),
            PaymentStatus::Unpaid => write!(f, "Unpaid"),
            PaymentStatus::PartiallyPaid => write!(f, "Partially Paid"),
            PaymentStatus::Other(s) => f.write_str(s),
            PaymentStatus::Unknown => write!(f, "Unknown"),
        }
    }
}
