//! Type definitions for queued documents and extracted records.

use crate::decode::EncodedDocument;
use crate::fields::Fields;
use crate::media::MediaType;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle of a queued document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitStatus {
    /// Waiting for the dispatcher
    Pending,
    /// Currently being extracted; at most one unit at a time
    InFlight,
    /// Extraction produced records
    Done,
    /// Extraction failed or found nothing; can be retried by the user
    Failed,
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitStatus::Pending => write!(f, "pending"),
            UnitStatus::InFlight => write!(f, "in flight"),
            UnitStatus::Done => write!(f, "done"),
            UnitStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One document queued for extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUnit {
    /// Assigned at ingestion and never reused
    pub id: String,

    /// Original file name or archive entry path
    pub name: String,

    /// Type-tagged document body
    pub content: EncodedDocument,

    /// Current lifecycle status
    pub status: UnitStatus,

    /// Message from the last failed extraction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentUnit {
    /// Creates a pending unit with a fresh id.
    pub fn new(name: impl Into<String>, content: EncodedDocument) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            content,
            status: UnitStatus::Pending,
            error: None,
        }
    }
}

/// A structured invoice entry pulled out of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRecord {
    /// Independent of the source document's id
    pub id: String,

    /// Name of the document this came from; provenance only, not a link
    pub source_file_name: String,

    /// Field name to value
    pub fields: Fields,
}

impl ExtractedRecord {
    /// Creates a record with a fresh id.
    pub fn new(source_file_name: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_file_name: source_file_name.into(),
            fields,
        }
    }
}

/// Qualifying document inside an archive, without its contents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveEntry {
    /// Normalized path of the entry within the archive
    pub path: String,

    /// Media type from the extension
    pub media_type: MediaType,

    /// Uncompressed size in bytes
    pub size: u64,
}

/// Counts of queued documents per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub pending: usize,
    pub in_flight: usize,
    pub done: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.in_flight + self.done + self.failed
    }
}
