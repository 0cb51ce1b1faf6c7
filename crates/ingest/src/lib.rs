//! # Ingest
//!
//! Invoice ingestion queue: accepts documents and ZIP archives, queues one
//! unit per document, extracts invoice entries one document at a time, and
//! exports the results.
//!
//! ## Pipeline
//!
//! - Uploads are typed by MIME: PDF, DOC and DOCX become one unit each; a ZIP
//!   is expanded and every `pdf`/`doc`/`docx` entry becomes a unit.
//! - Units wait in a FIFO queue. The dispatcher takes the oldest pending
//!   unit, hands it to an [`InvoiceExtractor`] and records the outcome.
//!   Exactly one extraction is in flight at any time.
//! - Extracted records are kept in arrival order and can be edited, deleted
//!   and exported as CSV, XLSX or a ZIP bundle with the source documents.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ingest::{EventBroadcaster, ExportFormat, HttpExtractor, IngestConfig, Session};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = IngestConfig::load(Path::new("ingest.json")).await?;
//! let extractor = Arc::new(HttpExtractor::new(config.extractor.clone())?);
//! let session = Session::new(config, extractor, Arc::new(EventBroadcaster::default()));
//!
//! session.ingest_path(Path::new("invoices/")).await?;
//! session.drain().await;
//!
//! let stats = session.stats();
//! println!("{} done, {} failed", stats.done, stats.failed);
//!
//! let csv = session.export(ExportFormat::Csv)?;
//! std::fs::write(session.export_file_name(ExportFormat::Csv), csv)?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod decode;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod export;
pub mod extraction;
pub mod fields;
pub mod ingest;
pub mod llm;
pub mod media;
pub mod queue;
pub mod results;
pub mod safety;
pub mod session;
pub mod state;
pub mod types;

// Re-export main types
pub use archive::{expand_archive, ArchiveDocument, ArchiveExpander};
pub use config::{EmptyExtractionPolicy, ExtractorConfig, IngestConfig};
pub use decode::{encode_document, read_document, EncodedDocument};
pub use dispatcher::{Dispatcher, DrainOutcome};
pub use error::{ExtractionError, IngestError, SecurityError};
pub use events::{EventBroadcaster, NoopObserver, QueueEvent, QueueObserver, TimedEvent};
pub use export::ExportFormat;
pub use extraction::InvoiceExtractor;
pub use fields::{extraction_columns, FieldValue, Fields, PaymentStatus, EXPORT_COLUMNS};
pub use ingest::Upload;
pub use llm::HttpExtractor;
pub use media::MediaType;
pub use queue::IngestionQueue;
pub use results::ResultAggregator;
pub use session::Session;
pub use state::{SharedState, SystemState};
pub use types::{ArchiveEntry, DocumentUnit, ExtractedRecord, QueueStats, UnitStatus};

/// List the documents an archive would yield, without encoding them.
///
/// # Errors
///
/// Returns `ArchiveCorrupt` if the archive cannot be parsed or an entry
/// cannot be read, and `SizeLimitExceeded` past `size_limit`.
pub fn list_archive(bytes: Vec<u8>, size_limit: Option<u64>) -> Result<Vec<ArchiveEntry>, IngestError> {
    ArchiveExpander::from_bytes(bytes)?
        .with_size_limit(size_limit)
        .map(|doc| doc.map(|d| d.entry()))
        .collect()
}
