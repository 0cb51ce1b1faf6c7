//! Error types for ingestion, dispatch and export.

use thiserror::Error;

/// Main error type for ingestion-time and user-action failures.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The upload's declared type is not an accepted document or archive type.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The archive could not be opened or one of its documents could not be read.
    #[error("Corrupted archive: {0}")]
    ArchiveCorrupt(String),

    /// The media type is outside the supported allow-list.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// The document bytes could not be read or the encoded form is malformed.
    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    /// Expanding the archive would exceed the configured size limit.
    #[error("Size limit exceeded: {current} bytes > {limit} bytes")]
    SizeLimitExceeded {
        /// Uncompressed bytes accumulated so far
        current: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// No document unit with this id is in the queue.
    #[error("Document not found: {0}")]
    UnitNotFound(String),

    /// No extracted record with this id exists.
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Only failed documents can be re-queued.
    #[error("Document {id} is {status} and cannot be retried")]
    NotRetryable {
        /// Unit id
        id: String,
        /// Current status of the unit
        status: String,
    },

    /// Building an export artifact failed.
    #[error("Export failed: {0}")]
    Export(String),

    /// The configuration could not be read or written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for IngestError {
    fn from(err: zip::result::ZipError) -> Self {
        IngestError::ArchiveCorrupt(err.to_string())
    }
}

/// Errors raised by an extraction collaborator.
///
/// These never abort a drain: the dispatcher records the message on the
/// failed document and moves on to the next one.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The request could not be sent or the connection failed.
    #[error("Request failed: {0}")]
    Request(String),

    /// The service answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body as text
        body: String,
    },

    /// The reply did not contain a usable list of invoice entries.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The document produced no invoice entries.
    #[error("No invoice entries found in document")]
    Empty,

    /// The extraction task panicked or was cancelled.
    #[error("Extraction aborted: {0}")]
    Aborted(String),
}

impl From<reqwest::Error> for ExtractionError {
    fn from(err: reqwest::Error) -> Self {
        ExtractionError::Request(err.to_string())
    }
}

/// Entry-name problems found while expanding or re-packing archives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecurityError {
    /// Path traversal attempt detected (e.g., "../../invoice.pdf").
    #[error("Path traversal attempt: {0}")]
    PathTraversal(String),

    /// Absolute path not allowed in archive entries.
    #[error("Absolute path not allowed: {0}")]
    AbsolutePath(String),
}
