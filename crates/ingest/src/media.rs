//! Supported media types and the lookups between extensions and MIME strings.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// MIME type of a PDF document.
pub const MIME_PDF: &str = "application/pdf";
/// MIME type of a legacy Word document.
pub const MIME_DOC: &str = "application/msword";
/// MIME type of an Office Open XML Word document.
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
/// MIME type of a ZIP container.
pub const MIME_ZIP: &str = "application/zip";

/// Alternate ZIP MIME types reported by some platforms.
const ZIP_ALIASES: &[&str] = &["application/x-zip-compressed", "application/x-zip"];

/// A media type the ingestion pipeline knows how to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Doc,
    Docx,
    /// Only valid for a top-level upload, never inside another archive.
    Zip,
}

impl MediaType {
    /// Canonical MIME string.
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => MIME_PDF,
            MediaType::Doc => MIME_DOC,
            MediaType::Docx => MIME_DOCX,
            MediaType::Zip => MIME_ZIP,
        }
    }

    /// Conventional file extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Pdf => "pdf",
            MediaType::Doc => "doc",
            MediaType::Docx => "docx",
            MediaType::Zip => "zip",
        }
    }

    /// Whether this is a document that can be queued for extraction.
    pub fn is_document(&self) -> bool {
        !matches!(self, MediaType::Zip)
    }

    /// Parse a MIME string, accepting the common ZIP aliases.
    pub fn from_mime(mime: &str) -> Result<Self, IngestError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            MIME_PDF => Ok(MediaType::Pdf),
            MIME_DOC => Ok(MediaType::Doc),
            MIME_DOCX => Ok(MediaType::Docx),
            MIME_ZIP => Ok(MediaType::Zip),
            other if ZIP_ALIASES.contains(&other) => Ok(MediaType::Zip),
            _ => Err(IngestError::UnsupportedMediaType(mime.to_string())),
        }
    }

    /// Look up a document type from a file name's extension.
    ///
    /// Only `pdf`, `doc` and `docx` qualify; this is the allow-list applied to
    /// archive entries, so `zip` deliberately yields `None`.
    pub fn document_from_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "doc" => Some(MediaType::Doc),
            "docx" => Some(MediaType::Docx),
            _ => None,
        }
    }

    /// Guess the MIME type of a local file from its path.
    ///
    /// Returns `None` for unknown extensions.
    pub fn guess_mime(path: &Path) -> Option<String> {
        mime_guess::from_path(path).first().map(|m| m.to_string())
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}
