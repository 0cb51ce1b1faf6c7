//! Document decoder: raw bytes to a self-describing data URI and back.
//!
//! The encoded form is `data:<mime>;base64,<payload>`, the shape extraction
//! services accept for inline media.

use crate::error::IngestError;
use crate::media::MediaType;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

const DATA_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// A document body tagged with its media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncodedDocument(String);

impl EncodedDocument {
    /// Encode raw bytes with their media type.
    pub fn encode(bytes: &[u8], media_type: MediaType) -> Self {
        let payload = STANDARD.encode(bytes);
        Self(format!(
            "{}{}{}{}",
            DATA_PREFIX,
            media_type.mime(),
            BASE64_MARKER,
            payload
        ))
    }

    /// Wrap an already-encoded data URI, validating its header.
    pub fn parse(uri: impl Into<String>) -> Result<Self, IngestError> {
        let uri = uri.into();
        split_header(&uri)?;
        Ok(Self(uri))
    }

    /// The media type named in the header.
    pub fn media_type(&self) -> Result<MediaType, IngestError> {
        let (mime, _) = split_header(&self.0)?;
        MediaType::from_mime(mime)
    }

    /// Decode back to the exact original bytes and media type.
    pub fn decode(&self) -> Result<(Vec<u8>, MediaType), IngestError> {
        let (mime, payload) = split_header(&self.0)?;
        let media_type = MediaType::from_mime(mime)?;
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| IngestError::DecodeFailed(format!("Invalid base64 payload: {}", e)))?;
        Ok((bytes, media_type))
    }

    /// The full data URI.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EncodedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Payloads run to megabytes; show the header only.
        match split_header(&self.0) {
            Ok((mime, payload)) => write!(f, "data:{};base64,<{} chars>", mime, payload.len()),
            Err(_) => f.write_str("<malformed document>"),
        }
    }
}

/// Encode a document, rejecting anything outside the allow-list.
///
/// ZIP containers are accepted here because a top-level upload is encoded
/// before expansion; [`crate::ingest`] never queues one.
pub fn encode_document(bytes: &[u8], mime: &str) -> Result<EncodedDocument, IngestError> {
    let media_type = MediaType::from_mime(mime)?;
    Ok(EncodedDocument::encode(bytes, media_type))
}

/// Read a file and encode it.
///
/// Suspends until the whole file is read; documents are small enough that
/// streaming is not worth it.
pub async fn read_document(path: &Path, media_type: MediaType) -> Result<EncodedDocument, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::DecodeFailed(format!("{}: {}", path.display(), e)))?;
    debug!(path = %path.display(), bytes = bytes.len(), "read document");
    Ok(EncodedDocument::encode(&bytes, media_type))
}

fn split_header(uri: &str) -> Result<(&str, &str), IngestError> {
    let rest = uri
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| IngestError::DecodeFailed("Missing data: prefix".to_string()))?;
    let marker = rest
        .find(BASE64_MARKER)
        .ok_or_else(|| IngestError::DecodeFailed("Missing ;base64, marker".to_string()))?;
    Ok((&rest[..marker], &rest[marker + BASE64_MARKER.len()..]))
}
