//! Turning uploads and local files into queueable document units.

use crate::archive::expand_archive;
use crate::decode::{read_document, EncodedDocument};
use crate::error::IngestError;
use crate::media::MediaType;
use crate::types::DocumentUnit;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// A file handed to the system with its declared type.
#[derive(Debug, Clone)]
pub struct Upload {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }
}

/// Convert an upload into pending units.
///
/// A document becomes one unit. An archive becomes one unit per qualifying
/// entry, in archive order; nothing is returned if any entry fails.
///
/// # Errors
///
/// - `InvalidInput` if the declared type is not a document or archive type
/// - `ArchiveCorrupt` / `SizeLimitExceeded` if the archive cannot be expanded
pub async fn units_from_upload(
    upload: Upload,
    size_limit: Option<u64>,
) -> Result<Vec<DocumentUnit>, IngestError> {
    let media_type = MediaType::from_mime(&upload.mime).map_err(|_| {
        IngestError::InvalidInput(format!(
            "{} has unsupported type {}",
            upload.name, upload.mime
        ))
    })?;

    if media_type.is_document() {
        debug!(name = %upload.name, media_type = %media_type, "accepted document");
        let content = EncodedDocument::encode(&upload.bytes, media_type);
        return Ok(vec![DocumentUnit::new(upload.name, content)]);
    }

    let name = upload.name;
    let bytes = upload.bytes;
    // Decompression and encoding are CPU-bound; keep them off the async workers.
    let units = tokio::task::spawn_blocking(move || {
        expand_archive(bytes, size_limit).map(|documents| {
            documents
                .into_iter()
                .map(|doc| {
                    let content = EncodedDocument::encode(&doc.bytes, doc.media_type);
                    DocumentUnit::new(doc.path, content)
                })
                .collect::<Vec<_>>()
        })
    })
    .await
    .map_err(|e| IngestError::ArchiveCorrupt(format!("Archive task failed: {}", e)))??;

    info!(archive = %name, documents = units.len(), "expanded archive");
    Ok(units)
}

/// Convert a local file or directory into pending units.
///
/// Files are typed by extension. Directories are walked recursively in
/// name order; files inside them that are neither documents nor archives
/// are skipped.
///
/// # Errors
///
/// - `InvalidInput` for a loose file with an unsupported extension
/// - `DecodeFailed` if a file cannot be read
/// - any error from [`units_from_upload`] for archives
pub async fn units_from_path(
    path: &Path,
    size_limit: Option<u64>,
) -> Result<Vec<DocumentUnit>, IngestError> {
    if !path.is_dir() {
        return units_from_file(path, display_name(path, None), size_limit).await;
    }

    let mut units = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| IngestError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let file = entry.path();
        if MediaType::guess_mime(file)
            .and_then(|mime| MediaType::from_mime(&mime).ok())
            .is_none()
        {
            debug!(path = %file.display(), "skipping unsupported file");
            continue;
        }

        let name = display_name(file, Some(path));
        units.extend(units_from_file(file, name, size_limit).await?);
    }

    info!(dir = %path.display(), documents = units.len(), "scanned directory");
    Ok(units)
}

async fn units_from_file(
    path: &Path,
    name: String,
    size_limit: Option<u64>,
) -> Result<Vec<DocumentUnit>, IngestError> {
    let mime = MediaType::guess_mime(path).ok_or_else(|| {
        IngestError::InvalidInput(format!("{} has an unknown file type", path.display()))
    })?;
    let media_type = MediaType::from_mime(&mime).map_err(|_| {
        IngestError::InvalidInput(format!("{} has unsupported type {}", path.display(), mime))
    })?;

    if media_type.is_document() {
        let content = read_document(path, media_type).await?;
        return Ok(vec![DocumentUnit::new(name, content)]);
    }

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| IngestError::DecodeFailed(format!("{}: {}", path.display(), e)))?;
    units_from_upload(Upload::new(name, mime, bytes), size_limit).await
}

/// Name shown for a local file: relative to the walked directory, or the
/// bare file name.
fn display_name(file: &Path, root: Option<&Path>) -> String {
    root.and_then(|root| file.strip_prefix(root).ok())
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
        .or_else(|| file.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| file.display().to_string())
}
