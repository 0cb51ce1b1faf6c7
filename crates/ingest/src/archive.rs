//! Archive expander: turns an uploaded ZIP into standalone documents.

use crate::error::IngestError;
use crate::media::MediaType;
use crate::safety::{check_size_limits, validate_entry_name};
use crate::types::ArchiveEntry;
use std::io::{Cursor, Read, Seek};
use tracing::{debug, warn};
use zip::ZipArchive;

/// Upper bound on the buffer reserved up front for one entry.
///
/// Declared sizes come from the archive and cannot be trusted.
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// One document found inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDocument {
    /// Normalized entry path, used as the document's name
    pub path: String,

    /// Media type from the entry's extension
    pub media_type: MediaType,

    /// Uncompressed entry contents
    pub bytes: Vec<u8>,
}

impl ArchiveDocument {
    /// Summary without the contents.
    pub fn entry(&self) -> ArchiveEntry {
        ArchiveEntry {
            path: self.path.clone(),
            media_type: self.media_type,
            size: self.bytes.len() as u64,
        }
    }
}

/// Lazily walks a ZIP archive, yielding only qualifying documents.
///
/// Directory entries and entries without a `pdf`, `doc` or `docx` extension
/// are skipped silently; entry names that are absolute or climb out with
/// `..` are skipped with a warning. Contents are read only when the iterator
/// reaches the entry. The first read failure ends the iteration.
pub struct ArchiveExpander<R> {
    archive: ZipArchive<R>,
    next_index: usize,
    size_limit: Option<u64>,
    expanded_bytes: u64,
    finished: bool,
}

impl ArchiveExpander<Cursor<Vec<u8>>> {
    /// Open an archive held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, IngestError> {
        Self::new(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> ArchiveExpander<R> {
    /// Open an archive from any seekable reader.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveCorrupt` if the central directory cannot be parsed.
    pub fn new(reader: R) -> Result<Self, IngestError> {
        let archive = ZipArchive::new(reader)
            .map_err(|e| IngestError::ArchiveCorrupt(format!("Could not open archive: {}", e)))?;

        debug!(entries = archive.len(), "opened archive");

        Ok(Self {
            archive,
            next_index: 0,
            size_limit: None,
            expanded_bytes: 0,
            finished: false,
        })
    }

    /// Bound the total uncompressed size of the documents yielded.
    pub fn with_size_limit(mut self, limit: Option<u64>) -> Self {
        self.size_limit = limit;
        self
    }

    /// Number of raw entries in the archive, qualifying or not.
    pub fn raw_entry_count(&self) -> usize {
        self.archive.len()
    }

    /// Uncompressed bytes yielded so far.
    pub fn expanded_bytes(&self) -> u64 {
        self.expanded_bytes
    }

    fn fail(&mut self, err: IngestError) -> Option<Result<ArchiveDocument, IngestError>> {
        self.finished = true;
        Some(Err(err))
    }
}

impl<R: Read + Seek> Iterator for ArchiveExpander<R> {
    type Item = Result<ArchiveDocument, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        while self.next_index < self.archive.len() {
            let index = self.next_index;
            self.next_index += 1;

            // The lookup result borrows the archive, so only touch `finished` here.
            let mut entry = match self.archive.by_index(index) {
                Ok(entry) => entry,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(IngestError::ArchiveCorrupt(format!(
                        "Entry #{}: {}",
                        index, e
                    ))));
                }
            };

            if entry.is_dir() {
                continue;
            }

            let raw_name = entry.name().to_string();
            let Some(media_type) = MediaType::document_from_name(&raw_name) else {
                debug!(entry = %raw_name, "skipping unsupported archive entry");
                continue;
            };

            let path = match validate_entry_name(&raw_name) {
                Ok(path) => path,
                Err(e) => {
                    warn!(entry = %raw_name, error = %e, "skipping unsafe archive entry");
                    continue;
                }
            };

            let declared = entry.size();
            if let Err(e) =
                check_size_limits(self.expanded_bytes.saturating_add(declared), self.size_limit)
            {
                drop(entry);
                return self.fail(e);
            }

            let mut bytes = Vec::with_capacity(declared.min(MAX_PREALLOC) as usize);
            let read = entry.read_to_end(&mut bytes);
            drop(entry);

            if let Err(e) = read {
                let err = IngestError::ArchiveCorrupt(format!("{}: {}", raw_name, e));
                return self.fail(err);
            }

            self.expanded_bytes += bytes.len() as u64;
            if let Err(e) = check_size_limits(self.expanded_bytes, self.size_limit) {
                return self.fail(e);
            }

            debug!(entry = %path, bytes = bytes.len(), "expanded archive entry");

            return Some(Ok(ArchiveDocument {
                path,
                media_type,
                bytes,
            }));
        }

        self.finished = true;
        None
    }
}

/// Expand a whole archive, all or nothing.
///
/// # Errors
///
/// Returns the first error met; no documents are returned in that case.
pub fn expand_archive(
    bytes: Vec<u8>,
    size_limit: Option<u64>,
) -> Result<Vec<ArchiveDocument>, IngestError> {
    ArchiveExpander::from_bytes(bytes)?
        .with_size_limit(size_limit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in files {
            if name.ends_with('/') {
                zip.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                zip.start_file(*name, SimpleFileOptions::default()).unwrap();
                zip.write_all(content).unwrap();
            }
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn test_expander_is_lazy_and_ordered() {
        let bytes = build_zip(&[
            ("one.pdf", b"1"),
            ("notes.txt", b"x"),
            ("two.docx", b"22"),
        ]);

        let mut expander = ArchiveExpander::from_bytes(bytes).unwrap();
        assert_eq!(expander.raw_entry_count(), 3);

        let first = expander.next().unwrap().unwrap();
        assert_eq!(first.path, "one.pdf");
        assert_eq!(expander.expanded_bytes(), 1);

        let second = expander.next().unwrap().unwrap();
        assert_eq!(second.path, "two.docx");
        assert_eq!(second.media_type, MediaType::Docx);
        assert_eq!(expander.expanded_bytes(), 3);

        assert!(expander.next().is_none());
        assert!(expander.next().is_none());
    }

    #[test]
    fn test_expander_skips_unsafe_names() {
        let bytes = build_zip(&[("../escape.pdf", b"bad"), ("ok.pdf", b"good")]);
        let docs = expand_archive(bytes, None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].path, "ok.pdf");
    }

    #[test]
    fn test_expander_stops_after_size_limit() {
        let bytes = build_zip(&[("a.pdf", &[0u8; 64]), ("b.pdf", &[0u8; 64])]);
        let mut expander = ArchiveExpander::from_bytes(bytes)
            .unwrap()
            .with_size_limit(Some(100));

        assert!(expander.next().unwrap().is_ok());
        assert!(matches!(
            expander.next(),
            Some(Err(IngestError::SizeLimitExceeded { limit: 100, .. }))
        ));
        assert!(expander.next().is_none());
    }

    #[test]
    fn test_entry_summary() {
        let doc = ArchiveDocument {
            path: "q1/inv.pdf".to_string(),
            media_type: MediaType::Pdf,
            bytes: vec![1, 2, 3],
        };
        let entry = doc.entry();
        assert_eq!(entry.path, "q1/inv.pdf");
        assert_eq!(entry.size, 3);
    }
}
