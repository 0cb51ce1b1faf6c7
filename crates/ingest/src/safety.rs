//! Entry-name and size checks applied when archives are expanded or built.
//!
//! Archive entry names become document names, which later become file names
//! inside the export bundle, so they must stay relative and free of `..`.

use crate::error::{IngestError, SecurityError};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Validates and normalizes an archive entry name.
///
/// Rejects absolute names and names with `..` components, drops `.`
/// components and redundant separators, and returns the normalized name with
/// `/` separators.
///
/// # Examples
///
/// ```
/// use ingest::safety::validate_entry_name;
///
/// assert_eq!(validate_entry_name("./march/inv-1.pdf").unwrap(), "march/inv-1.pdf");
/// assert!(validate_entry_name("../../inv-1.pdf").is_err());
/// assert!(validate_entry_name("/etc/inv-1.pdf").is_err());
/// ```
pub fn validate_entry_name(name: &str) -> Result<String, SecurityError> {
    // Archives written on Windows may use backslashes.
    let unified = name.replace('\\', "/");
    let path = Path::new(&unified);

    if path.is_absolute() || unified.starts_with('/') {
        return Err(SecurityError::AbsolutePath(name.to_string()));
    }

    let mut parts: Vec<&str> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    SecurityError::PathTraversal(format!("Invalid UTF-8 in entry name: {}", name))
                })?;
                parts.push(part);
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                return Err(SecurityError::PathTraversal(format!(
                    "Entry name contains '..' component: {}",
                    name
                )));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(SecurityError::AbsolutePath(name.to_string()));
            }
        }
    }

    if parts.is_empty() {
        return Err(SecurityError::PathTraversal(format!(
            "Entry name normalizes to empty: {:?}",
            name
        )));
    }

    Ok(parts.join("/"))
}

/// Checks accumulated uncompressed bytes against an optional limit.
///
/// ```
/// use ingest::safety::check_size_limits;
///
/// assert!(check_size_limits(1000, Some(2000)).is_ok());
/// assert!(check_size_limits(3000, Some(2000)).is_err());
/// assert!(check_size_limits(999_999_999, None).is_ok());
/// ```
pub fn check_size_limits(current_bytes: u64, limit: Option<u64>) -> Result<(), IngestError> {
    if let Some(max_bytes) = limit {
        if current_bytes > max_bytes {
            return Err(IngestError::SizeLimitExceeded {
                current: current_bytes,
                limit: max_bytes,
            });
        }
    }
    Ok(())
}

/// Hands out bundle entry names that are safe and never collide.
///
/// Unsafe names fall back to their final component; a repeated name gets
/// ` (1)`, ` (2)`, ... inserted before the extension.
#[derive(Debug, Default)]
pub struct UniqueNames {
    taken: HashSet<String>,
}

impl UniqueNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a name, returning the one actually assigned.
    pub fn assign(&mut self, wanted: &str) -> String {
        let base = validate_entry_name(wanted).unwrap_or_else(|_| fallback_name(wanted));

        if self.taken.insert(base.clone()) {
            return base;
        }

        let path = PathBuf::from(&base);
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());
        let ext = path.extension().map(|e| e.to_string_lossy().to_string());
        let parent = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .filter(|p| !p.is_empty());

        let mut counter = 1;
        loop {
            let file = match &ext {
                Some(ext) => format!("{} ({}).{}", stem, counter, ext),
                None => format!("{} ({})", stem, counter),
            };
            let candidate = match &parent {
                Some(parent) => format!("{}/{}", parent, file),
                None => file,
            };
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            counter += 1;
        }
    }
}

fn fallback_name(wanted: &str) -> String {
    wanted
        .replace('\\', "/")
        .rsplit('/')
        .find(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(str::to_string)
        .unwrap_or_else(|| "document".to_string())
}
