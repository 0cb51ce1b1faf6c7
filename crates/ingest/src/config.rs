//! Session configuration, loaded from an optional JSON file.

use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// What to do when extraction succeeds but finds no invoice entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyExtractionPolicy {
    /// Mark the document failed so the user looks at it
    #[default]
    Fail,
    /// Mark the document done with no records
    Accept,
}

/// Settings for the HTTP extraction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractorConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,

    /// Model name sent with each request
    pub model: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Per-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,

    /// Sampling temperature
    pub temperature: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "INVOICE_INGEST_API_KEY".to_string(),
            timeout_secs: None,
            temperature: 0.0,
        }
    }
}

impl ExtractorConfig {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, IngestError> {
        std::env::var(&self.api_key_env).map_err(|_| {
            IngestError::Config(format!(
                "Environment variable {} is not set",
                self.api_key_env
            ))
        })
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IngestConfig {
    pub extractor: ExtractorConfig,

    pub empty_extraction: EmptyExtractionPolicy,

    /// Maximum total uncompressed size of documents taken from one archive
    pub archive_size_limit_bytes: Option<u64>,

    /// Prefix for export file names
    pub export_prefix: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            empty_extraction: EmptyExtractionPolicy::Fail,
            archive_size_limit_bytes: Some(512 * 1024 * 1024), // 512 MiB
            export_prefix: "invoice_insights".to_string(),
        }
    }
}

impl IngestConfig {
    /// Load configuration from disk.
    ///
    /// A missing file gives the defaults. So does a file that fails to parse,
    /// after logging a warning.
    pub async fn load(path: &Path) -> Result<Self, IngestError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IngestError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        Ok(Self::from_json(&contents).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "failed to parse config, using defaults");
            Self::default()
        }))
    }

    pub fn from_json(contents: &str) -> Result<Self, IngestError> {
        serde_json::from_str(contents).map_err(|e| IngestError::Config(e.to_string()))
    }

    /// Write configuration as pretty JSON, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::Config(format!("Failed to serialize config: {}", e)))?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}
