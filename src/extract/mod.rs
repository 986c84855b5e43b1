//! Text extraction boundary
//!
//! Extraction is an external collaborator: the pipeline hands it raw bytes
//! and gets back page-tagged plain text. The built-in extractor handles
//! plain text and markdown with form-feed page separation; richer formats
//! plug in behind the same trait.

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// A single extracted page
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// 1-based page number
    pub number: u32,
    /// Plain text content of the page
    pub text: String,
}

/// Result of extracting a source file
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub pages: Vec<Page>,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|p| p.text.trim().is_empty())
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.len()).sum()
    }
}

/// Trait for text extraction backends
pub trait TextExtractor: Send + Sync {
    /// Extract page-tagged plain text from raw file bytes
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<ExtractedText>;
}

/// Extractor for plain text and markdown files.
///
/// Pages are delimited by form-feed characters; input without form feeds
/// becomes a single page.
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], content_type: &str) -> Result<ExtractedText> {
        if !matches!(content_type, "text/plain" | "text/markdown") {
            return Err(Error::Validation(format!(
                "Unsupported content type for text extraction: {}",
                content_type
            )));
        }

        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Validation(format!("File is not valid UTF-8: {}", e)))?;

        let pages = text
            .split('\u{c}')
            .enumerate()
            .map(|(i, page_text)| Page {
                number: (i + 1) as u32,
                text: page_text.to_string(),
            })
            .collect();

        Ok(ExtractedText { pages })
    }
}

/// Guess the MIME type of an upload from its file name
pub fn detect_content_type(file_name: &str) -> String {
    mime_guess::from_path(Path::new(file_name))
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Validate an upload against the configured type allowlist and size ceiling.
///
/// Returns the detected content type. Fails fast before a job is created.
pub fn validate_upload(file_name: &str, size: u64, config: &UploadConfig) -> Result<String> {
    if size == 0 {
        return Err(Error::Validation(format!("File '{}' is empty", file_name)));
    }

    if size > config.max_bytes {
        return Err(Error::Validation(format!(
            "File '{}' is {} bytes, over the {} byte ceiling",
            file_name, size, config.max_bytes
        )));
    }

    let content_type = detect_content_type(file_name);
    if !config
        .allowed_content_types
        .iter()
        .any(|t| t == &content_type)
    {
        return Err(Error::Validation(format!(
            "Unsupported file type '{}' for '{}'",
            content_type, file_name
        )));
    }

    Ok(content_type)
}
