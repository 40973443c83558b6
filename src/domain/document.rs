//! Input documents as supplied by the external loader.
//!
//! A `Document` is immutable once ingested: text extraction from PDF/HTML
//! happens upstream, and the pipeline only ever reads `raw_text`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bibliographic metadata attached by the loader, when known.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// PubMed identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,

    /// Digital object identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,

    /// Article title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// A full-text biomedical document (case report, article).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier for this document
    pub id: Uuid,

    /// Path the loader read this document from, if file-backed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,

    /// Full extracted text, UTF-8
    pub raw_text: String,

    /// Bibliographic metadata
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document from raw text with a fresh id.
    pub fn new(raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_path: None,
            raw_text: raw_text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Attach the source path the text was read from.
    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }

    /// Attach bibliographic metadata.
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Whether the document has any processable text at all.
    pub fn is_readable(&self) -> bool {
        !self.raw_text.trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_document_is_unreadable() {
        assert!(!Document::new("   \n\t  ").is_readable());
        assert!(Document::new("Patient 1 was well.").is_readable());
    }
}
