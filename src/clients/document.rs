//! Document text extraction for PRD inputs.

use std::path::Path;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tokio::fs;

use crate::error::FailureClass;

#[derive(Debug, Error, Diagnostic)]
pub enum DocumentError {
    #[error("unsupported document format: {extension}")]
    #[diagnostic(
        code(plansmith::document::unsupported),
        help("Plain text and markdown are read directly; other formats need their own extractor.")
    )]
    Unsupported { extension: String },

    #[error("document is empty: {path}")]
    #[diagnostic(code(plansmith::document::empty))]
    Empty { path: String },

    #[error("failed to read document: {source}")]
    #[diagnostic(code(plansmith::document::io))]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl DocumentError {
    pub fn class(&self) -> FailureClass {
        match self {
            DocumentError::Unsupported { .. } | DocumentError::Empty { .. } => {
                FailureClass::Validation
            }
            DocumentError::Io { .. } => FailureClass::Integration,
        }
    }
}

/// Pull plain text out of a PRD file.
///
/// The pipeline takes PRD text, not files; extractors exist so callers can
/// accept uploads and pass the result to [`crate::service::Planner::start`].
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, DocumentError>;
}

/// Extractor for `.txt` and `.md` files.
#[derive(Debug, Clone, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    #[must_use]
    pub fn new() -> Self {
        PlainTextExtractor
    }
}

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract_text(&self, path: &Path) -> Result<String, DocumentError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        if extension != "txt" && extension != "md" {
            return Err(DocumentError::Unsupported { extension });
        }

        let text = fs::read_to_string(path).await?;
        if text.trim().is_empty() {
            return Err(DocumentError::Empty {
                path: path.display().to_string(),
            });
        }
        Ok(text)
    }
}
