//! Document text extraction — thin adapter over `pdf-extract` and UTF-8 text.
//!
//! Contract: given bytes and the declared filename, return the extracted text or
//! `None`. Unsupported formats and unreadable documents are `None`, never an error.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Source format, declared by the uploaded filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    Pdf,
    Docx,
    Text,
    Unknown,
}

impl SourceFormat {
    pub fn from_filename(name: &str) -> Self {
        let extension = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.trim().to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "pdf" => SourceFormat::Pdf,
            "docx" => SourceFormat::Docx,
            "txt" | "text" | "md" => SourceFormat::Text,
            _ => SourceFormat::Unknown,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            SourceFormat::Pdf => "application/pdf",
            SourceFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            SourceFormat::Text => "text/plain",
            SourceFormat::Unknown => "application/octet-stream",
        }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract_text(&self, bytes: Bytes, declared_filename: &str) -> Option<String>;
}

/// Default extractor: PDF via `pdf-extract` (on the blocking pool), plain text via lossy UTF-8.
pub struct DocumentTextExtractor;

#[async_trait]
impl TextExtractor for DocumentTextExtractor {
    async fn extract_text(&self, bytes: Bytes, declared_filename: &str) -> Option<String> {
        if bytes.is_empty() {
            return None;
        }

        match SourceFormat::from_filename(declared_filename) {
            SourceFormat::Pdf => {
                // pdf-extract is CPU-bound and may panic on malformed input;
                // a panic surfaces here as a JoinError.
                let result = tokio::task::spawn_blocking(move || {
                    pdf_extract::extract_text_from_mem(&bytes)
                })
                .await;

                match result {
                    Ok(Ok(text)) => Some(text),
                    Ok(Err(e)) => {
                        warn!("PDF extraction failed for {declared_filename}: {e}");
                        None
                    }
                    Err(e) => {
                        warn!("PDF extraction aborted for {declared_filename}: {e}");
                        None
                    }
                }
            }
            SourceFormat::Text => Some(String::from_utf8_lossy(&bytes).into_owned()),
            format => {
                debug!("Unsupported resume format {format:?} for {declared_filename}");
                None
            }
        }
    }
}
