//! Document loading: PDF bytes to an ordered sequence of page chunks

use async_trait::async_trait;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::Chunk;

/// Hard ceiling on text extraction; hostile font programs can hang the extractor
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(60);

/// Splits raw PDF bytes into one chunk per page.
///
/// Pages with no extractable text yield an empty-text chunk; the rest of the
/// pipeline treats those as valid but low-value for retrieval. An unparseable
/// byte stream fails the whole load.
pub struct PdfLoader;

impl PdfLoader {
    /// Load a document into page chunks with 1-based positions
    pub fn load(document_id: Uuid, data: &[u8]) -> Result<Vec<Chunk>> {
        let pages = Self::extract_pages_with_timeout(data)?;

        // Cross-check against the page tree; extraction bugs show up here first
        if let Ok(doc) = lopdf::Document::load_mem(data) {
            let tree_count = doc.get_pages().len();
            if tree_count != pages.len() {
                tracing::warn!(
                    "extractor returned {} pages but page tree has {}",
                    pages.len(),
                    tree_count
                );
            }
        }

        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(i, text)| Chunk::new(document_id, i as u32 + 1, text))
            .collect())
    }

    /// Cheap page count from the page tree, recorded on the document at upload time
    pub fn page_count(data: &[u8]) -> Result<u32> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::DocumentLoad(format!("Not a parseable PDF: {}", e)))?;
        Ok(doc.get_pages().len() as u32)
    }

    /// Run pdf-extract on a worker thread with a receive timeout
    fn extract_pages_with_timeout(data: &[u8]) -> Result<Vec<String>> {
        let data_vec = data.to_vec();
        let (tx, rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            let result = pdf_extract::extract_text_from_mem_by_pages(&data_vec);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(EXTRACT_TIMEOUT) {
            Ok(Ok(pages)) => {
                let _ = handle.join();
                Ok(pages.iter().map(|p| clean_page_text(p)).collect())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                tracing::warn!("pdf-extract failed: {}, trying content-stream fallback", e);
                Self::extract_pages_fallback(data)
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // The extraction thread cannot be killed; leave it and fall back
                tracing::error!(
                    "PDF extraction timed out after {}s",
                    EXTRACT_TIMEOUT.as_secs()
                );
                Self::extract_pages_fallback(data)
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("PDF extraction thread crashed");
                Self::extract_pages_fallback(data)
            }
        }
    }

    /// Per-page extraction straight from the decoded content streams
    fn extract_pages_fallback(data: &[u8]) -> Result<Vec<String>> {
        let doc = lopdf::Document::load_mem(data)
            .map_err(|e| Error::DocumentLoad(format!("Not a parseable PDF: {}", e)))?;

        let mut pages = Vec::new();
        for (page_number, page_id) in doc.get_pages() {
            let text = match doc.get_page_content(page_id) {
                Ok(content) => extract_text_operators(&content),
                Err(e) => {
                    tracing::debug!("No content stream for page {}: {}", page_number, e);
                    String::new()
                }
            };
            pages.push(clean_page_text(&text));
        }

        Ok(pages)
    }
}

/// Async seam the ingestion pipeline loads documents through.
///
/// Extraction is CPU-bound, so the PDF implementation runs it on the
/// blocking pool.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, document_id: Uuid, data: Vec<u8>) -> Result<Vec<Chunk>>;
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load(&self, document_id: Uuid, data: Vec<u8>) -> Result<Vec<Chunk>> {
        tokio::task::spawn_blocking(move || PdfLoader::load(document_id, &data))
            .await
            .map_err(|e| Error::DocumentLoad(format!("Extraction task failed: {}", e)))?
    }
}

/// Scan a content stream for text between BT/ET operators.
///
/// Handles the literal-string forms of Tj and TJ, which covers simple
/// generated PDFs; anything denser is pdf-extract's job.
fn extract_text_operators(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let line = line.trim();

        if line == "BT" {
            in_text_block = true;
            continue;
        }
        if line == "ET" {
            in_text_block = false;
            if !text.is_empty() && !text.ends_with(' ') {
                text.push(' ');
            }
            continue;
        }

        if in_text_block && (line.ends_with("Tj") || line.ends_with("TJ")) {
            let mut rest = line;
            while let Some(start) = rest.find('(') {
                let Some(end) = rest[start + 1..].find(')') else {
                    break;
                };
                text.push_str(&decode_literal_string(&rest[start + 1..start + 1 + end]));
                rest = &rest[start + 1 + end + 1..];
            }
        }
    }

    text
}

/// Decode the basic escape sequences of a PDF literal string
fn decode_literal_string(raw: &str) -> String {
    raw.replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\t", "\t")
        .replace("\\(", "(")
        .replace("\\)", ")")
        .replace("\\\\", "\\")
}

/// Normalize extracted page text: common ligatures, smart quotes, null bytes,
/// and excess whitespace
fn clean_page_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\u{0}' => {}
            '\u{fb00}' => cleaned.push_str("ff"),
            '\u{fb01}' => cleaned.push_str("fi"),
            '\u{fb02}' => cleaned.push_str("fl"),
            '\u{fb03}' => cleaned.push_str("ffi"),
            '\u{fb04}' => cleaned.push_str("ffl"),
            '\u{2018}' | '\u{2019}' => cleaned.push('\''),
            '\u{201c}' | '\u{201d}' => cleaned.push('"'),
            '\u{a0}' => cleaned.push(' '),
            _ => cleaned.push(ch),
        }
    }

    cleaned
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
