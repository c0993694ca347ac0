//! Page-aware PDF chunking.
//!
//! Byte content is parsed with lopdf and text is extracted one page at a time.
//! Text content is treated as already-extracted text with pages separated by
//! form feeds (`\x0c`). Empty pages are skipped; every chunk records its
//! 1-based `page_number`, and sequence indices run across pages. A page whose
//! text cannot be extracted fails the whole document.

use crate::normalize::normalize_text;
use crate::text::TextChunker;
use async_trait::async_trait;
use semdex_core::{
    Chunk, ChunkConfig, ChunkError, Chunker, Document, DocumentContent, DocumentFormat,
};
use tracing::debug;

/// Chunker for PDF documents.
#[derive(Debug, Clone, Default)]
pub struct PdfChunker {
    text: TextChunker,
}

impl PdfChunker {
    /// Create a PDF chunker.
    #[must_use]
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            text: TextChunker::new(config),
        }
    }
}

fn malformed(reason: impl Into<String>) -> ChunkError {
    ChunkError::Malformed {
        format: "pdf".to_string(),
        reason: reason.into(),
    }
}

/// Extract `(page_number, text)` pairs from PDF bytes.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<(u32, String)>, ChunkError> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| malformed(e.to_string()))?;
    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys() {
        let text = doc
            .extract_text(&[*page_number])
            .map_err(|e| malformed(format!("page {page_number}: {e}")))?;
        pages.push((*page_number, text));
    }
    Ok(pages)
}

fn split_form_feeds(text: &str) -> Vec<(u32, String)> {
    text.split('\x0c')
        .enumerate()
        .map(|(i, page)| (i as u32 + 1, page.to_string()))
        .collect()
}

#[async_trait]
impl Chunker for PdfChunker {
    fn name(&self) -> &str {
        "pdf"
    }

    fn formats(&self) -> Vec<DocumentFormat> {
        vec![DocumentFormat::Pdf]
    }

    async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        let pages = match &document.content {
            DocumentContent::Text(text) => split_form_feeds(text),
            DocumentContent::Bytes(bytes) => {
                let bytes = bytes.clone();
                tokio::task::spawn_blocking(move || extract_pages(&bytes))
                    .await
                    .map_err(|e| malformed(format!("Task join error: {e}")))??
            }
        };
        debug!("Extracted {} PDF pages for {}", pages.len(), document.id);

        let mut chunks = Vec::new();
        for (page_number, raw) in pages {
            let normalized = normalize_text(&raw);
            if normalized.is_empty() {
                continue;
            }
            for segment in self.text.segments(&normalized)? {
                let mut metadata = segment.offset_metadata(self.name());
                metadata.insert("page_number".to_string(), page_number.into());
                metadata.insert("pdf_page_aware".to_string(), true.into());
                chunks.push(Chunk {
                    document_id: document.id.clone(),
                    sequence_index: chunks.len() as u32,
                    content: segment.text.to_string(),
                    metadata,
                });
            }
        }

        if chunks.is_empty() {
            return Err(ChunkError::Empty);
        }
        Ok(chunks)
    }
}
