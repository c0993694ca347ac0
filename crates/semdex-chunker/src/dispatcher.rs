//! Chunking dispatcher: a static mapping from declared format to chunker.

use crate::{HtmlChunker, JsonChunker, PdfChunker, TextChunker};
use semdex_core::{Chunk, ChunkConfig, ChunkError, Chunker, Document, DocumentFormat};
use std::collections::HashMap;
use std::sync::Arc;

/// Selects a chunker by declared document format.
///
/// The mapping is built at startup and never consults document content.
#[derive(Clone, Default)]
pub struct ChunkingDispatcher {
    chunkers: HashMap<DocumentFormat, Arc<dyn Chunker>>,
}

impl ChunkingDispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunkers: HashMap::new(),
        }
    }

    /// Dispatcher with the built-in text, JSON, HTML and PDF chunkers.
    #[must_use]
    pub fn with_defaults(config: ChunkConfig) -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(TextChunker::new(config.clone()));
        dispatcher.register(JsonChunker::new(config.clone()));
        dispatcher.register(HtmlChunker::new(config.clone()));
        dispatcher.register(PdfChunker::new(config));
        dispatcher
    }

    /// Register a chunker for every format it declares.
    pub fn register<C: Chunker + 'static>(&mut self, chunker: C) {
        let chunker: Arc<dyn Chunker> = Arc::new(chunker);
        for format in chunker.formats() {
            self.chunkers.insert(format, chunker.clone());
        }
    }

    /// Register a chunker for one specific format, replacing any previous mapping.
    pub fn register_for(&mut self, format: DocumentFormat, chunker: Arc<dyn Chunker>) {
        self.chunkers.insert(format, chunker);
    }

    /// Resolve the chunker for a format.
    pub fn resolve(&self, format: &DocumentFormat) -> Result<Arc<dyn Chunker>, ChunkError> {
        self.chunkers
            .get(format)
            .cloned()
            .ok_or_else(|| ChunkError::UnsupportedFormat(format.to_string()))
    }

    /// Registered formats, sorted.
    #[must_use]
    pub fn formats(&self) -> Vec<DocumentFormat> {
        let mut formats: Vec<DocumentFormat> = self.chunkers.keys().cloned().collect();
        formats.sort();
        formats
    }

    /// Resolve and split in one call.
    pub async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        self.resolve(&document.format)?.split(document).await
    }
}

impl std::fmt::Debug for ChunkingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkingDispatcher")
            .field("formats", &self.formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct UpperChunker;

    #[async_trait]
    impl Chunker for UpperChunker {
        fn name(&self) -> &str {
            "upper"
        }

        fn formats(&self) -> Vec<DocumentFormat> {
            vec![DocumentFormat::Custom("shout".to_string())]
        }

        async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
            let text = document.content.as_text().ok_or(ChunkError::Empty)?;
            Ok(vec![Chunk {
                document_id: document.id.clone(),
                sequence_index: 0,
                content: text.to_uppercase(),
                metadata: Default::default(),
            }])
        }
    }

    #[test]
    fn test_new_dispatcher_is_empty() {
        let dispatcher = ChunkingDispatcher::new();
        assert!(dispatcher.formats().is_empty());
        assert!(matches!(
            dispatcher.resolve(&DocumentFormat::Text),
            Err(ChunkError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_with_defaults_registers_builtin_formats() {
        let dispatcher = ChunkingDispatcher::with_defaults(ChunkConfig::default());
        assert_eq!(
            dispatcher.formats(),
            vec![
                DocumentFormat::Text,
                DocumentFormat::Json,
                DocumentFormat::Html,
                DocumentFormat::Pdf
            ]
        );
        assert_eq!(dispatcher.resolve(&DocumentFormat::Json).unwrap().name(), "json");
        assert_eq!(dispatcher.resolve(&DocumentFormat::Pdf).unwrap().name(), "pdf");
    }

    #[test]
    fn test_unknown_format() {
        let dispatcher = ChunkingDispatcher::with_defaults(ChunkConfig::default());
        let err = dispatcher
            .resolve(&DocumentFormat::Custom("docx".to_string()))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unsupported document format: docx");
    }

    #[tokio::test]
    async fn test_custom_chunker() {
        let mut dispatcher = ChunkingDispatcher::with_defaults(ChunkConfig::default());
        dispatcher.register(UpperChunker);

        let doc = Document::new("c", DocumentFormat::Custom("shout".to_string()), "hi there");
        let chunks = dispatcher.split(&doc).await.unwrap();
        assert_eq!(chunks[0].content, "HI THERE");
    }

    #[tokio::test]
    async fn test_dispatch_does_not_sniff_content() {
        let dispatcher = ChunkingDispatcher::with_defaults(ChunkConfig::default());
        // JSON-looking content declared as text is chunked as text
        let doc = Document::new("t", DocumentFormat::Text, r#"{"a": 1}"#);
        let chunks = dispatcher.split(&doc).await.unwrap();
        assert_eq!(chunks[0].content, r#"{"a": 1}"#);
        assert!(chunks[0].metadata.get("json_flattened").is_none());
    }

    #[test]
    fn test_register_for_overrides() {
        let mut dispatcher = ChunkingDispatcher::with_defaults(ChunkConfig::default());
        dispatcher.register_for(DocumentFormat::Text, Arc::new(UpperChunker));
        assert_eq!(dispatcher.resolve(&DocumentFormat::Text).unwrap().name(), "upper");
    }
}
