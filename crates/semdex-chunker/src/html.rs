//! HTML chunking.
//!
//! Visible text is taken from block elements (headings, paragraphs, list
//! items, quotes, preformatted blocks, table cells). Anything inside `script`,
//! `style`, `noscript`, `template` or `head` is dropped. Headings are rendered as
//! `## heading` blocks so structural chunking starts new chunks at sections,
//! and every chunk records the nearest preceding heading as `section`.

use crate::text::TextChunker;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use semdex_core::{Chunk, ChunkConfig, ChunkError, Chunker, Document, DocumentFormat};

const BLOCK_SELECTOR: &str = "h1, h2, h3, h4, h5, h6, p, li, blockquote, pre, td, th";
const BLOCK_TAGS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "li", "blockquote", "pre", "td", "th",
];
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// Chunker for HTML documents.
#[derive(Debug, Clone, Default)]
pub struct HtmlChunker {
    text: TextChunker,
}

/// Text extracted from an HTML page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedHtml {
    /// Blocks joined by blank lines
    pub text: String,
    /// Byte offset and text of every heading, in document order
    pub headings: Vec<(usize, String)>,
}

impl HtmlChunker {
    /// Create an HTML chunker.
    #[must_use]
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            text: TextChunker::new(config),
        }
    }

    /// Extract visible block text from an HTML page.
    pub fn extract(html: &str) -> Result<ExtractedHtml, ChunkError> {
        let document = Html::parse_document(html);
        let selector = Selector::parse(BLOCK_SELECTOR)
            .map_err(|e| ChunkError::InvalidConfig(format!("html selector: {e:?}")))?;

        let mut extracted = ExtractedHtml::default();
        for element in document.select(&selector) {
            if has_ancestor(&element, BLOCK_TAGS) || has_ancestor(&element, HIDDEN_TAGS) {
                continue;
            }
            let text = collapse(element.text());
            if text.is_empty() {
                continue;
            }
            let is_heading = matches!(
                element.value().name(),
                "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            );
            push_block(&mut extracted.text, &mut extracted.headings, text, is_heading);
        }

        if extracted.text.is_empty() {
            let visible = document
                .root_element()
                .descendants()
                .filter_map(|node| {
                    let text = node.value().as_text()?;
                    let hidden = node.ancestors().any(|ancestor| {
                        ElementRef::wrap(ancestor)
                            .is_some_and(|el| HIDDEN_TAGS.contains(&el.value().name()))
                    });
                    (!hidden).then(|| text.to_string())
                })
                .collect::<Vec<_>>();
            extracted.text = collapse(visible.iter().map(String::as_str));
        }

        Ok(extracted)
    }
}

fn has_ancestor(element: &ElementRef<'_>, tags: &[&str]) -> bool {
    element.ancestors().any(|ancestor| {
        ElementRef::wrap(ancestor).is_some_and(|el| tags.contains(&el.value().name()))
    })
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        for word in part.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}

fn push_block(out: &mut String, headings: &mut Vec<(usize, String)>, text: String, heading: bool) {
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    if heading {
        headings.push((out.len(), text.clone()));
        out.push_str("## ");
    }
    out.push_str(&text);
}

#[async_trait]
impl Chunker for HtmlChunker {
    fn name(&self) -> &str {
        "html"
    }

    fn formats(&self) -> Vec<DocumentFormat> {
        vec![DocumentFormat::Html]
    }

    async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        let html = document
            .content
            .as_text()
            .ok_or_else(|| ChunkError::Malformed {
                format: "html".to_string(),
                reason: "content is not valid UTF-8".to_string(),
            })?;
        let extracted = Self::extract(&html)?;
        let segments = self.text.segments(&extracted.text)?;

        Ok(segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let mut metadata = segment.offset_metadata(self.name());
                metadata.insert("html_extracted".to_string(), true.into());
                let section = extracted
                    .headings
                    .iter()
                    .take_while(|(offset, _)| *offset <= segment.start_byte)
                    .last();
                if let Some((_, heading)) = section {
                    metadata.insert("section".to_string(), heading.clone().into());
                }
                Chunk {
                    document_id: document.id.clone(),
                    sequence_index: i as u32,
                    content: segment.text.to_string(),
                    metadata,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::{BoundaryMode, MetadataValue};

    const PAGE: &str = r#"<html>
<head><title>Ignored</title><style>body { color: red; }</style></head>
<body>
  <script>var tracking = "secret";</script>
  <h1>Getting Started</h1>
  <p>Install the   tool.</p>
  <ul><li>Step <b>one</b></li><li><p>Step two</p></li></ul>
  <h2>Usage</h2>
  <p>Run it.</p>
  <noscript>Enable JavaScript</noscript>
</body>
</html>"#;

    #[test]
    fn test_extract_blocks() {
        let extracted = HtmlChunker::extract(PAGE).unwrap();

        assert_eq!(
            extracted.text,
            "## Getting Started\n\nInstall the tool.\n\nStep one\n\nStep two\n\n## Usage\n\nRun it."
        );
        assert!(!extracted.text.contains("secret"));
        assert!(!extracted.text.contains("color"));
        assert!(!extracted.text.contains("JavaScript"));
        assert_eq!(extracted.headings.len(), 2);
        assert_eq!(extracted.headings[1].1, "Usage");
    }

    #[test]
    fn test_extract_fallback_without_blocks() {
        let extracted =
            HtmlChunker::extract("<html><body><div>Loose <span>text</span></div><script>x()</script></body></html>")
                .unwrap();
        assert_eq!(extracted.text, "Loose text");
        assert!(extracted.headings.is_empty());
    }

    #[tokio::test]
    async fn test_split_records_sections() {
        let chunker = HtmlChunker::new(ChunkConfig {
            max_chunk_size: 60,
            overlap: 0,
            boundary_mode: BoundaryMode::Structural,
        });
        let doc = Document::new("h1", DocumentFormat::Html, PAGE);

        let chunks = chunker.split(&doc).await.unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].metadata.get("section"),
            Some(&MetadataValue::String("Getting Started".into()))
        );
        assert!(chunks[1].content.starts_with("## Usage"));
        assert_eq!(
            chunks[1].metadata.get("section"),
            Some(&MetadataValue::String("Usage".into()))
        );
        assert!(chunks
            .iter()
            .all(|c| c.metadata.get("html_extracted") == Some(&MetadataValue::Bool(true))));
    }

    #[tokio::test]
    async fn test_empty_html() {
        let chunker = HtmlChunker::default();
        let doc = Document::new("h", DocumentFormat::Html, "<html><body><script>x</script></body></html>");
        assert!(matches!(chunker.split(&doc).await, Err(ChunkError::Empty)));
    }

    #[tokio::test]
    async fn test_non_utf8_html_is_malformed() {
        let chunker = HtmlChunker::default();
        let doc = Document::new("h", DocumentFormat::Html, vec![b'<', 0xff, b'>']);
        assert!(matches!(
            chunker.split(&doc).await,
            Err(ChunkError::Malformed { .. })
        ));
    }
}
