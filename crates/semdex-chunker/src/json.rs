//! JSON chunking.
//!
//! The document is parsed and flattened into one `path: value` line per leaf
//! (`user.name: Ada`, `tags[0]: admin`). Null leaves and empty strings are
//! skipped. The flattened text is then chunked like plain text, so structural
//! mode keeps related keys together when they fit.

use crate::normalize::normalize_text;
use crate::text::TextChunker;
use async_trait::async_trait;
use semdex_core::{Chunk, ChunkConfig, ChunkError, Chunker, Document, DocumentFormat};
use serde_json::Value;

/// Chunker for JSON documents.
#[derive(Debug, Clone, Default)]
pub struct JsonChunker {
    text: TextChunker,
}

impl JsonChunker {
    /// Create a JSON chunker.
    #[must_use]
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            text: TextChunker::new(config),
        }
    }
}

/// Flatten a JSON value into `path: value` lines.
#[must_use]
pub fn flatten_json(value: &Value) -> Vec<String> {
    let mut lines = Vec::new();
    flatten_into(value, String::new(), &mut lines);
    lines
}

fn flatten_into(value: &Value, prefix: String, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, path, lines);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, format!("{prefix}[{i}]"), lines);
            }
        }
        Value::Null => {}
        Value::String(s) if s.trim().is_empty() => {}
        leaf => {
            let rendered = match leaf {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            if prefix.is_empty() {
                lines.push(rendered);
            } else {
                lines.push(format!("{prefix}: {rendered}"));
            }
        }
    }
}

#[async_trait]
impl Chunker for JsonChunker {
    fn name(&self) -> &str {
        "json"
    }

    fn formats(&self) -> Vec<DocumentFormat> {
        vec![DocumentFormat::Json]
    }

    async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        if document.content.as_bytes().iter().all(u8::is_ascii_whitespace) {
            return Err(ChunkError::Empty);
        }
        let value: Value =
            serde_json::from_slice(document.content.as_bytes()).map_err(|e| {
                ChunkError::Malformed {
                    format: "json".to_string(),
                    reason: e.to_string(),
                }
            })?;

        let flattened = normalize_text(&flatten_json(&value).join("\n"));
        let segments = self.text.segments(&flattened)?;

        Ok(segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let mut metadata = segment.offset_metadata(self.name());
                metadata.insert("json_flattened".to_string(), true.into());
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
