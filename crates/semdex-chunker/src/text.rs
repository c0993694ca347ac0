//! Boundary-aware text chunking.
//!
//! Text is normalized (see [`crate::normalize`]) and then cut into contiguous
//! spans no longer than `max_chunk_size` characters. The boundary mode decides
//! which units a span may start and end on:
//!
//! | Mode | Units |
//! |------|-------|
//! | `char` | Fixed windows stepping by `max_chunk_size - overlap` |
//! | `word` | Whitespace-delimited words, packed greedily |
//! | `sentence` | One chunk per sentence; oversize sentences fall back to words |
//! | `structural` | Paragraphs, then lines, sentences, words and characters |
//!
//! Packing modes carry up to `overlap` characters of trailing units into the next chunk.

use crate::normalize::normalize_text;
use async_trait::async_trait;
use semdex_core::{
    BoundaryMode, Chunk, ChunkConfig, ChunkError, Chunker, Document, DocumentFormat, Metadata,
    MetadataValue,
};

/// A chunk-sized slice of normalized text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSegment<'a> {
    /// Slice of the normalized text
    pub text: &'a str,
    /// Byte offset of the slice
    pub start_byte: usize,
    /// Character offset of the first character
    pub start_char: usize,
    /// Character offset one past the last character
    pub end_char: usize,
}

impl TextSegment<'_> {
    /// Offset fields recorded on every chunk.
    #[must_use]
    pub fn offset_metadata(&self, strategy: &str) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("start_char".to_string(), self.start_char.into());
        metadata.insert("end_char".to_string(), self.end_char.into());
        metadata.insert(
            "chunk_strategy".to_string(),
            MetadataValue::String(strategy.to_string()),
        );
        metadata
    }
}

/// Byte range within the normalized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// Split levels, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    Paragraph,
    Line,
    Sentence,
    Word,
    Char,
}

impl Level {
    fn finer(self) -> Self {
        match self {
            Self::Paragraph => Self::Line,
            Self::Line => Self::Sentence,
            Self::Sentence => Self::Word,
            Self::Word | Self::Char => Self::Char,
        }
    }
}

/// Text chunker with configurable size, overlap and boundary mode.
#[derive(Debug, Clone, Default)]
pub struct TextChunker {
    config: ChunkConfig,
}

impl TextChunker {
    /// Create a text chunker.
    #[must_use]
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Chunking configuration.
    #[must_use]
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// Reject configurations that cannot make progress.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.config.max_chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "max_chunk_size must be greater than 0".to_string(),
            ));
        }
        if self.config.overlap >= self.config.max_chunk_size {
            return Err(ChunkError::InvalidConfig(format!(
                "overlap ({}) must be smaller than max_chunk_size ({})",
                self.config.overlap, self.config.max_chunk_size
            )));
        }
        Ok(())
    }

    /// Cut already-normalized text into segments.
    pub fn segments<'a>(&self, text: &'a str) -> Result<Vec<TextSegment<'a>>, ChunkError> {
        self.validate()?;
        let whole = trim_span(
            text,
            Span {
                start: 0,
                end: text.len(),
            },
        )
        .ok_or(ChunkError::Empty)?;

        let max = self.config.max_chunk_size;
        let overlap = self.config.overlap;

        let spans = match self.config.boundary_mode {
            BoundaryMode::Char => hard_windows(text, whole, max, overlap),
            BoundaryMode::Word => {
                let pieces: Vec<Span> = split_level(text, whole, Level::Word)
                    .into_iter()
                    .flat_map(|word| segment(text, word, Level::Char, max))
                    .collect();
                pack(text, &pieces, max, overlap)
            }
            BoundaryMode::Sentence => split_level(text, whole, Level::Sentence)
                .into_iter()
                .flat_map(|sentence| {
                    if char_len(text, sentence) <= max {
                        vec![sentence]
                    } else {
                        let pieces = segment(text, sentence, Level::Word, max);
                        pack(text, &pieces, max, overlap)
                    }
                })
                .collect(),
            BoundaryMode::Structural => {
                let pieces = segment(text, whole, Level::Paragraph, max);
                pack(text, &pieces, max, overlap)
            }
        };

        Ok(to_segments(text, &spans))
    }
}

#[async_trait]
impl Chunker for TextChunker {
    fn name(&self) -> &str {
        "text"
    }

    fn formats(&self) -> Vec<DocumentFormat> {
        vec![DocumentFormat::Text]
    }

    async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError> {
        let text = document
            .content
            .as_text()
            .ok_or_else(|| ChunkError::Malformed {
                format: document.format.to_string(),
                reason: "content is not valid UTF-8".to_string(),
            })?;
        let normalized = normalize_text(&text);
        let segments = self.segments(&normalized)?;

        Ok(segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let mut metadata = segment.offset_metadata(self.name());
                metadata.insert(
                    "boundary_mode".to_string(),
                    self.config.boundary_mode.as_str().into(),
                );
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

fn char_len(text: &str, span: Span) -> usize {
    text[span.start..span.end].chars().count()
}

fn trim_span(text: &str, span: Span) -> Option<Span> {
    let slice = &text[span.start..span.end];
    let lead = slice.len() - slice.trim_start().len();
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        None
    } else {
        let start = span.start + lead;
        Some(Span {
            start,
            end: start + trimmed.len(),
        })
    }
}

/// Recursively split `span` until every piece fits in `max` characters.
fn segment(text: &str, span: Span, level: Level, max: usize) -> Vec<Span> {
    if char_len(text, span) <= max {
        return vec![span];
    }
    if level == Level::Char {
        return hard_windows(text, span, max, 0);
    }
    split_level(text, span, level)
        .into_iter()
        .flat_map(|piece| segment(text, piece, level.finer(), max))
        .collect()
}

/// Split `span` on the separators of one level, trimming each piece.
fn split_level(text: &str, span: Span, level: Level) -> Vec<Span> {
    let slice = &text[span.start..span.end];
    let offset = span.start;
    let mut cuts = Vec::new();

    match level {
        Level::Paragraph => {
            for (i, sep) in slice.match_indices("\n\n") {
                cuts.push(Span {
                    start: offset + i,
                    end: offset + i + sep.len(),
                });
            }
        }
        Level::Line => {
            for (i, _) in slice.match_indices('\n') {
                cuts.push(Span {
                    start: offset + i,
                    end: offset + i + 1,
                });
            }
        }
        Level::Sentence => {
            let mut chars = slice.char_indices().peekable();
            while let Some((i, c)) = chars.next() {
                if c == '\n' {
                    cuts.push(Span {
                        start: offset + i,
                        end: offset + i + 1,
                    });
                } else if matches!(c, '.' | '!' | '?') {
                    if let Some(&(j, next)) = chars.peek() {
                        if next.is_whitespace() {
                            cuts.push(Span {
                                start: offset + j,
                                end: offset + j,
                            });
                        }
                    }
                }
            }
        }
        Level::Word => {
            let mut run_start = None;
            for (i, c) in slice.char_indices() {
                if c.is_whitespace() {
                    run_start.get_or_insert(i);
                } else if let Some(start) = run_start.take() {
                    cuts.push(Span {
                        start: offset + start,
                        end: offset + i,
                    });
                }
            }
        }
        Level::Char => return vec![span],
    }

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut cursor = span.start;
    for cut in cuts {
        if let Some(piece) = trim_span(text, Span {
            start: cursor,
            end: cut.start,
        }) {
            pieces.push(piece);
        }
        cursor = cut.end;
    }
    if let Some(piece) = trim_span(text, Span {
        start: cursor,
        end: span.end,
    }) {
        pieces.push(piece);
    }
    pieces
}

/// Fixed character windows over `span`.
fn hard_windows(text: &str, span: Span, max: usize, overlap: usize) -> Vec<Span> {
    let mut bounds: Vec<usize> = text[span.start..span.end]
        .char_indices()
        .map(|(i, _)| span.start + i)
        .collect();
    bounds.push(span.end);

    let total = bounds.len() - 1;
    let step = max.saturating_sub(overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + max).min(total);
        if let Some(window) = trim_span(text, Span {
            start: bounds[start],
            end: bounds[end],
        }) {
            windows.push(window);
        }
        if end >= total {
            break;
        }
        start += step;
    }
    windows
}

/// Greedily merge adjacent pieces into spans of at most `max` characters.
fn pack(text: &str, pieces: &[Span], max: usize, overlap: usize) -> Vec<Span> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < pieces.len() {
        let start = pieces[i].start;
        let mut j = i;
        while j + 1 < pieces.len()
            && char_len(text, Span {
                start,
                end: pieces[j + 1].end,
            }) <= max
        {
            j += 1;
        }
        out.push(Span {
            start,
            end: pieces[j].end,
        });
        if j + 1 >= pieces.len() {
            break;
        }

        // The carried-over tail must leave room for the next unseen piece.
        let mut next = j + 1;
        let mut k = j;
        while overlap > 0
            && k > i
            && char_len(text, Span {
                start: pieces[k].start,
                end: pieces[j].end,
            }) <= overlap
            && char_len(text, Span {
                start: pieces[k].start,
                end: pieces[j + 1].end,
            }) <= max
        {
            next = k;
            k -= 1;
        }
        i = next;
    }
    out
}

fn to_segments<'a>(text: &'a str, spans: &[Span]) -> Vec<TextSegment<'a>> {
    let mut out = Vec::with_capacity(spans.len());
    let mut cursor_byte = 0;
    let mut cursor_char = 0;
    for span in spans {
        debug_assert!(span.start >= cursor_byte);
        cursor_char += text[cursor_byte..span.start].chars().count();
        cursor_byte = span.start;
        let len = char_len(text, *span);
        out.push(TextSegment {
            text: &text[span.start..span.end],
            start_byte: span.start,
            start_char: cursor_char,
            end_char: cursor_char + len,
        });
    }
    out
}
