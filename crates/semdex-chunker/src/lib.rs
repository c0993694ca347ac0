//! Document chunking strategies for semdex.
//!
//! | Chunker | Format | Notes |
//! |---------|--------|-------|
//! | [`TextChunker`] | text | char, word, sentence or structural boundaries |
//! | [`JsonChunker`] | json | flattens to `path: value` lines |
//! | [`HtmlChunker`] | html | block text only, records `section` |
//! | [`PdfChunker`] | pdf | page-aware, records `page_number` |
//!
//! [`ChunkingDispatcher`] maps declared formats to chunker instances.

pub mod dispatcher;
pub mod html;
pub mod json;
pub mod normalize;
pub mod pdf;
pub mod text;

pub use dispatcher::ChunkingDispatcher;
pub use html::HtmlChunker;
pub use json::JsonChunker;
pub use normalize::normalize_text;
pub use pdf::PdfChunker;
pub use text::{TextChunker, TextSegment};
