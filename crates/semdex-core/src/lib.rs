//! # semdex-core
//!
//! Core types, adapter traits and the error taxonomy for semdex.
//!
//! semdex ingests documents, splits them into chunks, embeds the chunks and
//! stores the vectors so they can be searched by similarity. This crate holds
//! the pieces every other crate shares:
//!
//! - **Chunking**: [`Chunker`] splits a [`Document`] into ordered [`Chunk`]s
//! - **Enrichment**: [`MetadataBuilder`] derives domain metadata per chunk
//! - **Embedding**: [`Embedder`] maps text to fixed-length vectors
//! - **Storage**: [`VectorStore`] persists [`IndexRecord`]s and answers queries
//!
//! ## Architecture
//!
//! ```text
//! Document ─→ Chunker ─→ MetadataBuilder ─→ Embedder ─→ VectorStore
//!                                                           ↑
//!               SearchRequest ─→ Embedder ─→ StoreQuery ────┘ ─→ SearchResult
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Document`] | Raw input with declared format and source metadata |
//! | [`Chunk`] | Contiguous unit with a 0-based `sequence_index` |
//! | [`RecordId`] | Deterministic id derived from document id and sequence index |
//! | [`IndexRecord`] | Stored vector, text and metadata |
//! | [`SearchResult`] | Ranked hit with a higher-is-better score |
//! | [`PipelineError`] | Structured `{stage, kind, message}` error |

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    ChunkError, EmbedError, ErrorKind, MetadataError, PipelineError, SagaState, Stage, StoreError,
};
pub use traits::*;
pub use types::*;
