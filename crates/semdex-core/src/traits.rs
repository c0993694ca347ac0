//! Adapter traits.
//!
//! Every pluggable strategy implements one of these traits and is registered
//! explicitly at startup as an `Arc<dyn Trait>`.

use crate::error::{ChunkError, EmbedError, MetadataError, StoreError};
use crate::types::{
    Chunk, DistanceMetric, Document, DocumentFormat, Embedding, IndexRecord, Metadata, RecordId,
    StoreBackend, StoreHit, StoreQuery, StoreStats,
};
use async_trait::async_trait;

// ============================================================================
// Chunking
// ============================================================================

/// Splits a document into ordered chunks.
#[async_trait]
pub trait Chunker: Send + Sync {
    /// Strategy name, recorded in chunk metadata.
    fn name(&self) -> &str;

    /// Formats this chunker understands.
    fn formats(&self) -> Vec<DocumentFormat>;

    /// Split a document.
    ///
    /// Returns a non-empty sequence with `sequence_index` contiguous from 0, or
    /// [`ChunkError::Empty`] for empty input and [`ChunkError::Malformed`] when
    /// the content does not parse as the declared format.
    async fn split(&self, document: &Document) -> Result<Vec<Chunk>, ChunkError>;
}

// ============================================================================
// Metadata
// ============================================================================

/// Derives domain metadata for a chunk.
///
/// Implementations must be pure functions of their inputs.
pub trait MetadataBuilder: Send + Sync {
    /// Profile name.
    fn name(&self) -> &str;

    /// Build the additional metadata for one chunk.
    fn build(&self, document: &Document, chunk: &Chunk) -> Result<Metadata, MetadataError>;
}

// ============================================================================
// Embedding
// ============================================================================

/// Maps text to fixed-length vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Dimensionality of every returned vector.
    fn dimension(&self) -> usize;

    /// Maximum number of texts accepted by one [`Embedder::embed_batch`] call.
    fn max_batch_size(&self) -> usize;

    /// Embed a batch of texts, preserving order.
    ///
    /// Callers must not pass more than [`Embedder::max_batch_size`] texts.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedError>;

    /// Embed a single query text.
    async fn embed_query(&self, query: &str) -> Result<Embedding, EmbedError> {
        let mut results = self.embed_batch(&[query]).await?;
        let count = results.len();
        match results.pop() {
            Some(vector) if count == 1 => Ok(vector),
            _ => Err(EmbedError::LengthMismatch {
                expected: 1,
                actual: count,
            }),
        }
    }
}

// ============================================================================
// Vector Storage
// ============================================================================

/// Persists index records and answers nearest-neighbour queries.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Backend family.
    fn backend(&self) -> StoreBackend;

    /// Distance metric used by [`VectorStore::query`].
    fn distance_metric(&self) -> DistanceMetric;

    /// Whether [`VectorStore::replace_document`] and [`VectorStore::upsert`] are atomic.
    fn supports_transactions(&self) -> bool;

    /// Create the collection or validate its dimensionality.
    ///
    /// Idempotent. Fails with [`StoreError::DimensionMismatch`] when the
    /// collection exists with a different dimensionality.
    async fn ensure_collection(&self, collection: &str, dimension: usize)
        -> Result<(), StoreError>;

    /// Dimensionality of an existing collection.
    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>, StoreError>;

    /// Insert or replace records keyed by `record_id`.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), StoreError>;

    /// Delete `stale` and upsert `records` for one document.
    ///
    /// Transactional backends override this with a single atomic operation.
    /// The default runs the two steps one after the other.
    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[IndexRecord],
        stale: &[RecordId],
    ) -> Result<(), StoreError> {
        let _ = document_id;
        if !stale.is_empty() {
            self.delete_records(collection, stale).await?;
        }
        self.upsert(collection, records).await
    }

    /// Delete every record of a document. Returns the number deleted.
    async fn delete_by_document(&self, collection: &str, document_id: &str)
        -> Result<u64, StoreError>;

    /// Delete records by id. Returns the number deleted.
    async fn delete_records(&self, collection: &str, ids: &[RecordId]) -> Result<u64, StoreError>;

    /// All records of a document, ordered by `sequence_index`.
    async fn records_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError>;

    /// Nearest neighbours ordered by ascending distance, ties by ascending `record_id`.
    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<StoreHit>, StoreError>;

    /// Collection statistics.
    async fn stats(&self, collection: &str) -> Result<StoreStats, StoreError>;
}
