//! Search pipeline.

use crate::ranking::rank;
use semdex_core::{
    ErrorKind, PipelineError, SearchRequest, SearchResult, Stage, StoreQuery, VectorStore,
};
use semdex_embed::EmbedderPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Configuration for the search pipeline.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Collection to query
    pub collection: String,
    /// `top_k` for requests built by [`SearchPipeline::request`]
    pub default_top_k: usize,
    /// Requests asking for more are clamped to this
    pub max_top_k: usize,
    /// Applied when the request sets no `min_score`
    pub min_score: Option<f32>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            collection: "semdex".to_string(),
            default_top_k: 10,
            max_top_k: 100,
            min_score: None,
        }
    }
}

/// Embeds a query, asks the store for neighbours and ranks them.
pub struct SearchPipeline {
    embedder: Arc<EmbedderPool>,
    store: Arc<dyn VectorStore>,
    config: SearchConfig,
}

impl SearchPipeline {
    pub fn new(embedder: Arc<EmbedderPool>, store: Arc<dyn VectorStore>, config: SearchConfig) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Request for `query_text` using the configured default `top_k`.
    pub fn request(&self, query_text: impl Into<String>) -> SearchRequest {
        SearchRequest::new(query_text, self.config.default_top_k)
    }

    /// Run a search.
    ///
    /// Results are in non-increasing score order with ties broken by ascending
    /// `record_id`. A collection that does not exist yet yields no results.
    pub async fn search(
        &self,
        request: &SearchRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        if request.top_k == 0 {
            return Err(PipelineError::new(
                Stage::Received,
                ErrorKind::InvalidRequest,
                "top_k must be at least 1",
            ));
        }
        if request.query_text.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Received,
                ErrorKind::InvalidRequest,
                "query text is empty",
            ));
        }
        let top_k = request.top_k.min(self.config.max_top_k.max(1));
        if top_k < request.top_k {
            debug!("Clamped top_k {} to {}", request.top_k, top_k);
        }
        checkpoint(cancel, Stage::Embedding)?;

        let vector = self
            .embedder
            .embed_query(&request.query_text, cancel)
            .await
            .map_err(|e| {
                warn!("Query embedding failed: {}", e);
                PipelineError::from_embed(Stage::Embedding, &e)
            })?;
        checkpoint(cancel, Stage::Querying)?;

        let collection = &self.config.collection;
        let dimension = self
            .store
            .collection_dimension(collection)
            .await
            .map_err(|e| {
                warn!("Collection {} unavailable: {}", collection, e);
                PipelineError::from_store(Stage::Querying, &e)
            })?;
        match dimension {
            None => {
                debug!("Collection {} does not exist, returning no results", collection);
                return Ok(Vec::new());
            }
            Some(existing) if existing != vector.len() => {
                return Err(PipelineError::new(
                    Stage::Querying,
                    ErrorKind::DimensionalityMismatch,
                    format!(
                        "collection {} has dimension {}, query has {}",
                        collection,
                        existing,
                        vector.len()
                    ),
                ));
            }
            Some(_) => {}
        }

        let query = StoreQuery {
            vector,
            top_k,
            filter: request.filter.clone().filter(|f| !f.is_empty()),
        };
        let hits = self.store.query(collection, &query).await.map_err(|e| {
            warn!("Query on {} failed: {}", collection, e);
            PipelineError::from_store(Stage::Querying, &e)
        })?;
        checkpoint(cancel, Stage::Querying)?;

        let min_score = request.min_score.or(self.config.min_score);
        let results = rank(self.store.distance_metric(), hits, min_score, top_k);
        info!("Search on {} returned {} results", collection, results.len());
        Ok(results)
    }
}

fn checkpoint(cancel: &CancellationToken, next: Stage) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::cancelled(next))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::{IndexRecord, Metadata, MetadataFilter, RecordId};
    use semdex_embed::HashEmbedder;
    use semdex_store::MemoryStore;

    const COLLECTION: &str = "search_test";
    const DIM: usize = 32;

    fn embedder() -> HashEmbedder {
        HashEmbedder::new(DIM)
    }

    fn record(document_id: &str, sequence_index: u32, content: &str, tag: &str) -> IndexRecord {
        let mut metadata = Metadata::new();
        metadata.insert("tag".to_string(), tag.into());
        IndexRecord {
            record_id: RecordId::derive(document_id, sequence_index),
            document_id: document_id.to_string(),
            sequence_index,
            content: content.to_string(),
            vector: embedder().embed_one(content),
            metadata,
        }
    }

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.ensure_collection(COLLECTION, DIM).await.unwrap();
        store
            .upsert(
                COLLECTION,
                &[
                    record("animals", 0, "the quick brown fox", "a"),
                    record("animals", 1, "a lazy dog sleeps", "a"),
                    record("plants", 0, "green leaves and roots", "b"),
                    record("plants", 1, "the fox eats berries", "b"),
                ],
            )
            .await
            .unwrap();
        store
    }

    fn pipeline(store: Arc<dyn VectorStore>) -> SearchPipeline {
        let pool = Arc::new(EmbedderPool::new(Arc::new(embedder()), 2));
        let config = SearchConfig {
            collection: COLLECTION.to_string(),
            max_top_k: 3,
            ..Default::default()
        };
        SearchPipeline::new(pool, store, config)
    }

    #[tokio::test]
    async fn test_search_finds_exact_chunk_first() {
        let pipeline = pipeline(seeded_store().await);
        let request = SearchRequest::new("a lazy dog sleeps", 2);

        let results = pipeline.search(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].record_id, RecordId::derive("animals", 1));
        assert!((results[0].score - 1.0).abs() < 1e-4);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_zero_top_k_is_rejected() {
        let pipeline = pipeline(seeded_store().await);
        let err = pipeline
            .search(&SearchRequest::new("fox", 0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
    }

    #[tokio::test]
    async fn test_top_k_is_clamped() {
        let pipeline = pipeline(seeded_store().await);
        let results = pipeline
            .search(&SearchRequest::new("fox", 50), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_collection_returns_empty() {
        let pipeline = pipeline(Arc::new(MemoryStore::new()));
        let results = pipeline
            .search(&pipeline.request("fox"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let store = Arc::new(MemoryStore::new());
        store.ensure_collection(COLLECTION, 384).await.unwrap();
        let err = pipeline(store)
            .search(&SearchRequest::new("fox", 1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DimensionalityMismatch);
    }

    #[tokio::test]
    async fn test_filter_restricts_results() {
        let pipeline = pipeline(seeded_store().await);
        let request = SearchRequest::new("fox", 3).with_filter(MetadataFilter::new().eq("tag", "b"));

        let results = pipeline.search(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.document_id == "plants"));
    }

    #[tokio::test]
    async fn test_min_score_drops_weak_matches() {
        let pipeline = pipeline(seeded_store().await);
        let request = SearchRequest::new("green leaves and roots", 3).with_min_score(0.99);

        let results = pipeline.search(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "plants");
    }

    #[tokio::test]
    async fn test_cancelled_search() {
        let pipeline = pipeline(seeded_store().await);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline
            .search(&SearchRequest::new("fox", 1), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
