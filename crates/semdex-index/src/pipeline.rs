//! Index pipeline: one document from receipt to commit.

use crate::lock::DocumentLocks;
use crate::metadata::{merge_metadata, MergePolicy};
use crate::saga::WriteSaga;
use chrono::{DateTime, Utc};
use semdex_chunker::ChunkingDispatcher;
use semdex_core::{
    Chunk, Document, ErrorKind, IndexRecord, Metadata, MetadataBuilder, PipelineError, RecordId,
    Stage, VectorStore,
};
use semdex_embed::EmbedderPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// States a run passes through on the way to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Received,
    Chunked,
    Enriched,
    Embedded,
    Stored,
    Committed,
}

/// Index update events.
#[derive(Debug, Clone)]
pub enum IndexUpdate {
    Started { document_id: String },
    StageCompleted { document_id: String, state: RunState },
    Committed { document_id: String, chunk_count: usize, stale_removed: usize },
    Failed { document_id: String, error: PipelineError },
}

/// Outcome of a committed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexReport {
    pub document_id: String,
    pub collection: String,
    pub chunk_count: usize,
    /// Records of the prior version whose sequence index no longer exists
    pub stale_removed: usize,
    pub final_state: RunState,
    /// Every state visited, in order
    pub states: Vec<RunState>,
    pub committed_at: DateTime<Utc>,
}

/// Configuration for the index pipeline.
#[derive(Debug, Clone)]
pub struct IndexPipelineConfig {
    /// Target collection
    pub collection: String,
    /// Index without builder fields when the builder fails
    pub metadata_best_effort: bool,
    /// Precedence between builder output and source metadata
    pub merge_policy: MergePolicy,
}

impl Default for IndexPipelineConfig {
    fn default() -> Self {
        Self {
            collection: "semdex".to_string(),
            metadata_best_effort: false,
            merge_policy: MergePolicy::default(),
        }
    }
}

/// Chunks, enriches, embeds and commits documents.
///
/// Every run is all-or-nothing: either the document's full new record set
/// replaces the old one, or the collection is left as it was.
pub struct IndexPipeline {
    dispatcher: Arc<ChunkingDispatcher>,
    builder: Option<Arc<dyn MetadataBuilder>>,
    embedder: Arc<EmbedderPool>,
    store: Arc<dyn VectorStore>,
    config: IndexPipelineConfig,
    collection_ready: OnceCell<()>,
    locks: DocumentLocks,
    update_tx: broadcast::Sender<IndexUpdate>,
}

/// Per-run progress, threaded through the stages.
struct Run<'a> {
    document: &'a Document,
    states: Vec<RunState>,
}

impl IndexPipeline {
    pub fn new(
        dispatcher: Arc<ChunkingDispatcher>,
        builder: Option<Arc<dyn MetadataBuilder>>,
        embedder: Arc<EmbedderPool>,
        store: Arc<dyn VectorStore>,
        config: IndexPipelineConfig,
    ) -> Self {
        let (update_tx, _) = broadcast::channel(256);
        Self {
            dispatcher,
            builder,
            embedder,
            store,
            config,
            collection_ready: OnceCell::new(),
            locks: DocumentLocks::new(),
            update_tx,
        }
    }

    /// Subscribe to index updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexUpdate> {
        self.update_tx.subscribe()
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn VectorStore> {
        self.store.clone()
    }

    /// Index one document, replacing any prior version.
    pub async fn index(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, PipelineError> {
        let _ = self.update_tx.send(IndexUpdate::Started {
            document_id: document.id.clone(),
        });

        let result = self.run(document, cancel).await;
        match &result {
            Ok(report) => {
                info!(
                    "Indexed {} into {}: {} chunks, {} stale removed",
                    report.document_id, report.collection, report.chunk_count, report.stale_removed
                );
                let _ = self.update_tx.send(IndexUpdate::Committed {
                    document_id: report.document_id.clone(),
                    chunk_count: report.chunk_count,
                    stale_removed: report.stale_removed,
                });
            }
            Err(e) => {
                warn!("Failed to index {}: {}", document.id, e);
                let _ = self.update_tx.send(IndexUpdate::Failed {
                    document_id: document.id.clone(),
                    error: e.clone(),
                });
            }
        }
        result
    }

    /// Delete every record of a document. Returns the number deleted.
    pub async fn delete_document(
        &self,
        document_id: &str,
        cancel: &CancellationToken,
    ) -> Result<u64, PipelineError> {
        if document_id.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Received,
                ErrorKind::InvalidRequest,
                "document id is empty",
            ));
        }
        let _guard = tokio::select! {
            guard = self.locks.acquire(document_id) => guard,
            () = cancel.cancelled() => return Err(PipelineError::cancelled(Stage::Received)),
        };
        let deleted = self
            .store
            .delete_by_document(&self.config.collection, document_id)
            .await
            .map_err(|e| {
                warn!("Delete of {} failed: {}", document_id, e);
                PipelineError::from_store(Stage::Storing, &e)
            })?;
        info!("Deleted {} records of {}", deleted, document_id);
        Ok(deleted)
    }

    async fn run(
        &self,
        document: &Document,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, PipelineError> {
        if document.id.trim().is_empty() {
            return Err(PipelineError::new(
                Stage::Received,
                ErrorKind::InvalidRequest,
                "document id is empty",
            ));
        }
        checkpoint(cancel, Stage::Received)?;
        let _guard = tokio::select! {
            guard = self.locks.acquire(&document.id) => guard,
            () = cancel.cancelled() => return Err(PipelineError::cancelled(Stage::Received)),
        };
        let mut run = Run {
            document,
            states: Vec::new(),
        };

        self.ensure_collection().await?;
        self.advance(&mut run, RunState::Received);
        checkpoint(cancel, Stage::Chunking)?;

        let chunks = self.chunk(document).await?;
        self.advance(&mut run, RunState::Chunked);
        checkpoint(cancel, Stage::Enrichment)?;

        let metadata = self.enrich(document, &chunks)?;
        self.advance(&mut run, RunState::Enriched);
        checkpoint(cancel, Stage::Embedding)?;

        let vectors = self.embed(&chunks, cancel).await?;
        self.advance(&mut run, RunState::Embedded);
        checkpoint(cancel, Stage::Storing)?;

        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(metadata)
            .zip(vectors)
            .map(|((chunk, metadata), vector)| IndexRecord {
                record_id: chunk.record_id(),
                document_id: chunk.document_id,
                sequence_index: chunk.sequence_index,
                content: chunk.content,
                vector,
                metadata,
            })
            .collect();

        let stale_removed = self.store_records(&mut run, &records, cancel).await?;
        self.advance(&mut run, RunState::Committed);

        Ok(IndexReport {
            document_id: document.id.clone(),
            collection: self.config.collection.clone(),
            chunk_count: records.len(),
            stale_removed,
            final_state: RunState::Committed,
            states: run.states,
            committed_at: Utc::now(),
        })
    }

    fn advance(&self, run: &mut Run<'_>, state: RunState) {
        debug!("{} -> {:?}", run.document.id, state);
        run.states.push(state);
        let _ = self.update_tx.send(IndexUpdate::StageCompleted {
            document_id: run.document.id.clone(),
            state,
        });
    }

    async fn ensure_collection(&self) -> Result<(), PipelineError> {
        let collection = &self.config.collection;
        let dimension = self.embedder.dimension();
        self.collection_ready
            .get_or_try_init(|| async {
                self.store
                    .ensure_collection(collection, dimension)
                    .await
                    .map_err(|e| {
                        warn!("Collection {} unavailable: {}", collection, e);
                        PipelineError::from_store(Stage::Received, &e)
                    })
            })
            .await?;
        Ok(())
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>, PipelineError> {
        let chunks = self.dispatcher.split(document).await.map_err(|e| {
            debug!("Chunking {} failed: {}", document.id, e);
            PipelineError::from_chunk(&e)
        })?;
        if chunks.is_empty() {
            return Err(PipelineError::new(
                Stage::Chunking,
                ErrorKind::EmptyDocument,
                "document produced no chunks",
            ));
        }
        for (expected, chunk) in chunks.iter().enumerate() {
            if chunk.document_id != document.id {
                return Err(PipelineError::contract(
                    Stage::Chunking,
                    format!("chunk belongs to {}, expected {}", chunk.document_id, document.id),
                ));
            }
            if chunk.sequence_index as usize != expected {
                return Err(PipelineError::contract(
                    Stage::Chunking,
                    format!(
                        "sequence index {} at position {}; indices must be contiguous from 0",
                        chunk.sequence_index, expected
                    ),
                ));
            }
        }
        debug!("Chunked {} into {} chunks", document.id, chunks.len());
        Ok(chunks)
    }

    fn enrich(&self, document: &Document, chunks: &[Chunk]) -> Result<Vec<Metadata>, PipelineError> {
        let policy = self.config.merge_policy;
        chunks
            .iter()
            .map(|chunk| {
                let built = match &self.builder {
                    None => None,
                    Some(builder) => match builder.build(document, chunk) {
                        Ok(meta) => Some(meta),
                        Err(e) if self.config.metadata_best_effort => {
                            warn!(
                                "Metadata builder {} failed for {}: {}; indexing without builder fields",
                                builder.name(),
                                document.id,
                                e
                            );
                            None
                        }
                        Err(e) => return Err(PipelineError::from_metadata(&e)),
                    },
                };
                Ok(merge_metadata(&document.metadata, &chunk.metadata, built, policy))
            })
            .collect()
    }

    async fn embed(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed(&texts, cancel).await.map_err(|e| {
            warn!("Embedding failed: {}", e);
            PipelineError::from_embed(Stage::Embedding, &e)
        })?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::contract(
                Stage::Embedding,
                format!("{} vectors for {} chunks", vectors.len(), chunks.len()),
            ));
        }
        let dimension = self.embedder.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(PipelineError::new(
                Stage::Embedding,
                ErrorKind::DimensionalityMismatch,
                format!("embedder returned dimension {}, expected {}", bad.len(), dimension),
            ));
        }
        Ok(vectors)
    }

    /// Replace the document's records. Returns the number of stale records removed.
    async fn store_records(
        &self,
        run: &mut Run<'_>,
        records: &[IndexRecord],
        cancel: &CancellationToken,
    ) -> Result<usize, PipelineError> {
        let collection = &self.config.collection;
        let document = run.document;
        let document_id = &document.id;

        let prior = self
            .store
            .records_for_document(collection, document_id)
            .await
            .map_err(|e| {
                warn!("Reading prior records of {} failed: {}", document_id, e);
                PipelineError::from_store(Stage::Storing, &e)
            })?;
        let chunk_count = records.len();
        let stale: Vec<RecordId> = prior
            .iter()
            .filter(|r| r.sequence_index as usize >= chunk_count)
            .map(|r| r.record_id.clone())
            .collect();
        let stale_removed = stale.len();

        if self.store.supports_transactions() {
            self.store
                .replace_document(collection, document_id, records, &stale)
                .await
                .map_err(|e| {
                    warn!("Replacing {} failed: {}", document_id, e);
                    PipelineError::from_store(Stage::Storing, &e)
                })?;
        } else {
            let saga = WriteSaga::new(self.store.as_ref(), collection, document_id, prior, stale);
            saga.run(records, cancel).await?;
        }
        self.advance(run, RunState::Stored);
        Ok(stale_removed)
    }
}

fn checkpoint(cancel: &CancellationToken, next: Stage) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::cancelled(next))
    } else {
        Ok(())
    }
}
