//! Test doubles shared by the unit tests.

use async_trait::async_trait;
use semdex_core::{
    DistanceMetric, IndexRecord, RecordId, StoreBackend, StoreError, StoreHit, StoreQuery,
    StoreStats, VectorStore,
};
use semdex_store::MemoryStore;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) fn record(document_id: &str, sequence_index: u32, content: &str) -> IndexRecord {
    IndexRecord {
        record_id: RecordId::derive(document_id, sequence_index),
        document_id: document_id.to_string(),
        sequence_index,
        content: content.to_string(),
        vector: vec![1.0, 0.0, 0.0, sequence_index as f32],
        metadata: Default::default(),
    }
}

// ==================== Faulty Store ====================

/// Non-transactional store that injects write failures.
///
/// A failing upsert writes the first half of its records before returning
/// [`StoreError::PartialWrite`].
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    failing_upserts: AtomicUsize,
    failing_deletes: AtomicBool,
    upserts: AtomicUsize,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: MemoryStore::new().non_transactional(),
            failing_upserts: AtomicUsize::new(0),
            failing_deletes: AtomicBool::new(false),
            upserts: AtomicUsize::new(0),
        }
    }

    pub(crate) fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub(crate) fn fail_next_upserts(&self, n: usize) {
        self.failing_upserts.store(n, Ordering::SeqCst);
    }

    pub(crate) fn fail_deletes(&self) {
        self.failing_deletes.store(true, Ordering::SeqCst);
    }

    pub(crate) fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorStore for FaultyStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::InMemory
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.inner.distance_metric()
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), StoreError> {
        self.inner.ensure_collection(collection, dimension).await
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        self.inner.collection_dimension(collection).await
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_upserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            let written = records.len() / 2;
            self.inner.upsert(collection, &records[..written]).await?;
            return Err(StoreError::PartialWrite {
                written,
                total: records.len(),
                reason: "injected".to_string(),
            });
        }
        self.inner.upsert(collection, records).await
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<u64, StoreError> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        self.inner.delete_by_document(collection, document_id).await
    }

    async fn delete_records(&self, collection: &str, ids: &[RecordId]) -> Result<u64, StoreError> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected".to_string()));
        }
        self.inner.delete_records(collection, ids).await
    }

    async fn records_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        self.inner.records_for_document(collection, document_id).await
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<StoreHit>, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn stats(&self, collection: &str) -> Result<StoreStats, StoreError> {
        self.inner.stats(collection).await
    }
}
