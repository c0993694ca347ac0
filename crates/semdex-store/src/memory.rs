//! In-memory vector store.
//!
//! [`MemoryStore`] keeps every collection behind a single `RwLock`, so each
//! trait call observes and mutates a consistent snapshot. That makes it a
//! transactional backend. Queries are brute force. It's useful for:
//! - Tests and demos without a database
//! - Small corpora that fit in memory

use async_trait::async_trait;
use semdex_core::{
    DistanceMetric, IndexRecord, RecordId, StoreBackend, StoreError, StoreHit, StoreQuery,
    StoreStats, VectorStore,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    records: BTreeMap<RecordId, IndexRecord>,
}

impl Collection {
    fn check(&self, name: &str, records: &[IndexRecord]) -> Result<(), StoreError> {
        match records.iter().find(|r| r.vector.len() != self.dimension) {
            Some(bad) => Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                existing: self.dimension,
                requested: bad.vector.len(),
            }),
            None => Ok(()),
        }
    }

    fn insert_all(&mut self, records: &[IndexRecord]) {
        for record in records {
            self.records.insert(record.record_id.clone(), record.clone());
        }
    }

    fn remove_all(&mut self, ids: &[RecordId]) -> u64 {
        ids.iter()
            .filter(|id| self.records.remove(*id).is_some())
            .count() as u64
    }
}

/// In-memory vector store.
///
/// # Example
///
/// ```rust
/// use semdex_store::MemoryStore;
/// use semdex_core::VectorStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = MemoryStore::new();
/// store.ensure_collection("docs", 384).await?;
///
/// let stats = store.stats("docs").await?;
/// assert_eq!(stats.total_records, 0);
/// assert_eq!(stats.dimension, Some(384));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    metric: DistanceMetric,
    transactional: bool,
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryStore {
    /// Create an empty store using cosine distance.
    #[must_use]
    pub fn new() -> Self {
        Self::with_metric(DistanceMetric::Cosine)
    }

    /// Create an empty store using the given metric.
    #[must_use]
    pub fn with_metric(metric: DistanceMetric) -> Self {
        Self {
            metric,
            transactional: true,
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Report the store as non-transactional so pipelines drive it through
    /// their compensating write path.
    #[must_use]
    pub fn non_transactional(mut self) -> Self {
        self.transactional = false;
        self
    }

    /// Native distance between two vectors. Lower is closer.
    #[must_use]
    pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
        match metric {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
            DistanceMetric::Dot => 1.0 - dot(a, b),
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
        }
    }

    /// All records of a collection, ordered by record id.
    pub async fn all_records(&self, collection: &str) -> Vec<IndexRecord> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .map(|c| c.records.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two vectors.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot(a, b) / (norm_a * norm_b)
}

fn missing(collection: &str) -> StoreError {
    StoreError::Schema(format!("collection {collection} does not exist"))
}

#[async_trait]
impl VectorStore for MemoryStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::InMemory
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    fn supports_transactions(&self) -> bool {
        self.transactional
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        match collections.get(collection) {
            Some(existing) if existing.dimension != dimension => {
                Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    existing: existing.dimension,
                    requested: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    collection.to_string(),
                    Collection {
                        dimension,
                        records: BTreeMap::new(),
                    },
                );
                debug!("Created in-memory collection {} (dimension: {})", collection, dimension);
                Ok(())
            }
        }
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection).map(|c| c.dimension))
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        target.check(collection, records)?;
        target.insert_all(records);
        debug!("Upserted {} records into {}", records.len(), collection);
        Ok(())
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[IndexRecord],
        stale: &[RecordId],
    ) -> Result<(), StoreError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;
        target.check(collection, records)?;
        let removed = target.remove_all(stale);
        target.insert_all(records);
        debug!(
            "Replaced {} with {} records ({} stale removed) in {}",
            document_id,
            records.len(),
            removed,
            collection
        );
        Ok(())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = target.records.len();
        target.records.retain(|_, r| r.document_id != document_id);
        let deleted = (before - target.records.len()) as u64;
        debug!("Deleted {} records for {}", deleted, document_id);
        Ok(deleted)
    }

    async fn delete_records(&self, collection: &str, ids: &[RecordId]) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        Ok(collections
            .get_mut(collection)
            .map_or(0, |target| target.remove_all(ids)))
    }

    async fn records_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let collections = self.collections.read().await;
        let mut records: Vec<IndexRecord> = collections
            .get(collection)
            .map(|c| {
                c.records
                    .values()
                    .filter(|r| r.document_id == document_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by_key(|r| r.sequence_index);
        Ok(records)
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<StoreHit>, StoreError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        if query.vector.len() != target.dimension {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                existing: target.dimension,
                requested: query.vector.len(),
            });
        }

        // Brute force search
        let mut hits: Vec<StoreHit> = target
            .records
            .values()
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| StoreHit {
                record_id: r.record_id.clone(),
                document_id: r.document_id.clone(),
                sequence_index: r.sequence_index,
                content: r.content.clone(),
                metadata: r.metadata.clone(),
                distance: Self::distance(self.metric, &query.vector, &r.vector),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.record_id.cmp(&b.record_id))
        });
        hits.truncate(query.top_k);
        Ok(hits)
    }

    async fn stats(&self, collection: &str) -> Result<StoreStats, StoreError> {
        let collections = self.collections.read().await;
        let Some(target) = collections.get(collection) else {
            return Ok(StoreStats {
                collection: collection.to_string(),
                ..StoreStats::default()
            });
        };
        let documents: BTreeSet<&str> = target
            .records
            .values()
            .map(|r| r.document_id.as_str())
            .collect();

        Ok(StoreStats {
            collection: collection.to_string(),
            total_records: target.records.len() as u64,
            total_documents: documents.len() as u64,
            dimension: Some(target.dimension),
        })
    }
}
