//! `LanceDB` vector store implementation.
//!
//! One Lance table per collection. Writes go through `merge_insert` on
//! `record_id` in sub-batches; there is no multi-batch transaction, so a
//! failure after the first sub-batch surfaces as [`StoreError::PartialWrite`]
//! and the index pipeline compensates.

use crate::schema::{records_schema, vector_dimension, VECTOR_COLUMN};
use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt32Array,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, DistanceType, Table};
use semdex_core::{
    metadata_from_json, metadata_to_json, DistanceMetric, IndexRecord, RecordId, StoreBackend,
    StoreError, StoreHit, StoreQuery, StoreStats, VectorStore,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Records written per `merge_insert` call.
pub const DEFAULT_WRITE_BATCH: usize = 256;

/// Rows fetched beyond `top_k` on the first search window.
const WINDOW_MARGIN: usize = 16;

/// LanceDB-based vector store.
pub struct LanceStore {
    /// Path to the `LanceDB` database
    db_path: PathBuf,
    metric: DistanceMetric,
    write_batch: usize,
    /// Database connection (lazy initialized)
    connection: RwLock<Option<Connection>>,
    /// Open table handles by collection
    tables: RwLock<HashMap<String, Table>>,
}

impl LanceStore {
    /// Create a new `LanceStore`.
    #[must_use]
    pub fn new(db_path: PathBuf, metric: DistanceMetric) -> Self {
        Self {
            db_path,
            metric,
            write_batch: DEFAULT_WRITE_BATCH,
            connection: RwLock::new(None),
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Override the number of records per `merge_insert` call.
    #[must_use]
    pub fn with_write_batch(mut self, write_batch: usize) -> Self {
        self.write_batch = write_batch.max(1);
        self
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Get or create connection.
    async fn get_connection(&self) -> Result<Connection, StoreError> {
        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        let mut conn = self.connection.write().await;
        if let Some(ref c) = *conn {
            return Ok(c.clone());
        }

        info!("Opening LanceDB at {:?}", self.db_path);
        tokio::fs::create_dir_all(&self.db_path)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to create db directory: {e}")))?;
        let db_path_str = self.db_path.to_string_lossy().to_string();
        let new_conn = connect(&db_path_str)
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect to LanceDB: {e}")))?;
        *conn = Some(new_conn.clone());
        Ok(new_conn)
    }

    /// Open a collection table, or `None` when it does not exist.
    async fn get_table(&self, collection: &str) -> Result<Option<Table>, StoreError> {
        {
            let tables = self.tables.read().await;
            if let Some(t) = tables.get(collection) {
                return Ok(Some(t.clone()));
            }
        }

        let conn = self.get_connection().await?;
        let names = conn
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to list tables: {e}")))?;
        if !names.iter().any(|name| name == collection) {
            return Ok(None);
        }

        let table = conn
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open table {collection}: {e}")))?;
        self.tables
            .write()
            .await
            .insert(collection.to_string(), table.clone());
        Ok(Some(table))
    }

    async fn require_table(&self, collection: &str) -> Result<Table, StoreError> {
        self.get_table(collection)
            .await?
            .ok_or_else(|| StoreError::Schema(format!("collection {collection} does not exist")))
    }

    async fn table_dimension(table: &Table) -> Result<Option<usize>, StoreError> {
        let schema = table
            .schema()
            .await
            .map_err(|e| StoreError::Schema(format!("Failed to read table schema: {e}")))?;
        Ok(vector_dimension(&schema))
    }

    fn distance_type(&self) -> DistanceType {
        match self.metric {
            DistanceMetric::Cosine => DistanceType::Cosine,
            DistanceMetric::Dot => DistanceType::Dot,
            DistanceMetric::L2 => DistanceType::L2,
        }
    }

    async fn merge_batch(&self, table: &Table, dim: usize, records: &[IndexRecord]) -> Result<(), StoreError> {
        let batch = records_to_batch(records, dim)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let mut merge = table.merge_insert(&["record_id"]);
        merge.when_matched_update_all(None).when_not_matched_insert_all();
        merge
            .execute(Box::new(batches))
            .await
            .map_err(|e| StoreError::Write(format!("merge_insert failed: {e}")))?;
        Ok(())
    }

    async fn count(table: &Table, predicate: Option<String>) -> Result<u64, StoreError> {
        table
            .count_rows(predicate)
            .await
            .map(|n| n as u64)
            .map_err(|e| StoreError::Query(format!("Failed to count rows: {e}")))
    }

    async fn nearest(&self, table: &Table, vector: &[f32], limit: usize) -> Result<Vec<StoreHit>, StoreError> {
        let mut results = table
            .query()
            .nearest_to(vector.to_vec())
            .map_err(|e| StoreError::Query(format!("Failed to create search query: {e}")))?
            .distance_type(self.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to execute search: {e}")))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch results: {e}")))?
        {
            hits.extend(batch_to_hits(&batch)?);
        }
        Ok(hits)
    }
}

/// Quote a string literal for a Lance SQL predicate.
fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn id_predicate(ids: &[RecordId]) -> String {
    let list: Vec<String> = ids.iter().map(|id| sql_literal(id.as_str())).collect();
    format!("record_id IN ({})", list.join(", "))
}

fn records_to_batch(records: &[IndexRecord], dim: usize) -> Result<RecordBatch, StoreError> {
    if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
        return Err(StoreError::DimensionMismatch {
            collection: String::new(),
            existing: dim,
            requested: bad.vector.len(),
        });
    }

    let record_ids: Vec<&str> = records.iter().map(|r| r.record_id.as_str()).collect();
    let document_ids: Vec<&str> = records.iter().map(|r| r.document_id.as_str()).collect();
    let sequence: Vec<u32> = records.iter().map(|r| r.sequence_index).collect();
    let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
    let metadata = records
        .iter()
        .map(|r| serde_json::to_string(&metadata_to_json(&r.metadata)))
        .collect::<Result<Vec<String>, _>>()?;

    let mut builder = FixedSizeListBuilder::new(Float32Builder::new(), dim as i32);
    for record in records {
        builder.values().append_slice(&record.vector);
        builder.append(true);
    }
    let vectors: ArrayRef = Arc::new(builder.finish());

    RecordBatch::try_new(
        Arc::new(records_schema(dim)),
        vec![
            Arc::new(StringArray::from(record_ids)),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(UInt32Array::from(sequence)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(metadata)),
            vectors,
        ],
    )
    .map_err(|e| StoreError::Schema(format!("Failed to build record batch: {e}")))
}

struct Columns<'a> {
    record_ids: &'a StringArray,
    document_ids: &'a StringArray,
    sequence: &'a UInt32Array,
    contents: &'a StringArray,
    metadata: &'a StringArray,
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| StoreError::Query(format!("Missing column {name}")))
}

impl<'a> Columns<'a> {
    fn from_batch(batch: &'a RecordBatch) -> Result<Self, StoreError> {
        Ok(Self {
            record_ids: string_column(batch, "record_id")?,
            document_ids: string_column(batch, "document_id")?,
            sequence: batch
                .column_by_name("sequence_index")
                .and_then(|c| c.as_any().downcast_ref::<UInt32Array>())
                .ok_or_else(|| StoreError::Query("Missing column sequence_index".to_string()))?,
            contents: string_column(batch, "content")?,
            metadata: string_column(batch, "metadata")?,
        })
    }

    fn metadata(&self, i: usize) -> Result<semdex_core::Metadata, StoreError> {
        let value: serde_json::Value = serde_json::from_str(self.metadata.value(i))?;
        Ok(metadata_from_json(&value))
    }
}

fn batch_to_records(batch: &RecordBatch) -> Result<Vec<IndexRecord>, StoreError> {
    let columns = Columns::from_batch(batch)?;
    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| StoreError::Query("Missing column vector".to_string()))?;

    (0..batch.num_rows())
        .map(|i| {
            let values = vectors.value(i);
            let values = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| StoreError::Query("vector column is not Float32".to_string()))?;
            Ok(IndexRecord {
                record_id: RecordId::from_raw(columns.record_ids.value(i)),
                document_id: columns.document_ids.value(i).to_string(),
                sequence_index: columns.sequence.value(i),
                content: columns.contents.value(i).to_string(),
                vector: values.values().to_vec(),
                metadata: columns.metadata(i)?,
            })
        })
        .collect()
}

fn batch_to_hits(batch: &RecordBatch) -> Result<Vec<StoreHit>, StoreError> {
    let columns = Columns::from_batch(batch)?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| StoreError::Query("Missing column _distance".to_string()))?;

    (0..batch.num_rows())
        .map(|i| {
            Ok(StoreHit {
                record_id: RecordId::from_raw(columns.record_ids.value(i)),
                document_id: columns.document_ids.value(i).to_string(),
                sequence_index: columns.sequence.value(i),
                content: columns.contents.value(i).to_string(),
                metadata: columns.metadata(i)?,
                distance: distances.value(i),
            })
        })
        .collect()
}

#[async_trait]
impl VectorStore for LanceStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::DedicatedVectorDb
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), StoreError> {
        if let Some(table) = self.get_table(collection).await? {
            return match Self::table_dimension(&table).await? {
                Some(existing) if existing != dimension => Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    existing,
                    requested: dimension,
                }),
                Some(_) => Ok(()),
                None => Err(StoreError::Schema(format!(
                    "table {collection} has no vector column"
                ))),
            };
        }

        info!("Creating Lance table {} (dimension: {})", collection, dimension);
        let conn = self.get_connection().await?;
        let table = conn
            .create_empty_table(collection, Arc::new(records_schema(dimension)))
            .execute()
            .await
            .map_err(|e| StoreError::Schema(format!("Failed to create table {collection}: {e}")))?;
        self.tables
            .write()
            .await
            .insert(collection.to_string(), table);
        Ok(())
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        match self.get_table(collection).await? {
            Some(table) => Self::table_dimension(&table).await,
            None => Ok(None),
        }
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let table = self.require_table(collection).await?;
        let dim = Self::table_dimension(&table)
            .await?
            .ok_or_else(|| StoreError::Schema(format!("table {collection} has no vector column")))?;
        if let Some(bad) = records.iter().find(|r| r.vector.len() != dim) {
            return Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                existing: dim,
                requested: bad.vector.len(),
            });
        }

        let total = records.len();
        let mut written = 0usize;
        for batch in records.chunks(self.write_batch) {
            if let Err(e) = self.merge_batch(&table, dim, batch).await {
                if written == 0 {
                    return Err(e);
                }
                return Err(StoreError::PartialWrite {
                    written,
                    total,
                    reason: e.to_string(),
                });
            }
            written += batch.len();
        }

        debug!("Upserted {} records into {}", total, collection);
        Ok(())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<u64, StoreError> {
        let Some(table) = self.get_table(collection).await? else {
            return Ok(0);
        };
        let predicate = format!("document_id = {}", sql_literal(document_id));
        let deleted = Self::count(&table, Some(predicate.clone())).await?;
        if deleted > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| StoreError::Write(format!("Failed to delete document: {e}")))?;
        }
        debug!("Deleted {} records for {}", deleted, document_id);
        Ok(deleted)
    }

    async fn delete_records(&self, collection: &str, ids: &[RecordId]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let Some(table) = self.get_table(collection).await? else {
            return Ok(0);
        };
        let predicate = id_predicate(ids);
        let deleted = Self::count(&table, Some(predicate.clone())).await?;
        if deleted > 0 {
            table
                .delete(&predicate)
                .await
                .map_err(|e| StoreError::Write(format!("Failed to delete records: {e}")))?;
        }
        Ok(deleted)
    }

    async fn records_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let Some(table) = self.get_table(collection).await? else {
            return Ok(Vec::new());
        };

        let mut results = table
            .query()
            .only_if(format!("document_id = {}", sql_literal(document_id)))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query records: {e}")))?;

        let mut records = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to fetch records: {e}")))?
        {
            records.extend(batch_to_records(&batch)?);
        }
        records.sort_by_key(|r| r.sequence_index);
        Ok(records)
    }

    /// Nearest neighbours ordered by distance, then record id.
    ///
    /// The search window grows until the `top_k`-th match is strictly closer
    /// than the farthest fetched row, or the table is exhausted. Filtered
    /// queries therefore return every match that belongs in the top k, and ties
    /// at the boundary are resolved by record id instead of by the index.
    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<StoreHit>, StoreError> {
        let Some(table) = self.get_table(collection).await? else {
            return Ok(Vec::new());
        };
        let total = usize::try_from(Self::count(&table, None).await?).unwrap_or(usize::MAX);
        if total == 0 || query.top_k == 0 {
            return Ok(Vec::new());
        }
        let filter = query.filter.as_ref().filter(|f| !f.is_empty());

        let mut limit = query.top_k.saturating_add(WINDOW_MARGIN).min(total);
        loop {
            debug!("Searching {} with limit {}", collection, limit);
            let fetched = self.nearest(&table, &query.vector, limit).await?;
            let exhausted = fetched.len() < limit || limit >= total;
            let window_edge = fetched
                .iter()
                .map(|hit| hit.distance)
                .fold(f32::NEG_INFINITY, f32::max);

            let mut hits: Vec<StoreHit> = match filter {
                Some(filter) => fetched
                    .into_iter()
                    .filter(|hit| filter.matches(&hit.metadata))
                    .collect(),
                None => fetched,
            };
            hits.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.record_id.cmp(&b.record_id))
            });

            let settled = hits
                .get(query.top_k - 1)
                .is_some_and(|boundary| boundary.distance < window_edge);
            if settled || exhausted {
                hits.truncate(query.top_k);
                return Ok(hits);
            }
            limit = limit.saturating_mul(2).min(total);
        }
    }

    async fn stats(&self, collection: &str) -> Result<StoreStats, StoreError> {
        let Some(table) = self.get_table(collection).await? else {
            return Ok(StoreStats {
                collection: collection.to_string(),
                ..StoreStats::default()
            });
        };

        let total_records = Self::count(&table, None).await?;
        let mut results = table
            .query()
            .select(Select::columns(&["document_id"]))
            .execute()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to query documents: {e}")))?;

        let mut documents = BTreeSet::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| StoreError::Query(format!("Failed to count documents: {e}")))?
        {
            let ids = string_column(&batch, "document_id")?;
            for i in 0..ids.len() {
                documents.insert(ids.value(i).to_string());
            }
        }

        Ok(StoreStats {
            collection: collection.to_string(),
            total_records,
            total_documents: documents.len() as u64,
            dimension: Self::table_dimension(&table).await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::{Metadata, MetadataFilter};
    use tempfile::tempdir;

    const TEST_DIM: usize = 4;

    fn record(doc: &str, seq: u32, vector: Vec<f32>) -> IndexRecord {
        let mut metadata = Metadata::new();
        metadata.insert("doc".to_string(), doc.into());
        metadata.insert("seq".to_string(), seq.into());
        IndexRecord {
            record_id: RecordId::derive(doc, seq),
            document_id: doc.to_string(),
            sequence_index: seq,
            content: format!("{doc} chunk {seq}"),
            vector,
            metadata,
        }
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; TEST_DIM];
        v[i % TEST_DIM] = 1.0;
        v
    }

    async fn store_in(dir: &Path) -> LanceStore {
        let store = LanceStore::new(dir.join("test.lance"), DistanceMetric::Cosine);
        store.ensure_collection("docs", TEST_DIM).await.unwrap();
        store
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("o'brien"), "'o''brien'");
        let ids = [RecordId::from_raw("a"), RecordId::from_raw("b")];
        assert_eq!(id_predicate(&ids), "record_id IN ('a', 'b')");
    }

    #[tokio::test]
    async fn test_ensure_collection_idempotent_and_validated() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        store.ensure_collection("docs", TEST_DIM).await.unwrap();
        assert_eq!(store.collection_dimension("docs").await.unwrap(), Some(TEST_DIM));
        assert_eq!(store.collection_dimension("missing").await.unwrap(), None);

        let err = store.ensure_collection("docs", 8).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                existing: TEST_DIM,
                requested: 8,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upsert_and_read_back() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;

        let records: Vec<IndexRecord> = (0..3).map(|i| record("a", i, axis(i as usize))).collect();
        store.upsert("docs", &records).await.unwrap();

        let read = store.records_for_document("docs", "a").await.unwrap();
        assert_eq!(read, records);
    }

    #[tokio::test]
    async fn test_upsert_is_keyed_by_record_id() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await.with_write_batch(1);

        store.upsert("docs", &[record("a", 0, axis(0))]).await.unwrap();
        store.upsert("docs", &[record("a", 0, axis(2))]).await.unwrap();

        let read = store.records_for_document("docs", "a").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].vector, axis(2));
        assert_eq!(store.stats("docs").await.unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimension() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        let err = store
            .upsert("docs", &[record("a", 0, vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { .. }));
        assert_eq!(store.stats("docs").await.unwrap().total_records, 0);
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        let records: Vec<IndexRecord> = (0..4).map(|i| record("a", i, axis(i as usize))).collect();
        store.upsert("docs", &records).await.unwrap();

        let hits = store
            .query(
                "docs",
                &StoreQuery {
                    vector: vec![0.9, 0.1, 0.0, 0.0],
                    top_k: 2,
                    filter: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record_id, RecordId::derive("a", 0));
        assert_eq!(hits[1].record_id, RecordId::derive("a", 1));
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_filter_post_applied() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        store
            .upsert("docs", &[record("a", 0, axis(0)), record("b", 0, axis(1))])
            .await
            .unwrap();

        let hits = store
            .query(
                "docs",
                &StoreQuery {
                    vector: axis(0),
                    top_k: 1,
                    filter: Some(MetadataFilter::new().eq("doc", "b")),
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_id, "b");
    }

    #[tokio::test]
    async fn test_filtered_query_reaches_past_closer_rows() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        let mut records: Vec<IndexRecord> = (0..40).map(|i| record("a", i, axis(0))).collect();
        records.push(record("b", 0, axis(1)));
        store.upsert("docs", &records).await.unwrap();

        let hits = store
            .query(
                "docs",
                &StoreQuery {
                    vector: axis(0),
                    top_k: 1,
                    filter: Some(MetadataFilter::new().eq("doc", "b")),
                },
            )
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record_id, RecordId::derive("b", 0));
    }

    #[tokio::test]
    async fn test_boundary_ties_break_by_record_id() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        let records: Vec<IndexRecord> = (0..30).map(|i| record("t", i, axis(0))).collect();
        store.upsert("docs", &records).await.unwrap();

        let hits = store
            .query(
                "docs",
                &StoreQuery {
                    vector: axis(0),
                    top_k: 3,
                    filter: None,
                },
            )
            .await
            .unwrap();

        let mut expected: Vec<RecordId> = records.iter().map(|r| r.record_id.clone()).collect();
        expected.sort();
        expected.truncate(3);
        let ids: Vec<RecordId> = hits.into_iter().map(|h| h.record_id).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_delete_counts() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        store
            .upsert(
                "docs",
                &[record("a", 0, axis(0)), record("a", 1, axis(1)), record("b", 0, axis(2))],
            )
            .await
            .unwrap();

        assert_eq!(store.delete_records("docs", &[RecordId::derive("a", 1)]).await.unwrap(), 1);
        assert_eq!(store.delete_by_document("docs", "a").await.unwrap(), 1);
        assert_eq!(store.delete_by_document("docs", "a").await.unwrap(), 0);
        assert_eq!(store.delete_by_document("missing", "a").await.unwrap(), 0);

        let stats = store.stats("docs").await.unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.total_documents, 1);
    }

    #[tokio::test]
    async fn test_default_replace_document() {
        let temp = tempdir().unwrap();
        let store = store_in(temp.path()).await;
        assert!(!store.supports_transactions());
        store
            .upsert("docs", &[record("a", 0, axis(0)), record("a", 1, axis(1))])
            .await
            .unwrap();

        store
            .replace_document(
                "docs",
                "a",
                &[record("a", 0, axis(3))],
                &[RecordId::derive("a", 1)],
            )
            .await
            .unwrap();

        let read = store.records_for_document("docs", "a").await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].vector, axis(3));
    }

    #[tokio::test]
    async fn test_stats_missing_collection() {
        let temp = tempdir().unwrap();
        let store = LanceStore::new(temp.path().join("test.lance"), DistanceMetric::L2);
        let stats = store.stats("nothing").await.unwrap();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.dimension, None);
    }
}
