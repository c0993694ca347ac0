//! PostgreSQL + pgvector backend.
//!
//! One table per collection inside a configurable schema:
//!
//! ```sql
//! record_id TEXT PRIMARY KEY, document_id TEXT, sequence_index BIGINT,
//! content TEXT, metadata JSONB, embedding VECTOR(dim)
//! ```
//!
//! The collection dimensionality is read back from `pg_attribute.atttypmod`.
//! [`VectorStore::replace_document`] runs in a single transaction, which
//! makes this a transactional backend.

use async_trait::async_trait;
use pgvector::Vector;
use semdex_core::{
    metadata_from_json, metadata_to_json, DistanceMetric, IndexRecord, RecordId, StoreBackend,
    StoreError, StoreHit, StoreQuery, StoreStats, VectorStore,
};
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, GenericClient, NoTls, Row};
use tracing::{debug, error, info};

/// Fully-qualified table for one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Build the table identifier for a collection.
    pub fn new(schema: &str, collection: &str) -> Result<Self, StoreError> {
        if schema.trim().is_empty() {
            return Err(StoreError::Schema("schema name is required".to_string()));
        }
        if collection.trim().is_empty() {
            return Err(StoreError::Schema("collection name is required".to_string()));
        }
        Ok(Self {
            schema: schema.to_string(),
            table: collection.to_string(),
        })
    }

    /// Table reference with quoted identifiers.
    #[must_use]
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    /// Name of the `document_id` index.
    #[must_use]
    pub fn document_index_name(&self) -> String {
        quote_ident(&format!(
            "{}_{}_document_id_idx",
            sanitize_ident(&self.schema),
            sanitize_ident(&self.table)
        ))
    }
}

/// Quotes Postgres identifiers, escaping embedded quotes.
#[must_use]
pub fn quote_ident(input: &str) -> String {
    format!("\"{}\"", input.replace('"', "\"\""))
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect()
}

/// SQL expression for the native distance, lower is closer.
///
/// `<#>` returns the negated inner product, so `1 + <#>` is `1 - dot`.
#[must_use]
pub fn distance_expr(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "(embedding <=> $1)",
        DistanceMetric::Dot => "(1 + (embedding <#> $1))",
        DistanceMetric::L2 => "(embedding <-> $1)",
    }
}

fn create_table_sql(table: &TableName, dimension: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (
            record_id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            sequence_index BIGINT NOT NULL,
            content TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            embedding VECTOR({dimension}) NOT NULL
        )",
        table.qualified()
    )
}

fn upsert_sql(table: &TableName) -> String {
    format!(
        "INSERT INTO {} \
            (record_id, document_id, sequence_index, content, metadata, embedding) \
            VALUES ($1, $2, $3, $4, $5, $6) \
            ON CONFLICT (record_id) DO UPDATE SET \
                document_id = EXCLUDED.document_id, \
                sequence_index = EXCLUDED.sequence_index, \
                content = EXCLUDED.content, \
                metadata = EXCLUDED.metadata, \
                embedding = EXCLUDED.embedding",
        table.qualified()
    )
}

fn query_sql(table: &TableName, metric: DistanceMetric, filtered: bool) -> String {
    let filter = if filtered {
        "WHERE metadata @> $3::jsonb "
    } else {
        ""
    };
    format!(
        "SELECT record_id, document_id, sequence_index, content, metadata, \
            {distance} AS distance \
        FROM {table} \
        {filter}\
        ORDER BY distance ASC, record_id ASC \
        LIMIT $2",
        distance = distance_expr(metric),
        table = table.qualified(),
    )
}

const DIMENSION_SQL: &str = "SELECT a.atttypmod \
    FROM pg_attribute a \
    JOIN pg_class c ON a.attrelid = c.oid \
    JOIN pg_namespace n ON c.relnamespace = n.oid \
    WHERE n.nspname = $1 AND c.relname = $2 AND a.attname = 'embedding' AND NOT a.attisdropped";

fn is_undefined_table(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::UNDEFINED_TABLE)
}

fn write_err(context: &str, err: &tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Unavailable(format!("{context}: {err}"))
    } else {
        StoreError::Write(format!("{context}: {err}"))
    }
}

fn query_err(context: &str, err: &tokio_postgres::Error) -> StoreError {
    if err.is_closed() {
        StoreError::Unavailable(format!("{context}: {err}"))
    } else {
        StoreError::Query(format!("{context}: {err}"))
    }
}

fn sequence_from_row(row: &Row) -> Result<u32, StoreError> {
    let raw: i64 = row.get("sequence_index");
    u32::try_from(raw)
        .map_err(|_| StoreError::Schema(format!("sequence_index {raw} exceeds u32 range")))
}

/// Vector store backed by PostgreSQL with the pgvector extension.
pub struct PgVectorStore {
    client: Mutex<Client>,
    schema: String,
    metric: DistanceMetric,
}

impl PgVectorStore {
    /// Connect to Postgres and spawn the connection task.
    pub async fn connect(
        dsn: &str,
        schema: impl Into<String>,
        metric: DistanceMetric,
    ) -> Result<Self, StoreError> {
        let (client, connection) = tokio_postgres::connect(dsn, NoTls)
            .await
            .map_err(|e| StoreError::Unavailable(format!("failed to connect to Postgres: {e}")))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!("Postgres connection error: {}", err);
            }
        });
        info!("Connected to Postgres");
        Ok(Self::from_client(client, schema, metric))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, schema: impl Into<String>, metric: DistanceMetric) -> Self {
        Self {
            client: Mutex::new(client),
            schema: schema.into(),
            metric,
        }
    }

    fn table(&self, collection: &str) -> Result<TableName, StoreError> {
        TableName::new(&self.schema, collection)
    }

    async fn dimension_with<C: GenericClient>(
        &self,
        client: &C,
        collection: &str,
    ) -> Result<Option<usize>, StoreError> {
        let row = client
            .query_opt(DIMENSION_SQL, &[&self.schema, &collection])
            .await
            .map_err(|e| query_err("failed to read collection dimension", &e))?;
        Ok(row.and_then(|row| {
            let typmod: i32 = row.get(0);
            usize::try_from(typmod).ok().filter(|d| *d > 0)
        }))
    }

    async fn check_dimension<C: GenericClient>(
        &self,
        client: &C,
        collection: &str,
        records: &[IndexRecord],
    ) -> Result<(), StoreError> {
        let existing = self
            .dimension_with(client, collection)
            .await?
            .ok_or_else(|| StoreError::Schema(format!("collection {collection} does not exist")))?;
        match records.iter().find(|r| r.vector.len() != existing) {
            Some(bad) => Err(StoreError::DimensionMismatch {
                collection: collection.to_string(),
                existing,
                requested: bad.vector.len(),
            }),
            None => Ok(()),
        }
    }

    async fn write_records<C: GenericClient>(
        client: &C,
        table: &TableName,
        records: &[IndexRecord],
    ) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let statement = client
            .prepare(&upsert_sql(table))
            .await
            .map_err(|e| write_err("failed to prepare upsert", &e))?;
        for record in records {
            let sequence_index = i64::from(record.sequence_index);
            let metadata = metadata_to_json(&record.metadata);
            let vector = Vector::from(record.vector.clone());
            client
                .execute(
                    &statement,
                    &[
                        &record.record_id.as_str(),
                        &record.document_id,
                        &sequence_index,
                        &record.content,
                        &metadata,
                        &vector,
                    ],
                )
                .await
                .map_err(|e| write_err(&format!("failed to upsert record {}", record.record_id), &e))?;
        }
        Ok(())
    }

    async fn delete_ids<C: GenericClient>(
        client: &C,
        table: &TableName,
        ids: &[RecordId],
    ) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: Vec<&str> = ids.iter().map(RecordId::as_str).collect();
        let sql = format!("DELETE FROM {} WHERE record_id = ANY($1)", table.qualified());
        client
            .execute(&sql, &[&ids])
            .await
            .map_err(|e| write_err("failed to delete records", &e))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn backend(&self) -> StoreBackend {
        StoreBackend::RelationalVector
    }

    fn distance_metric(&self) -> DistanceMetric {
        self.metric
    }

    fn supports_transactions(&self) -> bool {
        true
    }

    async fn ensure_collection(&self, collection: &str, dimension: usize) -> Result<(), StoreError> {
        if dimension == 0 {
            return Err(StoreError::Schema("embedding dimension must be positive".to_string()));
        }
        let table = self.table(collection)?;
        let client = self.client.lock().await;

        client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
            .map_err(|e| StoreError::Schema(format!("failed to ensure pgvector extension: {e}")))?;

        match self.dimension_with(&*client, collection).await? {
            Some(existing) if existing != dimension => {
                return Err(StoreError::DimensionMismatch {
                    collection: collection.to_string(),
                    existing,
                    requested: dimension,
                });
            }
            Some(_) => return Ok(()),
            None => {}
        }

        client
            .execute(&create_table_sql(&table, dimension), &[])
            .await
            .map_err(|e| StoreError::Schema(format!("failed to create table: {e}")))?;
        let index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (document_id)",
            table.document_index_name(),
            table.qualified()
        );
        client
            .execute(&index, &[])
            .await
            .map_err(|e| StoreError::Schema(format!("failed to create document index: {e}")))?;

        debug!("Created pgvector table {} (dimension: {})", table.qualified(), dimension);
        Ok(())
    }

    async fn collection_dimension(&self, collection: &str) -> Result<Option<usize>, StoreError> {
        let client = self.client.lock().await;
        self.dimension_with(&*client, collection).await
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<(), StoreError> {
        let table = self.table(collection)?;
        let mut client = self.client.lock().await;
        self.check_dimension(&*client, collection, records).await?;

        let transaction = client
            .transaction()
            .await
            .map_err(|e| write_err("failed to begin transaction", &e))?;
        Self::write_records(&transaction, &table, records).await?;
        transaction
            .commit()
            .await
            .map_err(|e| write_err("failed to commit upsert", &e))?;

        debug!("Upserted {} records into {}", records.len(), table.qualified());
        Ok(())
    }

    async fn replace_document(
        &self,
        collection: &str,
        document_id: &str,
        records: &[IndexRecord],
        stale: &[RecordId],
    ) -> Result<(), StoreError> {
        let table = self.table(collection)?;
        let mut client = self.client.lock().await;
        self.check_dimension(&*client, collection, records).await?;

        let transaction = client
            .transaction()
            .await
            .map_err(|e| write_err("failed to begin transaction", &e))?;
        let removed = Self::delete_ids(&transaction, &table, stale).await?;
        Self::write_records(&transaction, &table, records).await?;
        transaction
            .commit()
            .await
            .map_err(|e| write_err("failed to commit document replace", &e))?;

        debug!(
            "Replaced {} with {} records ({} stale removed) in {}",
            document_id,
            records.len(),
            removed,
            table.qualified()
        );
        Ok(())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<u64, StoreError> {
        let table = self.table(collection)?;
        let client = self.client.lock().await;
        let sql = format!("DELETE FROM {} WHERE document_id = $1", table.qualified());
        match client.execute(&sql, &[&document_id]).await {
            Ok(deleted) => {
                debug!("Deleted {} records for {}", deleted, document_id);
                Ok(deleted)
            }
            Err(e) if is_undefined_table(&e) => Ok(0),
            Err(e) => Err(write_err("failed to delete document", &e)),
        }
    }

    async fn delete_records(&self, collection: &str, ids: &[RecordId]) -> Result<u64, StoreError> {
        let table = self.table(collection)?;
        let client = self.client.lock().await;
        if self.dimension_with(&*client, collection).await?.is_none() {
            return Ok(0);
        }
        Self::delete_ids(&*client, &table, ids).await
    }

    async fn records_for_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let table = self.table(collection)?;
        let client = self.client.lock().await;
        let sql = format!(
            "SELECT record_id, document_id, sequence_index, content, metadata, embedding \
            FROM {} WHERE document_id = $1 ORDER BY sequence_index ASC",
            table.qualified()
        );
        let rows = match client.query(&sql, &[&document_id]).await {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(query_err("failed to read document records", &e)),
        };

        rows.iter()
            .map(|row| {
                let metadata: serde_json::Value = row.get("metadata");
                let vector: Vector = row.get("embedding");
                Ok(IndexRecord {
                    record_id: RecordId::from_raw(row.get::<_, String>("record_id")),
                    document_id: row.get("document_id"),
                    sequence_index: sequence_from_row(row)?,
                    content: row.get("content"),
                    vector: vector.to_vec(),
                    metadata: metadata_from_json(&metadata),
                })
            })
            .collect()
    }

    async fn query(&self, collection: &str, query: &StoreQuery) -> Result<Vec<StoreHit>, StoreError> {
        let table = self.table(collection)?;
        let filter = query
            .filter
            .as_ref()
            .filter(|f| !f.is_empty())
            .map(|f| metadata_to_json(&f.must));
        let sql = query_sql(&table, self.metric, filter.is_some());
        let vector = Vector::from(query.vector.clone());
        let limit = i64::try_from(query.top_k).unwrap_or(i64::MAX);

        let client = self.client.lock().await;
        let result = match &filter {
            Some(filter) => client.query(&sql, &[&vector, &limit, filter]).await,
            None => client.query(&sql, &[&vector, &limit]).await,
        };
        let rows = match result {
            Ok(rows) => rows,
            Err(e) if is_undefined_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(query_err("vector query failed", &e)),
        };

        rows.iter()
            .map(|row| {
                let metadata: serde_json::Value = row.get("metadata");
                let distance: f64 = row.get("distance");
                Ok(StoreHit {
                    record_id: RecordId::from_raw(row.get::<_, String>("record_id")),
                    document_id: row.get("document_id"),
                    sequence_index: sequence_from_row(row)?,
                    content: row.get("content"),
                    metadata: metadata_from_json(&metadata),
                    distance: distance as f32,
                })
            })
            .collect()
    }

    async fn stats(&self, collection: &str) -> Result<StoreStats, StoreError> {
        let table = self.table(collection)?;
        let client = self.client.lock().await;
        let Some(dimension) = self.dimension_with(&*client, collection).await? else {
            return Ok(StoreStats {
                collection: collection.to_string(),
                ..StoreStats::default()
            });
        };
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT document_id) FROM {}",
            table.qualified()
        );
        let row = client
            .query_one(&sql, &[])
            .await
            .map_err(|e| query_err("failed to read collection stats", &e))?;
        let records: i64 = row.get(0);
        let documents: i64 = row.get(1);

        Ok(StoreStats {
            collection: collection.to_string(),
            total_records: u64::try_from(records).unwrap_or(0),
            total_documents: u64::try_from(documents).unwrap_or(0),
            dimension: Some(dimension),
        })
    }
}
