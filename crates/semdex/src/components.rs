//! Builds the adapter stack and both pipelines from configuration.
//!
//! This is the only place that reads secrets from the environment.

#[cfg(feature = "lancedb")]
use crate::config::data_dir;
use crate::config::{Config, Profile, Provider};
use anyhow::{Context, Result};
use semdex_chunker::ChunkingDispatcher;
use semdex_core::{ChunkConfig, Embedder, MetadataBuilder, StoreBackend, VectorStore};
use semdex_embed::{EmbedderPool, GeminiConfig, GeminiEmbedder, HashEmbedder, RetryPolicy};
use semdex_index::{
    CoopwiseMetadataBuilder, IndexPipeline, IndexPipelineConfig, StaticMetadataBuilder,
    Winnov8MetadataBuilder,
};
use semdex_query::{SearchConfig, SearchPipeline};
use semdex_store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// The wired pipelines plus the shared store.
pub struct Components {
    pub collection: String,
    pub store: Arc<dyn VectorStore>,
    pub index: IndexPipeline,
    pub search: SearchPipeline,
}

/// Create the standard component stack.
pub async fn create_components(config: &Config) -> Result<Components> {
    let collection = config.collection();
    let store = create_store(config).await?;
    let embedder = create_embedder(config)?;
    let pool = Arc::new(
        EmbedderPool::new(embedder, config.embedding.max_concurrent).with_policy(retry_policy(config)),
    );
    info!(
        "Using {} ({} dims) with {} store, collection {}",
        pool.model_name(),
        pool.dimension(),
        store.backend(),
        collection
    );

    let dispatcher = Arc::new(ChunkingDispatcher::with_defaults(ChunkConfig::from(
        &config.chunking,
    )));
    let index = IndexPipeline::new(
        dispatcher,
        create_metadata_builder(config)?,
        pool.clone(),
        store.clone(),
        IndexPipelineConfig {
            collection: collection.clone(),
            metadata_best_effort: config.index.metadata_best_effort,
            merge_policy: config.index.merge_policy,
        },
    );
    let search = SearchPipeline::new(
        pool,
        store.clone(),
        SearchConfig {
            collection: collection.clone(),
            default_top_k: config.search.default_top_k,
            max_top_k: config.search.max_top_k,
            min_score: config.search.min_score,
        },
    );

    Ok(Components {
        collection,
        store,
        index,
        search,
    })
}

/// Read a secret from the environment variable named by a `*_ref` setting.
pub fn resolve_secret(name: &str) -> Result<String> {
    let value =
        std::env::var(name).with_context(|| format!("Environment variable {name} is not set"))?;
    if value.trim().is_empty() {
        anyhow::bail!("Environment variable {name} is empty");
    }
    Ok(value)
}

fn retry_policy(config: &Config) -> RetryPolicy {
    RetryPolicy {
        retry_budget: config.embedding.retry_budget,
        timeout: Duration::from_millis(config.embedding.timeout_ms),
        ..RetryPolicy::default()
    }
}

pub fn create_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    let embedding = &config.embedding;
    match embedding.provider {
        Provider::Gemini => {
            let api_key = resolve_secret(&embedding.api_key_ref)?;
            let defaults = GeminiConfig::default();
            let embedder = GeminiEmbedder::new(GeminiConfig {
                api_key,
                model_name: embedding.model_name.clone(),
                dimension: embedding.dimension,
                max_batch_size: embedding.max_batch_size,
                timeout: Duration::from_millis(embedding.timeout_ms),
                task_type: embedding.task_type.clone().or(defaults.task_type.clone()),
                query_task_type: embedding
                    .query_task_type
                    .clone()
                    .or(defaults.query_task_type.clone()),
                ..defaults
            })
            .context("Failed to create Gemini embedder")?;
            Ok(Arc::new(embedder))
        }
        Provider::Hash => Ok(Arc::new(
            HashEmbedder::new(embedding.dimension)
                .with_max_batch_size(embedding.max_batch_size)
                .with_model_name(embedding.model_name.clone()),
        )),
    }
}

pub async fn create_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let store = &config.store;
    match store.backend {
        StoreBackend::RelationalVector => connect_postgres(config).await,
        StoreBackend::DedicatedVectorDb => open_lance(config),
        StoreBackend::InMemory => {
            warn!("In-memory store does not persist between runs");
            Ok(Arc::new(MemoryStore::with_metric(store.distance_metric)))
        }
    }
}

#[cfg(feature = "postgres")]
async fn connect_postgres(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let dsn = resolve_secret(&config.store.connection_ref)?;
    let store = semdex_store::PgVectorStore::connect(
        &dsn,
        config.store.schema.clone(),
        config.store.distance_metric,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "postgres"))]
async fn connect_postgres(_config: &Config) -> Result<Arc<dyn VectorStore>> {
    anyhow::bail!("relational-vector backend requires the `postgres` feature")
}

#[cfg(feature = "lancedb")]
fn open_lance(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let path = match &config.store.path {
        Some(path) => path.clone(),
        None => data_dir().context("Failed to get data directory")?.join("lance"),
    };
    Ok(Arc::new(semdex_store::LanceStore::new(
        path,
        config.store.distance_metric,
    )))
}

#[cfg(not(feature = "lancedb"))]
fn open_lance(_config: &Config) -> Result<Arc<dyn VectorStore>> {
    anyhow::bail!("dedicated-vector-db backend requires the `lancedb` feature")
}

pub fn create_metadata_builder(config: &Config) -> Result<Option<Arc<dyn MetadataBuilder>>> {
    let meta = &config.metadata;
    let builder: Arc<dyn MetadataBuilder> = match meta.profile {
        Profile::None => return Ok(None),
        Profile::Static => Arc::new(
            meta.fields
                .iter()
                .fold(StaticMetadataBuilder::default(), |b, (k, v)| b.with(k.clone(), v.as_str())),
        ),
        Profile::Coopwise => Arc::new(CoopwiseMetadataBuilder::new(
            meta.cooperative_id
                .clone()
                .context("metadata.cooperative_id is required for the coopwise profile")?,
            meta.group_id.clone(),
        )),
        Profile::Winnov8 => Arc::new(Winnov8MetadataBuilder::new(
            meta.owner_id
                .clone()
                .context("metadata.owner_id is required for the winnov8 profile")?,
            meta.entity_type
                .clone()
                .context("metadata.entity_type is required for the winnov8 profile")?,
        )),
    };
    Ok(Some(builder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::{Chunk, Document, DocumentFormat, Metadata, MetadataValue};

    fn hash_config() -> Config {
        let mut config = Config::default();
        config.embedding.provider = Provider::Hash;
        config.embedding.dimension = 32;
        config.store.backend = StoreBackend::InMemory;
        config
    }

    #[tokio::test]
    async fn test_create_in_memory_components() {
        let components = create_components(&hash_config()).await.unwrap();
        assert_eq!(components.store.backend(), StoreBackend::InMemory);
        assert_eq!(components.index.collection(), components.collection);
        assert_eq!(components.search.config().max_top_k, 100);
    }

    #[test]
    fn test_hash_embedder_uses_config() {
        let mut config = hash_config();
        config.embedding.max_batch_size = 7;
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.max_batch_size(), 7);
    }

    #[test]
    fn test_gemini_requires_api_key() {
        let mut config = Config::default();
        config.embedding.api_key_ref = "SEMDEX_TEST_UNSET_API_KEY".to_string();
        assert!(create_embedder(&config).is_err());
    }

    #[test]
    fn test_metadata_profiles() {
        let mut config = Config::default();
        assert!(create_metadata_builder(&config).unwrap().is_none());

        config.metadata.profile = Profile::Coopwise;
        assert!(create_metadata_builder(&config).is_err());

        config.metadata.cooperative_id = Some("coop-1".to_string());
        let builder = create_metadata_builder(&config).unwrap().unwrap();
        assert_eq!(builder.name(), "coopwise");

        config.metadata.profile = Profile::Static;
        config.metadata.fields.insert("tenant".to_string(), "acme".to_string());
        let builder = create_metadata_builder(&config).unwrap().unwrap();
        let doc = Document::new("d", DocumentFormat::Text, "x");
        let chunk = Chunk {
            document_id: "d".to_string(),
            sequence_index: 0,
            content: "x".to_string(),
            metadata: Metadata::new(),
        };
        let meta = builder.build(&doc, &chunk).unwrap();
        assert_eq!(meta.get("tenant"), Some(&MetadataValue::from("acme")));
    }
}
