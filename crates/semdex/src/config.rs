//! Configuration handling for semdex.
//!
//! Loaded from TOML. Every field has a default, so an empty or missing file is valid.
//! Secrets are never stored in the file: `api_key_ref` and `connection_ref`
//! name environment variables that are resolved at startup.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use semdex_core::{collection_name, BoundaryMode, ChunkConfig, DistanceMetric, StoreBackend};
use semdex_index::MergePolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Embedding provider configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Vector store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Index pipeline configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Metadata profile
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load from the default config path. A missing file yields the defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from `path`, or from the default config path when `None`.
    pub fn load_from(path: Option<PathBuf>) -> Result<Self> {
        let explicit = path.is_some();
        let Some(path) = path.or_else(Self::config_path) else {
            return Ok(Self::default());
        };
        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file does not exist: {}", path.display());
            }
            return Ok(Self::default());
        }
        Self::from_file(&path)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Default config file location.
    pub fn config_path() -> Option<PathBuf> {
        config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Collection targeted by both pipelines.
    pub fn collection(&self) -> String {
        if self.store.collection_per_model {
            collection_name(
                &self.store.collection_name,
                &self.embedding.model_name,
                self.embedding.dimension,
            )
        } else {
            self.store.collection_name.clone()
        }
    }

    /// Annotated sample configuration.
    pub fn sample_toml() -> &'static str {
        r#"# semdex configuration

[embedding]
# gemini | hash
provider = "gemini"
model_name = "text-embedding-004"
# Name of the environment variable holding the API key
api_key_ref = "GEMINI_API_KEY"
dimension = 768
max_batch_size = 100
max_concurrent = 4
timeout_ms = 30000
retry_budget = 3

[store]
# relational-vector | dedicated-vector-db | in-memory
backend = "relational-vector"
# Name of the environment variable holding the PostgreSQL DSN
connection_ref = "SEMDEX_DATABASE_URL"
schema = "public"
collection_name = "semdex"
# Append model and dimension to the collection name
collection_per_model = true
# cosine | dot | l2
distance_metric = "cosine"
# LanceDB directory, defaults to the data directory
# path = "/var/lib/semdex/lance"

[chunking]
max_chunk_size = 1200
overlap = 150
# char | word | sentence | structural
boundary_mode = "structural"

[index]
metadata_best_effort = false
# builder_wins | source_wins
merge_policy = "builder_wins"

[metadata]
# none | static | coopwise | winnov8
profile = "none"
# cooperative_id = "coop-123"
# group_id = "group-7"
# owner_id = "user-42"
# entity_type = "resume"

# [metadata.fields]
# tenant = "acme"

[search]
default_top_k = 10
max_top_k = 100
# min_score = 0.2

[logging]
level = "info"
"#
    }
}

/// Embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    /// Offline feature-hashing embedder
    Hash,
}

/// Embedding-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: Provider,

    /// Model to use
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_ref")]
    pub api_key_ref: String,

    /// Output dimensionality
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum texts per provider call
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Max concurrent provider calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Per-call timeout (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Gemini task type for indexed documents (default `RETRIEVAL_DOCUMENT`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,

    /// Gemini task type for search queries (default `RETRIEVAL_QUERY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_task_type: Option<String>,
}

fn default_provider() -> Provider {
    Provider::Gemini
}

fn default_model_name() -> String {
    "text-embedding-004".to_string()
}

fn default_api_key_ref() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_dimension() -> usize {
    768
}

fn default_max_batch_size() -> usize {
    100
}

fn default_max_concurrent() -> usize {
    4
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_budget() -> u32 {
    3
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            api_key_ref: default_api_key_ref(),
            dimension: default_dimension(),
            max_batch_size: default_max_batch_size(),
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
            retry_budget: default_retry_budget(),
            task_type: None,
            query_task_type: None,
        }
    }
}

/// Vector store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Environment variable holding the database DSN
    #[serde(default = "default_connection_ref")]
    pub connection_ref: String,

    /// PostgreSQL schema
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Collection name, or prefix when `collection_per_model` is set
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    #[serde(default = "default_collection_per_model")]
    pub collection_per_model: bool,

    #[serde(default)]
    pub distance_metric: DistanceMetric,

    /// LanceDB directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_backend() -> StoreBackend {
    StoreBackend::RelationalVector
}

fn default_connection_ref() -> String {
    "SEMDEX_DATABASE_URL".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_collection_name() -> String {
    "semdex".to_string()
}

fn default_collection_per_model() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection_ref: default_connection_ref(),
            schema: default_schema(),
            collection_name: default_collection_name(),
            collection_per_model: default_collection_per_model(),
            distance_metric: DistanceMetric::default(),
            path: None,
        }
    }
}

/// Chunking-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size (characters)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Overlap between chunks (characters)
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(default)]
    pub boundary_mode: BoundaryMode,
}

fn default_max_chunk_size() -> usize {
    1200
}

fn default_overlap() -> usize {
    150
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            overlap: default_overlap(),
            boundary_mode: BoundaryMode::default(),
        }
    }
}

impl From<&ChunkingConfig> for ChunkConfig {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            max_chunk_size: config.max_chunk_size,
            overlap: config.overlap,
            boundary_mode: config.boundary_mode,
        }
    }
}

/// Index pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexConfig {
    /// Index without builder fields when the metadata builder fails
    #[serde(default)]
    pub metadata_best_effort: bool,

    #[serde(default)]
    pub merge_policy: MergePolicy,
}

/// Metadata profile selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    #[default]
    None,
    Static,
    Coopwise,
    Winnov8,
}

/// Metadata builder configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MetadataConfig {
    #[serde(default)]
    pub profile: Profile,

    /// Fixed fields for the static profile
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooperative_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
}

/// Search-related configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default result count
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    /// Maximum result count
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

fn default_top_k() -> usize {
    10
}

fn default_max_top_k() -> usize {
    100
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            min_score: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Get the XDG data directory for semdex.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SEMDEX_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "semdex").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the XDG config directory for semdex.
pub fn config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SEMDEX_CONFIG_DIR") {
        return Some(PathBuf::from(dir));
    }

    ProjectDirs::from("", "", "semdex").map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embedding.provider, Provider::Gemini);
        assert_eq!(config.embedding.dimension, 768);
        assert_eq!(config.store.backend, StoreBackend::RelationalVector);
        assert_eq!(config.chunking.boundary_mode, BoundaryMode::Structural);
        assert_eq!(config.index.merge_policy, MergePolicy::BuilderWins);
        assert_eq!(config.metadata.profile, Profile::None);
        assert_eq!(config.search.default_top_k, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_sample_toml_parses() {
        let config: Config = toml::from_str(Config::sample_toml()).unwrap();
        assert_eq!(config.embedding.api_key_ref, "GEMINI_API_KEY");
        assert_eq!(config.store.connection_ref, "SEMDEX_DATABASE_URL");
        assert_eq!(config.store.distance_metric, DistanceMetric::Cosine);
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            provider = "hash"
            dimension = 64

            [store]
            backend = "in-memory"
            distance_metric = "l2"

            [index]
            merge_policy = "source_wins"

            [metadata]
            profile = "winnov8"
            owner_id = "u1"
            entity_type = "resume"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.provider, Provider::Hash);
        assert_eq!(config.embedding.max_batch_size, 100);
        assert_eq!(config.store.backend, StoreBackend::InMemory);
        assert_eq!(config.store.distance_metric, DistanceMetric::L2);
        assert_eq!(config.index.merge_policy, MergePolicy::SourceWins);
        assert_eq!(config.metadata.owner_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_task_types_per_purpose() {
        let config: Config = toml::from_str(
            r#"
            [embedding]
            task_type = "SEMANTIC_SIMILARITY"
            query_task_type = "QUESTION_ANSWERING"
            "#,
        )
        .unwrap();

        assert_eq!(config.embedding.task_type.as_deref(), Some("SEMANTIC_SIMILARITY"));
        assert_eq!(
            config.embedding.query_task_type.as_deref(),
            Some("QUESTION_ANSWERING")
        );
        assert!(Config::default().embedding.query_task_type.is_none());
    }

    #[test]
    fn test_collection_per_model() {
        let mut config = Config::default();
        assert_eq!(config.collection(), "semdex_text_embedding_004_768");

        config.store.collection_per_model = false;
        assert_eq!(config.collection(), "semdex");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nmax_top_k = 25").unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.search.max_top_k, 25);
    }

    #[test]
    fn test_load_from_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_from(Some(missing)).is_err());
    }

    #[test]
    fn test_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\nbackend = \"cassandra\"").unwrap();
        assert!(Config::from_file(file.path()).is_err());
    }

    #[test]
    fn test_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.collection(), config.collection());
    }
}
