//! Vector storage backends for semdex.
//!
//! Every backend implements [`VectorStore`](semdex_core::VectorStore).
//!
//! | Backend | Type | Transactions | Cargo feature |
//! |---------|------|--------------|---------------|
//! | in-memory | [`MemoryStore`] | yes | always available |
//! | relational-vector | [`PgVectorStore`] | yes | `postgres` (default) |
//! | dedicated-vector-db | [`LanceStore`] | no | `lancedb` |
//!
//! Stores report a backend-native `distance` where lower is closer; turning
//! it into a score is the search pipeline's job.
//!
//! # Example
//!
//! ```rust,ignore
//! use semdex_store::PgVectorStore;
//! use semdex_core::{DistanceMetric, VectorStore};
//!
//! let store = PgVectorStore::connect(&dsn, "public", DistanceMetric::Cosine).await?;
//! store.ensure_collection("docs_text_embedding_004_768", 768).await?;
//! let hits = store.query("docs_text_embedding_004_768", &query).await?;
//! ```

pub mod memory;

#[cfg(feature = "postgres")]
pub mod pgvector;

#[cfg(feature = "lancedb")]
pub mod lancedb;
#[cfg(feature = "lancedb")]
pub mod schema;

pub use memory::MemoryStore;

#[cfg(feature = "postgres")]
pub use self::pgvector::PgVectorStore;

#[cfg(feature = "lancedb")]
pub use self::lancedb::LanceStore;
