//! # semdex-embed
//!
//! Embedding adapters for semdex, plus the pool the pipelines embed through.
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GeminiEmbedder`] | Gemini `batchEmbedContents` over async reqwest |
//! | [`HashEmbedder`] | Deterministic offline feature-hashing embedder |
//! | [`EmbedderPool`] | Re-batching, bounded concurrency, timeout and retry |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use semdex_embed::{EmbedderPool, GeminiConfig, GeminiEmbedder, RetryPolicy};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let embedder = GeminiEmbedder::new(GeminiConfig {
//!     api_key: std::env::var("GEMINI_API_KEY")?,
//!     ..GeminiConfig::default()
//! })?;
//! let pool = EmbedderPool::new(Arc::new(embedder), 4).with_policy(RetryPolicy::default());
//!
//! let vectors = pool.embed(&["Hello world", "Vector search"], &CancellationToken::new()).await?;
//! assert_eq!(vectors[0].len(), 768);
//! ```
//!
//! Adapters never retry on their own. They classify failures through
//! [`semdex_core::EmbedError::is_transient`] and the pool decides.

pub mod gemini;
pub mod hash;
pub mod pool;

pub use gemini::{GeminiConfig, GeminiEmbedder};
pub use hash::HashEmbedder;
pub use pool::{EmbedderPool, RetryPolicy};
