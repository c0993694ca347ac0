//! Deterministic feature-hashing embedder.
//!
//! [`HashEmbedder`] needs no model or network. Each lower-cased alphanumeric
//! token is hashed with blake3 into several signed buckets and the result is
//! L2-normalized, so texts sharing tokens score close under cosine distance.
//! It is used by tests, demos and the in-memory backend.

use async_trait::async_trait;
use semdex_core::{EmbedError, Embedder, Embedding};

/// Buckets written per token.
const BUCKETS_PER_TOKEN: usize = 4;

/// Deterministic offline embedder.
///
/// # Example
///
/// ```rust
/// use semdex_embed::HashEmbedder;
/// use semdex_core::Embedder;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let embedder = HashEmbedder::new(384);
/// let vectors = embedder.embed_batch(&["Hello", "hello!"]).await?;
///
/// assert_eq!(vectors.len(), 2);
/// assert_eq!(vectors[0].len(), 384);
/// assert_eq!(vectors[0], vectors[1]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    max_batch_size: usize,
    model_name: String,
}

impl HashEmbedder {
    /// Create a hash embedder with the given dimensionality.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            max_batch_size: 64,
            model_name: "hash-embedding".to_string(),
        }
    }

    /// Override the maximum batch size.
    #[must_use]
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size.max(1);
        self
    }

    /// Override the reported model name.
    #[must_use]
    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    /// Embed one text.
    #[must_use]
    pub fn embed_one(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let digest = blake3::hash(token.as_bytes());
            for bucket in digest.as_bytes().chunks(8).take(BUCKETS_PER_TOKEN) {
                let n = bucket
                    .iter()
                    .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte));
                let index = (n % self.dimension as u64) as usize;
                let sign = if n >> 63 == 1 { -1.0 } else { 1.0 };
                vector[index] += sign;
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbedError> {
        if texts.len() > self.max_batch_size {
            return Err(EmbedError::BatchTooLarge {
                size: texts.len(),
                max: self.max_batch_size,
            });
        }
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}
