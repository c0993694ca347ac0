//! Search pipeline and result ranking for semdex.
//!
//! [`SearchPipeline`] embeds the query text through the
//! [`EmbedderPool`](semdex_embed::EmbedderPool), checks the collection's
//! dimensionality, queries the [`VectorStore`](semdex_core::VectorStore) and
//! ranks the hits with [`ranking::rank`].

pub mod pipeline;
pub mod ranking;

pub use pipeline::{SearchConfig, SearchPipeline};
pub use ranking::{normalize_score, rank};
