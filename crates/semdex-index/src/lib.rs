//! Document indexing pipeline for semdex.
//!
//! This crate commits one document at a time through:
//! chunking → enrichment → embedding → storage.
//!
//! # Components
//!
//! - [`IndexPipeline`]: Runs a document through every stage and owns the all-or-nothing contract
//! - [`WriteSaga`]: Compensating write used when the store has no transactions
//! - [`DocumentLocks`]: Serializes runs on the same document id
//! - [`MetadataBuilder`](semdex_core::MetadataBuilder) profiles: static, CoopWise, Winnov8, composite
//! - [`IndexUpdate`]: Events emitted during indexing
//!
//! # Example
//!
//! ```rust,ignore
//! use semdex_index::{IndexPipeline, IndexPipelineConfig};
//!
//! let pipeline = IndexPipeline::new(dispatcher, None, embedder, store, IndexPipelineConfig::default());
//!
//! // Subscribe to updates
//! let mut updates = pipeline.subscribe();
//!
//! let report = pipeline.index(&document, &cancel).await?;
//! println!("{} chunks committed", report.chunk_count);
//! ```

pub mod lock;
pub mod metadata;
pub mod pipeline;
pub mod saga;

#[cfg(test)]
mod testing;

pub use lock::DocumentLocks;
pub use metadata::{
    merge_metadata, CompositeMetadataBuilder, CoopwiseMetadataBuilder, MergePolicy,
    StaticMetadataBuilder, Winnov8MetadataBuilder,
};
pub use pipeline::{IndexPipeline, IndexPipelineConfig, IndexReport, IndexUpdate, RunState};
pub use saga::WriteSaga;
