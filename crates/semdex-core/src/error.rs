//! Error types for semdex.
//!
//! Adapters return their own narrow error enums ([`ChunkError`], [`EmbedError`],
//! [`StoreError`], [`MetadataError`]). Pipelines convert them into a
//! [`PipelineError`], which carries the failing [`Stage`], a backend-neutral
//! [`ErrorKind`] and a message safe to hand to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Chunking errors.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("document is empty or whitespace-only")]
    Empty,

    #[error("malformed {format} document: {reason}")]
    Malformed { format: String, reason: String },

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Embedding errors.
#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by provider")]
    RateLimited { retry_after: Option<Duration> },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider returned {status}: {message}")]
    Provider { status: u16, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider returned {actual} embeddings for {expected} inputs")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("batch of {size} exceeds provider max batch size {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("embedder misconfigured: {0}")]
    Config(String),

    #[error("retry budget exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<EmbedError>,
    },

    #[error("embedding cancelled")]
    Cancelled,
}

impl EmbedError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Transport(_) => true,
            Self::Provider { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Provider-suggested delay before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("vector store unavailable: {0}")]
    Unavailable(String),

    #[error("collection {collection} has dimension {existing}, requested {requested}")]
    DimensionMismatch {
        collection: String,
        existing: usize,
        requested: usize,
    },

    #[error("partial write: {written} of {total} records written: {reason}")]
    PartialWrite {
        written: usize,
        total: usize,
        reason: String,
    },

    #[error("write failed: {0}")]
    Write(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Metadata builder errors.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata build failed: {0}")]
    Failed(String),

    #[error("missing required metadata field: {0}")]
    MissingField(String),
}

/// Pipeline stage at which a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Chunking,
    Enrichment,
    Embedding,
    Storing,
    Committing,
    Querying,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "received",
            Self::Chunking => "chunking",
            Self::Enrichment => "enrichment",
            Self::Embedding => "embedding",
            Self::Storing => "storing",
            Self::Committing => "committing",
            Self::Querying => "querying",
        })
    }
}

/// Backend-neutral error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EmptyDocument,
    MalformedDocument,
    UnsupportedFormat,
    MetadataBuild,
    EmbeddingUnavailable,
    DimensionalityMismatch,
    VectorStoreUnavailable,
    /// Compensating cleanup was attempted and succeeded
    PartialWrite,
    /// Compensating cleanup failed; the document may be inconsistent
    CleanupFailed,
    Cancelled,
    InvalidRequest,
    /// An adapter broke its contract (wrong result count, gapped sequence)
    ContractViolation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::EmptyDocument => "empty_document",
            Self::MalformedDocument => "malformed_document",
            Self::UnsupportedFormat => "unsupported_format",
            Self::MetadataBuild => "metadata_build",
            Self::EmbeddingUnavailable => "embedding_unavailable",
            Self::DimensionalityMismatch => "dimensionality_mismatch",
            Self::VectorStoreUnavailable => "vector_store_unavailable",
            Self::PartialWrite => "partial_write",
            Self::CleanupFailed => "cleanup_failed",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest => "invalid_request",
            Self::ContractViolation => "contract_violation",
        })
    }
}

/// Terminal state of a compensating write on a non-transactional backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SagaState {
    /// All intended writes applied
    Committed,
    /// Writes rolled back and the prior version restored
    Compensated,
    /// Rollback failed; operator intervention required
    CompensationFailed,
}

/// Structured error returned by the index and search pipelines.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{stage}: {kind}: {message}")]
pub struct PipelineError {
    /// Stage at which the run failed
    pub stage: Stage,
    /// Error classification
    pub kind: ErrorKind,
    /// Caller-safe description
    pub message: String,
    /// Saga outcome, when a compensating write was attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation: Option<SagaState>,
}

impl PipelineError {
    pub fn new(stage: Stage, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            compensation: None,
        }
    }

    #[must_use]
    pub fn with_compensation(mut self, state: SagaState) -> Self {
        self.compensation = Some(state);
        self
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn contract(stage: Stage, message: impl Into<String>) -> Self {
        Self::new(stage, ErrorKind::ContractViolation, message)
    }

    /// Classify a chunking failure.
    #[must_use]
    pub fn from_chunk(err: &ChunkError) -> Self {
        let kind = match err {
            ChunkError::Empty => ErrorKind::EmptyDocument,
            ChunkError::Malformed { .. } => ErrorKind::MalformedDocument,
            ChunkError::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            ChunkError::InvalidConfig(_) => ErrorKind::InvalidRequest,
        };
        Self::new(Stage::Chunking, kind, err.to_string())
    }

    /// Classify a metadata builder failure.
    #[must_use]
    pub fn from_metadata(err: &MetadataError) -> Self {
        Self::new(Stage::Enrichment, ErrorKind::MetadataBuild, err.to_string())
    }

    /// Classify an embedding failure. Provider text is not forwarded.
    #[must_use]
    pub fn from_embed(stage: Stage, err: &EmbedError) -> Self {
        match err {
            EmbedError::Cancelled => Self::cancelled(stage),
            EmbedError::DimensionMismatch { expected, actual } => Self::new(
                stage,
                ErrorKind::DimensionalityMismatch,
                format!("embedder returned dimension {actual}, expected {expected}"),
            ),
            EmbedError::LengthMismatch { expected, actual } => Self::contract(
                stage,
                format!("embedder returned {actual} vectors for {expected} inputs"),
            ),
            EmbedError::RetriesExhausted { attempts, .. } => Self::new(
                stage,
                ErrorKind::EmbeddingUnavailable,
                format!("embedding provider unavailable after {attempts} attempts"),
            ),
            EmbedError::Timeout(after) => Self::new(
                stage,
                ErrorKind::EmbeddingUnavailable,
                format!("embedding provider timed out after {after:?}"),
            ),
            EmbedError::Provider { status, .. } => Self::new(
                stage,
                ErrorKind::EmbeddingUnavailable,
                format!("embedding provider rejected the request (status {status})"),
            ),
            EmbedError::Config(_) => Self::new(
                stage,
                ErrorKind::EmbeddingUnavailable,
                "embedding provider is misconfigured",
            ),
            _ => Self::new(
                stage,
                ErrorKind::EmbeddingUnavailable,
                "embedding provider unavailable",
            ),
        }
    }

    /// Classify a vector store failure. Backend text is not forwarded.
    #[must_use]
    pub fn from_store(stage: Stage, err: &StoreError) -> Self {
        match err {
            StoreError::DimensionMismatch {
                collection,
                existing,
                requested,
            } => Self::new(
                stage,
                ErrorKind::DimensionalityMismatch,
                format!("collection {collection} has dimension {existing}, requested {requested}"),
            ),
            StoreError::PartialWrite { written, total, .. } => Self::new(
                stage,
                ErrorKind::PartialWrite,
                format!("{written} of {total} records written before failure"),
            ),
            _ => Self::new(
                stage,
                ErrorKind::VectorStoreUnavailable,
                "vector store operation failed",
            ),
        }
    }
}
