//! Core types for semdex.
//!
//! ## Documents and Chunks
//! - [`Document`]: Raw input submitted to the index pipeline
//! - [`DocumentFormat`]: Declared format used to pick a chunker
//! - [`Chunk`]: An ordered, contiguous unit derived from a document
//! - [`ChunkConfig`]: Size, overlap and boundary settings for chunkers
//!
//! ## Metadata
//! - [`MetadataValue`]: Scalar metadata value
//! - [`Metadata`]: Ordered key/value mapping attached to documents and records
//! - [`MetadataFilter`]: Conjunction of equality conditions over metadata
//!
//! ## Records and Search
//! - [`RecordId`]: Deterministic identity of a stored chunk
//! - [`IndexRecord`]: The durable unit owned by a vector store
//! - [`StoreQuery`] / [`StoreHit`]: Nearest-neighbour query and raw backend hit
//! - [`SearchRequest`] / [`SearchResult`]: Search entry point types
//! - [`DistanceMetric`]: Vector distance calculation method

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Vector produced by an embedder.
pub type Embedding = Vec<f32>;

/// Metadata mapping. Ordered so that serialization and merging are deterministic.
pub type Metadata = BTreeMap<String, MetadataValue>;

// ============================================================================
// Documents
// ============================================================================

/// Declared format of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DocumentFormat {
    /// Plain text
    Text,
    /// JSON document
    Json,
    /// HTML page
    Html,
    /// PDF file
    Pdf,
    /// Deployment-specific format handled by a registered custom chunker
    Custom(String),
}

impl DocumentFormat {
    /// Lower-case name of the format.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Html => "html",
            Self::Pdf => "pdf",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        match name.as_str() {
            "" => Err("document format must not be empty".to_string()),
            "text" | "txt" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "html" | "htm" => Ok(Self::Html),
            "pdf" => Ok(Self::Pdf),
            _ => Ok(Self::Custom(name)),
        }
    }
}

impl TryFrom<String> for DocumentFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocumentFormat> for String {
    fn from(format: DocumentFormat) -> Self {
        format.as_str().to_string()
    }
}

/// Document payload as submitted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentContent {
    /// Already-decoded text
    Text(String),
    /// Raw bytes (PDF files, HTML of unknown encoding)
    Bytes(Vec<u8>),
}

impl DocumentContent {
    /// Raw bytes of the payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    /// Payload as UTF-8 text, if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(text) => Some(Cow::Borrowed(text)),
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
        }
    }

    /// Length of the payload in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for DocumentContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for DocumentContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for DocumentContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// Raw input to the index pipeline. Never mutated once submitted.
#[derive(Debug, Clone)]
pub struct Document {
    /// Unique document identifier
    pub id: String,
    /// Payload
    pub content: DocumentContent,
    /// Declared format
    pub format: DocumentFormat,
    /// Caller-supplied source metadata
    pub metadata: Metadata,
    checksum: OnceLock<String>,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.content == other.content
            && self.format == other.format
            && self.metadata == other.metadata
    }
}

impl Document {
    /// Create a document with a caller-supplied id.
    pub fn new(
        id: impl Into<String>,
        format: DocumentFormat,
        content: impl Into<DocumentContent>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            format,
            metadata: Metadata::new(),
            checksum: OnceLock::new(),
        }
    }

    /// Create a document with a generated (UUID v4) id.
    pub fn generated(format: DocumentFormat, content: impl Into<DocumentContent>) -> Self {
        Self::new(Uuid::new_v4().to_string(), format, content)
    }

    /// Attach a source metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// blake3 checksum of the document payload, hex encoded.
    ///
    /// Hashed on first use and cached, so per-chunk callers pay for it once.
    #[must_use]
    pub fn checksum(&self) -> &str {
        self.checksum
            .get_or_init(|| blake3::hash(self.content.as_bytes()).to_hex().to_string())
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl MetadataValue {
    /// String contents, if this is a string value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer value.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Convert to a JSON value for backends that store metadata as JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }

    /// Convert a scalar JSON value. Arrays, objects and nulls have no scalar form.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float)),
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<u32> for MetadataValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<usize> for MetadataValue {
    fn from(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Serialize metadata as a JSON object.
#[must_use]
pub fn metadata_to_json(metadata: &Metadata) -> serde_json::Value {
    serde_json::Value::Object(
        metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Parse metadata from a JSON object, skipping non-scalar entries.
#[must_use]
pub fn metadata_from_json(value: &serde_json::Value) -> Metadata {
    value
        .as_object()
        .map(|object| {
            object
                .iter()
                .filter_map(|(k, v)| MetadataValue::from_json(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default()
}

/// Conjunction of equality conditions over record metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    /// Every key must be present with exactly this value
    pub must: Metadata,
}

impl MetadataFilter {
    /// Create an empty filter (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an equality condition.
    #[must_use]
    pub fn eq(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.must.insert(key.into(), value.into());
        self
    }

    /// Whether the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
    }

    /// Check a metadata mapping against the filter.
    #[must_use]
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.must
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

// ============================================================================
// Chunks
// ============================================================================

/// Boundary used when splitting text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryMode {
    /// Fixed windows of characters
    Char,
    /// Whole words
    Word,
    /// One chunk per sentence
    Sentence,
    /// Paragraphs, falling back to lines, sentences, words, characters
    #[default]
    Structural,
}

impl BoundaryMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Word => "word",
            Self::Sentence => "sentence",
            Self::Structural => "structural",
        }
    }
}

impl FromStr for BoundaryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "char" => Ok(Self::Char),
            "word" => Ok(Self::Word),
            "sentence" => Ok(Self::Sentence),
            "structural" => Ok(Self::Structural),
            other => Err(format!("unknown boundary mode: {other}")),
        }
    }
}

/// Configuration for text chunking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// Maximum chunk size in characters
    pub max_chunk_size: usize,
    /// Characters carried over from the end of one chunk into the next
    pub overlap: usize,
    /// Unit boundary respected when splitting
    pub boundary_mode: BoundaryMode,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: 1200,
            overlap: 150,
            boundary_mode: BoundaryMode::Structural,
        }
    }
}

impl ChunkConfig {
    /// Default sizes with a specific boundary mode.
    #[must_use]
    pub fn with_mode(boundary_mode: BoundaryMode) -> Self {
        Self {
            boundary_mode,
            ..Self::default()
        }
    }
}

/// A contiguous unit derived from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Back-reference to the source document
    pub document_id: String,
    /// 0-based position within the document
    pub sequence_index: u32,
    /// Chunk text
    pub content: String,
    /// Chunker-derived fields (offsets, page numbers, section headings)
    pub metadata: Metadata,
}

impl Chunk {
    /// Deterministic record id for this chunk.
    #[must_use]
    pub fn record_id(&self) -> RecordId {
        RecordId::derive(&self.document_id, self.sequence_index)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Namespace under which record ids are derived.
const RECORD_NAMESPACE: Uuid = Uuid::from_u128(0x8c1f_4d2e_93a7_5b06_a4e8_71d2_c93f_0e5a);

/// Deterministic identity of a stored chunk.
///
/// Derived from `document_id` and `sequence_index`, so re-indexing the same chunk
/// overwrites its record instead of duplicating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the record id for a chunk position.
    #[must_use]
    pub fn derive(document_id: &str, sequence_index: u32) -> Self {
        let name = format!("{document_id}\u{1f}{sequence_index}");
        Self(
            Uuid::new_v5(&RECORD_NAMESPACE, name.as_bytes())
                .hyphenated()
                .to_string(),
        )
    }

    /// Wrap an id read back from a backend.
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Text form of the id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The durable unit owned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Deterministic record identity
    pub record_id: RecordId,
    /// Source document
    pub document_id: String,
    /// Position within the document
    pub sequence_index: u32,
    /// Chunk text
    pub content: String,
    /// Embedding vector
    pub vector: Embedding,
    /// Merged chunk metadata
    pub metadata: Metadata,
}

/// Nearest-neighbour query issued against a vector store.
#[derive(Debug, Clone)]
pub struct StoreQuery {
    /// Query vector
    pub vector: Embedding,
    /// Maximum number of hits
    pub top_k: usize,
    /// Optional metadata filter
    pub filter: Option<MetadataFilter>,
}

/// Raw hit returned by a vector store.
///
/// `distance` is backend-native: lower is closer. The search pipeline converts
/// it to a higher-is-better score.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub record_id: RecordId,
    pub document_id: String,
    pub sequence_index: u32,
    pub content: String,
    pub metadata: Metadata,
    pub distance: f32,
}

/// Vector distance calculation method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
            Self::L2 => "l2",
        })
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            "l2" | "euclidean" => Ok(Self::L2),
            other => Err(format!("unknown distance metric: {other}")),
        }
    }
}

/// Vector store backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreBackend {
    /// Relational database with a vector extension
    RelationalVector,
    /// Purpose-built vector database
    DedicatedVectorDb,
    /// In-process index
    InMemory,
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RelationalVector => "relational-vector",
            Self::DedicatedVectorDb => "dedicated-vector-db",
            Self::InMemory => "in-memory",
        })
    }
}

/// Statistics for one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Collection name
    pub collection: String,
    /// Number of stored records
    pub total_records: u64,
    /// Number of distinct documents
    pub total_documents: u64,
    /// Vector dimensionality, if the collection exists
    pub dimension: Option<usize>,
}

/// Build the collection name for an embedder model and dimensionality.
///
/// The result only contains `[a-z0-9_]`, so every backend can use it as a table name.
#[must_use]
pub fn collection_name(prefix: &str, model: &str, dimension: usize) -> String {
    let raw = format!("{prefix}_{model}_{dimension}");
    sanitize_collection(&raw)
}

/// Lower-case and replace anything outside `[a-z0-9_]` with `_`.
#[must_use]
pub fn sanitize_collection(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_underscore = false;
    for c in raw.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "semdex".to_string()
    } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("c_{trimmed}")
    } else {
        trimmed.to_string()
    }
}

// ============================================================================
// Search
// ============================================================================

/// Search entry point request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Natural-language query
    pub query_text: String,
    /// Maximum number of results
    pub top_k: usize,
    /// Optional metadata filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
    /// Drop results scoring below this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

impl SearchRequest {
    pub fn new(query_text: impl Into<String>, top_k: usize) -> Self {
        Self {
            query_text: query_text.into(),
            top_k,
            filter: None,
            min_score: None,
        }
    }

    #[must_use]
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    #[must_use]
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }
}

/// A ranked search result. Constructed per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matching record
    pub record_id: RecordId,
    /// Similarity score, higher is better
    pub score: f32,
    /// Source document
    pub document_id: String,
    /// Position within the document
    pub sequence_index: u32,
    /// Chunk text
    pub content: String,
    /// Chunk metadata
    pub metadata: Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== DocumentFormat Tests ==========

    #[test]
    fn test_document_format_parse() {
        assert_eq!("text".parse::<DocumentFormat>().unwrap(), DocumentFormat::Text);
        assert_eq!("TXT".parse::<DocumentFormat>().unwrap(), DocumentFormat::Text);
        assert_eq!("htm".parse::<DocumentFormat>().unwrap(), DocumentFormat::Html);
        assert_eq!(
            "docx".parse::<DocumentFormat>().unwrap(),
            DocumentFormat::Custom("docx".to_string())
        );
        assert!("  ".parse::<DocumentFormat>().is_err());
    }

    #[test]
    fn test_document_format_serde() {
        let json = serde_json::to_string(&DocumentFormat::Pdf).unwrap();
        assert_eq!(json, "\"pdf\"");

        let custom: DocumentFormat = serde_json::from_str("\"markdown\"").unwrap();
        assert_eq!(custom, DocumentFormat::Custom("markdown".to_string()));
    }

    // ========== Document Tests ==========

    #[test]
    fn test_document_content_text() {
        let bytes = DocumentContent::Bytes(b"hello".to_vec());
        assert_eq!(bytes.as_text().as_deref(), Some("hello"));

        let invalid = DocumentContent::Bytes(vec![0xff, 0xfe]);
        assert!(invalid.as_text().is_none());
        assert_eq!(invalid.len(), 2);
    }

    #[test]
    fn test_document_checksum_is_stable() {
        let a = Document::new("a", DocumentFormat::Text, "same content");
        let b = Document::new("b", DocumentFormat::Text, "same content");
        let c = Document::new("c", DocumentFormat::Text, "other content");

        assert_eq!(a.checksum(), b.checksum());
        assert_ne!(a.checksum(), c.checksum());
    }

    #[test]
    fn test_document_checksum_is_hashed_once() {
        let doc = Document::new("a", DocumentFormat::Text, "x".repeat(1 << 16));
        assert!(doc.checksum.get().is_none());

        let first = doc.checksum().as_ptr();
        assert!(doc.checksum.get().is_some());
        assert_eq!(doc.checksum().as_ptr(), first);

        // The cache does not take part in equality.
        let fresh = Document::new("a", DocumentFormat::Text, "x".repeat(1 << 16));
        assert_eq!(doc, fresh);
    }

    #[test]
    fn test_generated_document_ids_are_unique() {
        let a = Document::generated(DocumentFormat::Text, "x");
        let b = Document::generated(DocumentFormat::Text, "x");
        assert_ne!(a.id, b.id);
    }

    // ========== Metadata Tests ==========

    #[test]
    fn test_metadata_value_untagged_serde() {
        let mut metadata = Metadata::new();
        metadata.insert("name".into(), "report".into());
        metadata.insert("page".into(), 3u32.into());
        metadata.insert("draft".into(), false.into());

        let json = serde_json::to_string(&metadata).unwrap();
        assert_eq!(json, r#"{"draft":false,"name":"report","page":3}"#);

        let parsed: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }

    #[test]
    fn test_metadata_json_skips_non_scalars() {
        let value = serde_json::json!({"a": 1, "b": [1, 2], "c": null, "d": "x"});
        let metadata = metadata_from_json(&value);
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get("a"), Some(&MetadataValue::Integer(1)));
        assert_eq!(metadata.get("d"), Some(&MetadataValue::String("x".into())));
    }

    #[test]
    fn test_metadata_filter_matches() {
        let mut metadata = Metadata::new();
        metadata.insert("product".into(), "coopwise".into());
        metadata.insert("page".into(), 2i64.into());

        assert!(MetadataFilter::new().matches(&metadata));
        assert!(MetadataFilter::new().eq("product", "coopwise").matches(&metadata));
        assert!(!MetadataFilter::new().eq("product", "winnov8").matches(&metadata));
        assert!(!MetadataFilter::new().eq("page", "2").matches(&metadata));
        assert!(!MetadataFilter::new().eq("missing", true).matches(&metadata));
    }

    // ========== RecordId Tests ==========

    #[test]
    fn test_record_id_is_deterministic() {
        assert_eq!(RecordId::derive("doc1", 0), RecordId::derive("doc1", 0));
        assert_ne!(RecordId::derive("doc1", 0), RecordId::derive("doc1", 1));
        assert_ne!(RecordId::derive("doc1", 0), RecordId::derive("doc2", 0));
    }

    #[test]
    fn test_record_id_separator_prevents_collisions() {
        assert_ne!(RecordId::derive("doc1", 10), RecordId::derive("doc11", 0));
    }

    #[test]
    fn test_record_id_format() {
        let id = RecordId::derive("doc1", 0);
        assert_eq!(id.as_str().len(), 36);
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    // ========== Collection Tests ==========

    #[test]
    fn test_collection_name() {
        assert_eq!(
            collection_name("semdex", "text-embedding-004", 768),
            "semdex_text_embedding_004_768"
        );
        assert_eq!(collection_name("My App", "Model/X", 384), "my_app_model_x_384");
        assert_eq!(sanitize_collection("__"), "semdex");
        assert_eq!(sanitize_collection("384"), "c_384");
    }

    // ========== Enum Tests ==========

    #[test]
    fn test_distance_metric_serde() {
        assert_eq!(serde_json::to_string(&DistanceMetric::Cosine).unwrap(), "\"cosine\"");
        assert_eq!(serde_json::to_string(&DistanceMetric::L2).unwrap(), "\"l2\"");
        assert_eq!("euclidean".parse::<DistanceMetric>().unwrap(), DistanceMetric::L2);
    }

    #[test]
    fn test_boundary_mode_default_and_parse() {
        assert_eq!(BoundaryMode::default(), BoundaryMode::Structural);
        assert_eq!("Sentence".parse::<BoundaryMode>().unwrap(), BoundaryMode::Sentence);
        assert!("paragraph".parse::<BoundaryMode>().is_err());
    }

    #[test]
    fn test_store_backend_serde() {
        assert_eq!(
            serde_json::to_string(&StoreBackend::RelationalVector).unwrap(),
            "\"relational-vector\""
        );
        assert_eq!(StoreBackend::InMemory.to_string(), "in-memory");
    }

    #[test]
    fn test_chunk_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.max_chunk_size, 1200);
        assert_eq!(config.overlap, 150);
        assert_eq!(config.boundary_mode, BoundaryMode::Structural);
    }
}
