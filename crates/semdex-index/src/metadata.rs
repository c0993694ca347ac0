//! Metadata builders and the merge applied before embedding.
//!
//! A record's metadata is assembled from three layers:
//! 1. the document's source metadata
//! 2. chunker-derived keys (offsets, strategy, page, section), which always overlay the source
//! 3. builder output, merged according to [`MergePolicy`]

use semdex_core::{Chunk, Document, Metadata, MetadataBuilder, MetadataError, MetadataValue};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Precedence between builder output and source metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Builder keys override existing keys
    #[default]
    BuilderWins,
    /// Builder keys only fill keys that are not already present
    SourceWins,
}

/// Merge the three metadata layers for one chunk.
#[must_use]
pub fn merge_metadata(
    source: &Metadata,
    chunk: &Metadata,
    builder: Option<Metadata>,
    policy: MergePolicy,
) -> Metadata {
    let mut merged = source.clone();
    merged.extend(chunk.iter().map(|(k, v)| (k.clone(), v.clone())));
    if let Some(built) = builder {
        match policy {
            MergePolicy::BuilderWins => merged.extend(built),
            MergePolicy::SourceWins => {
                for (key, value) in built {
                    merged.entry(key).or_insert(value);
                }
            }
        }
    }
    merged
}

/// Fields every profile adds.
fn common_fields(document: &Document) -> Metadata {
    let mut meta = Metadata::new();
    meta.insert("doc_format".to_string(), document.format.as_str().into());
    meta.insert("document_id".to_string(), document.id.as_str().into());
    meta.insert("checksum".to_string(), document.checksum().into());
    meta
}

fn required(field: &str, value: &str) -> Result<(), MetadataError> {
    if value.trim().is_empty() {
        Err(MetadataError::MissingField(field.to_string()))
    } else {
        Ok(())
    }
}

/// Adds fixed key/value pairs.
#[derive(Debug, Clone, Default)]
pub struct StaticMetadataBuilder {
    fields: Metadata,
}

impl StaticMetadataBuilder {
    #[must_use]
    pub fn new(fields: Metadata) -> Self {
        Self { fields }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

impl MetadataBuilder for StaticMetadataBuilder {
    fn name(&self) -> &str {
        "static"
    }

    fn build(&self, document: &Document, _chunk: &Chunk) -> Result<Metadata, MetadataError> {
        let mut meta = common_fields(document);
        meta.extend(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(meta)
    }
}

/// Profile for CoopWise cooperative documents.
#[derive(Debug, Clone)]
pub struct CoopwiseMetadataBuilder {
    pub cooperative_id: String,
    pub group_id: Option<String>,
}

impl CoopwiseMetadataBuilder {
    #[must_use]
    pub fn new(cooperative_id: impl Into<String>, group_id: Option<String>) -> Self {
        Self {
            cooperative_id: cooperative_id.into(),
            group_id,
        }
    }
}

impl MetadataBuilder for CoopwiseMetadataBuilder {
    fn name(&self) -> &str {
        "coopwise"
    }

    fn build(&self, document: &Document, _chunk: &Chunk) -> Result<Metadata, MetadataError> {
        required("cooperative_id", &self.cooperative_id)?;
        let mut meta = common_fields(document);
        meta.insert("product".to_string(), "coopwise".into());
        meta.insert("cooperative_id".to_string(), self.cooperative_id.as_str().into());
        if let Some(group) = self.group_id.as_deref().filter(|g| !g.is_empty()) {
            meta.insert("group_id".to_string(), group.into());
        }
        Ok(meta)
    }
}

/// Profile for Winnov8 owner-scoped entities (resumes, project docs, requests).
#[derive(Debug, Clone)]
pub struct Winnov8MetadataBuilder {
    pub owner_id: String,
    pub entity_type: String,
}

impl Winnov8MetadataBuilder {
    #[must_use]
    pub fn new(owner_id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            entity_type: entity_type.into(),
        }
    }
}

impl MetadataBuilder for Winnov8MetadataBuilder {
    fn name(&self) -> &str {
        "winnov8"
    }

    fn build(&self, document: &Document, _chunk: &Chunk) -> Result<Metadata, MetadataError> {
        required("owner_id", &self.owner_id)?;
        required("entity_type", &self.entity_type)?;
        let mut meta = common_fields(document);
        meta.insert("product".to_string(), "winnov8".into());
        meta.insert("owner_id".to_string(), self.owner_id.as_str().into());
        meta.insert("entity_type".to_string(), self.entity_type.as_str().into());
        Ok(meta)
    }
}

/// Applies several builders in order. Later builders win on shared keys.
#[derive(Clone, Default)]
pub struct CompositeMetadataBuilder {
    builders: Vec<Arc<dyn MetadataBuilder>>,
}

impl CompositeMetadataBuilder {
    #[must_use]
    pub fn new(builders: Vec<Arc<dyn MetadataBuilder>>) -> Self {
        Self { builders }
    }

    #[must_use]
    pub fn push(mut self, builder: Arc<dyn MetadataBuilder>) -> Self {
        self.builders.push(builder);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl MetadataBuilder for CompositeMetadataBuilder {
    fn name(&self) -> &str {
        "composite"
    }

    fn build(&self, document: &Document, chunk: &Chunk) -> Result<Metadata, MetadataError> {
        let mut meta = Metadata::new();
        for builder in &self.builders {
            meta.extend(builder.build(document, chunk)?);
        }
        Ok(meta)
    }
}

impl std::fmt::Debug for CompositeMetadataBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.builders.iter().map(|b| b.name()).collect();
        f.debug_struct("CompositeMetadataBuilder")
            .field("builders", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semdex_core::DocumentFormat;

    fn doc() -> Document {
        Document::new("doc-1", DocumentFormat::Text, "hello world")
            .with_metadata("source", "upload")
            .with_metadata("product", "from-source")
    }

    fn chunk() -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("start_char".to_string(), 0usize.into());
        metadata.insert("source".to_string(), "chunker".into());
        Chunk {
            document_id: "doc-1".to_string(),
            sequence_index: 0,
            content: "hello world".to_string(),
            metadata,
        }
    }

    fn string(meta: &Metadata, key: &str) -> Option<String> {
        meta.get(key).and_then(|v| v.as_str()).map(str::to_string)
    }

    #[test]
    fn test_chunk_keys_overlay_source() {
        let doc = doc();
        let merged = merge_metadata(&doc.metadata, &chunk().metadata, None, MergePolicy::BuilderWins);
        assert_eq!(string(&merged, "source").as_deref(), Some("chunker"));
        assert_eq!(merged.get("start_char"), Some(&MetadataValue::Integer(0)));
    }

    #[test]
    fn test_builder_wins() {
        let doc = doc();
        let built = CoopwiseMetadataBuilder::new("coop-9", None)
            .build(&doc, &chunk())
            .unwrap();
        let merged = merge_metadata(&doc.metadata, &chunk().metadata, Some(built), MergePolicy::BuilderWins);
        assert_eq!(string(&merged, "product").as_deref(), Some("coopwise"));
        assert_eq!(string(&merged, "cooperative_id").as_deref(), Some("coop-9"));
    }

    #[test]
    fn test_source_wins() {
        let doc = doc();
        let built = CoopwiseMetadataBuilder::new("coop-9", None)
            .build(&doc, &chunk())
            .unwrap();
        let merged = merge_metadata(&doc.metadata, &chunk().metadata, Some(built), MergePolicy::SourceWins);
        assert_eq!(string(&merged, "product").as_deref(), Some("from-source"));
        assert_eq!(string(&merged, "cooperative_id").as_deref(), Some("coop-9"));
    }

    #[test]
    fn test_common_fields() {
        let doc = doc();
        let meta = StaticMetadataBuilder::default()
            .with("tenant", "acme")
            .build(&doc, &chunk())
            .unwrap();
        assert_eq!(string(&meta, "doc_format").as_deref(), Some("text"));
        assert_eq!(string(&meta, "document_id").as_deref(), Some("doc-1"));
        assert_eq!(string(&meta, "checksum"), Some(doc.checksum().to_string()));
        assert_eq!(string(&meta, "tenant").as_deref(), Some("acme"));
    }

    #[test]
    fn test_coopwise_group_is_optional() {
        let meta = CoopwiseMetadataBuilder::new("c", Some("g".to_string()))
            .build(&doc(), &chunk())
            .unwrap();
        assert_eq!(string(&meta, "group_id").as_deref(), Some("g"));

        let meta = CoopwiseMetadataBuilder::new("c", None)
            .build(&doc(), &chunk())
            .unwrap();
        assert!(!meta.contains_key("group_id"));
    }

    #[test]
    fn test_missing_required_fields() {
        let err = CoopwiseMetadataBuilder::new("  ", None)
            .build(&doc(), &chunk())
            .unwrap_err();
        assert!(matches!(err, MetadataError::MissingField(f) if f == "cooperative_id"));

        let err = Winnov8MetadataBuilder::new("owner", "")
            .build(&doc(), &chunk())
            .unwrap_err();
        assert!(matches!(err, MetadataError::MissingField(f) if f == "entity_type"));
    }

    #[test]
    fn test_winnov8_fields() {
        let meta = Winnov8MetadataBuilder::new("user-1", "resume")
            .build(&doc(), &chunk())
            .unwrap();
        assert_eq!(string(&meta, "product").as_deref(), Some("winnov8"));
        assert_eq!(string(&meta, "owner_id").as_deref(), Some("user-1"));
        assert_eq!(string(&meta, "entity_type").as_deref(), Some("resume"));
    }

    #[test]
    fn test_composite_later_wins() {
        let composite = CompositeMetadataBuilder::default()
            .push(Arc::new(StaticMetadataBuilder::default().with("product", "first")))
            .push(Arc::new(Winnov8MetadataBuilder::new("o", "project_doc")));
        assert_eq!(composite.len(), 2);

        let meta = composite.build(&doc(), &chunk()).unwrap();
        assert_eq!(string(&meta, "product").as_deref(), Some("winnov8"));
    }

    #[test]
    fn test_composite_propagates_errors() {
        let composite = CompositeMetadataBuilder::new(vec![
            Arc::new(StaticMetadataBuilder::default()),
            Arc::new(Winnov8MetadataBuilder::new("", "resume")),
        ]);
        assert!(composite.build(&doc(), &chunk()).is_err());
    }
}
