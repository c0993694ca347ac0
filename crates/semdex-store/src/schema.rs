//! Arrow schema definitions for `LanceDB` tables.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Name of the vector column.
pub const VECTOR_COLUMN: &str = "vector";

/// Schema for one collection table.
#[must_use]
pub fn records_schema(embedding_dim: usize) -> Schema {
    Schema::new(vec![
        // Identity
        Field::new("record_id", DataType::Utf8, false),
        Field::new("document_id", DataType::Utf8, false),
        Field::new("sequence_index", DataType::UInt32, false),
        // Content
        Field::new("content", DataType::Utf8, false),
        // Metadata as a JSON object
        Field::new("metadata", DataType::Utf8, false),
        // Embedding
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                embedding_dim as i32,
            ),
            false,
        ),
    ])
}

/// Dimensionality of the vector column, if the schema has one.
#[must_use]
pub fn vector_dimension(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
        DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
        _ => None,
    }
}
