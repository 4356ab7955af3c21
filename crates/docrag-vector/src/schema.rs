use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// One table per collection. `metadata` holds a JSON object of string values.
pub fn build_collection_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new("id", DataType::Utf8, false),
		Field::new("source_document_id", DataType::Utf8, false),
		Field::new("text", DataType::Utf8, false),
		Field::new("page_or_section", DataType::Utf8, true),
		Field::new("metadata", DataType::Utf8, false),
		Field::new("vector", DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}
