use arrow_schema::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

pub const VECTOR_COLUMN: &str = "vector";

fn vector_field(dim: i32) -> Field {
    Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true)
}

/// One row per persisted chunk. `metadata` is the full metadata map as JSON;
/// `source`, `file_type` and `chunk_index` are copied out for filtering.
pub fn build_chunk_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("file_type", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, true),
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("metadata", DataType::Utf8, false),
        vector_field(dim),
    ]))
}

pub fn build_cache_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("content_hash", DataType::Utf8, false),
        Field::new("embedder_id", DataType::Utf8, false),
        Field::new("created_at", DataType::Timestamp(TimeUnit::Millisecond, None), false),
        vector_field(dim),
    ]))
}

pub fn cache_table_name(collection: &str) -> String { format!("{collection}_embedding_cache") }

/// Width of the `vector` column, if the schema has one.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_dim_reads_fixed_size_list() {
        assert_eq!(vector_dim(&build_chunk_schema(384)), Some(384));
        assert_eq!(vector_dim(&build_cache_schema(1024)), Some(1024));
        let no_vec = Schema::new(vec![Field::new("id", DataType::Utf8, false)]);
        assert_eq!(vector_dim(&no_vec), None);
    }

    #[test]
    fn cache_table_is_named_after_collection() {
        assert_eq!(cache_table_name("documents"), "documents_embedding_cache");
    }
}
