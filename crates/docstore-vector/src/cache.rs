//! Lance-backed embedding cache keyed by `(content_hash, embedder_id)`.
//!
//! The cache is consulted before calling the embedder and written through on
//! misses, so re-ingesting unchanged content skips the model entirely.
use anyhow::Result;
use arrow_array::{FixedSizeListArray, RecordBatch, RecordBatchIterator, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;

use crate::schema::{build_cache_schema, VECTOR_COLUMN};
use crate::table::{in_filter, open_if_exists, quote_literal, string_column, table_vector_dim, vector_at, vector_column};

#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub content_hash: String,
    pub embedder_id: String,
    pub vector: Vec<f32>,
}

/// Hashes per `IN (...)` filter; keeps pushed-down predicates a sane size.
pub const FILTER_GROUP: usize = 256;

/// Cached vectors for `hashes` under `embedder_id`, keyed by content hash.
pub async fn get_many(
    conn: &Connection,
    table: &str,
    embedder_id: &str,
    dim: usize,
    hashes: &[String],
) -> Result<HashMap<String, Vec<f32>>> {
    let mut out = HashMap::new();
    if hashes.is_empty() {
        return Ok(out);
    }
    let Some(t) = open_if_exists(conn, table).await? else { return Ok(out) };
    if table_vector_dim(&t).await? != Some(dim) {
        return Ok(out);
    }
    let unique: Vec<String> = hashes.iter().cloned().collect::<HashSet<_>>().into_iter().collect();
    for group in unique.chunks(FILTER_GROUP) {
        let filter = format!("embedder_id = {} AND {}", quote_literal(embedder_id), in_filter("content_hash", group));
        let mut stream = t.query().only_if(filter).execute().await?;
        while let Some(batch) = stream.try_next().await? {
            let hash_col = string_column(&batch, "content_hash")?;
            let vec_col = vector_column(&batch, VECTOR_COLUMN)?;
            for i in 0..batch.num_rows() {
                if let Some(vals) = vector_at(vec_col, i) {
                    out.insert(hash_col.value(i).to_string(), vals);
                }
            }
        }
    }
    Ok(out)
}

/// Drops every cached vector for `hashes`, whatever the embedder. Returns
/// how many rows went.
pub async fn delete_many(conn: &Connection, table: &str, hashes: &[String]) -> Result<usize> {
    let Some(t) = open_if_exists(conn, table).await? else { return Ok(0) };
    let mut removed = 0;
    for group in hashes.chunks(FILTER_GROUP) {
        let filter = in_filter("content_hash", group);
        let n = t.count_rows(Some(filter.clone())).await?;
        if n > 0 {
            t.delete(&filter).await?;
            removed += n;
        }
    }
    Ok(removed)
}

/// Appends entries, creating the cache table on first use. A cache built for
/// another dimensionality is left alone.
pub async fn put_many(conn: &Connection, table: &str, dim: usize, entries: &[CacheEntry]) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }
    let dim_i32 = i32::try_from(dim)?;
    let schema = build_cache_schema(dim_i32);
    let t = match open_if_exists(conn, table).await? {
        Some(t) => {
            if table_vector_dim(&t).await? != Some(dim) {
                warn!(table, dim, "embedding cache has a different dimensionality; not caching");
                return Ok(());
            }
            t
        }
        None => {
            let iter = RecordBatchIterator::new(vec![].into_iter(), schema.clone());
            conn.create_table(table, Box::new(iter)).execute().await?
        }
    };
    let now = Utc::now().timestamp_millis();
    let vectors = entries.iter().map(|e| Some(e.vector.iter().copied().map(Some).collect::<Vec<_>>()));
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.content_hash.as_str()))),
            Arc::new(StringArray::from_iter_values(entries.iter().map(|e| e.embedder_id.as_str()))),
            Arc::new(TimestampMillisecondArray::from(vec![now; entries.len()])),
            Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, dim_i32)),
        ],
    )?;
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
    t.add(reader).execute().await?;
    Ok(())
}
