use anyhow::{anyhow, Result};
use arrow_array::{FixedSizeListArray, Int32Array, RecordBatch, RecordBatchIterator, StringArray};
use indicatif::{ProgressBar, ProgressStyle};
use lancedb::Connection;
use std::sync::Arc;
use tracing::{debug, info};

use docstore_core::Chunk;

use crate::schema::build_chunk_schema;
use crate::table::table_exists;

/// A chunk ready to be written: content, provenance and its embedding.
#[derive(Debug, Clone)]
pub struct ChunkRow {
    pub id: String,
    pub content: String,
    pub source: String,
    pub file_type: String,
    pub chunk_index: Option<i32>,
    pub content_hash: String,
    pub metadata: String,
    pub vector: Vec<f32>,
}

impl ChunkRow {
    pub fn new(chunk: &Chunk, content_hash: String, vector: Vec<f32>) -> Result<Self> {
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: chunk.content().to_string(),
            source: chunk.source().to_string(),
            file_type: chunk.file_type().to_string(),
            chunk_index: chunk.chunk_index().and_then(|i| i32::try_from(i).ok()),
            content_hash,
            metadata: serde_json::to_string(chunk.metadata())?,
            vector,
        })
    }
}

pub fn content_hash(content: &str) -> String { blake3::hash(content.as_bytes()).to_hex().to_string() }

/// Appends rows to `table_name`, creating the table on first write.
///
/// Rows are converted in record batches of `batch_size` but committed as a
/// single Lance write, so a failed persist leaves the table untouched.
pub struct ChunkWriter<'a> {
    db: &'a Connection,
    table_name: &'a str,
    dim: i32,
    batch_size: usize,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(db: &'a Connection, table_name: &'a str, dim: usize, batch_size: usize) -> Result<Self> {
        let dim = i32::try_from(dim).map_err(|_| anyhow!("embedding dimension {dim} is too large"))?;
        Ok(Self { db, table_name, dim, batch_size: batch_size.max(1) })
    }

    pub async fn write(&self, rows: &[ChunkRow]) -> Result<()> {
        if rows.is_empty() {
            debug!("No rows to write");
            return Ok(());
        }
        info!("Writing {} chunks into LanceDB table: {}", rows.len(), self.table_name);
        let pb = progress_bar(rows.len(), "chunks prepared")?;
        let mut batches = Vec::with_capacity(rows.len().div_ceil(self.batch_size));
        for group in rows.chunks(self.batch_size) {
            batches.push(Ok(self.rows_to_record_batch(group)?));
            pb.inc(group.len() as u64);
        }
        pb.finish_and_clear();
        let schema = build_chunk_schema(self.dim);
        let reader = Box::new(RecordBatchIterator::new(batches.into_iter(), schema));
        if table_exists(self.db, self.table_name).await? {
            self.db.open_table(self.table_name).execute().await?.add(reader).execute().await?;
        } else {
            self.db.create_table(self.table_name, reader).execute().await?;
        }
        info!("Wrote {} chunks into {}", rows.len(), self.table_name);
        Ok(())
    }

    fn rows_to_record_batch(&self, rows: &[ChunkRow]) -> Result<RecordBatch> {
        let expected = usize::try_from(self.dim)?;
        if let Some(bad) = rows.iter().find(|r| r.vector.len() != expected) {
            return Err(anyhow!("vector for {} has {} dims, table expects {}", bad.source, bad.vector.len(), expected));
        }
        let vectors = rows.iter().map(|r| Some(r.vector.iter().copied().map(Some).collect::<Vec<_>>()));
        let record_batch = RecordBatch::try_new(
            build_chunk_schema(self.dim),
            vec![
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.id.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.content.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.source.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.file_type.as_str()))),
                Arc::new(Int32Array::from(rows.iter().map(|r| r.chunk_index).collect::<Vec<_>>())),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.content_hash.as_str()))),
                Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.metadata.as_str()))),
                Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors, self.dim)),
            ],
        )?;
        Ok(record_batch)
    }
}

pub(crate) fn progress_bar(len: usize, unit: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!("{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{percent}}%)"))?
            .progress_chars("#>-"),
    );
    Ok(pb)
}
