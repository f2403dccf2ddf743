use anyhow::{Context, Result};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{DistanceType, Table};

use docstore_core::{Metadata, RetrievedChunk};

use crate::table::{f32_column, string_column};

/// Tuning knobs for a single vector search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub k: usize,
    pub nprobes: usize,
    pub refine_factor: Option<u32>,
}

/// Cosine nearest-neighbour search, best first.
///
/// Relevance is `1 - cosine_distance`, i.e. the cosine similarity.
pub async fn search_vec(table: &Table, q_vec: Vec<f32>, params: SearchParams) -> Result<Vec<RetrievedChunk>> {
    if params.k == 0 {
        return Ok(Vec::new());
    }
    let mut query = table
        .vector_search(q_vec)?
        .distance_type(DistanceType::Cosine)
        .nprobes(params.nprobes)
        .select(Select::columns(&["id", "content", "metadata"]))
        .limit(params.k);
    if let Some(rf) = params.refine_factor {
        query = query.refine_factor(rf);
    }
    let mut stream = query.execute().await?;
    let mut hits = Vec::new();
    while let Some(batch) = stream.try_next().await? {
        let ids = string_column(&batch, "id")?;
        let contents = string_column(&batch, "content")?;
        let metas = string_column(&batch, "metadata")?;
        let distances = f32_column(&batch, "_distance")?;
        for i in 0..batch.num_rows() {
            let metadata: Metadata = serde_json::from_str(metas.value(i))
                .with_context(|| format!("row {} has malformed metadata", ids.value(i)))?;
            hits.push(RetrievedChunk {
                id: ids.value(i).to_string(),
                content: contents.value(i).to_string(),
                metadata,
                relevance: 1.0 - distances.value(i),
            });
        }
    }
    hits.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    hits.truncate(params.k);
    Ok(hits)
}
