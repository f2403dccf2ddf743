//! IVF-PQ index construction for large collections.
//!
//! Small collections are searched exhaustively; below [`MIN_ROWS_FOR_INDEX`]
//! the PQ codebooks cannot be trained and no index is built.
use anyhow::Result;
use lancedb::index::{vector::IvfPqIndexBuilder, Index};
use lancedb::{DistanceType, Table};
use tracing::info;

use crate::schema::VECTOR_COLUMN;

pub const MIN_ROWS_FOR_INDEX: usize = 256;
pub const INDEX_NAME: &str = "vector_idx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IvfPqParams {
    pub nlist: usize,
    pub m: usize,
}

pub fn compute_ivfpq_params(total_rows: usize, dim: usize) -> IvfPqParams {
    // Integer sqrt; precision is irrelevant for partition counts.
    let mut sqrt_n = 1usize;
    while (sqrt_n + 1) * (sqrt_n + 1) <= total_rows {
        sqrt_n += 1;
    }
    let nlist = sqrt_n.clamp(1, 4096);
    let preferred = if dim >= 1024 { 32 } else { 16 };
    let m = [preferred, 16, 8, 4, 2, 1].into_iter().find(|m| dim % m == 0).unwrap_or(1);
    IvfPqParams { nlist, m }
}

/// Builds (or replaces) the cosine IVF-PQ index. Returns the index name, or
/// `None` when the table is too small to train one.
pub async fn build_ivfpq_index(table: &Table, dim: usize) -> Result<Option<String>> {
    let rows = table.count_rows(None).await?;
    if rows < MIN_ROWS_FOR_INDEX {
        info!(rows, min = MIN_ROWS_FOR_INDEX, "collection too small for an IVF-PQ index; searches stay exhaustive");
        return Ok(None);
    }
    let params = compute_ivfpq_params(rows, dim);
    info!(rows, nlist = params.nlist, m = params.m, "building IVF-PQ index");
    table
        .create_index(
            &[VECTOR_COLUMN],
            Index::IvfPq(
                IvfPqIndexBuilder::default()
                    .distance_type(DistanceType::Cosine)
                    .num_partitions(u32::try_from(params.nlist)?)
                    .num_sub_vectors(u32::try_from(params.m)?),
            ),
        )
        .name(INDEX_NAME.to_string())
        .execute()
        .await?;
    Ok(Some(INDEX_NAME.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_scale_with_rows_and_divide_dim() {
        assert_eq!(compute_ivfpq_params(256, 384), IvfPqParams { nlist: 16, m: 16 });
        assert_eq!(compute_ivfpq_params(1_000_000, 1024), IvfPqParams { nlist: 1000, m: 32 });
        assert_eq!(compute_ivfpq_params(10_000, 100).m, 4);
        assert_eq!(compute_ivfpq_params(0, 7), IvfPqParams { nlist: 1, m: 1 });
    }
}
