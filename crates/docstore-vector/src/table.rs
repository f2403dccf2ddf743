//! LanceDB connection and housekeeping helpers.
//!
//! Provides the database open function, table existence and row counting,
//! and typed column accessors that fail with an error instead of panicking.
use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, RecordBatch, StringArray};
use arrow_array::cast::AsArray;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, Connection, Table};
use std::collections::HashSet;

use docstore_core::CollectionState;

use crate::schema::vector_dim;

pub async fn open_db(uri: &str) -> Result<Connection> {
    Ok(connect(uri).execute().await?)
}

pub async fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let names = conn.table_names().execute().await?;
    Ok(names.iter().any(|n| n == name))
}

pub async fn open_if_exists(conn: &Connection, name: &str) -> Result<Option<Table>> {
    if !table_exists(conn, name).await? {
        return Ok(None);
    }
    Ok(Some(conn.open_table(name).execute().await?))
}

pub async fn collection_state(conn: &Connection, name: &str) -> Result<CollectionState> {
    match open_if_exists(conn, name).await? {
        None => Ok(CollectionState::Missing),
        Some(t) => Ok(CollectionState::from_count(t.count_rows(None).await?)),
    }
}

/// Embedding width stored in an existing table.
pub async fn table_vector_dim(table: &Table) -> Result<Option<usize>> {
    let schema = table.schema().await?;
    Ok(vector_dim(&schema))
}

/// SQL string literal for a Lance filter expression.
pub fn quote_literal(value: &str) -> String { format!("'{}'", value.replace('\'', "''")) }

/// `column IN ('a', 'b', ...)` with every value quoted.
pub fn in_filter(column: &str, values: &[String]) -> String {
    let quoted: Vec<String> = values.iter().map(|v| quote_literal(v)).collect();
    format!("{column} IN ({})", quoted.join(", "))
}

/// Distinct values of a utf8 column, optionally restricted by `filter`.
pub async fn distinct_strings(table: &Table, column: &str, filter: Option<&str>) -> Result<HashSet<String>> {
    let mut query = table.query().select(Select::columns(&[column]));
    if let Some(f) = filter {
        query = query.only_if(f);
    }
    let mut stream = query.execute().await?;
    let mut out = HashSet::new();
    while let Some(batch) = stream.try_next().await? {
        let col = string_column(&batch, column)?;
        out.extend((0..batch.num_rows()).map(|i| col.value(i).to_string()));
    }
    Ok(out)
}

pub fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("column '{name}' missing or not utf8"))
}

pub fn f32_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Float32Array> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| anyhow!("column '{name}' missing or not float32"))
}

pub fn vector_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a FixedSizeListArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
        .ok_or_else(|| anyhow!("column '{name}' missing or not a fixed size list"))
}

/// Row `i` of a vector column, `None` for null rows.
pub fn vector_at(col: &FixedSizeListArray, i: usize) -> Option<Vec<f32>> {
    if col.is_null(i) {
        return None;
    }
    let list = col.value(i);
    Some(list.as_primitive::<arrow_array::types::Float32Type>().values().to_vec())
}
