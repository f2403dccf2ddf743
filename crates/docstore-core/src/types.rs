//! Domain types shared by ingestion, persistence and retrieval.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};

pub type ChunkId = String;
pub type Metadata = BTreeMap<String, MetaValue>;

pub const SOURCE_KEY: &str = "source";
pub const FILE_TYPE_KEY: &str = "file_type";

/// A scalar metadata value. Serialized as a bare JSON scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self { Self::Str(v.to_string()) }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self { Self::Str(v) }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self { Self::Int(v) }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self { Self::Int(i64::try_from(v).unwrap_or(i64::MAX)) }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self { Self::Float(v) }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self { Self::Bool(v) }
}

/// A bounded span of document text plus its provenance.
///
/// Only constructible through [`Chunk::new`], which guarantees:
/// - `content` is not blank
/// - `metadata` holds a non-empty string `source`
/// - `metadata` holds a string `file_type`
///
/// The embedding is computed at persist time and stored with the row, never here.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    content: String,
    metadata: Metadata,
}

impl Chunk {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Result<Self> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidChunk("content is empty".into()));
        }
        match metadata.get(SOURCE_KEY).and_then(MetaValue::as_str) {
            Some(s) if !s.is_empty() => {}
            _ => return Err(Error::InvalidChunk(format!("metadata '{SOURCE_KEY}' must be a non-empty string"))),
        }
        if metadata.get(FILE_TYPE_KEY).and_then(MetaValue::as_str).is_none() {
            return Err(Error::InvalidChunk(format!("metadata '{FILE_TYPE_KEY}' must be a string")));
        }
        Ok(Self { content, metadata })
    }

    pub fn content(&self) -> &str { &self.content }

    pub fn metadata(&self) -> &Metadata { &self.metadata }

    pub fn source(&self) -> &str {
        self.metadata.get(SOURCE_KEY).and_then(MetaValue::as_str).unwrap_or_default()
    }

    pub fn file_type(&self) -> &str {
        self.metadata.get(FILE_TYPE_KEY).and_then(MetaValue::as_str).unwrap_or_default()
    }

    /// Position within the parent document, when recorded at ingest time.
    pub fn chunk_index(&self) -> Option<i64> {
        self.metadata.get("chunk_index").and_then(MetaValue::as_i64)
    }
}

/// One similarity-search result.
///
/// `relevance` is the cosine similarity between the query and the chunk
/// embedding; higher is better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: Metadata,
    pub relevance: f32,
}

impl RetrievedChunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(MetaValue::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionState {
    Missing,
    Empty,
    Populated(usize),
}

impl CollectionState {
    pub fn from_count(count: usize) -> Self {
        if count == 0 { Self::Empty } else { Self::Populated(count) }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Populated(n) => *n,
            _ => 0,
        }
    }
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("missing"),
            Self::Empty => f.write_str("empty"),
            Self::Populated(n) => write!(f, "populated ({n} chunks)"),
        }
    }
}
