//! docstore-core
//!
//! Domain types, error taxonomy, configuration and the ingestion half of the
//! pipeline: decoding files (`loader`), splitting text (`splitter`) and
//! producing validated chunks (`data_processor`).

pub mod config;
pub mod data_processor;
pub mod error;
pub mod loader;
pub mod splitter;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{Chunk, CollectionState, MetaValue, Metadata, RetrievedChunk};
