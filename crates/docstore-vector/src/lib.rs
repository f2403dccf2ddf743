//! docstore-vector
//!
//! LanceDB persistence and similarity search for document chunks.
//! [`LanceCollection`] is the async API; [`DocumentStore`] wraps it with an
//! owned Tokio runtime for synchronous callers.
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use docstore_core::config::Settings;
use docstore_core::data_processor::{DataProcessor, IngestSummary};
use docstore_core::traits::Embedder;
use docstore_core::{Chunk, CollectionState, Error, Result, RetrievedChunk};

pub mod cache;
pub mod index_build;
pub mod schema;
pub mod search;
pub mod table;
pub mod writer;

use cache::CacheEntry;
use search::SearchParams;
use writer::{content_hash, ChunkRow, ChunkWriter};

/// What a successful `persist` wrote and where.
#[derive(Debug, Clone)]
pub struct CollectionHandle {
    pub name: String,
    pub uri: String,
    pub dim: usize,
    pub written_ids: Vec<String>,
    pub total_rows: usize,
    pub cache_hits: usize,
}

/// Async collection API. Embedding runs on Tokio's blocking pool, so the
/// model never stalls the caller's executor.
pub struct LanceCollection {
    db: lancedb::Connection,
    uri: String,
    name: String,
    embedder: Arc<dyn Embedder>,
    settings: Settings,
}

impl LanceCollection {
    pub async fn connect(uri: &str, settings: &Settings, embedder: Box<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let db = table::open_db(uri).await.map_err(Error::storage)?;
        Ok(Self {
            db,
            uri: uri.to_string(),
            name: settings.store.collection.clone(),
            embedder: Arc::from(embedder),
            settings: settings.clone(),
        })
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn embedder(&self) -> &dyn Embedder { self.embedder.as_ref() }

    async fn embed_off_runtime(&self, texts: Vec<String>) -> anyhow::Result<Vec<Vec<f32>>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed_batch(&texts)).await?
    }

    /// Embeds and appends `chunks`. Every call adds new rows with fresh ids.
    pub async fn persist(&self, chunks: &[Chunk]) -> Result<CollectionHandle> {
        let dim = self.embedder.dim();
        let existing = table::open_if_exists(&self.db, &self.name).await.map_err(Error::storage)?;
        if let Some(t) = &existing {
            let stored = table::table_vector_dim(t).await.map_err(Error::storage)?;
            if stored != Some(dim) {
                return Err(Error::Storage(format!(
                    "collection '{}' stores {}-dim vectors but embedder '{}' produces {dim}",
                    self.name,
                    stored.map_or_else(|| "unknown".to_string(), |d| d.to_string()),
                    self.embedder.model_id()
                )));
            }
        }

        let (vectors, cache_hits) = self.embed_chunks(chunks).await?;
        let rows = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, (hash, vector))| ChunkRow::new(chunk, hash, vector))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(Error::storage)?;
        ChunkWriter::new(&self.db, &self.name, dim, self.settings.store.write_batch_size)
            .map_err(Error::storage)?
            .write(&rows)
            .await
            .map_err(Error::storage)?;

        let total_rows = self.count().await?;
        Ok(CollectionHandle {
            name: self.name.clone(),
            uri: self.uri.clone(),
            dim,
            written_ids: rows.into_iter().map(|r| r.id).collect(),
            total_rows,
            cache_hits,
        })
    }

    /// One `(content_hash, vector)` per chunk, plus the number served from cache.
    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<(Vec<(String, Vec<f32>)>, usize)> {
        let dim = self.embedder.dim();
        let model_id = self.embedder.model_id().to_string();
        let cache_table = schema::cache_table_name(&self.name);
        let hashes: Vec<String> = chunks.iter().map(|c| content_hash(c.content())).collect();

        let mut known: HashMap<String, Vec<f32>> = if self.settings.embedding.cache {
            cache::get_many(&self.db, &cache_table, &model_id, dim, &hashes).await.map_err(Error::storage)?
        } else {
            HashMap::new()
        };
        let cache_hits = hashes.iter().filter(|h| known.contains_key(*h)).count();

        let mut seen = HashSet::new();
        let pending: Vec<(&str, &str)> = hashes
            .iter()
            .zip(chunks)
            .filter(|(hash, _)| !known.contains_key(*hash) && seen.insert(hash.as_str()))
            .map(|(hash, chunk)| (hash.as_str(), chunk.content()))
            .collect();
        debug!(chunks = chunks.len(), cache_hits, to_embed = pending.len(), "embedding chunks");

        let mut fresh = Vec::with_capacity(pending.len());
        if !pending.is_empty() {
            let pb = writer::progress_bar(pending.len(), "chunks embedded").map_err(Error::storage)?;
            for group in pending.chunks(self.settings.embedding.batch_size) {
                let texts: Vec<String> = group.iter().map(|(_, text)| (*text).to_string()).collect();
                let vecs = self.embed_off_runtime(texts).await.map_err(Error::storage)?;
                if vecs.len() != group.len() {
                    return Err(Error::Storage(format!("embedder returned {} vectors for {} texts", vecs.len(), group.len())));
                }
                for ((hash, _), v) in group.iter().zip(vecs) {
                    if v.len() != dim {
                        return Err(Error::Storage(format!("embedder returned {} dims, expected {dim}", v.len())));
                    }
                    fresh.push(CacheEntry { content_hash: (*hash).to_string(), embedder_id: model_id.clone(), vector: v });
                }
                pb.inc(group.len() as u64);
            }
            pb.finish_and_clear();
        }

        if self.settings.embedding.cache {
            if let Err(e) = cache::put_many(&self.db, &cache_table, dim, &fresh).await {
                warn!(error = %e, "failed to update embedding cache");
            }
        }
        known.extend(fresh.into_iter().map(|e| (e.content_hash, e.vector)));

        let mut out = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let vector = known
                .get(&hash)
                .cloned()
                .ok_or_else(|| Error::Storage(format!("no embedding computed for content {hash}")))?;
            out.push((hash, vector));
        }
        Ok((out, cache_hits))
    }

    /// Up to `k` chunks ordered by descending relevance. A missing or empty
    /// collection yields no results.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(t) = table::open_if_exists(&self.db, &self.name).await.map_err(Error::query)? else {
            debug!(collection = %self.name, "query against missing collection");
            return Ok(Vec::new());
        };
        if t.count_rows(None).await.map_err(Error::query)? == 0 {
            return Ok(Vec::new());
        }
        let q_vec = self
            .embed_off_runtime(vec![text.to_string()])
            .await
            .map_err(Error::query)?
            .pop()
            .ok_or_else(|| Error::QueryFailure("embedder returned no vector for the query".into()))?;
        let params = SearchParams { k, nprobes: self.settings.query.nprobes, refine_factor: self.settings.query.refine_factor };
        let hits = search::search_vec(&t, q_vec, params).await.map_err(Error::query)?;
        debug!(k, hits = hits.len(), "query finished");
        Ok(hits)
    }

    /// Deletes every row whose `source` equals `source`; returns how many.
    /// Cached embeddings of content no longer in the collection are dropped too.
    pub async fn delete_source(&self, source: &str) -> Result<usize> {
        let Some(t) = table::open_if_exists(&self.db, &self.name).await.map_err(Error::storage)? else {
            return Ok(0);
        };
        let filter = format!("source = {}", table::quote_literal(source));
        let hashes = table::distinct_strings(&t, "content_hash", Some(&filter)).await.map_err(Error::storage)?;
        if hashes.is_empty() {
            return Ok(0);
        }
        let matching = t.count_rows(Some(filter.clone())).await.map_err(Error::storage)?;
        t.delete(&filter).await.map_err(Error::storage)?;
        info!(source, deleted = matching, "deleted source from collection");

        let cache_table = schema::cache_table_name(&self.name);
        if let Err(e) = self.prune_cache(&t, &cache_table, hashes).await {
            warn!(error = %e, "failed to prune embedding cache");
        }
        Ok(matching)
    }

    async fn prune_cache(&self, t: &lancedb::Table, cache_table: &str, mut hashes: HashSet<String>) -> anyhow::Result<()> {
        let candidates: Vec<String> = hashes.iter().cloned().collect();
        for group in candidates.chunks(cache::FILTER_GROUP) {
            let filter = table::in_filter("content_hash", group);
            for live in table::distinct_strings(t, "content_hash", Some(&filter)).await? {
                hashes.remove(&live);
            }
        }
        let orphaned: Vec<String> = hashes.into_iter().collect();
        let removed = cache::delete_many(&self.db, cache_table, &orphaned).await?;
        debug!(removed, "pruned embedding cache");
        Ok(())
    }

    pub async fn state(&self) -> Result<CollectionState> {
        table::collection_state(&self.db, &self.name).await.map_err(Error::storage)
    }

    pub async fn count(&self) -> Result<usize> { Ok(self.state().await?.row_count()) }

    pub async fn build_index(&self) -> Result<Option<String>> {
        let Some(t) = table::open_if_exists(&self.db, &self.name).await.map_err(Error::storage)? else {
            return Ok(None);
        };
        index_build::build_ivfpq_index(&t, self.embedder.dim()).await.map_err(Error::storage)
    }
}

/// Blocking front door over [`LanceCollection`] plus file ingestion.
///
/// Owns its own Tokio runtime; do not call it from inside async code.
pub struct DocumentStore {
    runtime: tokio::runtime::Runtime,
    collection: LanceCollection,
    processor: DataProcessor,
    default_k: usize,
}

impl DocumentStore {
    pub fn open(settings: &Settings, embedder: Box<dyn Embedder>) -> Result<Self> {
        settings.validate()?;
        let processor = DataProcessor::new(settings.chunking)?;
        let persist_dir = settings.store.persist_path();
        std::fs::create_dir_all(&persist_dir).map_err(|e| Error::io(&persist_dir, e))?;
        let runtime = tokio::runtime::Runtime::new().map_err(Error::storage)?;
        let uri = persist_dir.to_string_lossy().to_string();
        let collection = runtime.block_on(LanceCollection::connect(&uri, settings, embedder))?;
        info!(uri = %uri, collection = %collection.name(), model = %collection.embedder().model_id(), "opened document store");
        Ok(Self { runtime, collection, processor, default_k: settings.query.default_k })
    }

    /// Opens with the embedder selected by `settings.embedding`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = docstore_embed::get_default_embedder(&settings.embedding).map_err(Error::storage)?;
        Self::open(settings, embedder)
    }

    pub fn default_k(&self) -> usize { self.default_k }

    pub fn ingest(&self, path: &Path) -> Result<Vec<Chunk>> { self.processor.ingest_file(path) }

    pub fn ingest_dir(&self, dir: &Path) -> Result<IngestSummary> { self.processor.process_directory(dir) }

    pub fn persist(&self, chunks: &[Chunk]) -> Result<CollectionHandle> {
        self.runtime.block_on(self.collection.persist(chunks))
    }

    /// Ingests every path, then persists. Nothing is written if any file fails.
    pub fn ingest_and_persist<P: AsRef<Path>>(&self, paths: &[P]) -> Result<CollectionHandle> {
        let chunks = self.processor.ingest_files(paths)?;
        self.persist(&chunks)
    }

    pub fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        self.runtime.block_on(self.collection.query(text, k))
    }

    /// Like [`query`](Self::query) but never fails: errors are logged and
    /// reported as no results.
    pub fn retrieve(&self, text: &str, k: usize) -> Vec<RetrievedChunk> {
        self.query(text, k).unwrap_or_else(|e| {
            warn!(error = %e, "retrieval failed; continuing without context");
            Vec::new()
        })
    }

    pub fn delete_source(&self, source: &str) -> Result<usize> {
        self.runtime.block_on(self.collection.delete_source(source))
    }

    pub fn state(&self) -> Result<CollectionState> { self.runtime.block_on(self.collection.state()) }

    pub fn count(&self) -> Result<usize> { self.runtime.block_on(self.collection.count()) }

    pub fn build_index(&self) -> Result<Option<String>> { self.runtime.block_on(self.collection.build_index()) }

    pub fn close(self) {
        let Self { runtime, collection, .. } = self;
        drop(collection);
        runtime.shutdown_background();
    }
}
