use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use docstore_core::config::{EmbeddingProvider, Settings};
use docstore_core::traits::Embedder;
use docstore_core::{Chunk, Error, Metadata};
use docstore_embed::HashEmbedder;
use docstore_vector::LanceCollection;

fn settings() -> Settings {
    let mut s = Settings::default();
    s.store.collection = "chunks".into();
    s.embedding.provider = EmbeddingProvider::Hash;
    s
}

fn chunk(source: &str, i: usize, text: &str) -> Chunk {
    let mut m = Metadata::new();
    m.insert("source".into(), source.into());
    m.insert("file_type".into(), "txt".into());
    m.insert("chunk_index".into(), i.into());
    Chunk::new(text, m).unwrap()
}

/// Counts how many texts reach the wrapped embedder.
struct CountingEmbedder {
    inner: HashEmbedder,
    calls: Arc<AtomicUsize>,
}

impl Embedder for CountingEmbedder {
    fn model_id(&self) -> &str { self.inner.model_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn model_id(&self) -> &str { "failing:d32" }
    fn dim(&self) -> usize { 32 }
    fn max_len(&self) -> usize { 512 }
    fn embed_batch(&self, _texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        anyhow::bail!("model unavailable")
    }
}

#[tokio::test]
async fn repeated_content_is_served_from_cache() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let calls = Arc::new(AtomicUsize::new(0));
    let embedder = CountingEmbedder { inner: HashEmbedder::new(32), calls: calls.clone() };
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(embedder)).await.unwrap();

    let chunks = vec![chunk("a.txt", 0, "split the kindling"), chunk("a.txt", 1, "split the kindling"), chunk("b.txt", 0, "stack the logs")];
    let first = coll.persist(&chunks).await.unwrap();
    assert_eq!(first.cache_hits, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "duplicate content embedded once");

    let second = coll.persist(&chunks).await.unwrap();
    assert_eq!(second.cache_hits, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(second.total_rows, 6, "persist is not idempotent");
    assert!(first.written_ids.iter().all(|id| !second.written_ids.contains(id)));
}

#[tokio::test]
async fn cache_can_be_disabled() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let mut s = settings();
    s.embedding.cache = false;
    let calls = Arc::new(AtomicUsize::new(0));
    let embedder = CountingEmbedder { inner: HashEmbedder::new(32), calls: calls.clone() };
    let coll = LanceCollection::connect(&uri, &s, Box::new(embedder)).await.unwrap();

    let chunks = vec![chunk("a.txt", 0, "split the kindling")];
    coll.persist(&chunks).await.unwrap();
    let again = coll.persist(&chunks).await.unwrap();
    assert_eq!(again.cache_hits, 0);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn dimension_mismatch_is_a_storage_error() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let small = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(16))).await.unwrap();
    small.persist(&[chunk("a.txt", 0, "sixteen dims")]).await.unwrap();

    let large = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(32))).await.unwrap();
    let err = large.persist(&[chunk("b.txt", 0, "thirty two dims")]).await.unwrap_err();
    assert!(matches!(err, Error::Storage(_)), "{err}");
    assert_eq!(large.count().await.unwrap(), 1);
}

#[tokio::test]
async fn query_failure_surfaces_as_error() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let writer = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(32))).await.unwrap();
    writer.persist(&[chunk("a.txt", 0, "compost turning schedule")]).await.unwrap();

    let reader = LanceCollection::connect(&uri, &settings(), Box::new(FailingEmbedder)).await.unwrap();
    assert!(matches!(reader.query("compost", 3).await, Err(Error::QueryFailure(_))));
    assert!(matches!(reader.persist(&[chunk("b.txt", 0, "x")]).await, Err(Error::Storage(_))));
}

#[tokio::test]
async fn zero_k_and_blank_queries_return_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(32))).await.unwrap();
    coll.persist(&[chunk("a.txt", 0, "goat milking routine")]).await.unwrap();
    assert!(coll.query("goat", 0).await.unwrap().is_empty());
    assert!(coll.query("   ", 3).await.unwrap().is_empty());
    assert_eq!(coll.query("goat", 3).await.unwrap().len(), 1);
}

#[tokio::test]
async fn persisting_nothing_creates_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(32))).await.unwrap();
    let handle = coll.persist(&[]).await.unwrap();
    assert!(handle.written_ids.is_empty());
    assert_eq!(handle.total_rows, 0);
    assert_eq!(coll.state().await.unwrap(), docstore_core::CollectionState::Missing);
}

#[tokio::test]
#[ignore = "trains an IVF-PQ index; slow"]
async fn ivfpq_index_on_large_collection() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(HashEmbedder::new(32))).await.unwrap();
    let chunks: Vec<Chunk> = (0..300).map(|i| chunk(&format!("doc{i}.txt"), 0, &format!("note {i} about field {}", i % 17))).collect();
    coll.persist(&chunks).await.unwrap();

    assert_eq!(coll.build_index().await.unwrap().as_deref(), Some("vector_idx"));
    let hits = coll.query("note 42 about field 8", 5).await.unwrap();
    assert!(!hits.is_empty());
}

#[tokio::test]
async fn rows_beyond_write_batch_size_land_in_one_persist() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let mut s = settings();
    s.store.write_batch_size = 2;
    let coll = LanceCollection::connect(&uri, &s, Box::new(HashEmbedder::new(32))).await.unwrap();

    let chunks: Vec<Chunk> = (0..7).map(|i| chunk("many.txt", i, &format!("row number {i}"))).collect();
    let handle = coll.persist(&chunks).await.unwrap();
    assert_eq!(handle.written_ids.len(), 7);
    assert_eq!(handle.total_rows, 7);
}

#[tokio::test]
async fn deleting_a_source_prunes_its_cached_embeddings() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let calls = Arc::new(AtomicUsize::new(0));
    let embedder = CountingEmbedder { inner: HashEmbedder::new(32), calls: calls.clone() };
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(embedder)).await.unwrap();

    coll.persist(&[chunk("a.txt", 0, "only in a"), chunk("a.txt", 1, "shared line")]).await.unwrap();
    coll.persist(&[chunk("b.txt", 0, "shared line")]).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert_eq!(coll.delete_source("a.txt").await.unwrap(), 2);

    // "shared line" is still stored under b.txt, so its vector stays cached.
    let again = coll.persist(&[chunk("a.txt", 0, "only in a"), chunk("a.txt", 1, "shared line")]).await.unwrap();
    assert_eq!(again.cache_hits, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Sleeps like a heavy model would.
struct SlowEmbedder(HashEmbedder);

impl Embedder for SlowEmbedder {
    fn model_id(&self) -> &str { self.0.model_id() }
    fn dim(&self) -> usize { self.0.dim() }
    fn max_len(&self) -> usize { self.0.max_len() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        std::thread::sleep(std::time::Duration::from_millis(300));
        self.0.embed_batch(texts)
    }
}

#[tokio::test]
async fn embedding_does_not_stall_the_executor() {
    let tmp = tempfile::tempdir().unwrap();
    let uri = tmp.path().to_string_lossy().to_string();
    let coll = LanceCollection::connect(&uri, &settings(), Box::new(SlowEmbedder(HashEmbedder::new(32)))).await.unwrap();

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };
    coll.persist(&[chunk("a.txt", 0, "slow to embed")]).await.unwrap();
    ticker.abort();
    assert!(ticks.load(Ordering::SeqCst) >= 5, "ticker ran {} times", ticks.load(Ordering::SeqCst));
}
