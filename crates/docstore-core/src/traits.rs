/// A text embedding model.
///
/// Implementations return L2-normalized vectors of exactly `dim()` floats; the
/// same `model_id()` must always produce the same dimensionality.
pub trait Embedder: Send + Sync {
    /// Stable identifier for the model (e.g. `bge-m3:d1024`). Keys the embedding cache.
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}
