use anyhow::Result;
use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

use docstore_core::traits::Embedder;

/// Deterministic bag-of-tokens embedder. Identical texts map to identical
/// vectors and shared tokens raise cosine similarity, which is all tests and
/// offline development need.
pub struct HashEmbedder {
    dim: usize,
    id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("hash:d{dim}") }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for (i, raw) in text.split_whitespace().enumerate() {
            let lowered = raw.to_lowercase();
            let trimmed = lowered.trim_matches(|c: char| !c.is_alphanumeric());
            let token = if trimmed.is_empty() { lowered.as_str() } else { trimmed };
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
