//! docstore-embed
//!
//! Embedding providers behind `docstore_core::traits::Embedder`: the local
//! BGE-M3 model on candle and a deterministic hashing embedder.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tracing::info;

use docstore_core::config::{expand_path, EmbeddingProvider, EmbeddingSettings};
use docstore_core::traits::Embedder;

pub mod hash;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use hash::HashEmbedder;
pub use model::BgeM3Embedder;
pub use pool::masked_mean_l2;

/// Builds the embedder selected by `settings`.
///
/// `APP_USE_FAKE_EMBEDDINGS=1` forces the hashing embedder.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    if use_fake_embeddings() || settings.provider == EmbeddingProvider::Hash {
        info!(dim = settings.hash_dim, "Using HashEmbedder");
        return Ok(Box::new(HashEmbedder::new(settings.hash_dim)));
    }
    let model_dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Box::new(BgeM3Embedder::load(&model_dir, settings.max_len)?))
}

fn use_fake_embeddings() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = expand_path(dir);
        if p.exists() { return Ok(p); }
        return Err(anyhow!("Configured embedding.model_dir does not exist: {}", p.display()));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            let p = PathBuf::from(&dir);
            if p.exists() { info!("Using {}: {}", var, p.display()); return Ok(p); }
        }
    }
    for candidate in ["models/bge-m3", "../models/bge-m3"] {
        let p = PathBuf::from(candidate);
        if p.exists() { info!("Using model dir: {}", p.display()); return Ok(p); }
    }
    Err(anyhow!("Could not locate BGE-M3 model directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configured_model_dir_is_an_error() {
        let err = resolve_model_dir(Some("/definitely/not/here")).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn hash_provider_needs_no_model() {
        let settings = EmbeddingSettings { provider: EmbeddingProvider::Hash, hash_dim: 64, ..Default::default() };
        let embedder = get_default_embedder(&settings).unwrap();
        assert_eq!(embedder.dim(), 64);
        assert_eq!(embedder.model_id(), "hash:d64");
    }
}
