use docstore_core::config::{EmbeddingProvider, EmbeddingSettings};
use docstore_embed::get_default_embedder;

fn main() -> anyhow::Result<()> {
    let provider = if std::env::args().any(|a| a == "--hash") { EmbeddingProvider::Hash } else { EmbeddingProvider::Local };
    let embedder = get_default_embedder(&EmbeddingSettings { provider, ..Default::default() })?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("model={} B={} dim={}", embedder.model_id(), embs.len(), embedder.dim());
    Ok(())
}
