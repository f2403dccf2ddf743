//! `docstore`: ingest documents into a LanceDB collection and query them.
//!
//! Examples:
//!   docstore ingest ./notes ./manuals/pump.pdf
//!   docstore query "how do I prime the pump" -k 3
//!   docstore --collection manuals status

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docstore_core::config::{resolve_with_base, Config, Settings};
use docstore_core::data_processor::DataProcessor;
use docstore_core::Chunk;
use docstore_vector::DocumentStore;

#[derive(Parser)]
#[command(name = "docstore", version, about = "Document ingestion and similarity retrieval")]
struct Cli {
    /// Config file (defaults to config.toml + config.<RUST_ENV>.toml + APP_* env)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override store.persist_dir
    #[arg(long, global = true)]
    persist_dir: Option<String>,

    /// Override store.collection
    #[arg(long, global = true)]
    collection: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest files or directories and persist their chunks
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Decode and split only; write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the chunks most similar to TEXT
    Query {
        text: String,
        #[arg(short)]
        k: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Print collection state and row count
    Status,
    /// Delete every chunk of a source file name
    Delete { source: String },
    /// Build the IVF-PQ index when the collection is large enough
    Index,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose { "docstore=debug" } else { "docstore=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let settings = load_settings(&cli)?;
    match cli.command {
        Command::Ingest { paths, dry_run } => ingest(&settings, &paths, dry_run),
        Command::Query { text, k, json } => {
            let store = DocumentStore::from_settings(&settings)?;
            let results = store.query(&text, k.unwrap_or(store.default_k()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if results.is_empty() {
                println!("No results.");
            } else {
                for (rank, r) in results.iter().enumerate() {
                    println!("{}. [{:.3}] {}", rank + 1, r.relevance, r.source().unwrap_or("?"));
                    println!("   {}", preview(&r.content, 200));
                }
            }
            store.close();
            Ok(())
        }
        Command::Status => {
            let store = DocumentStore::from_settings(&settings)?;
            println!("collection: {}", settings.store.collection);
            println!("location:   {}", settings.store.persist_path().display());
            println!("state:      {}", store.state()?);
            store.close();
            Ok(())
        }
        Command::Delete { source } => {
            let store = DocumentStore::from_settings(&settings)?;
            let deleted = store.delete_source(&source)?;
            println!("Deleted {deleted} chunks of {source}");
            store.close();
            Ok(())
        }
        Command::Index => {
            let store = DocumentStore::from_settings(&settings)?;
            match store.build_index()? {
                Some(name) => println!("Built index {name}"),
                None => println!("Collection too small for an index; searches stay exhaustive"),
            }
            store.close();
            Ok(())
        }
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    let mut settings = config.settings()?;
    if let Some(dir) = &cli.persist_dir {
        let cwd = std::env::current_dir().context("current directory")?;
        settings.store.persist_dir = resolve_with_base(&cwd, dir).to_string_lossy().to_string();
    }
    if let Some(name) = &cli.collection {
        settings.store.collection.clone_from(name);
    }
    settings.validate()?;
    Ok(settings)
}

fn ingest(settings: &Settings, paths: &[PathBuf], dry_run: bool) -> Result<()> {
    let processor = DataProcessor::new(settings.chunking)?;
    let (chunks, failed) = collect_chunks(&processor, paths)?;
    if dry_run {
        println!("Dry run: {} chunks ready, {failed} files failed", chunks.len());
        return check_failures(failed);
    }
    let store = DocumentStore::from_settings(settings)?;
    let handle = store.persist(&chunks)?;
    info!(written = handle.written_ids.len(), cache_hits = handle.cache_hits, "persisted");
    println!(
        "Ingested {} chunks into '{}' ({} total, {failed} files failed)",
        handle.written_ids.len(),
        handle.name,
        handle.total_rows
    );
    store.close();
    check_failures(failed)
}

/// Chunks every readable file under `paths`, counting the ones that failed to load.
fn collect_chunks(processor: &DataProcessor, paths: &[PathBuf]) -> Result<(Vec<Chunk>, usize)> {
    let mut chunks: Vec<Chunk> = Vec::new();
    let mut failed = 0usize;
    for path in paths {
        if path.is_dir() {
            let summary = processor.process_directory(path)?;
            failed += summary.failures.len();
            chunks.extend(summary.chunks);
        } else {
            match processor.ingest_file(path) {
                Ok(c) => chunks.extend(c),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping file");
                    failed += 1;
                }
            }
        }
    }
    Ok((chunks, failed))
}

fn check_failures(failed: usize) -> Result<()> {
    if failed > 0 {
        anyhow::bail!("{failed} file(s) failed to ingest");
    }
    Ok(())
}

fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docstore_core::config::ChunkingConfig;

    #[test]
    fn unreadable_files_fail_the_ingest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.txt"), "A short note about the well pump.").unwrap();
        let processor = DataProcessor::new(ChunkingConfig::default()).unwrap();

        let missing = dir.path().join("missing.txt");
        let (chunks, failed) =
            collect_chunks(&processor, &[dir.path().join("good.txt"), missing]).unwrap();
        assert!(!chunks.is_empty());
        assert_eq!(failed, 1);
        assert!(check_failures(failed).is_err());

        let (_, failed) = collect_chunks(&processor, &[dir.path().join("good.txt")]).unwrap();
        assert!(check_failures(failed).is_ok());
    }
}
