use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::loader::load_document;
use crate::splitter::{normalize_text, TextSplitter};
use crate::types::{Chunk, Metadata, FILE_TYPE_KEY, SOURCE_KEY};

/// Outcome of ingesting a directory: chunks from every readable file plus the
/// files that failed, each with its own error.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files: usize,
    pub chunks: Vec<Chunk>,
    pub failures: Vec<(PathBuf, Error)>,
}

/// Turns files into validated, overlapping chunks.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    splitter: TextSplitter,
}

impl DataProcessor {
    pub fn new(chunking: ChunkingConfig) -> Result<Self> {
        Ok(Self { splitter: TextSplitter::new(chunking)? })
    }

    pub fn chunking(&self) -> &ChunkingConfig { self.splitter.config() }

    /// Decodes one file and splits it. Any failure aborts this file only.
    pub fn ingest_file(&self, file_path: &Path) -> Result<Vec<Chunk>> {
        let source = file_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .ok_or_else(|| Error::UnsupportedFormat(format!("{} is not a file path", file_path.display())))?;
        let doc = load_document(file_path)?;
        let (text, page_starts) = join_pages(&doc.pages);
        if text.is_empty() {
            return Err(Error::EmptyDocument(source));
        }
        let spans = self.splitter.split(&text);
        let total_chunks = spans.len();
        let mut chunks = Vec::with_capacity(total_chunks);
        for (chunk_index, span) in spans.into_iter().enumerate() {
            let mut metadata = Metadata::new();
            metadata.insert(SOURCE_KEY.into(), source.clone().into());
            metadata.insert(FILE_TYPE_KEY.into(), doc.file_type.clone().into());
            metadata.insert("path".into(), file_path.to_string_lossy().to_string().into());
            metadata.insert("chunk_index".into(), chunk_index.into());
            metadata.insert("total_chunks".into(), total_chunks.into());
            metadata.insert("start_index".into(), span.start.into());
            if doc.paged {
                metadata.insert("page".into(), page_at(&page_starts, span.start).into());
            }
            chunks.push(Chunk::new(span.text, metadata)?);
        }
        debug!(source = %source, file_type = %doc.file_type, chunks = chunks.len(), "ingested file");
        Ok(chunks)
    }

    /// Ingests each path in order; the first failure aborts the whole batch.
    pub fn ingest_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Chunk>> {
        let mut all_chunks = Vec::new();
        for path in paths {
            all_chunks.extend(self.ingest_file(path.as_ref())?);
        }
        Ok(all_chunks)
    }

    pub fn process_directory(&self, data_dir: &Path) -> Result<IngestSummary> {
        self.process_directory_limited(data_dir, usize::MAX)
    }

    /// Walks `data_dir` (sorted) and ingests up to `limit` files, collecting
    /// per-file failures instead of aborting.
    pub fn process_directory_limited(&self, data_dir: &Path, limit: usize) -> Result<IngestSummary> {
        if !data_dir.is_dir() {
            return Err(Error::io(
                data_dir,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }
        let mut files = list_files(data_dir);
        if files.len() > limit {
            files.truncate(limit);
            info!(limit, "limited directory ingestion");
        }
        let mut summary = IngestSummary::default();
        for (file_index, file_path) in files.iter().enumerate() {
            debug!("Processing file {}/{}: {}", file_index + 1, files.len(), file_path.display());
            match self.ingest_file(file_path) {
                Ok(chunks) => {
                    summary.files += 1;
                    summary.chunks.extend(chunks);
                }
                Err(e) => {
                    warn!(path = %file_path.display(), error = %e, "skipping file");
                    summary.failures.push((file_path.clone(), e));
                }
            }
        }
        info!(
            "Processed {} files into {} chunks ({} failed)",
            summary.files,
            summary.chunks.len(),
            summary.failures.len()
        );
        Ok(summary)
    }
}

/// Normalizes each page and joins the non-empty ones with a paragraph break.
/// Returns the text plus `(char_offset, page)` for every kept page, where
/// `page` is the 0-based page number in the source.
fn join_pages(pages: &[String]) -> (String, Vec<(usize, usize)>) {
    let mut text = String::new();
    let mut len = 0usize;
    let mut starts = Vec::new();
    for (page, raw) in pages.iter().enumerate() {
        let normalized = normalize_text(raw);
        if normalized.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push_str("\n\n");
            len += 2;
        }
        starts.push((len, page));
        len += normalized.chars().count();
        text.push_str(&normalized);
    }
    (text, starts)
}

/// Page holding character `offset`.
fn page_at(starts: &[(usize, usize)], offset: usize) -> usize {
    starts.iter().take_while(|(start, _)| *start <= offset).last().map_or(0, |(_, page)| *page)
}

fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    files.sort();
    files
}
