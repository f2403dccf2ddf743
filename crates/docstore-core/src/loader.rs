//! Extension-driven decoding of raw files into plain text.

use regex::Regex;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::error::{Error, Result};

const PLAIN_TEXT_EXTENSIONS: &[&str] =
    &["txt", "md", "markdown", "rst", "csv", "tsv", "json", "log", "yaml", "yml", "toml"];
const MARKUP_EXTENSIONS: &[&str] = &["html", "htm", "xml"];
const BINARY_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bin", "zip", "gz", "tar", "7z", "png", "jpg", "jpeg", "gif", "bmp", "mp3", "mp4",
    "wav", "class", "o", "a", "iso",
];
/// Share of U+FFFD replacement characters above which sniffed content counts as binary.
const MAX_REPLACEMENT_RATIO: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoder {
    Pdf,
    PlainText,
    WordProcessor,
    Markup,
    Generic,
}

impl Decoder {
    pub fn for_extension(ext: &str) -> Result<Self> {
        let ext = ext.to_ascii_lowercase();
        if ext == "pdf" {
            Ok(Self::Pdf)
        } else if ext == "docx" || ext == "doc" {
            Ok(Self::WordProcessor)
        } else if PLAIN_TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::PlainText)
        } else if MARKUP_EXTENSIONS.contains(&ext.as_str()) {
            Ok(Self::Markup)
        } else if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            Err(Error::UnsupportedFormat(format!(".{ext} files are binary")))
        } else {
            Ok(Self::Generic)
        }
    }
}

/// The decoded text of one file plus the `file_type` tag for its chunks.
///
/// Paged formats (PDF) keep one entry per page in `pages`; everything else
/// is a single unpaged entry.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub file_type: String,
    pub pages: Vec<String>,
    pub paged: bool,
}

/// Reads `path` and decodes it according to its extension.
pub fn load_document(path: &Path) -> Result<LoadedDocument> {
    let ext = path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase);
    let decoder = match ext.as_deref() {
        Some(e) => Decoder::for_extension(e)?,
        None => Decoder::Generic,
    };
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), ?decoder, bytes = bytes.len(), "decoding file");
    let (pages, paged) = match decoder {
        Decoder::Pdf => (decode_pdf(&bytes)?, true),
        Decoder::PlainText => (vec![decode_utf8_lossy(&bytes)], false),
        Decoder::WordProcessor => (vec![decode_docx(&bytes)?], false),
        Decoder::Markup => (vec![strip_markup(&decode_utf8_lossy(&bytes))], false),
        Decoder::Generic => (vec![sniff_text(&bytes)?], false),
    };
    let file_type = ext.unwrap_or_else(|| "text".to_string());
    Ok(LoadedDocument { file_type, pages, paged })
}

fn decode_utf8_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.trim_start_matches('\u{feff}').to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// One string per page, in page order.
fn decode_pdf(bytes: &[u8]) -> Result<Vec<String>> {
    // pdf-extract panics on some malformed inputs; treat that like a decode error.
    let extracted = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| Error::UnsupportedFormat("pdf: extractor panicked on malformed document".into()))?;
    extracted.map_err(|e| Error::UnsupportedFormat(format!("pdf: {e}")))
}

fn decode_docx(bytes: &[u8]) -> Result<String> {
    if !bytes.starts_with(b"PK") {
        return Err(Error::UnsupportedFormat("legacy binary .doc is not supported; save as .docx".into()));
    }
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::UnsupportedFormat(format!("docx: {e}")))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::UnsupportedFormat(format!("docx: {e}")))?
        .read_to_string(&mut xml)
        .map_err(|e| Error::UnsupportedFormat(format!("docx: {e}")))?;
    Ok(docx_xml_to_text(&xml))
}

fn docx_xml_to_text(xml: &str) -> String {
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    static TABS: OnceLock<Regex> = OnceLock::new();
    let breaks = BREAKS.get_or_init(|| Regex::new(r"</w:p>|<w:br\s*/>|<w:cr\s*/>").expect("static regex"));
    let tabs = TABS.get_or_init(|| Regex::new(r"<w:tab\s*/>").expect("static regex"));
    let with_breaks = breaks.replace_all(xml, "\n");
    let with_tabs = tabs.replace_all(&with_breaks, "\t");
    unescape_entities(&strip_tags(&with_tabs))
}

fn strip_markup(html: &str) -> String {
    static BLOCKS: OnceLock<Regex> = OnceLock::new();
    static BREAKS: OnceLock<Regex> = OnceLock::new();
    let blocks = BLOCKS.get_or_init(|| {
        Regex::new(r"(?is)<script\b.*?</script>|<style\b.*?</style>|<!--.*?-->").expect("static regex")
    });
    let breaks = BREAKS.get_or_init(|| {
        Regex::new(r"(?i)<br\s*/?>|</(p|div|li|h[1-6]|tr|section|article)>").expect("static regex")
    });
    let without_blocks = blocks.replace_all(html, " ");
    let with_breaks = breaks.replace_all(&without_blocks, "\n");
    unescape_entities(&strip_tags(&with_breaks))
}

fn strip_tags(s: &str) -> String {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    let tags = TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("static regex"));
    tags.replace_all(s, "").into_owned()
}

fn unescape_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Fallback for unknown extensions: accept the bytes only if they look like text.
fn sniff_text(bytes: &[u8]) -> Result<String> {
    if bytes.contains(&0) {
        return Err(Error::UnsupportedFormat("content looks binary (NUL bytes)".into()));
    }
    let text = decode_utf8_lossy(bytes);
    let total = text.chars().count();
    if total > 0 {
        let replaced = text.chars().filter(|&c| c == char::REPLACEMENT_CHARACTER).count();
        if replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
            return Err(Error::UnsupportedFormat("content is not valid text".into()));
        }
    }
    Ok(text)
}
