// Document loading module
// Reads the corpus folder into normalized, source-tagged pages ready for chunking


use fancy_regex::Regex;
use itertools::Itertools;
use lopdf::Document;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::{RagError, Result};

/// File extensions the loader understands; anything other than PDF and CSV is read as text
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "pdf", "csv"];

/// Form feed separates pages in text extracted from paginated formats
const PAGE_SEPARATOR: char = '\u{000C}';

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b\x0e-\x1f\x7f-\x9f]").expect("control character pattern is valid")
});
static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9._-]").expect("filename pattern is valid"));

/// A normalized page of a source document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    /// Sanitized file name of the document
    pub source_id: String,
    /// 1-based page number, or 1-based data row number for CSV files
    pub location: String,
    pub text: String,
}

/// Result of scanning the documents folder
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedDocuments {
    pub pages: Vec<DocumentPage>,
    /// Sanitized names of the files that contributed at least one page
    pub sources: Vec<String>,
}

impl LoadedDocuments {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Load every supported document in `dir`
///
/// The folder is created when missing. Unreadable files are logged and skipped,
/// so the only error is failing to list or create the folder itself.
#[inline]
pub fn load_documents(dir: &Path) -> Result<LoadedDocuments> {
    fs::create_dir_all(dir).map_err(|e| {
        RagError::Documents(format!(
            "Cannot create documents folder {}: {}",
            dir.display(),
            e
        ))
    })?;

    let mut files = fs::read_dir(dir)
        .map_err(|e| {
            RagError::Documents(format!(
                "Cannot list documents folder {}: {}",
                dir.display(),
                e
            ))
        })?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_supported(path))
        .collect::<Vec<_>>();
    files.sort();

    if files.is_empty() {
        info!("No supported documents found in {}", dir.display());
        return Ok(LoadedDocuments::default());
    }

    info!("Found {} documents to process", files.len());

    let mut loaded = LoadedDocuments::default();
    for path in &files {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let pages = match read_pages(path, &sanitize_filename(&file_name)) {
            Ok(pages) => pages,
            Err(e) => {
                warn!("Skipping unreadable document {}: {}", file_name, e);
                continue;
            }
        };
        if pages.is_empty() {
            warn!("No valid content found in {}", file_name);
            continue;
        }

        debug!("Loaded {} valid pages from {}", pages.len(), file_name);
        if let Some(first) = pages.first() {
            if !loaded.sources.contains(&first.source_id) {
                loaded.sources.push(first.source_id.clone());
            }
        }
        loaded.pages.extend(pages);
    }

    info!(
        "Successfully loaded {} pages from {} files",
        loaded.pages.len(),
        loaded.sources.len()
    );
    Ok(loaded)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

fn is_supported(path: &Path) -> bool {
    extension(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Read one document into normalized pages, choosing the parser by extension
fn read_pages(path: &Path, source_id: &str) -> Result<Vec<DocumentPage>> {
    match extension(path).as_deref() {
        Some("pdf") => read_pdf_pages(path, source_id),
        Some("csv") => read_csv_rows(path, source_id),
        _ => {
            let raw = fs::read_to_string(path)?;
            Ok(split_pages(source_id, &raw))
        }
    }
}

/// One page per PDF page that yields text; pages without a text layer are skipped
fn read_pdf_pages(path: &Path, source_id: &str) -> Result<Vec<DocumentPage>> {
    let doc = Document::load(path)
        .map_err(|e| RagError::Documents(format!("Failed to load PDF: {}", e)))?;

    let mut page_numbers = doc.get_pages().into_keys().collect::<Vec<u32>>();
    page_numbers.sort_unstable();

    let pages = page_numbers
        .into_iter()
        .filter_map(|page_number| {
            let raw = match doc.extract_text(&[page_number]) {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("No text extracted from {} page {}: {}", source_id, page_number, e);
                    return None;
                }
            };
            let text = normalize_text(&raw);
            (!text.is_empty()).then(|| DocumentPage {
                source_id: source_id.to_string(),
                location: page_number.to_string(),
                text,
            })
        })
        .collect();

    Ok(pages)
}

/// One page per CSV data row, rendered as `header: value` pairs
fn read_csv_rows(path: &Path, source_id: &str) -> Result<Vec<DocumentPage>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| RagError::Documents(format!("Failed to open CSV: {}", e)))?;

    let headers = reader
        .headers()
        .map_err(|e| RagError::Documents(format!("Failed to read CSV header: {}", e)))?
        .clone();

    let mut pages = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let row = index + 1;
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed row {} in {}: {}", row, source_id, e);
                continue;
            }
        };

        let rendered = record
            .iter()
            .enumerate()
            .map(|(column, value)| match headers.get(column) {
                Some(header) => format!("{}: {}", header.trim(), value.trim()),
                None => value.trim().to_string(),
            })
            .join("\n");

        let text = normalize_text(&rendered);
        if !text.is_empty() {
            pages.push(DocumentPage {
                source_id: source_id.to_string(),
                location: row.to_string(),
                text,
            });
        }
    }

    Ok(pages)
}

fn split_pages(source_id: &str, raw: &str) -> Vec<DocumentPage> {
    raw.split(PAGE_SEPARATOR)
        .enumerate()
        .filter_map(|(index, page)| {
            let text = normalize_text(page);
            (!text.is_empty()).then(|| DocumentPage {
                source_id: source_id.to_string(),
                location: (index + 1).to_string(),
                text,
            })
        })
        .collect()
}

/// Strip control characters and collapse whitespace runs to single spaces
#[inline]
pub fn normalize_text(text: &str) -> String {
    let without_controls = CONTROL_CHARS.replace_all(text, "");
    WHITESPACE_RUNS
        .replace_all(&without_controls, " ")
        .trim()
        .to_string()
}

/// Reduce a file name to a stable identifier safe for storage and display
#[inline]
pub fn sanitize_filename(filename: &str) -> String {
    let stripped = filename.replace("..", "").replace(['/', '\\'], "");
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(&stripped, "_");

    if sanitized.is_empty() {
        "unknown_file".to_string()
    } else {
        sanitized.into_owned()
    }
}
