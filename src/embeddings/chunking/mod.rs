
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::documents::DocumentPage;

/// Represents a window of source text ready for embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sanitized file name the text came from
    pub source_id: String,
    /// Page or row identifier, "N/A" if unknown
    pub location: String,
    /// Never empty
    pub text: String,
}

/// Configuration for content chunking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared between adjacent windows
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Split normalized pages into overlapping windows
///
/// Windows try to end on whitespace found in their second half so words are
/// not cut, and every window after the first starts `chunk_overlap` characters
/// before the end of the previous one. Output is deterministic for identical input.
#[inline]
pub fn chunk_pages(pages: &[DocumentPage], config: &ChunkingConfig) -> Vec<Chunk> {
    let chunks: Vec<Chunk> = pages
        .iter()
        .flat_map(|page| {
            split_windows(&page.text, config)
                .into_iter()
                .map(|text| Chunk {
                    source_id: page.source_id.clone(),
                    location: page.location.clone(),
                    text,
                })
        })
        .collect();

    debug!(
        "Chunked {} pages into {} chunks (avg {} chars)",
        pages.len(),
        chunks.len(),
        chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}

/// Split a single text into trimmed, non-empty windows
pub(crate) fn split_windows(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);

    let mut windows = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let hard_end = (start + size).min(chars.len());
        let end = if hard_end < chars.len() {
            soft_boundary(&chars, start, hard_end)
        } else {
            hard_end
        };

        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() {
            windows.push(trimmed.to_string());
        }

        if end >= chars.len() {
            break;
        }

        // Always advance, even when the overlap would reach back past `start`
        start = end.saturating_sub(overlap).max(start + 1);
    }

    windows
}

/// Last whitespace position in the second half of the window, or the hard end
fn soft_boundary(chars: &[char], start: usize, hard_end: usize) -> usize {
    let midpoint = start + (hard_end - start) / 2;
    (midpoint..hard_end)
        .rev()
        .find(|&i| chars[i].is_whitespace())
        .map_or(hard_end, |i| i + 1)
}
