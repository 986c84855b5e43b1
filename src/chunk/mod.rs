//! Deterministic, page-aware text chunking
//!
//! Splits extracted pages into bounded chunks with overlap while:
//! - Preferring paragraph and sentence boundaries over hard cuts
//! - Staying on UTF-8 character boundaries
//! - Producing identical output for identical input
//! - Computing content hashes used by the embedding cache

mod boundaries;

pub use boundaries::*;

use crate::config::ChunkConfig;
use crate::extract::ExtractedText;
use blake3::Hasher;

/// A chunk produced by the splitter, not yet persisted
#[derive(Debug, Clone)]
pub struct ChunkDraft {
    /// 0-based position across the whole document
    pub index: usize,

    /// 1-based page the chunk starts on
    pub page_number: u32,

    /// Character start position within the page
    pub char_start: usize,

    /// Character end position within the page
    pub char_end: usize,

    /// The chunk text
    pub text: String,

    /// Blake3 hash of the chunk text
    pub hash: String,
}

/// Compute a stable hash for a string
pub fn compute_text_hash(text: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(text.as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Split extracted pages into chunks.
///
/// Chunks never span pages; the page number travels with each chunk so
/// retrieval can attribute results. The global chunk index is assigned in
/// page order and is the stable tiebreak key for ranking.
pub fn split_document(extracted: &ExtractedText, config: &ChunkConfig) -> Vec<ChunkDraft> {
    let mut chunks = Vec::new();
    let mut index = 0;

    for page in &extracted.pages {
        for piece in split_page(&page.text, config) {
            chunks.push(ChunkDraft {
                index,
                page_number: page.number,
                char_start: piece.start,
                char_end: piece.end,
                text: piece.text.clone(),
                hash: compute_text_hash(&piece.text),
            });
            index += 1;
        }
    }

    chunks
}

struct PagePiece {
    start: usize,
    end: usize,
    text: String,
}

fn split_page(text: &str, config: &ChunkConfig) -> Vec<PagePiece> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let break_points = find_break_points(text);
    let mut pieces = Vec::new();
    let mut current_start = ensure_char_boundary(text, 0);

    while current_start < text.len() {
        let target_end = current_start + config.max_chars;

        let chunk_end = if target_end >= text.len() {
            text.len()
        } else {
            find_best_break(text, current_start, config, &break_points)
        };

        let chunk_end = ensure_char_boundary(text, chunk_end);
        if chunk_end <= current_start {
            break;
        }

        let raw = &text[current_start..chunk_end];
        let chunk_text = raw.trim();
        // Offsets describe the trimmed span, so slicing the page with them
        // yields exactly the stored text
        let text_start = current_start + (raw.len() - raw.trim_start().len());
        let text_end = text_start + chunk_text.len();
        let is_last = chunk_end >= text.len();

        // Merge tail fragments into nothing rather than emit noise,
        // except when the fragment is the entire page
        if !chunk_text.is_empty() && (chunk_text.len() >= config.min_chars || pieces.is_empty() || is_last)
        {
            pieces.push(PagePiece {
                start: text_start,
                end: text_end,
                text: chunk_text.to_string(),
            });
        }

        if is_last {
            break;
        }

        // Step forward with overlap
        current_start = if chunk_end > current_start + config.overlap_chars {
            ensure_char_boundary(text, chunk_end - config.overlap_chars)
        } else {
            chunk_end
        };
    }

    pieces
}

/// Find the best break point near the target chunk size.
///
/// Searches the window between 60% and 100% of `max_chars` past the start
/// and picks the highest-priority boundary; falls back to the last space,
/// then to a hard cut at `max_chars`.
fn find_best_break(
    text: &str,
    start: usize,
    config: &ChunkConfig,
    break_points: &[BreakPoint],
) -> usize {
    let min_pos = ensure_char_boundary(text, start + (config.max_chars * 3 / 5));
    let max_pos = ensure_char_boundary(text, (start + config.max_chars).min(text.len()));

    let best = break_points
        .iter()
        .filter(|p| p.position > min_pos && p.position <= max_pos)
        .max_by_key(|p| (p.priority, p.position));
    if let Some(point) = best {
        return point.position;
    }

    // Fall back to the last space in the window
    if min_pos < max_pos {
        let window = &text[min_pos..max_pos];
        if let Some((i, _)) = window.rmatch_indices(' ').next() {
            return min_pos + i + 1;
        }
    }

    max_pos
}
