//! Overlapping document chunker.
//!
//! Long content is split into windows of `chunk_size` characters with
//! `chunk_overlap` characters of overlap. When a window would cut
//! mid-sentence, the break is pulled back to the last sentence boundary
//! within the final 20% of the window. The scan always advances by at
//! least one character.
//!
//! All offsets are in characters, not bytes, so CJK content chunks the
//! same way as ASCII.

use gofriq::{Error, Result};

/// Sentence boundaries considered when trimming a window.
const SENTENCE_BOUNDARIES: &[[char; 2]] =
    &[['.', ' '], ['.', '\n'], ['!', ' '], ['!', '\n'], ['?', ' '], ['?', '\n']];

/// Chunking configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters of overlap between consecutive chunks.
    pub chunk_overlap: usize,
    /// Chunks shorter than this are dropped.
    pub min_chunk_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200, min_chunk_size: 100 }
    }
}

impl ChunkConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::validation("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::validation("chunk_overlap must be less than chunk_size"));
        }
        Ok(())
    }
}

/// One chunk of document content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Deterministic id: `<doc_guid>_<index>`.
    pub chunk_id: String,
    pub document_guid: String,
    pub content: String,
    pub chunk_index: usize,
    /// Starting character offset in the original content.
    pub start_char: usize,
    /// Ending character offset (exclusive).
    pub end_char: usize,
}

/// Find the last sentence boundary in `window[search_start..]`, returning
/// the offset just past it (relative to the window start).
fn last_sentence_boundary(window: &[char], search_start: usize) -> Option<usize> {
    if search_start >= window.len() {
        return None;
    }
    let mut best: Option<usize> = None;
    for boundary in SENTENCE_BOUNDARIES {
        let mut i = window.len().saturating_sub(2);
        loop {
            if i < search_start {
                break;
            }
            if window[i] == boundary[0] && window[i + 1] == boundary[1] {
                let end = i + 2;
                if best.map_or(true, |b| end > b) {
                    best = Some(end);
                }
                break;
            }
            if i == 0 {
                break;
            }
            i -= 1;
        }
    }
    best
}

/// Split `content` into chunks for `document_guid`.
///
/// Short content (at most one window) becomes a single chunk regardless
/// of `min_chunk_size`.
pub fn chunk_document(
    document_guid: &str,
    content: &str,
    config: &ChunkConfig,
) -> Result<Vec<Chunk>> {
    config.validate()?;

    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= config.chunk_size {
        return Ok(vec![Chunk {
            chunk_id: format!("{document_guid}_0"),
            document_guid: document_guid.to_string(),
            content: content.to_string(),
            chunk_index: 0,
            start_char: 0,
            end_char: chars.len(),
        }]);
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0usize;

    while start < chars.len() {
        let mut end = (start + config.chunk_size).min(chars.len());

        // Prefer a sentence boundary within the last 20% of the window.
        if end < chars.len() {
            let search_start = (config.chunk_size * 4) / 5;
            if let Some(boundary) = last_sentence_boundary(&chars[start..end], search_start) {
                end = start + boundary;
            }
        }

        let chunk_content: String = chars[start..end].iter().collect();
        let trimmed = chunk_content.trim();
        if trimmed.chars().count() >= config.min_chunk_size {
            chunks.push(Chunk {
                chunk_id: format!("{document_guid}_{chunk_index}"),
                document_guid: document_guid.to_string(),
                content: trimmed.to_string(),
                chunk_index,
                start_char: start,
                end_char: end,
            });
            chunk_index += 1;
        }

        if end >= chars.len() {
            break;
        }

        // Overlap the next window, guaranteeing forward progress.
        let next = end.saturating_sub(config.chunk_overlap);
        start = if next <= start { start + 1 } else { next };
    }

    Ok(chunks)
}
