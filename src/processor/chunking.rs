//! # Text Chunking Module
//!
//! Splits extracted page text into bounded, overlapping windows for embedding.
//!
//! ## Chunking Strategy
//!
//! 1. Take a window of at most `chunk_size` characters from the current start
//! 2. Pull the window's end back to the last paragraph break, line break,
//!    sentence end or space in its second half, in that order of preference
//! 3. Start the next window `chunk_overlap` characters before that end,
//!    nudged forward to the start of a word
//!
//! Every chunk is an exact slice of the input and records where it starts,
//! so the original text can be stitched back together by dropping the
//! overlapping prefix of each chunk.

use crate::processor::ChunkOptions;
use crate::processor::error::ProcessError;
use serde::Serialize;
use tracing::{debug, instrument};

/// Preferred split points, best first
const SEPARATORS: &[&[char]] = &[&['\n', '\n'], &['\n'], &['.', ' '], &[' ']];

/// A chunk of text with metadata
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TextChunk {
    /// The text of the chunk
    pub text: String,

    /// The position of the chunk in the original document
    pub position: usize,

    /// Character offset of the chunk's first character in the document
    pub start_offset: usize,
}

/// Chunk text into overlapping windows
///
/// # Arguments
///
/// * `text` - The text to chunk
/// * `options` - Chunking options
///
/// # Returns
///
/// The chunks in document order. Blank input gives no chunks.
#[instrument(skip(text), fields(chars = text.len()))]
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Result<Vec<TextChunk>, ProcessError> {
    let ChunkOptions {
        chunk_size,
        chunk_overlap,
    } = *options;
    if chunk_size == 0 {
        return Err(ProcessError::Chunking("chunk size must be positive".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(ProcessError::Chunking(format!(
            "chunk overlap ({}) must be smaller than chunk size ({})",
            chunk_overlap, chunk_size
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let window_end = (start + chunk_size).min(total);
        let end = if window_end == total {
            total
        } else {
            find_break(&chars, start, window_end)
        };

        let piece: String = chars[start..end].iter().collect();
        if !piece.trim().is_empty() {
            chunks.push(TextChunk {
                text: piece,
                position: chunks.len(),
                start_offset: start,
            });
        }

        if end == total {
            break;
        }
        let next = end.saturating_sub(chunk_overlap).max(start + 1);
        start = snap_to_word_start(&chars, next, end);
    }

    debug!(chunks = chunks.len(), "Chunked text");
    Ok(chunks)
}

/// Best end position for a window `[start, window_end)`
fn find_break(chars: &[char], start: usize, window_end: usize) -> usize {
    let earliest = start + (window_end - start) / 2;
    for separator in SEPARATORS {
        let len = separator.len();
        if window_end < earliest + len {
            continue;
        }
        let mut i = window_end - len;
        loop {
            if chars[i..i + len] == **separator {
                return i + len;
            }
            if i == earliest {
                break;
            }
            i -= 1;
        }
    }
    window_end
}

/// Move `pos` forward to the next word start, but never to `limit` or beyond
fn snap_to_word_start(chars: &[char], pos: usize, limit: usize) -> usize {
    let mut i = pos;
    while i < limit && i > 0 && !chars[i - 1].is_whitespace() {
        i += 1;
    }
    while i < limit && chars[i].is_whitespace() {
        i += 1;
    }
    if i < limit { i } else { pos }
}
