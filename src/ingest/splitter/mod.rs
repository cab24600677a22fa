#[cfg(test)]
mod tests;

use tracing::debug;

use super::Chunk;
use crate::{RagError, Result};

/// Natural break points, most preferred first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Whitespace,
}

const BOUNDARY_PREFERENCE: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Whitespace,
];

impl Boundary {
    /// Whether a chunk ending right before `end` stops on this kind of boundary
    fn ends_at(self, chars: &[char], end: usize) -> bool {
        let last = chars.get(end.wrapping_sub(1)).copied();
        let before_last = end.checked_sub(2).and_then(|i| chars.get(i)).copied();

        match self {
            Self::Paragraph => last == Some('\n') && before_last == Some('\n'),
            Self::Line => last == Some('\n'),
            Self::Sentence => {
                last.is_some_and(char::is_whitespace)
                    && matches!(before_last, Some('.' | '!' | '?'))
            }
            Self::Whitespace => last.is_some_and(char::is_whitespace),
        }
    }
}

/// Split text into chunks of at most `chunk_size` characters
///
/// Every chunk after the first starts exactly `overlap` characters before the
/// end of the previous one. Chunk ends prefer paragraph breaks, then line
/// breaks, then sentence ends, then whitespace, and fall back to a hard cut.
/// Lengths and offsets are counted in characters, not bytes.
#[inline]
pub fn split(raw_text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(RagError::InvalidConfig(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    if overlap >= chunk_size {
        return Err(RagError::InvalidConfig(format!(
            "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
        )));
    }

    let chars: Vec<char> = raw_text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let window_end = start.saturating_add(chunk_size);
        let end = if window_end >= total {
            total
        } else {
            find_break(&chars, start + overlap, window_end)
        };

        chunks.push(Chunk {
            id: chunks.len(),
            text: chars[start..end].iter().collect(),
            source_offset: start,
        });

        if end == total {
            break;
        }

        // end > start + overlap, so this always advances
        start = end - overlap;
    }

    debug!(
        "Split {} characters into {} chunks (chunk_size={}, overlap={})",
        total,
        chunks.len(),
        chunk_size,
        overlap
    );

    Ok(chunks)
}

/// Pick a chunk end in `(min_exclusive, max_end]`
fn find_break(chars: &[char], min_exclusive: usize, max_end: usize) -> usize {
    BOUNDARY_PREFERENCE
        .iter()
        .find_map(|boundary| {
            ((min_exclusive + 1)..=max_end)
                .rev()
                .find(|&end| boundary.ends_at(chars, end))
        })
        .unwrap_or(max_end)
}
