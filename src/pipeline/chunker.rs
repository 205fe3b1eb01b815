//! Sentence-aligned text chunking
//!
//! Splits contract text into ordered chunks of at most `chunk_size`
//! characters, plus one when a sentence ends exactly at the window edge.
//! A boundary snaps back to just after the last period inside the window,
//! the edge itself included, so sentences stay whole; without one the
//! window is cut hard.
//! Chunks are trimmed, and chunks that trim to nothing are not emitted.

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 5000;

/// Split `text` into trimmed, sentence-aligned chunks.
///
/// Sizes count `char`s, not bytes, so multi-byte text never splits inside
/// a code point. A `chunk_size` of 0 is treated as 1.
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    let chunk_size = chunk_size.max(1);

    // Byte offset of every char, plus the end of the text.
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < total {
        let mut end = start + chunk_size;
        if end < total {
            if let Some(period) = last_period_in(&chars, start, end) {
                end = period + 1;
            }
        } else {
            end = total;
        }

        let chunk = text[offsets[start]..offsets[end]].trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        start = end;
    }
    chunks
}

/// Index of the last '.' strictly after `start`, up to and including `end`.
fn last_period_in(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let last = end.min(chars.len().saturating_sub(1));
    (start + 1..=last).rev().find(|&i| chars[i] == '.')
}
