//! Chunker (C2): overlapping semantic-boundary segmentation.
//!
//! Sliding window of `chunk_size`; when the raw window lands mid-text, only
//! the last 20% of the window is searched for a preferred boundary, in
//! priority order: paragraph break, sentence end, line break, word break.
//! Searching a fixed trailing fraction (rather than scanning the whole
//! window from the start) keeps chunks close to the target size while still
//! guaranteeing the next window's overlap lands on a sane boundary.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpan {
    pub chunk_index: usize,
    pub start_char: usize,
    pub end_char: usize,
}

#[derive(Debug, Clone)]
pub struct ChunkOutput {
    pub text: String,
    pub span: ChunkSpan,
}

pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    pub fn chunk(&self, text: &str) -> Vec<ChunkOutput> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        while start < text.len() {
            let raw_end = (start + self.chunk_size).min(text.len());
            let end = snap_to_char_boundary(text, raw_end);

            let actual_end = if end < text.len() {
                find_break_point(text, start, end)
            } else {
                end
            };

            let chunk_text = &text[start..actual_end];
            chunks.push(ChunkOutput {
                text: chunk_text.to_string(),
                span: ChunkSpan {
                    chunk_index: index,
                    start_char: start,
                    end_char: actual_end,
                },
            });
            index += 1;

            let window_len = actual_end - start;
            let step = if window_len > self.chunk_overlap {
                window_len - self.chunk_overlap
            } else {
                window_len.max(1)
            };

            let raw_next = start + step;
            let next = snap_to_char_boundary(text, raw_next);
            if next <= start || next >= text.len() {
                break;
            }
            start = next;
        }

        chunks
    }

    /// Split a chunk roughly in half at a semantic boundary within ±20% of
    /// the midpoint, used by the Embedding Engine's overflow recovery
    /// (§4.4). Returns `(first_half, second_half_with_overlap)`.
    pub fn split_on_overflow(&self, text: &str) -> (String, String) {
        let midpoint = text.len() / 2;
        let tolerance = (text.len() as f64 * 0.2) as usize;
        let search_start = snap_to_char_boundary(text, midpoint.saturating_sub(tolerance));
        let search_end = snap_to_char_boundary(text, (midpoint + tolerance).min(text.len()));

        let split_at = if search_start < search_end {
            find_break_point_in_range(text, search_start, search_end).unwrap_or_else(|| {
                snap_to_char_boundary(text, midpoint)
            })
        } else {
            snap_to_char_boundary(text, midpoint)
        };

        let first = &text[..split_at];
        let second = &text[split_at..];

        let overlap_len = self.chunk_overlap.min(first.len() / 4);
        let overlap_start = snap_to_char_boundary(first, first.len().saturating_sub(overlap_len));
        let overlap = &first[overlap_start..];

        (first.to_string(), format!("{overlap}{second}"))
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(2000, 200)
    }
}

/// Search only the final 20% of `[start, preferred_end)` for a boundary, in
/// priority order: double newline, single newline, sentence, word. Falls
/// back to `preferred_end` if nothing matches.
fn find_break_point(text: &str, start: usize, preferred_end: usize) -> usize {
    let window_len = preferred_end - start;
    let search_fraction = (window_len as f64 * 0.8) as usize;
    let raw_search_start = start + search_fraction;
    let search_start = snap_to_char_boundary(text, raw_search_start.min(preferred_end));

    find_break_point_in_range(text, search_start, preferred_end).unwrap_or(preferred_end)
}

fn find_break_point_in_range(text: &str, search_start: usize, search_end: usize) -> Option<usize> {
    if search_start >= search_end {
        return None;
    }
    let region = &text[search_start..search_end];

    if let Some(pos) = region.rfind("\n\n") {
        return Some(search_start + pos + 2);
    }
    if let Some(pos) = region.rfind('\n') {
        return Some(search_start + pos + 1);
    }
    if let Some(pos) = region.rfind(". ") {
        return Some(search_start + pos + 2);
    }
    if let Some(pos) = region.rfind(' ') {
        return Some(search_start + pos + 1);
    }
    None
}

/// Snap a byte offset to the nearest valid UTF-8 char boundary (rounding
/// down). A no-op if `pos` is already on a boundary or past the end.
fn snap_to_char_boundary(text: &str, pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    let mut p = pos;
    while p > 0 && !text.is_char_boundary(p) {
        p -= 1;
    }
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_produces_single_chunk() {
        let chunker = TextChunker::new(2000, 200);
        let chunks = chunker.chunk("hello world");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].span.start_char, 0);
        assert_eq!(chunks[0].span.end_char, 11);
    }

    #[test]
    fn chunks_are_contiguous_and_indexed_from_zero() {
        let text = "paragraph one.\n\n".repeat(50);
        let chunker = TextChunker::new(200, 40);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.span.chunk_index, i);
        }
    }

    #[test]
    fn overlap_is_respected_between_consecutive_chunks() {
        let text = "word ".repeat(500);
        let chunker = TextChunker::new(300, 50);
        let chunks = chunker.chunk(&text);
        for pair in chunks.windows(2) {
            assert!(pair[1].span.start_char < pair[0].span.end_char);
        }
    }

    #[test]
    fn reconstructed_text_covers_original_within_tolerance() {
        let text = "Sentence one. Sentence two. Sentence three. ".repeat(40);
        let chunker = TextChunker::new(200, 20);
        let chunks = chunker.chunk(&text);
        let covered: usize = chunks
            .iter()
            .map(|c| c.span.end_char - c.span.start_char)
            .sum();
        // With overlap, covered length exceeds the original; it must never
        // fall short of it (that would mean a gap was skipped).
        assert!(covered >= text.len());
    }

    #[test]
    fn split_on_overflow_preserves_both_halves_with_overlap() {
        let chunker = TextChunker::new(2000, 200);
        let text = "Sentence one. Sentence two. Sentence three. Sentence four.".repeat(20);
        let (first, second) = chunker.split_on_overflow(&text);
        assert!(!first.is_empty());
        assert!(!second.is_empty());
        assert!(second.len() > text.len() / 2 - first.len());
    }
}
