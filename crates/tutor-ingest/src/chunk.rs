use crate::extract::ExtractedPage;
use crate::types::PendingChunk;

// Token counts aren't available without a tokenizer the rest of the corpus
// doesn't otherwise need; a 4-chars-per-token heuristic (common for English
// prose) keeps the windows in the right ballpark (§4.3 "800-1200 token
// overlapping windows, 10-15% overlap").
const CHARS_PER_TOKEN: usize = 4;
const WINDOW_TOKENS_MAX: usize = 1200;
const OVERLAP_PCT: f64 = 0.12;
const MIN_CHUNK_TOKENS: usize = 200;

/// Split extracted pages into overlapping windows, then merge any
/// undersized trailing chunk into its predecessor (§4.3 "merge short
/// chunks").
pub fn chunk_pages(document_id: &str, pages: &[ExtractedPage]) -> Vec<PendingChunk> {
    let window_chars = WINDOW_TOKENS_MAX * CHARS_PER_TOKEN;
    let overlap_chars = (window_chars as f64 * OVERLAP_PCT) as usize;
    let stride = window_chars.saturating_sub(overlap_chars).max(1);
    let min_chunk_chars = MIN_CHUNK_TOKENS * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut global_offset: i64 = 0;

    for page in pages {
        let text = page.text.trim();
        if text.is_empty() {
            global_offset += page.text.len() as i64;
            continue;
        }

        let bytes_len = text.len();
        let mut start = 0usize;
        while start < bytes_len {
            let end = (start + window_chars).min(bytes_len);
            let (slice, snapped_end) = char_boundary_slice(text, start, end);
            chunks.push(PendingChunk {
                document_id: document_id.to_string(),
                page: page.page,
                char_start: global_offset + start as i64,
                char_end: global_offset + snapped_end as i64,
                text: slice.to_string(),
            });
            if snapped_end >= bytes_len {
                break;
            }
            start += stride;
        }

        global_offset += page.text.len() as i64;
    }

    merge_short_trailing_chunks(chunks, min_chunk_chars)
}

/// Fold any chunk shorter than `min_chunk_chars` into its predecessor
/// within the same document, so a page break or final partial window never
/// yields a near-empty chunk on its own.
fn merge_short_trailing_chunks(chunks: Vec<PendingChunk>, min_chunk_chars: usize) -> Vec<PendingChunk> {
    let mut merged: Vec<PendingChunk> = Vec::with_capacity(chunks.len());

    for chunk in chunks {
        let is_short = chunk.text.len() < min_chunk_chars;
        match merged.last_mut() {
            Some(prev) if is_short && prev.document_id == chunk.document_id => {
                prev.text.push_str(&chunk.text);
                prev.char_end = chunk.char_end;
            }
            _ => merged.push(chunk),
        }
    }

    merged
}

/// Slice `text[start..end]` snapped outward to the nearest char boundary so
/// we never split a multi-byte UTF-8 sequence.
fn char_boundary_slice(text: &str, start: usize, end: usize) -> (&str, usize) {
    let mut end = end.min(text.len());
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    let mut start = start.min(end);
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    (&text[start..end], end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(text: &str) -> ExtractedPage {
        ExtractedPage {
            page: Some(1),
            text: text.to_string(),
        }
    }

    #[test]
    fn produces_single_chunk_for_short_document() {
        let pages = vec![page("a short document, well under one window.")];
        let chunks = chunk_pages("doc-1", &pages);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_id, "doc-1");
    }

    #[test]
    fn windows_overlap_for_long_documents() {
        let long_text = "word ".repeat(2000);
        let pages = vec![page(&long_text)];
        let chunks = chunk_pages("doc-2", &pages);
        assert!(chunks.len() > 1);
        // Consecutive windows should overlap: the second window's start
        // must be before the first window's end.
        assert!(chunks[1].char_start < chunks[0].char_end);
    }

    #[test]
    fn short_trailing_window_is_merged_into_predecessor() {
        // One full window plus a short remainder that would otherwise
        // become its own undersized chunk.
        let long_text = "w ".repeat(2400) + &"tail ".repeat(5);
        let pages = vec![page(&long_text)];
        let chunks = chunk_pages("doc-3", &pages);
        let last = chunks.last().unwrap();
        assert!(last.text.len() >= MIN_CHUNK_TOKENS * CHARS_PER_TOKEN || chunks.len() == 1);
    }

    #[test]
    fn never_splits_a_utf8_boundary() {
        let pages = vec![page(&"α".repeat(3000))];
        let chunks = chunk_pages("doc-4", &pages);
        for chunk in &chunks {
            assert!(chunk.text.is_char_boundary(0));
            assert!(std::str::from_utf8(chunk.text.as_bytes()).is_ok());
        }
    }
}
