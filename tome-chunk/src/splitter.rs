//! Splits document text into bounded, overlapping chunks for embedding and
//! retrieval.
//!
//! A document is cut into windows of at most a configured byte length, with a
//! configured overlap carried between consecutive windows of the same
//! document. Each window tries to end at the most natural available boundary:
//! a paragraph break first, then a sentence end, then any whitespace, and
//! only as a last resort an arbitrary character position. Overlap keeps
//! context that straddles a cut visible to both neighboring chunks.
//!
//! Splitting is deterministic: the same text and the same configuration
//! always produce the same chunk sequence. Chunks never span two documents
//! because the splitter is invoked once per document.
//!
//! # Usage
//!
//! ```
//! use tome_chunk::TextSplitter;
//!
//! let splitter = TextSplitter::new(1000, 200);
//! let chunks = splitter.split("report.txt", "First paragraph.\n\nSecond paragraph.");
//!
//! assert_eq!(chunks.len(), 1); // short input fits a single chunk
//! assert_eq!(chunks[0].source_name, "report.txt");
//! assert_eq!(chunks[0].position, 0);
//! ```

use regex::Regex;
use serde::Serialize;

/// Default maximum chunk length in bytes.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks of the same document, in bytes.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A contiguous segment of a source document, the unit of embedding and
/// retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Name of the document this chunk was cut from.
    pub source_name: String,
    /// Order of this chunk within its document (0-indexed).
    pub position: usize,
    /// The chunk text.
    pub text: String,
}

/// Boundary-aware text splitter with a maximum chunk size and an overlap
/// carried between consecutive chunks.
///
/// Sizes are measured in bytes; cut points are always adjusted to valid
/// UTF-8 boundaries, so a chunk may undershoot the configured sizes by a few
/// bytes around multi-byte characters.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    max_chunk_size: usize,
    overlap: usize,
    paragraph: Regex,
    sentence: Regex,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl TextSplitter {
    /// Creates a splitter producing chunks of at most `max_chunk_size` bytes
    /// with `overlap` bytes shared between consecutive chunks.
    ///
    /// # Panics
    ///
    /// Panics if `max_chunk_size` is zero or `overlap >= max_chunk_size`;
    /// both are configuration errors the caller must not make.
    pub fn new(max_chunk_size: usize, overlap: usize) -> Self {
        assert!(max_chunk_size > 0, "max_chunk_size must be positive");
        assert!(
            overlap < max_chunk_size,
            "overlap ({overlap}) must be smaller than max_chunk_size ({max_chunk_size})"
        );

        TextSplitter {
            max_chunk_size,
            overlap,
            paragraph: Regex::new(r"\n\s*\n").unwrap(),
            sentence: Regex::new(r#"[.!?]["')\]]*\s"#).unwrap(),
        }
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `content` into ordered chunks attributed to `source_name`.
    ///
    /// Empty input yields no chunks; non-empty input never yields an empty
    /// chunk. Consecutive chunks share `overlap` bytes of text, adjusted to
    /// character boundaries.
    pub fn split(&self, source_name: &str, content: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        if content.is_empty() {
            return chunks;
        }

        let mut start = 0usize;
        loop {
            let end = if content.len() - start <= self.max_chunk_size {
                content.len()
            } else {
                self.break_before(content, start)
            };

            chunks.push(Chunk {
                source_name: source_name.to_string(),
                position: chunks.len(),
                text: content[start..end].to_string(),
            });

            if end == content.len() {
                break;
            }
            // Carry the overlap into the next window, unless boundary
            // snapping would stall the scan.
            let mut next = end.saturating_sub(self.overlap);
            if next <= start {
                next = end;
            }
            start = ceil_char_boundary(content, next);
        }

        chunks
    }

    // Picks the end of the window starting at `start`, preferring paragraph
    // breaks, then sentence ends, then whitespace, then a hard cut at the
    // size limit. The chosen end must leave the next window's start
    // (end - overlap) strictly past `start` so the scan always advances.
    fn break_before(&self, text: &str, start: usize) -> usize {
        let mut limit = floor_char_boundary(text, start + self.max_chunk_size);
        if limit <= start {
            // max_chunk_size smaller than the next character; overshoot
            // rather than emit nothing.
            limit = ceil_char_boundary(text, start + 1);
        }
        let window = &text[start..limit];
        let min_len = self.overlap + 1;

        last_match_end(&self.paragraph, window, min_len)
            .or_else(|| last_match_end(&self.sentence, window, min_len))
            .or_else(|| last_whitespace_end(window, min_len))
            .map(|end| start + end)
            .unwrap_or(limit)
    }
}

fn last_match_end(pattern: &Regex, window: &str, min_len: usize) -> Option<usize> {
    pattern
        .find_iter(window)
        .map(|m| m.end())
        .filter(|&end| end >= min_len)
        .last()
}

fn last_whitespace_end(window: &str, min_len: usize) -> Option<usize> {
    window
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| end >= min_len)
        .last()
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let splitter = TextSplitter::new(500, 100);
        let content = "A short note that easily fits in one chunk.";
        let chunks = splitter.split("note.txt", content);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, content);
        assert_eq!(chunks[0].position, 0);
        assert_eq!(chunks[0].source_name, "note.txt");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let splitter = TextSplitter::default();
        assert!(splitter.split("empty.txt", "").is_empty());
    }

    #[test]
    fn boundary_free_text_matches_chunk_count_formula() {
        // With no natural boundaries at all, chunk windows advance by
        // exactly (max - overlap) bytes, giving ceil((L - O) / (M - O)).
        let cases = [(1000usize, 300usize, 100usize), (500, 300, 100), (1024, 256, 64)];
        for (len, max, overlap) in cases {
            let content = "x".repeat(len);
            let splitter = TextSplitter::new(max, overlap);
            let chunks = splitter.split("solid.txt", &content);
            let expected = (len - overlap).div_ceil(max - overlap);
            assert_eq!(
                chunks.len(),
                expected,
                "L={len} M={max} O={overlap}: got {} chunks",
                chunks.len()
            );
            for chunk in &chunks {
                assert!(!chunk.text.is_empty());
                assert!(chunk.text.len() <= max);
            }
        }
    }

    #[test]
    fn consecutive_chunks_share_the_configured_overlap() {
        let overlap = 50;
        // Varied boundary-free content so overlap equality is meaningful.
        let content: String = (0..700u32)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let splitter = TextSplitter::new(200, overlap);
        let chunks = splitter.split("solid.txt", &content);

        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let tail = &pair[0].text[pair[0].text.len() - overlap..];
            let head = &pair[1].text[..overlap];
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn prefers_paragraph_breaks_over_hard_cuts() {
        let first = "First paragraph with a reasonable amount of text in it.";
        let second = "Second paragraph, also with enough text to matter here.";
        let content = format!("{first}\n\n{second}");
        let splitter = TextSplitter::new(first.len() + 20, 10);
        let chunks = splitter.split("doc.txt", &content);

        assert!(chunks.len() >= 2);
        // The first chunk ends at the paragraph break, not mid-sentence.
        assert!(chunks[0].text.starts_with(first));
        assert!(chunks[0].text.trim_end().ends_with('.'));
    }

    #[test]
    fn prefers_sentence_ends_when_no_paragraph_break_fits() {
        let content =
            "One sentence here. Another sentence follows it. And then a third one arrives. \
             Finally a fourth sentence closes the text out completely."
                .to_string();
        let splitter = TextSplitter::new(60, 0);
        let chunks = splitter.split("doc.txt", &content);

        assert!(chunks.len() > 1);
        // Every non-final chunk ends right after sentence punctuation.
        for chunk in &chunks[..chunks.len() - 1] {
            let trimmed = chunk.text.trim_end();
            assert!(
                trimmed.ends_with('.') || trimmed.ends_with('!') || trimmed.ends_with('?'),
                "chunk did not break at a sentence end: {:?}",
                chunk.text
            );
        }
    }

    #[test]
    fn splitting_is_deterministic() {
        let content = "Some repeated text. ".repeat(100);
        let splitter = TextSplitter::new(150, 30);
        let first = splitter.split("doc.txt", &content);
        let second = splitter.split("doc.txt", &content);
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_never_panics_or_empties() {
        let content = "väldigt långa stycken på svenska — åäö ".repeat(60);
        let splitter = TextSplitter::new(120, 40);
        let chunks = splitter.split("svenska.txt", &content);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(!chunk.text.is_empty());
            // Every chunk is valid UTF-8 cut on character boundaries by
            // construction; re-encoding must round-trip.
            assert_eq!(chunk.text, String::from_utf8(chunk.text.as_bytes().to_vec()).unwrap());
        }
    }

    #[test]
    fn positions_are_sequential_per_document() {
        let content = "z".repeat(2000);
        let splitter = TextSplitter::new(300, 50);
        let chunks = splitter.split("big.txt", &content);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.position, i);
        }
    }

    #[test]
    #[should_panic(expected = "overlap")]
    fn overlap_must_be_smaller_than_max_size() {
        TextSplitter::new(100, 100);
    }
}
