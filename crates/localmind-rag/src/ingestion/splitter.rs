//! Recursive character splitting with overlap and span tracking
//!
//! Breaks are chosen inside each window by preference: paragraph break,
//! then sentence boundary, then whitespace, then a hard cut at the window
//! end. Consecutive spans overlap by at most `overlap` characters and never
//! leave a gap, so the original text can be rebuilt from the span offsets.

use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{meta, Chunk, Document};

/// A span of the source text, in character offsets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    /// First character (inclusive)
    pub start: usize,
    /// Last character (exclusive)
    pub end: usize,
    /// Span text with surrounding whitespace trimmed
    pub text: String,
}

/// Text splitter with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextSplitter {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Maximum overlap between consecutive chunks
    overlap: usize,
}

impl TextSplitter {
    /// Create a new splitter; `overlap` must be smaller than `chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than 0".into()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Create from config
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split documents in order, chunk indices restart per document
    pub fn split_documents(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|doc| self.split_document(doc)).collect()
    }

    /// Split one document into chunks inheriting its metadata
    pub fn split_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.content)
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let mut metadata = doc.metadata.clone();
                metadata.insert(meta::CHUNK_INDEX.to_string(), index.to_string());
                metadata.insert(meta::START_INDEX.to_string(), span.start.to_string());
                Chunk::new(span.text, metadata)
            })
            .collect()
    }

    /// Split text into overlapping spans
    ///
    /// Whitespace-only spans are dropped, as are spans whose content lies
    /// entirely inside the previous span's overlap band.
    pub fn split_text(&self, text: &str) -> Vec<TextSpan> {
        let chars: Vec<char> = text.chars().collect();
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = chars.len();

        let mut spans = Vec::new();
        let mut start = 0usize;
        let mut covered = 0usize;

        while start < total {
            let end = if total - start <= self.chunk_size {
                total
            } else {
                self.find_break(text, &bounds, &chars, start)
            };

            let content_end = (start..end)
                .rev()
                .find(|&i| !chars[i].is_whitespace())
                .map(|i| i + 1);
            if content_end.map_or(false, |content_end| content_end > covered) {
                spans.push(TextSpan {
                    start,
                    end,
                    text: text[bounds[start]..bounds[end]].trim().to_string(),
                });
                covered = end;
            }

            if end == total {
                break;
            }
            start = self.next_start(&chars, end);
        }

        spans
    }

    /// Pick the end of the span starting at `start` (window larger than chunk_size remains)
    fn find_break(&self, text: &str, bounds: &[usize], chars: &[char], start: usize) -> usize {
        let window_end = start + self.chunk_size;
        // A break must leave room for the overlap so the next span moves forward
        let min_end = start + self.overlap + 1;
        let base = bounds[start];
        let window = &text[base..bounds[window_end]];

        let to_char = |byte: usize| bounds.binary_search(&(base + byte)).ok();
        let acceptable = |pos: &usize| *pos >= min_end && *pos <= window_end;

        let paragraph = window
            .match_indices("\n\n")
            .filter_map(|(i, sep)| to_char(i + sep.len()))
            .filter(acceptable)
            .last();
        if let Some(pos) = paragraph {
            return pos;
        }

        let sentence = window
            .split_sentence_bound_indices()
            .filter(|(i, _)| *i > 0)
            .filter_map(|(i, _)| to_char(i))
            .filter(acceptable)
            .last();
        if let Some(pos) = sentence {
            return pos;
        }

        let whitespace = (min_end..=window_end)
            .rev()
            .find(|&pos| chars[pos - 1].is_whitespace());
        if let Some(pos) = whitespace {
            return pos;
        }

        window_end
    }

    /// Start of the next span: inside the overlap band, at a word start when one exists
    fn next_start(&self, chars: &[char], end: usize) -> usize {
        let lo = end - self.overlap;
        (lo..end)
            .find(|&pos| pos > 0 && chars[pos - 1].is_whitespace() && !chars[pos].is_whitespace())
            .unwrap_or(lo)
    }
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileKind;

    /// Deterministic letters-only text
    fn unique_text(len: usize) -> String {
        (0..len)
            .map(|i| {
                let v = (i as u64).wrapping_mul(2654435761) % 52;
                if v < 26 {
                    (b'a' + v as u8) as char
                } else {
                    (b'A' + (v - 26) as u8) as char
                }
            })
            .collect()
    }

    /// Pseudo-random prose with paragraphs, sentences and multibyte characters
    fn prose(words: usize) -> String {
        let vocab = ["alpha", "beta", "gamma", "delta", "épsilon", "zeta", "ηta", "theta", "iota"];
        let mut out = String::new();
        let mut seed = 7u64;
        for i in 0..words {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            out.push_str(vocab[(seed >> 33) as usize % vocab.len()]);
            match (seed >> 20) % 23 {
                0 => out.push_str(".\n\n"),
                1 | 2 => out.push_str(". "),
                3 => out.push('\n'),
                _ => out.push(' '),
            }
            if i % 97 == 0 {
                out.push_str("  ");
            }
        }
        out
    }

    fn rebuild(text: &str, spans: &[TextSpan]) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut covered = 0usize;
        for span in spans {
            let from = covered.max(span.start);
            out.extend(&chars[from..span.end]);
            covered = span.end;
        }
        out
    }

    #[test]
    fn test_rejects_overlap_not_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(0, 0).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_hard_cut_windows() {
        let text = unique_text(2500);
        let splitter = TextSplitter::new(1000, 200).unwrap();
        let spans = splitter.split_text(&text);

        assert_eq!(spans.len(), 3);
        assert_eq!((spans[0].start, spans[0].end), (0, 1000));
        assert_eq!((spans[1].start, spans[1].end), (800, 1800));
        assert_eq!((spans[2].start, spans[2].end), (1600, 2500));
        assert_eq!(&spans[0].text[800..], &spans[1].text[..200]);
    }

    #[test]
    fn test_trailing_whitespace_adds_no_duplicate_tail() {
        let text = format!("{}     ", unique_text(1000));
        let splitter = TextSplitter::new(1000, 200).unwrap();
        let spans = splitter.split_text(&text);

        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (0, 1000));
        assert_eq!(spans[0].text, text.trim());
    }

    #[test]
    fn test_deterministic() {
        let text = prose(3000);
        let splitter = TextSplitter::default();
        assert_eq!(splitter.split_text(&text), splitter.split_text(&text));

        let doc = Document::new(text, "notes.txt", FileKind::PlainText);
        assert_eq!(splitter.split_document(&doc), splitter.split_document(&doc));
    }

    #[test]
    fn test_bounds_and_overlap() {
        let text = prose(4000);
        for (size, overlap) in [(1000, 200), (300, 50), (64, 0), (50, 49)] {
            let splitter = TextSplitter::new(size, overlap).unwrap();
            let spans = splitter.split_text(&text);
            assert!(!spans.is_empty());

            let chars: Vec<char> = text.chars().collect();
            for pair in spans.windows(2) {
                assert!(pair[1].start > pair[0].start);
                if pair[1].start > pair[0].end {
                    // only a dropped whitespace-only span may sit in between
                    assert!(chars[pair[0].end..pair[1].start].iter().all(|c| c.is_whitespace()));
                }
                assert!(pair[0].end.saturating_sub(pair[1].start) <= overlap);
            }
            for span in &spans {
                assert!(span.end - span.start <= size);
                assert!(span.text.chars().count() <= size);
                assert!(!span.text.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_lossless_reconstruction() {
        let text = prose(2500);
        let splitter = TextSplitter::new(400, 80).unwrap();
        let spans = splitter.split_text(&text);

        let non_ws = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
        assert_eq!(non_ws(&rebuild(&text, &spans)), non_ws(&text));

        let chars: Vec<char> = text.chars().collect();
        for span in &spans {
            let raw: String = chars[span.start..span.end].iter().collect();
            assert_eq!(raw.trim(), span.text);
        }
    }

    #[test]
    fn test_prefers_paragraph_breaks() {
        let first = "a".repeat(60);
        let second = "b".repeat(60);
        let text = format!("{}\n\n{} tail words here", first, second);
        let splitter = TextSplitter::new(100, 10).unwrap();
        let spans = splitter.split_text(&text);

        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, first);
        assert_eq!(spans[0].end, 62);
        assert_eq!(spans[1].start, 52);
        assert!(spans[1].text.ends_with("tail words here"));
    }

    #[test]
    fn test_prefers_sentence_over_whitespace() {
        let text = "One short sentence here. Another sentence follows it and then keeps going on and on without end";
        let splitter = TextSplitter::new(60, 5).unwrap();
        let spans = splitter.split_text(text);

        assert_eq!(spans[0].text, "One short sentence here.");
    }

    #[test]
    fn test_whitespace_only_dropped() {
        let splitter = TextSplitter::new(10, 2).unwrap();
        assert!(splitter.split_text("   \n\n\t  ").is_empty());
        assert!(splitter.split_text("").is_empty());

        let text = format!("{}{}{}", "x".repeat(8), " ".repeat(30), "y".repeat(8));
        let spans = splitter.split_text(&text);
        assert!(spans.iter().all(|s| !s.text.trim().is_empty()));
        assert_eq!(spans.first().map(|s| s.text.as_str()), Some("xxxxxxxx"));
        assert_eq!(spans.last().map(|s| s.text.as_str()), Some("yyyyyyyy"));
    }

    #[test]
    fn test_chunk_metadata_inherited() {
        let doc = Document::page(unique_text(2500), "r.pdf", FileKind::Pdf, 2, 5);
        let chunks = TextSplitter::default().split_document(&doc);

        assert_eq!(chunks.len(), 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.source(), "r.pdf");
            assert_eq!(chunk.page(), Some(2));
            assert_eq!(chunk.chunk_index(), Some(i));
        }
        assert_eq!(chunks[1].metadata.get(meta::START_INDEX).map(String::as_str), Some("800"));
    }
}
