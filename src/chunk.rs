//! Word-bounded, paragraph-aligned chunking for service submission.
//!
//! Chunks never overlap in content. Each chunk carries the tail of the
//! previous chunk as a read-only context hint, so merging is plain
//! concatenation.

use crate::config::CleaningConfiguration;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static RE_PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*(?:\n[ \t]*)+").unwrap());

/// One slice of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Zero-based position in the chunk sequence.
    pub index: usize,
    /// Whole paragraphs joined by blank lines.
    pub content: String,
    /// Trailing words of the previous chunk. Never part of the output.
    pub context: String,
    pub word_count: usize,
}

/// Greedy paragraph accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    target_words: usize,
    overlap_words: usize,
}

impl Chunker {
    pub fn new(target_words: usize, overlap_words: usize) -> Self {
        Self {
            target_words: target_words.max(1),
            overlap_words,
        }
    }

    pub fn from_config(config: &CleaningConfiguration) -> Self {
        Self::new(config.chunk_target_words, config.chunk_overlap_words)
    }

    /// Splits content into chunks of at most `target_words`, except that a
    /// single paragraph longer than the target becomes its own chunk.
    pub fn chunk(&self, content: &str) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_words = 0;

        for paragraph in split_paragraphs(content) {
            let words = paragraph.split_whitespace().count();
            if !current.is_empty() && current_words + words > self.target_words {
                self.close(&mut chunks, &current, current_words);
                current.clear();
                current_words = 0;
            }
            current.push(paragraph);
            current_words += words;
        }

        if !current.is_empty() {
            self.close(&mut chunks, &current, current_words);
        }

        chunks
    }

    fn close(&self, chunks: &mut Vec<Chunk>, paragraphs: &[&str], word_count: usize) {
        let context = chunks
            .last()
            .map(|prev| trailing_words(&prev.content, self.overlap_words))
            .unwrap_or_default();
        chunks.push(Chunk {
            index: chunks.len(),
            content: paragraphs.join("\n\n"),
            context,
            word_count,
        });
    }
}

/// Splits content on blank lines, dropping empty paragraphs.
pub fn split_paragraphs(content: &str) -> Vec<&str> {
    RE_PARAGRAPH_BREAK
        .split(content)
        .map(|p| p.trim_start_matches('\n').trim_end())
        .filter(|p| !p.trim().is_empty())
        .collect()
}

fn trailing_words(text: &str, count: usize) -> String {
    if count == 0 {
        return String::new();
    }
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(count);
    words[start..].join(" ")
}

/// Chunks content with explicit sizes.
pub fn chunk(content: &str, target_words: usize, overlap_words: usize) -> Vec<Chunk> {
    Chunker::new(target_words, overlap_words).chunk(content)
}

/// Joins processed chunks in order, one blank line between them.
///
/// No deduplication happens here; repeated paragraphs in the source are
/// legitimate content.
pub fn merge<I, S>(chunks: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result = String::new();
    for chunk in chunks {
        let text = chunk.as_ref().trim_matches('\n').trim_end();
        if text.trim().is_empty() {
            continue;
        }
        if !result.is_empty() {
            result.push_str("\n\n");
        }
        result.push_str(text);
    }
    result
}

/// Rough token estimate for usage accounting.
pub struct TokenCounter;

impl TokenCounter {
    /// ~4 characters per token for Latin text, ~2 for CJK.
    pub fn estimate(text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }

        if text.is_ascii() {
            return (text.len() as u64).div_ceil(4);
        }

        let mut char_count = 0u64;
        let mut cjk_count = 0u64;
        for c in text.chars() {
            char_count += 1;
            if is_cjk_char(c) {
                cjk_count += 1;
            }
        }

        let non_cjk = char_count - cjk_count;
        cjk_count.div_ceil(2) + non_cjk.div_ceil(4)
    }
}

#[inline]
fn is_cjk_char(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code) // CJK Unified Ideographs
        || (0x3040..=0x30FF).contains(&code) // Hiragana, Katakana
        || (0xAC00..=0xD7AF).contains(&code) // Hangul
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(words: usize, tag: &str) -> String {
        (0..words)
            .map(|i| format!("{}{}", tag, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_split_paragraphs() {
        let parts = split_paragraphs("a b\nc\n\n\n  \nd e\n\n");
        assert_eq!(parts, vec!["a b\nc", "d e"]);
    }

    #[test]
    fn test_greedy_accumulation() {
        let content = [paragraph(40, "a"), paragraph(40, "b"), paragraph(40, "c")].join("\n\n");
        let chunks = chunk(&content, 100, 10);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].word_count, 80);
        assert_eq!(chunks[1].word_count, 40);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn test_oversized_paragraph_is_not_split() {
        let content = [paragraph(10, "a"), paragraph(500, "b"), paragraph(10, "c")].join("\n\n");
        let chunks = chunk(&content, 100, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].word_count, 500);
    }

    #[test]
    fn test_context_is_previous_tail_only() {
        let content = [paragraph(50, "a"), paragraph(50, "b")].join("\n\n");
        let chunks = chunk(&content, 60, 5);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].context, "");
        assert_eq!(chunks[1].context, "a45 a46 a47 a48 a49");
        assert!(!chunks[1].content.contains("a49"));
    }

    #[test]
    fn test_merge_round_trip() {
        let content = [paragraph(30, "a"), paragraph(30, "b"), paragraph(30, "c")].join("\n\n");
        let chunks = chunk(&content, 35, 10);
        let merged = merge(chunks.iter().map(|c| c.content.as_str()));
        assert_eq!(merged, content);
    }

    #[test]
    fn test_merge_keeps_repeated_paragraphs() {
        let merged = merge(["Same paragraph.", "Same paragraph.", "\n\nOther.\n"]);
        assert_eq!(merged, "Same paragraph.\n\nSame paragraph.\n\nOther.");
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(TokenCounter::estimate(""), 0);
        assert_eq!(TokenCounter::estimate("abcdefgh"), 2);
        assert_eq!(TokenCounter::estimate("abcde"), 2);
        assert_eq!(TokenCounter::estimate("漢字漢字"), 2);
    }
}
