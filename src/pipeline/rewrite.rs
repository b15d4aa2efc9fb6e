//! Heuristic paragraph repair and the acceptance check for service rewrites.

use crate::chunk::split_paragraphs;
use crate::shield::ContentShield;
use regex::Regex;
use std::sync::LazyLock;

/// Largest relative word-count change accepted from a rewrite.
pub const MAX_WORD_DEVIATION: f64 = 0.15;

/// Lines that start a structure which must keep its line breaks.
static RE_STRUCTURED_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:#{1,6}\s|\s*[-*+]\s|\s*\d+[.)]\s|>|\||```|~~~|    |\t|<!--|\[(?:CHAPTER|PART|END))").unwrap()
});

/// Why a rewritten chunk was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRejection {
    Empty,
    /// A shield token disappeared or was altered.
    LostPlaceholder,
    /// Word count moved more than [`MAX_WORD_DEVIATION`].
    WordDeviation,
}

/// Checks a service rewrite against its input.
pub fn check_rewrite(original: &str, rewritten: &str, shield: &ContentShield) -> Result<(), RewriteRejection> {
    if rewritten.trim().is_empty() {
        return Err(RewriteRejection::Empty);
    }
    if !shield.preserved(original, rewritten) {
        return Err(RewriteRejection::LostPlaceholder);
    }
    let before = original.split_whitespace().count();
    let after = rewritten.split_whitespace().count();
    if before > 0 {
        let deviation = (after as f64 - before as f64).abs() / before as f64;
        if deviation > MAX_WORD_DEVIATION {
            return Err(RewriteRejection::WordDeviation);
        }
    }
    Ok(())
}

fn is_structured(paragraph: &str) -> bool {
    paragraph.lines().any(|l| RE_STRUCTURED_LINE.is_match(l))
}

/// Joins two wrapped lines, rejoining a word hyphenated across the break.
fn join_wrapped(acc: &mut String, next: &str) {
    let next = next.trim();
    if next.is_empty() {
        return;
    }
    if acc.is_empty() {
        acc.push_str(next);
        return;
    }
    let hyphenated = acc.ends_with('-')
        && acc[..acc.len() - 1]
            .chars()
            .next_back()
            .is_some_and(char::is_alphabetic)
        && next.chars().next().is_some_and(char::is_lowercase);
    if hyphenated {
        acc.pop();
    } else {
        acc.push(' ');
    }
    acc.push_str(next);
}

/// Rejoins hard-wrapped prose so each paragraph is one line.
///
/// Headings, lists, tables, code, and quotes keep their line breaks.
pub fn reflow_paragraphs(text: &str) -> String {
    split_paragraphs(text)
        .into_iter()
        .map(|paragraph| {
            if is_structured(paragraph) || !paragraph.contains('\n') {
                return paragraph.to_string();
            }
            let mut joined = String::with_capacity(paragraph.len());
            for line in paragraph.lines() {
                join_wrapped(&mut joined, line);
            }
            joined
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn ends_sentence(word: &str) -> bool {
    let core = word.trim_end_matches(['"', '\'', '”', '’', ')']);
    core.ends_with(['.', '!', '?'])
}

/// Splits one prose paragraph at sentence ends into parts of at most `max_words`.
///
/// A single sentence longer than the limit is kept whole.
fn split_paragraph(paragraph: &str, max_words: usize) -> Vec<String> {
    let mut sentences: Vec<Vec<&str>> = vec![Vec::new()];
    for word in paragraph.split_whitespace() {
        if let Some(current) = sentences.last_mut() {
            current.push(word);
        }
        if ends_sentence(word) {
            sentences.push(Vec::new());
        }
    }
    sentences.retain(|s| !s.is_empty());

    let mut parts: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for sentence in sentences {
        if !current.is_empty() && current.len() + sentence.len() > max_words {
            parts.push(std::mem::take(&mut current));
        }
        current.extend(sentence);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts.into_iter().map(|p| p.join(" ")).collect()
}

/// Returns true if any prose paragraph is longer than `max_words`.
pub fn has_long_paragraphs(text: &str, max_words: usize) -> bool {
    split_paragraphs(text)
        .into_iter()
        .any(|p| !is_structured(p) && p.split_whitespace().count() > max_words)
}

/// Breaks overlong prose paragraphs at sentence boundaries.
pub fn split_long_paragraphs(text: &str, max_words: usize) -> String {
    let max_words = max_words.max(1);
    split_paragraphs(text)
        .into_iter()
        .flat_map(|paragraph| {
            if is_structured(paragraph) || paragraph.split_whitespace().count() <= max_words {
                vec![paragraph.to_string()]
            } else {
                split_paragraph(paragraph, max_words)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflow_joins_and_dehyphenates() {
        let text = "The quick brown fox jum-\nped over the\nlazy dog.\n\nSecond para-\ngraph here.";
        assert_eq!(
            reflow_paragraphs(text),
            "The quick brown fox jumped over the lazy dog.\n\nSecond paragraph here."
        );
    }

    #[test]
    fn test_reflow_keeps_real_hyphens_and_structure() {
        let text = "A well-\nKnown name.\n\n- item one\n- item two\n\n| a | b |\n|---|---|";
        let out = reflow_paragraphs(text);
        assert!(out.starts_with("A well- Known name."));
        assert!(out.contains("- item one\n- item two"));
        assert!(out.contains("| a | b |\n|---|---|"));
    }

    #[test]
    fn test_split_long_paragraph_at_sentences() {
        let text = "One two three. Four five six. Seven eight nine.";
        let out = split_long_paragraphs(text, 6);
        assert_eq!(out, "One two three. Four five six.\n\nSeven eight nine.");
        assert!(has_long_paragraphs(text, 6));
        assert!(!has_long_paragraphs(&out, 6));
    }

    #[test]
    fn test_overlong_sentence_kept_whole() {
        let text = "a b c d e f g h.";
        assert_eq!(split_long_paragraphs(text, 3), text);
    }

    #[test]
    fn test_check_rewrite() {
        let (shielded, shield) = ContentShield::extract("Text with `code` inside.");
        assert_eq!(check_rewrite(&shielded, &shielded, &shield), Ok(()));
        assert_eq!(
            check_rewrite(&shielded, "Text with inside.", &shield),
            Err(RewriteRejection::LostPlaceholder)
        );

        let empty = ContentShield::for_input("");
        assert_eq!(
            check_rewrite("one two three four five six seven", "one two", &empty),
            Err(RewriteRejection::WordDeviation)
        );
        assert_eq!(check_rewrite("one", "  ", &empty), Err(RewriteRejection::Empty));
    }
}
