//! Pattern detection: heuristic region detectors, content evidence, chapters,
//! and the shared detection pass used by hybrid steps.

mod chapters;
pub mod evidence;
mod regions;

pub use chapters::{
    chapter_number_value, detect_chapters, is_chapter_start, parse_chapter_heading, ChapterHeading,
    ChapterKind,
};
pub use evidence::{verify, Evidence};
pub use regions::{
    detect_auxiliary_lists, detect_back_matter, detect_front_matter, detect_index,
    detect_notes_sections, detect_table_of_contents,
};

pub(crate) use regions::heading_level;

use crate::config::{CleaningConfiguration, ContentTypeHint, DefensePolicy};
use crate::model::{
    BoundaryInfo, ContentTypeFlags, DetectedPatterns, DetectionSource, RegionHint, RegionKind,
};
use crate::normalize::{detect_running_lines, page_number_patterns};
use crate::references::{detect_citations, detect_footnote_markers};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Outcome of one heuristic detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub kind: RegionKind,
    pub detected: bool,
    pub boundary: Option<BoundaryInfo>,
    pub confidence: f64,
    /// Names of the patterns that matched.
    pub matched_patterns: Vec<String>,
    pub explanation: String,
}

impl Detection {
    pub fn none(kind: RegionKind, explanation: impl Into<String>) -> Self {
        Self {
            kind,
            detected: false,
            boundary: None,
            confidence: 0.0,
            matched_patterns: Vec::new(),
            explanation: explanation.into(),
        }
    }

    pub fn found(
        kind: RegionKind,
        boundary: BoundaryInfo,
        matched_patterns: Vec<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            detected: true,
            confidence: boundary.confidence,
            boundary: Some(boundary),
            matched_patterns,
            explanation: explanation.into(),
        }
    }
}

/// Splits content into lines so that `join("\n")` restores it exactly.
pub fn split_lines(content: &str) -> Vec<&str> {
    content.split('\n').collect()
}

/// Runs the heuristic detector for a region kind.
///
/// Auxiliary lists and notes report their first block; use
/// [`detect_auxiliary_lists`] or [`detect_notes_sections`] for all of them.
pub fn detect_region(kind: RegionKind, lines: &[&str], policy: &DefensePolicy) -> Detection {
    match kind {
        RegionKind::FrontMatter => detect_front_matter(lines, policy),
        RegionKind::TableOfContents => detect_table_of_contents(lines, policy),
        RegionKind::Index => detect_index(lines, policy),
        RegionKind::BackMatter => detect_back_matter(lines, policy),
        RegionKind::AuxiliaryLists => match detect_auxiliary_lists(lines, policy).first() {
            Some(list) => Detection::found(
                kind,
                list.boundary(),
                vec!["aux_list_header".into(), "aux_list_entry".into()],
                format!("{} list", list.kind),
            ),
            None => Detection::none(kind, "no auxiliary list in the opening window"),
        },
        RegionKind::Notes => match detect_notes_sections(lines, policy).into_iter().next() {
            Some(section) => Detection::found(
                kind,
                section,
                vec!["notes_header".into()],
                "NOTES section",
            ),
            None => Detection::none(kind, "no NOTES section"),
        },
    }
}

// ============================================================================
// Content type flags
// ============================================================================

static RE_TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\|?\s*:?-{3,}:?\s*(?:\|\s*:?-{3,}:?\s*)+\|?\s*$").unwrap());

static RE_MATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$|\\\[|\\\(|\\(?:frac|sum|int|alpha|beta|sqrt)\b").unwrap());

static RE_DIALOGUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)^\s*["“'‘]\S.*[,.!?]["”'’]"#).unwrap());

static RE_ACADEMIC_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:abstract|methodology|hypothesis|et al\.|ibid\.|empirical|literature review)\b").unwrap()
});

static RE_TECHNICAL_TERMS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:function|parameter|configuration|install|algorithm|api|database|command)\b").unwrap()
});

/// Derives content-type flags from surface features of the text.
pub fn detect_content_flags(content: &str) -> ContentTypeFlags {
    let words = content.split_whitespace().count().max(1) as f64;
    let has_code = content.contains("```") || content.contains("~~~");
    let paragraphs: Vec<&str> = content.split("\n\n").filter(|p| !p.trim().is_empty()).collect();

    let dialogue = RE_DIALOGUE.find_iter(content).count();
    let academic_terms = RE_ACADEMIC_TERMS.find_iter(content).count();
    let technical_terms = RE_TECHNICAL_TERMS.find_iter(content).count();

    ContentTypeFlags {
        fiction: paragraphs.len() >= 5 && dialogue as f64 / paragraphs.len() as f64 >= 0.1,
        academic: academic_terms as f64 / words >= 0.002 || detect_citations(content).detected,
        technical: has_code || technical_terms as f64 / words >= 0.005,
        has_code,
        has_math: RE_MATH.is_match(content),
        has_tables: RE_TABLE_SEPARATOR.is_match(content),
        poetry: is_poetry(&paragraphs),
    }
}

/// Mostly multi-line stanzas of short lines. Code and tables do not count.
fn is_poetry(paragraphs: &[&str]) -> bool {
    let prose: Vec<&str> = paragraphs
        .iter()
        .copied()
        .filter(|p| {
            let start = p.trim_start();
            !start.starts_with("```") && !start.starts_with("~~~") && !start.starts_with('|')
        })
        .collect();
    if prose.len() < 3 {
        return false;
    }
    let stanzas = prose
        .iter()
        .filter(|p| {
            let lines: Vec<&str> = p.lines().collect();
            lines.len() >= 2
                && lines.iter().all(|l| {
                    let len = l.trim().chars().count();
                    len > 0 && len <= 50
                })
        })
        .count();
    stanzas as f64 / prose.len() as f64 >= 0.6
}

/// Applies a user content-type hint over detected flags.
pub fn apply_content_hint(flags: ContentTypeFlags, hint: ContentTypeHint) -> ContentTypeFlags {
    match hint {
        ContentTypeHint::Auto => flags,
        ContentTypeHint::Fiction => ContentTypeFlags {
            fiction: true,
            academic: false,
            ..flags
        },
        ContentTypeHint::NonFiction => ContentTypeFlags {
            fiction: false,
            ..flags
        },
        ContentTypeHint::Academic => ContentTypeFlags {
            academic: true,
            fiction: false,
            ..flags
        },
        ContentTypeHint::Technical => ContentTypeFlags {
            technical: true,
            fiction: false,
            ..flags
        },
        ContentTypeHint::Poetry => ContentTypeFlags {
            poetry: true,
            ..flags
        },
    }
}

// ============================================================================
// Shared detection pass
// ============================================================================

/// Heuristic pattern detection over the whole document.
///
/// The returned patterns carry revision 0; the caller stamps the content
/// revision they were computed against.
pub fn detect_patterns(content: &str, config: &CleaningConfiguration) -> DetectedPatterns {
    let lines = split_lines(content);
    let policy = &config.defense;
    let mut patterns = DetectedPatterns {
        page_number_patterns: page_number_patterns(),
        ..DetectedPatterns::default()
    };

    let running = detect_running_lines(
        content,
        config.header_footer_threshold,
        config.max_header_footer_length,
    );
    let (headers, footers) = split_running_lines(&lines, running);
    patterns.header_patterns = headers;
    patterns.footer_patterns = footers;

    for kind in [
        RegionKind::FrontMatter,
        RegionKind::TableOfContents,
        RegionKind::Index,
        RegionKind::BackMatter,
    ] {
        let detection = detect_region(kind, &lines, policy);
        tracing::debug!(region = %kind, detected = detection.detected, "{}", detection.explanation);
        if let Some(boundary) = detection.boundary {
            patterns.regions.insert(
                kind,
                RegionHint {
                    boundary,
                    source: DetectionSource::Heuristic,
                },
            );
        }
    }

    patterns.auxiliary_lists = detect_auxiliary_lists(&lines, policy);
    patterns.citations = detect_citations(content);

    let mut footnotes = detect_footnote_markers(content);
    footnotes.sections = detect_notes_sections(&lines, policy);
    if !footnotes.sections.is_empty() {
        footnotes.detected = true;
        footnotes.confidence = footnotes.confidence.max(0.75);
    }
    patterns.footnotes = footnotes;

    patterns.chapters = detect_chapters(&lines);
    patterns.content_flags = apply_content_hint(detect_content_flags(content), config.content_type);

    tracing::info!(
        regions = patterns.regions.len(),
        aux_lists = patterns.auxiliary_lists.len(),
        chapters = patterns.chapters.chapters.len(),
        citations = patterns.citations.detected,
        footnotes = patterns.footnotes.detected,
        "Heuristic pattern detection finished"
    );

    patterns
}

/// Escaped line regexes, split by whether the line mostly occurs near the
/// top or the bottom of a 40-line page.
fn split_running_lines(lines: &[&str], running: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut headers = Vec::new();
    let mut footers = Vec::new();
    for text in running {
        let (top, bottom) = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| l.trim() == text)
            .fold((0, 0), |(top, bottom), (i, _)| {
                if i % 40 < 20 {
                    (top + 1, bottom)
                } else {
                    (top, bottom + 1)
                }
            });
        let pattern = format!("^\\s*{}\\s*$", regex::escape(&text));
        if top >= bottom {
            headers.push(pattern);
        } else {
            footers.push(pattern);
        }
    }
    (headers, footers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_round_trip() {
        let content = "a\n\nb\n";
        assert_eq!(split_lines(content).join("\n"), content);
        assert_eq!(split_lines(content).len(), 4);
    }

    #[test]
    fn test_content_flags() {
        let flags = detect_content_flags("Intro\n\n```rust\nfn main() {}\n```\n\n| a | b |\n|---|---|\n| 1 | 2 |");
        assert!(flags.has_code);
        assert!(flags.technical);
        assert!(flags.has_tables);
        assert!(!flags.has_math);
        assert!(!flags.poetry);
    }

    #[test]
    fn test_poetry_flag() {
        let stanza = "The wind is low\nthe river slow\nand all is still";
        let content = [stanza; 4].join("\n\n");
        assert!(detect_content_flags(&content).poetry);
    }

    #[test]
    fn test_content_hint_overrides() {
        let flags = ContentTypeFlags {
            fiction: true,
            ..ContentTypeFlags::default()
        };
        let academic = apply_content_hint(flags, ContentTypeHint::Academic);
        assert!(academic.academic);
        assert!(!academic.fiction);
        assert_eq!(apply_content_hint(flags, ContentTypeHint::Auto), flags);
    }

    #[test]
    fn test_detect_patterns_finds_back_matter_and_notes() {
        let mut lines: Vec<String> = (0..120)
            .map(|i| format!("Ordinary sentence {} in the body of the book.", i))
            .collect();
        lines.extend(
            ["", "# Notes", "", "1. Smith, p. 4.", "2. Jones, p. 9."]
                .iter()
                .map(|s| s.to_string()),
        );
        let content = lines.join("\n");
        let patterns = detect_patterns(&content, &CleaningConfiguration::default());

        assert!(patterns.has_evidence(RegionKind::BackMatter));
        assert!(patterns.has_evidence(RegionKind::Notes));
        assert_eq!(patterns.footnotes.sections[0].start_line, Some(122));
        assert!(!patterns.has_evidence(RegionKind::FrontMatter));
        assert_eq!(patterns.revision, 0);
    }

    #[test]
    fn test_detect_region_dispatch() {
        let mut lines = vec!["Body text."; 20];
        lines.extend(["", "## Notes", "", "1. A.", "2. B."]);
        let detection = detect_region(RegionKind::Notes, &lines, &DefensePolicy::default());
        assert!(detection.detected);
        let boundary = detection.boundary.unwrap();
        assert_eq!((boundary.start_line, boundary.end_line), (Some(22), Some(25)));

        let detection = detect_region(RegionKind::BackMatter, &lines[..5], &DefensePolicy::default());
        assert!(!detection.detected);
    }
}
