//! Chapter and part heading detection.
//!
//! A line counts as a chapter heading when it carries a chapter keyword
//! (`Chapter 3`, `PART TWO`, `Prologue`) and either is a Markdown heading or
//! stands alone between blank lines. Table-of-contents listings therefore
//! never qualify: their entries sit on consecutive lines.
//!
//! Without keyword headings, top-level Markdown headings are used instead.

use crate::model::{ChapterDetection, ChapterInfo};
use regex::Regex;
use std::sync::LazyLock;

/// Standalone headings longer than this are prose.
const MAX_HEADING_LEN: usize = 80;

static RE_NUMBERED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*)?(chapter|ch\.|part|book)\s+([0-9]{1,3}|[ivxlcdm]{1,7}|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve|thirteen|fourteen|fifteen|sixteen|seventeen|eighteen|nineteen|twenty)\b\s*(?:[.:—–-]\s*)?(.*?)(?:\*\*)?\s*$",
    )
    .unwrap()
});

static RE_NAMED_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:#{1,6}\s*)?(?:\*\*)?(prologue|epilogue|interlude|introduction)\b\s*(?:[.:—–-]\s*(.*?))?(?:\*\*)?\s*$",
    )
    .unwrap()
});

static RE_MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap());

/// Kind of a structural heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterKind {
    /// `Part`/`Book` grouping several chapters.
    Part,
    Chapter,
    /// Prologue, epilogue, interlude, or introduction.
    Named,
}

impl ChapterKind {
    /// Suggested Markdown heading level for this kind.
    pub fn suggested_heading_level(&self) -> u8 {
        match self {
            ChapterKind::Part => 1,
            ChapterKind::Chapter | ChapterKind::Named => 2,
        }
    }
}

/// A parsed chapter heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterHeading {
    pub kind: ChapterKind,
    pub number: Option<String>,
    pub title: Option<String>,
}

/// Parses a chapter keyword heading without checking its surroundings.
pub fn parse_chapter_heading(line: &str) -> Option<ChapterHeading> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_HEADING_LEN {
        return None;
    }

    if let Some(caps) = RE_NUMBERED_HEADING.captures(trimmed) {
        let keyword = caps[1].to_lowercase();
        let kind = if keyword == "part" || keyword == "book" {
            ChapterKind::Part
        } else {
            ChapterKind::Chapter
        };
        let title = caps
            .get(3)
            .map(|m| m.as_str().trim().to_string())
            .filter(|t| !t.is_empty());
        return Some(ChapterHeading {
            kind,
            number: Some(caps[2].to_string()),
            title,
        });
    }

    if let Some(caps) = RE_NAMED_HEADING.captures(trimmed) {
        let name = capitalize(&caps[1]);
        let title = caps
            .get(2)
            .map(|m| format!("{}: {}", name, m.as_str().trim()))
            .filter(|t| !t.ends_with(": "))
            .unwrap_or(name);
        return Some(ChapterHeading {
            kind: ChapterKind::Named,
            number: None,
            title: Some(title),
        });
    }

    None
}

fn capitalize(word: &str) -> String {
    let lower = word.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Numeric value of a chapter number written as digits, a Roman numeral, or a word.
pub fn chapter_number_value(number: &str) -> Option<u32> {
    const WORDS: &[&str] = &[
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven",
        "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
        "nineteen", "twenty",
    ];

    if let Ok(n) = number.parse::<u32>() {
        return Some(n);
    }
    let lower = number.to_lowercase();
    if let Some(idx) = WORDS.iter().position(|w| *w == lower) {
        return Some(idx as u32 + 1);
    }
    roman_value(&lower)
}

fn roman_value(numeral: &str) -> Option<u32> {
    let mut total = 0u32;
    let mut previous = 0u32;
    for c in numeral.chars().rev() {
        let value = match c {
            'i' => 1,
            'v' => 5,
            'x' => 10,
            'l' => 50,
            'c' => 100,
            'd' => 500,
            'm' => 1000,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

fn is_blank(lines: &[&str], index: Option<usize>) -> bool {
    match index {
        Some(i) => lines.get(i).map_or(true, |l| l.trim().is_empty()),
        None => true,
    }
}

/// Returns true if line `i` is separated from surrounding text.
pub(crate) fn stands_alone(lines: &[&str], i: usize) -> bool {
    is_blank(lines, i.checked_sub(1)) && is_blank(lines, Some(i + 1))
}

/// Returns true if line `i` opens a chapter, part, or named section.
pub fn is_chapter_start(lines: &[&str], i: usize) -> bool {
    let Some(line) = lines.get(i) else {
        return false;
    };
    parse_chapter_heading(line).is_some()
        && (line.trim_start().starts_with('#') || stands_alone(lines, i))
}

/// Title on the line after a bare `Chapter 3` heading, if short.
fn following_title(lines: &[&str], i: usize) -> Option<String> {
    lines
        .iter()
        .skip(i + 1)
        .take(3)
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().trim_start_matches('#').trim())
        .filter(|l| {
            l.chars().count() <= 60 && !l.ends_with('.') && parse_chapter_heading(l).is_none()
        })
        .map(str::to_string)
}

/// Detects chapter and part headings. Line numbers are 1-based.
pub fn detect_chapters(lines: &[&str]) -> ChapterDetection {
    let mut chapters = Vec::new();
    let mut parts = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !is_chapter_start(lines, i) {
            continue;
        }
        let Some(heading) = parse_chapter_heading(line) else {
            continue;
        };

        let title = heading.title.clone().or_else(|| following_title(lines, i));
        let label = match (&heading.kind, &heading.number) {
            (ChapterKind::Part, Some(n)) => format!("Part {}", n),
            (_, Some(n)) => format!("Chapter {}", n),
            _ => String::new(),
        };
        let info = ChapterInfo {
            number: heading.number.clone(),
            title: title.unwrap_or(label),
            start_line: i + 1,
        };
        match heading.kind {
            ChapterKind::Part => parts.push(info),
            _ => chapters.push(info),
        }
    }

    if chapters.is_empty() {
        chapters = markdown_heading_chapters(lines);
    }

    if chapters.is_empty() {
        return ChapterDetection {
            parts,
            ..ChapterDetection::default()
        };
    }

    let mut confidence = 0.5 + 0.1 * chapters.len().min(3) as f64;
    if is_sequential(&chapters) {
        confidence += 0.1;
    }

    ChapterDetection {
        detected: true,
        chapters,
        parts,
        confidence: confidence.min(0.9),
    }
}

/// Top-level headings when at least two exist, else second-level when at least three.
fn markdown_heading_chapters(lines: &[&str]) -> Vec<ChapterInfo> {
    let headings: Vec<(usize, usize, String)> = lines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            RE_MARKDOWN_HEADING
                .captures(line)
                .map(|caps| (i, caps[1].len(), caps[2].to_string()))
        })
        .collect();

    for (level, minimum) in [(1, 2), (2, 3)] {
        let selected: Vec<ChapterInfo> = headings
            .iter()
            .filter(|(_, l, _)| *l == level)
            .map(|(i, _, title)| ChapterInfo {
                number: None,
                title: title.clone(),
                start_line: i + 1,
            })
            .collect();
        if selected.len() >= minimum {
            return selected;
        }
    }

    Vec::new()
}

/// Returns true if numbered chapters increase by one, as in `1, 2, 3`.
fn is_sequential(chapters: &[ChapterInfo]) -> bool {
    let values: Vec<u32> = chapters
        .iter()
        .filter_map(|c| c.number.as_deref().and_then(chapter_number_value))
        .collect();
    values.len() >= 2 && values.windows(2).all(|w| w[1] == w[0] + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_numbered_heading() {
        let heading = parse_chapter_heading("## Chapter 3: The Storm").unwrap();
        assert_eq!(heading.kind, ChapterKind::Chapter);
        assert_eq!(heading.number.as_deref(), Some("3"));
        assert_eq!(heading.title.as_deref(), Some("The Storm"));

        let part = parse_chapter_heading("PART TWO").unwrap();
        assert_eq!(part.kind, ChapterKind::Part);
        assert_eq!(part.title, None);
    }

    #[test]
    fn test_parse_named_heading() {
        let heading = parse_chapter_heading("# Prologue").unwrap();
        assert_eq!(heading.kind, ChapterKind::Named);
        assert_eq!(heading.title.as_deref(), Some("Prologue"));
    }

    #[test]
    fn test_prose_is_not_a_heading() {
        assert!(parse_chapter_heading(
            "Chapter one of my life was hard, and I will tell you why it was so hard in detail."
        )
        .is_none());
        assert!(parse_chapter_heading("The chapter ended.").is_none());
    }

    #[test]
    fn test_number_values() {
        assert_eq!(chapter_number_value("12"), Some(12));
        assert_eq!(chapter_number_value("XIV"), Some(14));
        assert_eq!(chapter_number_value("Seven"), Some(7));
        assert_eq!(chapter_number_value("abc"), None);
    }

    #[test]
    fn test_detect_standalone_chapters() {
        let lines = [
            "Chapter 1",
            "",
            "The Beginning",
            "",
            "Text of one.",
            "",
            "Chapter 2",
            "",
            "Text of two.",
        ];
        let detection = detect_chapters(&lines);
        assert!(detection.detected);
        assert_eq!(detection.chapters.len(), 2);
        assert_eq!(detection.chapters[0].start_line, 1);
        assert_eq!(detection.chapters[0].title, "The Beginning");
        assert_eq!(detection.chapters[1].title, "Chapter 2");
        assert!(detection.confidence > 0.7);
    }

    #[test]
    fn test_toc_listing_is_ignored() {
        let lines = ["Contents", "Chapter 1: Start", "Chapter 2: End", "", "Body."];
        assert!(!detect_chapters(&lines).detected);
    }

    #[test]
    fn test_markdown_fallback() {
        let lines = ["# First", "", "text", "", "# Second", "", "more"];
        let detection = detect_chapters(&lines);
        assert_eq!(detection.chapters.len(), 2);
        assert_eq!(detection.chapters[1].start_line, 5);
    }

    #[test]
    fn test_parts_are_separate() {
        let lines = ["# Part I", "", "## Chapter 1", "", "x", "", "## Chapter 2"];
        let detection = detect_chapters(&lines);
        assert_eq!(detection.parts.len(), 1);
        assert_eq!(detection.chapters.len(), 2);
    }
}
