//! Citation and footnote detection and removal.
//!
//! All removal runs on shielded text: code, math, and tables are replaced
//! by tokens first, then URLs, DOIs, and decimal numbers, so `3.14` or a
//! `[3]` inside a table can never be taken for a citation. Bibliography
//! entries and everything under a references heading are left intact.

use crate::model::{CitationDetection, CitationStyle, FootnoteDetection, FootnoteMarkerStyle};
use crate::shield::{ContentShield, ShieldKind};
use regex::{Captures, Regex};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Longest text a single service-supplied pattern may remove.
const MAX_PATTERN_MATCH_LEN: usize = 60;

/// Share of prose words a single service-supplied pattern may remove.
const MAX_PATTERN_WORD_SHARE: f64 = 0.1;

/// Patterns removing at most this many words are never capped.
const PATTERN_CAP_FLOOR_WORDS: usize = 10;

/// Ordinary text no service-supplied pattern may match.
const PLAIN_PROSE: &[&str] = &[
    "",
    " ",
    "the",
    "The Quiet River",
    "rose in 2001",
    "page 12",
    "3.14",
];

/// Words that legitimately carry `²`/`³`.
const UNIT_WORDS: &[&str] = &["km", "cm", "mm", "ft", "sq", "in", "yd", "mi", "dm", "nm"];

// ============================================================================
// Protected literals
// ============================================================================

static RE_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s)>\]]+").unwrap());

static RE_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:doi:\s*)?10\.\d{4,9}/[^\s)\]]+").unwrap());

static RE_DECIMAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+[.,]\d+\b").unwrap());

// ============================================================================
// Citation patterns
// ============================================================================

static RE_AUTHOR_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    let author = r"[A-Z][A-Za-z'’\-]+(?:(?:,? and |,? & |, )[A-Z][A-Za-z'’\-]+)*(?: et al\.?)?";
    let year = r"(?:1[5-9]|20)\d{2}[a-z]?";
    let pages = r"(?:,? (?:p|pp)\. ?\d+(?:[-–]\d+)?)?";
    let single = format!(r"{author},? {year}{pages}");
    Regex::new(&format!(
        r"[ \t]?\((?:(?:see|cf\.) )?{single}(?:; {single})*\)"
    ))
    .unwrap()
});

static RE_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]?\[\d{1,3}(?:\s*[,–\-]\s*\d{1,3})*\]").unwrap());

static RE_SUPERSCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\p{L}{2,})([.,;:!?"')\]]?)([⁰¹²³⁴⁵⁶⁷⁸⁹]+)"#).unwrap()
});

// ============================================================================
// Footnote patterns
// ============================================================================

static RE_CARET_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\^[^\]\s]{1,10}\]").unwrap());

static RE_SUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<sup>\s*\[?[0-9a-z*†‡]{1,4}\]?\s*</sup>").unwrap());

static RE_SYMBOL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\p{L}.,;:!?"')])[†‡]+"#).unwrap());

/// OCR flattens superscript note numbers into `word.12 Next`
static RE_FLAT_NOTE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([a-z]{2,}[.,;:!?"')])(\d{1,3})(\s+[A-Z"“]|$)"#).unwrap());

static RE_FOOTNOTE_DEFINITION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}\[\^[^\]]+\]:").unwrap());

// ============================================================================
// Bibliography
// ============================================================================

static RE_BIBLIOGRAPHY_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[-*]\s+|\[\d+\]\s*|\d+\.\s+)?[A-Z][A-Za-z'’\-]+,\s+(?:[A-Z]\.\s?)+.*(?:1[5-9]|20)\d{2}",
    )
    .unwrap()
});

static RE_REFERENCES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^#{1,6}\s*(?:references|bibliography|works cited|sources|literature cited)\s*$")
        .unwrap()
});

static RE_HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#{1,6}\s").unwrap());

/// Returns true for a line that looks like a bibliography entry,
/// such as `Smith, J. (2001). Title.`.
pub fn is_bibliography_entry(line: &str) -> bool {
    RE_BIBLIOGRAPHY_ENTRY.is_match(line)
}

/// Result of a removal pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceRemoval {
    pub content: String,
    /// Number of markers or lines removed.
    pub removed: usize,
    /// Service-supplied patterns skipped for matching too much prose.
    pub skipped_patterns: Vec<String>,
}

impl ReferenceRemoval {
    fn unchanged(input: &str) -> Self {
        Self {
            content: input.to_string(),
            removed: 0,
            skipped_patterns: Vec::new(),
        }
    }
}

// ============================================================================
// Shielded prose
// ============================================================================

/// Returns true if `range` sits between `[` and `]` on its line.
fn inside_brackets(text: &str, range: Range<usize>) -> bool {
    let before = &text[..range.start];
    let before = &before[before.rfind('\n').map_or(0, |i| i + 1)..];
    let after = text[range.end..].split('\n').next().unwrap_or("");

    let opened = before
        .rfind('[')
        .is_some_and(|open| before.rfind(']').map_or(true, |close| close < open));
    let closed = after
        .find(']')
        .is_some_and(|close| after.find('[').map_or(true, |open| close < open));
    opened && closed
}

/// Document text with code, math, tables, URLs, DOIs, and decimals shielded.
///
/// A decimal inside brackets stays visible so `[3,5]` can still be read as
/// a citation.
struct ProseText {
    text: String,
    shield: ContentShield,
}

impl ProseText {
    fn new(input: &str) -> Self {
        let (text, mut shield) = ContentShield::extract(input);
        let text = shield.protect_matches(&text, &RE_URL, ShieldKind::Literal);
        let text = shield.protect_matches(&text, &RE_DOI, ShieldKind::Literal);
        let outside_brackets = |text: &str, range| !inside_brackets(text, range);
        let text =
            shield.protect_matches_where(&text, &RE_DECIMAL, ShieldKind::Literal, outside_brackets);
        Self { text, shield }
    }

    /// Shielded lines, each paired with whether it is prose. Lines under a
    /// references heading and bibliography entries are not prose.
    fn lines(&self) -> impl Iterator<Item = (&str, bool)> + '_ {
        let mut in_bibliography = false;
        self.text.split('\n').map(move |line| {
            let trimmed = line.trim_start();
            if RE_HEADING.is_match(trimmed) {
                in_bibliography = RE_REFERENCES_HEADING.is_match(trimmed.trim_end());
            }
            (line, !in_bibliography && !is_bibliography_entry(line))
        })
    }

    fn prose_lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines().filter_map(|(line, prose)| prose.then_some(line))
    }

    fn prose_words(&self) -> usize {
        self.prose_lines().map(|line| line.split_whitespace().count()).sum()
    }

    /// Applies `f` to every prose line, then restores the shielded text.
    fn rewrite<F>(&self, mut f: F) -> ReferenceRemoval
    where
        F: FnMut(&str) -> (String, usize),
    {
        let mut removed = 0;
        let lines: Vec<String> = self
            .lines()
            .map(|(line, prose)| {
                if !prose {
                    return line.to_string();
                }
                let (cleaned, count) = f(line);
                removed += count;
                cleaned
            })
            .collect();

        ReferenceRemoval {
            content: self.shield.restore(&lines.join("\n")),
            removed,
            skipped_patterns: Vec::new(),
        }
    }

    /// Matches of a service-supplied pattern that may be removed. Matching
    /// runs between tokens, so no match can cut into a shielded region.
    fn custom_matches<'l>(&self, line: &'l str, re: &Regex) -> Vec<&'l str> {
        self.shield
            .split_tokens(line)
            .into_iter()
            .filter(|(_, is_token)| !is_token)
            .flat_map(|(part, _)| re.find_iter(part).map(|m| m.as_str()))
            .filter(|m| is_removable_match(m))
            .collect()
    }

    fn replace_custom(&self, line: &str, re: &Regex, count: &mut usize) -> String {
        self.shield
            .split_tokens(line)
            .into_iter()
            .map(|(part, is_token)| {
                if is_token {
                    part.to_string()
                } else {
                    replace_counted(part, re, count, custom_replacement)
                }
            })
            .collect()
    }

    /// Drops patterns that would remove more than the allowed share of
    /// prose words. Returns the kept patterns and the skipped sources.
    fn cap_patterns(&self, patterns: Vec<Regex>) -> (Vec<Regex>, Vec<String>) {
        if patterns.is_empty() {
            return (patterns, Vec::new());
        }
        let total = self.prose_words();
        let mut skipped = Vec::new();
        let kept = patterns
            .into_iter()
            .filter(|re| {
                let words: usize = self
                    .prose_lines()
                    .flat_map(|line| self.custom_matches(line, re))
                    .map(|m| m.split_whitespace().count().max(1))
                    .sum();
                let share = if total == 0 { 1.0 } else { words as f64 / total as f64 };
                if words > PATTERN_CAP_FLOOR_WORDS && share > MAX_PATTERN_WORD_SHARE {
                    warn!(
                        pattern = re.as_str(),
                        words,
                        total,
                        "skipping pattern that matches too much prose"
                    );
                    skipped.push(re.as_str().to_string());
                    false
                } else {
                    true
                }
            })
            .collect();
        (kept, skipped)
    }
}

type Replacement = fn(&Captures, &str) -> Option<String>;

/// Replaces matches, keeping those for which `replacement` returns `None`.
fn replace_counted<F>(line: &str, re: &Regex, count: &mut usize, mut replacement: F) -> String
where
    F: FnMut(&Captures, &str) -> Option<String>,
{
    re.replace_all(line, |caps: &Captures| match replacement(caps, line) {
        Some(text) => {
            *count += 1;
            text
        }
        None => caps[0].to_string(),
    })
    .into_owned()
}

/// Matches `replacement` would actually rewrite.
fn accepted_matches<'l>(line: &'l str, re: &Regex, replacement: Replacement) -> Vec<&'l str> {
    re.captures_iter(line)
        .filter(|caps| replacement(caps, line).is_some())
        .filter_map(|caps| caps.get(0))
        .map(|m| m.as_str())
        .collect()
}

/// Compiles a service-supplied pattern, rejecting ones that are invalid,
/// could match empty text, or match ordinary prose.
pub fn compile_safe_pattern(pattern: &str) -> Option<Regex> {
    if pattern.is_empty() || pattern.len() > 200 {
        return None;
    }
    match Regex::new(pattern) {
        Ok(re) if !PLAIN_PROSE.iter().any(|prose| re.is_match(prose)) => Some(re),
        Ok(_) => {
            warn!(pattern, "rejecting over-broad reference pattern");
            None
        }
        Err(e) => {
            debug!(pattern, error = %e, "ignoring invalid reference pattern");
            None
        }
    }
}

/// A citation or note marker carries brackets with a number, or a
/// superscript digit.
fn has_citation_evidence(text: &str) -> bool {
    let bracketed = text.contains(['(', ')', '[', ']', '{', '}'])
        && text.chars().any(|c| c.is_ascii_digit());
    bracketed || text.contains(['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'])
}

fn is_removable_match(text: &str) -> bool {
    text.chars().count() <= MAX_PATTERN_MATCH_LEN && has_citation_evidence(text)
}

/// Compiles the service-supplied citation patterns that are safe and, when
/// samples were supplied, match at least one of them.
fn custom_citation_patterns(detection: &CitationDetection) -> Vec<Regex> {
    detection
        .patterns
        .iter()
        .filter(|p| !is_builtin_pattern(p))
        .filter_map(|p| compile_safe_pattern(p))
        .filter(|re| {
            let fits = detection.samples.is_empty()
                || detection
                    .samples
                    .iter()
                    .any(|sample| re.find_iter(sample).any(|m| is_removable_match(m.as_str())));
            if !fits {
                debug!(pattern = re.as_str(), "pattern matches none of the citation samples");
            }
            fits
        })
        .collect()
}

fn remove_match(_caps: &Captures, _line: &str) -> Option<String> {
    Some(String::new())
}

fn numeric_replacement(caps: &Captures, line: &str) -> Option<String> {
    let m = caps.get(0)?;
    let next = line[m.end()..].chars().next();
    let prev = line[..m.start()].chars().next_back();
    // `[1](url)`, `[1]:` definitions, and `[text][1]` reference links
    if matches!(next, Some('(' | ':' | '[')) || matches!(prev, Some(']' | '!')) {
        return None;
    }
    // A bracket starting the line is a list label, not a citation
    if line[..m.start()].trim().is_empty() {
        return None;
    }
    Some(String::new())
}

fn superscript_replacement(caps: &Captures, _line: &str) -> Option<String> {
    let word = &caps[1];
    let digits = &caps[3];
    let is_unit = UNIT_WORDS.contains(&word.to_lowercase().as_str());
    if is_unit && digits.chars().all(|c| matches!(c, '²' | '³')) {
        return None;
    }
    Some(format!("{}{}", word, &caps[2]))
}

fn custom_replacement(caps: &Captures, _line: &str) -> Option<String> {
    is_removable_match(&caps[0]).then(String::new)
}

// ============================================================================
// Citations
// ============================================================================

/// Detects the dominant in-text citation style.
///
/// A style needs at least three occurrences outside bibliography lines.
pub fn detect_citations(input: &str) -> CitationDetection {
    let prose = ProseText::new(input);
    let candidates: [(CitationStyle, &Regex, Replacement); 3] = [
        (CitationStyle::AuthorYear, &*RE_AUTHOR_YEAR, remove_match),
        (CitationStyle::Numeric, &*RE_NUMERIC, numeric_replacement),
        (CitationStyle::Superscript, &*RE_SUPERSCRIPT, superscript_replacement),
    ];

    let mut best: Option<(CitationStyle, &Regex, usize, Vec<String>)> = None;
    for (style, re, replacement) in candidates {
        let mut count = 0;
        let mut samples = Vec::new();
        for line in prose.prose_lines() {
            let found = accepted_matches(line, re, replacement);
            if let Some(first) = found.first() {
                if samples.len() < 3 {
                    samples.push(first.trim().to_string());
                }
            }
            count += found.len();
        }

        let better = best.as_ref().map_or(true, |(_, _, best, _)| count > *best);
        if count >= 3 && better {
            best = Some((style, re, count, samples));
        }
    }

    match best {
        Some((style, re, count, samples)) => CitationDetection {
            detected: true,
            style: Some(style),
            patterns: vec![re.as_str().to_string()],
            samples,
            confidence: (0.4 + count as f64 * 0.05).min(0.9),
        },
        None => CitationDetection::default(),
    }
}

/// Removes in-text citations of the detected style plus any safe
/// service-supplied patterns.
///
/// A service-supplied pattern only removes matches that carry citation
/// evidence, never touches shielded regions, and is skipped outright when
/// it would remove more than a small share of the prose.
pub fn remove_citations(input: &str, detection: &CitationDetection) -> ReferenceRemoval {
    if !detection.detected {
        return ReferenceRemoval::unchanged(input);
    }

    let prose = ProseText::new(input);
    let (custom, skipped) = prose.cap_patterns(custom_citation_patterns(detection));

    let mut removal = prose.rewrite(|line| {
        let mut count = 0;
        let mut text = match detection.style {
            Some(CitationStyle::AuthorYear) => {
                replace_counted(line, &RE_AUTHOR_YEAR, &mut count, remove_match)
            }
            Some(CitationStyle::Numeric) => {
                replace_counted(line, &RE_NUMERIC, &mut count, numeric_replacement)
            }
            Some(CitationStyle::Superscript) => {
                replace_counted(line, &RE_SUPERSCRIPT, &mut count, superscript_replacement)
            }
            _ => line.to_string(),
        };
        for re in &custom {
            text = prose.replace_custom(&text, re, &mut count);
        }
        (text, count)
    });
    removal.skipped_patterns = skipped;
    removal
}

fn is_builtin_pattern(pattern: &str) -> bool {
    [&*RE_AUTHOR_YEAR, &*RE_NUMERIC, &*RE_SUPERSCRIPT]
        .iter()
        .any(|re| re.as_str() == pattern)
}

// ============================================================================
// Footnotes
// ============================================================================

/// Detects the dominant footnote marker style from in-text markers.
///
/// Notes sections are located separately by the notes detector.
pub fn detect_footnote_markers(input: &str) -> FootnoteDetection {
    let prose = ProseText::new(input);
    let mut caret = 0;
    let mut sup = 0;
    let mut symbol = 0;

    for line in prose.prose_lines() {
        if !RE_FOOTNOTE_DEFINITION.is_match(line) {
            caret += RE_CARET_MARKER.find_iter(line).count();
        }
        sup += RE_SUP_TAG.find_iter(line).count();
        sup += accepted_matches(line, &RE_SUPERSCRIPT, superscript_replacement).len();
        symbol += RE_SYMBOL_MARKER.find_iter(line).count();
    }

    let (style, count, pattern) = [
        (FootnoteMarkerStyle::Caret, caret, RE_CARET_MARKER.as_str()),
        (FootnoteMarkerStyle::Superscript, sup, RE_SUPERSCRIPT.as_str()),
        (FootnoteMarkerStyle::Symbol, symbol, RE_SYMBOL_MARKER.as_str()),
    ]
    .into_iter()
    .max_by_key(|(_, count, _)| *count)
    .unwrap_or((FootnoteMarkerStyle::Unknown, 0, ""));

    if count < 2 {
        return FootnoteDetection::default();
    }

    FootnoteDetection {
        detected: true,
        marker_style: Some(style),
        marker_pattern: Some(pattern.to_string()),
        sections: Vec::new(),
        confidence: (0.5 + count as f64 * 0.05).min(0.9),
    }
}

/// Removes in-text footnote markers.
///
/// Caret markers and `<sup>` tags are always removed; other styles only
/// when detected. A service-supplied marker pattern gets the same checks
/// as a citation pattern.
pub fn remove_footnote_markers(input: &str, detection: &FootnoteDetection) -> ReferenceRemoval {
    let custom: Vec<Regex> = detection
        .marker_pattern
        .as_deref()
        .filter(|p| {
            ![&*RE_CARET_MARKER, &*RE_SUPERSCRIPT, &*RE_SYMBOL_MARKER]
                .iter()
                .any(|re| re.as_str() == *p)
        })
        .and_then(compile_safe_pattern)
        .into_iter()
        .collect();

    let prose = ProseText::new(input);
    let (custom, skipped) = if detection.detected {
        prose.cap_patterns(custom)
    } else {
        (Vec::new(), Vec::new())
    };

    let mut removal = prose.rewrite(|line| {
        if RE_FOOTNOTE_DEFINITION.is_match(line) {
            return (line.to_string(), 0);
        }

        let mut count = 0;
        let mut text = replace_counted(line, &RE_CARET_MARKER, &mut count, remove_match);
        text = replace_counted(&text, &RE_SUP_TAG, &mut count, remove_match);

        if detection.detected {
            match detection.marker_style {
                Some(FootnoteMarkerStyle::Superscript) => {
                    text = replace_counted(&text, &RE_SUPERSCRIPT, &mut count, superscript_replacement);
                    text = replace_counted(&text, &RE_FLAT_NOTE_NUMBER, &mut count, |caps, _| {
                        Some(format!("{}{}", &caps[1], &caps[3]))
                    });
                }
                Some(FootnoteMarkerStyle::Bracketed) => {
                    text = replace_counted(&text, &RE_NUMERIC, &mut count, numeric_replacement);
                }
                Some(FootnoteMarkerStyle::Symbol) => {
                    text = replace_counted(&text, &RE_SYMBOL_MARKER, &mut count, |caps, _| {
                        Some(caps[1].to_string())
                    });
                }
                _ => {}
            }
            for re in &custom {
                text = prose.replace_custom(&text, re, &mut count);
            }
        }

        (text, count)
    });
    removal.skipped_patterns = skipped;
    removal
}

/// Removes Markdown footnote definitions (`[^1]: ...`) and their
/// indented continuation lines. Definitions inside code stay.
pub fn remove_footnote_definitions(input: &str) -> ReferenceRemoval {
    let prose = ProseText::new(input);
    let mut lines = Vec::new();
    let mut removed = 0;
    let mut in_definition = false;

    for line in prose.text.split('\n') {
        if RE_FOOTNOTE_DEFINITION.is_match(line) {
            in_definition = true;
            removed += 1;
            continue;
        }
        if in_definition && (line.starts_with("    ") || line.starts_with('\t')) {
            removed += 1;
            continue;
        }
        in_definition = false;
        lines.push(line);
    }

    ReferenceRemoval {
        content: prose.shield.restore(&lines.join("\n")),
        removed,
        skipped_patterns: Vec::new(),
    }
}

/// Heuristic citation and footnote-marker stripping used by the normalizer.
pub fn strip_references(input: &str) -> String {
    let citations = detect_citations(input);
    let footnotes = detect_footnote_markers(input);
    let text = remove_citations(input, &citations).content;
    remove_footnote_markers(&text, &footnotes).content
}
