//! Content markers that identify each region kind.
//!
//! Shared by the content-verification phase of the boundary defense and by
//! the heuristic detectors, so a heuristic boundary always carries the
//! evidence verification looks for.

use crate::model::RegionKind;
use regex::Regex;
use std::sync::LazyLock;

/// Region headers must appear within this many non-blank lines of the start.
pub const HEADER_WINDOW: usize = 5;

/// Share of non-blank lines that must be note entries in a notes range
/// without a header.
const MIN_NOTE_ENTRY_DENSITY: f64 = 0.5;

/// Header lines longer than this are prose, not headers.
const MAX_HEADER_LEN: usize = 60;

// ============================================================================
// Headers (matched against the stripped header text)
// ============================================================================

pub(crate) static RE_CONTENTS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:table of contents|contents|contents at a glance|brief contents)$").unwrap()
});

pub(crate) static RE_AUX_LIST_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:list of (?:figures|tables|illustrations|maps|plates|abbreviations|charts|boxes|contributors)|abbreviations|illustrations)$",
    )
    .unwrap()
});

pub(crate) static RE_INDEX_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:general |subject |name )?index(?: of [a-z ]+)?$").unwrap()
});

pub(crate) static RE_NOTES_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:end ?notes|notes|notes (?:and|&) references|chapter notes|footnotes)$")
        .unwrap()
});

pub(crate) static RE_BACK_MATTER_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:notes|end ?notes|appendix(?:\s+[a-z0-9]{1,4})?(?:\s*[.:—–-]\s*.*)?|appendices|glossary(?: of terms)?|bibliography|select(?:ed)? bibliography|references|works cited|sources|further reading|index|about the authors?|acknowledge?ments|credits|permissions)$",
    )
    .unwrap()
});

// ============================================================================
// Body markers (matched against whole lines)
// ============================================================================

pub(crate) static RE_FRONT_MATTER_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:copyright|©|\(c\)\s*\d{4}|\bisbn\b|all rights reserved|published by|printed in|first (?:published|edition)|library of congress|cataloging|\bdedicated to\b|to my (?:wife|husband|mother|father|parents|children|family)|^\W*(?:preface|foreword|epigraph|dedication|acknowledge?ments|title page|also by [a-z .]+)\W*$)",
    )
    .unwrap()
});

pub(crate) static RE_TOC_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:[-*+]\s+)?(?:\[[^\]]+\]\(#[^)]*\)|(?i:chapter|part|book|section|prologue|epilogue|introduction|conclusion)\b.*|(?:\d{1,3}|[IVXLC]{1,6})[.)]?\s+\S.*|\S.*?(?:\.{2,}|…|\s{2,}|\t)\s*\d{1,4}|\S.{0,80}\s\d{1,4})\s*$",
    )
    .unwrap()
});

pub(crate) static RE_AUX_LIST_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*]\s+)?(?:(?:figure|fig\.|table|map|plate|chart|box)\s+[\da-z][\d.]*|\S.*?(?:\.{2,}|\s{2,}|\t)\s*\d{1,4}\s*$|\S.{0,100}\s\d{1,4}\s*$)",
    )
    .unwrap()
});

static RE_ABBREVIATION_ENTRY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*]\s+)?[A-Z][A-Z&.]{1,7}\s*(?:[-–—:=]|\s{2,}|\t)\s*\S").unwrap());

pub(crate) static RE_INDEX_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*[a-z][^\d\n]{0,60},\s*(?:\d{1,4}(?:[-–]\d{1,4})?|see(?: also)? .+)(?:,\s*\d{1,4}(?:[-–]\d{1,4})?)*\.?\s*$",
    )
    .unwrap()
});

pub(crate) static RE_NOTE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d{1,3}[.)]|\[\^?\d{1,3}\]:?|\^\d{1,3})\s+\S").unwrap()
});

/// Strips Markdown heading marks, emphasis, and trailing punctuation.
pub fn header_text(line: &str) -> &str {
    line.trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches(|c: char| c == '*' || c == '_')
        .trim()
        .trim_end_matches(|c: char| c == ':' || c == '.')
        .trim()
}

/// Returns true if the line is a short header matching `re`.
pub fn is_header(line: &str, re: &Regex) -> bool {
    let text = header_text(line);
    !text.is_empty() && line.trim().len() <= MAX_HEADER_LEN && re.is_match(text)
}

/// Returns true for an auxiliary-list entry (figure, table, or abbreviation line).
pub fn is_aux_list_entry(line: &str) -> bool {
    line.len() <= 160 && (RE_AUX_LIST_ENTRY.is_match(line) || RE_ABBREVIATION_ENTRY.is_match(line))
}

pub fn is_toc_entry(line: &str) -> bool {
    line.len() <= 120 && RE_TOC_ENTRY.is_match(line)
}

pub fn is_index_entry(line: &str) -> bool {
    RE_INDEX_ENTRY.is_match(line)
}

pub fn is_note_entry(line: &str) -> bool {
    RE_NOTE_ENTRY.is_match(line)
}

/// What content verification found in a line range.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Evidence {
    pub found: bool,
    /// Names of the markers that matched.
    pub markers: Vec<&'static str>,
    /// Zero-based offset of the header line inside the range, if any.
    pub header_offset: Option<usize>,
    pub explanation: String,
}

impl Evidence {
    fn found(markers: Vec<&'static str>, header_offset: Option<usize>, explanation: String) -> Self {
        Self {
            found: true,
            markers,
            header_offset,
            explanation,
        }
    }

    fn missing(explanation: impl Into<String>) -> Self {
        Self {
            found: false,
            explanation: explanation.into(),
            ..Self::default()
        }
    }
}

/// Offset of the first header matching `re` within the first
/// [`HEADER_WINDOW`] non-blank lines.
pub fn find_header(lines: &[&str], re: &Regex) -> Option<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .take(HEADER_WINDOW)
        .find(|(_, line)| is_header(line, re))
        .map(|(i, _)| i)
}

/// Fraction of consecutive entries whose first letters do not go backwards.
pub fn alphabetical_ratio(lines: &[&str]) -> f64 {
    let initials: Vec<char> = lines
        .iter()
        .filter_map(|line| line.trim().chars().next())
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .collect();
    if initials.len() < 2 {
        return 0.0;
    }
    let ordered = initials.windows(2).filter(|w| w[0] <= w[1]).count();
    ordered as f64 / (initials.len() - 1) as f64
}

/// Checks that a line range contains markers appropriate for `kind`.
pub fn verify(kind: RegionKind, lines: &[&str]) -> Evidence {
    match kind {
        RegionKind::FrontMatter => {
            let hits = lines
                .iter()
                .filter(|line| RE_FRONT_MATTER_MARKER.is_match(line))
                .count();
            if hits > 0 {
                Evidence::found(
                    vec!["front_matter_marker"],
                    None,
                    format!("{} front-matter marker line(s)", hits),
                )
            } else {
                Evidence::missing("no copyright, ISBN, dedication, or preface markers")
            }
        }
        RegionKind::TableOfContents => {
            let header = find_header(lines, &RE_CONTENTS_HEADER);
            let entries = lines.iter().filter(|l| is_toc_entry(l)).count();
            match header {
                Some(offset) if entries >= 2 => Evidence::found(
                    vec!["contents_header", "toc_entry"],
                    Some(offset),
                    format!("CONTENTS header with {} listing lines", entries),
                ),
                Some(_) => Evidence::missing("CONTENTS header without chapter listing"),
                None => Evidence::missing("no CONTENTS header"),
            }
        }
        RegionKind::AuxiliaryLists => {
            let header = find_header(lines, &RE_AUX_LIST_HEADER);
            let entries = lines.iter().filter(|l| is_aux_list_entry(l)).count();
            match header {
                Some(offset) if entries >= 2 => Evidence::found(
                    vec!["aux_list_header", "aux_list_entry"],
                    Some(offset),
                    format!("list header with {} entries", entries),
                ),
                Some(_) => Evidence::missing("list header without entries"),
                None => Evidence::missing("no list-of header"),
            }
        }
        RegionKind::Index => {
            if let Some(offset) = find_header(lines, &RE_INDEX_HEADER) {
                return Evidence::found(vec!["index_header"], Some(offset), "INDEX header".into());
            }
            let entries: Vec<&str> = lines.iter().copied().filter(|l| is_index_entry(l)).collect();
            let ratio = alphabetical_ratio(&entries);
            if entries.len() >= 5 && ratio >= 0.8 {
                Evidence::found(
                    vec!["index_entry"],
                    None,
                    format!("{} alphabetized index entries", entries.len()),
                )
            } else {
                Evidence::missing("no INDEX header or alphabetized entries")
            }
        }
        RegionKind::BackMatter => match find_header(lines, &RE_BACK_MATTER_HEADER) {
            Some(offset) => Evidence::found(
                vec!["back_matter_header"],
                Some(offset),
                format!("back-matter header '{}'", header_text(lines[offset])),
            ),
            None => Evidence::missing("no back-matter header near range start"),
        },
        RegionKind::Notes => {
            if let Some(offset) = find_header(lines, &RE_NOTES_HEADER) {
                return Evidence::found(vec!["notes_header"], Some(offset), "NOTES header".into());
            }
            let text: Vec<&str> = lines.iter().copied().filter(|l| !l.trim().is_empty()).collect();
            let entries = text.iter().filter(|l| is_note_entry(l)).count();
            let opens_with_entry = text.iter().take(HEADER_WINDOW).any(|l| is_note_entry(l));
            let density = entries as f64 / text.len().max(1) as f64;

            if entries < 2 {
                Evidence::missing("no NOTES header or numbered entries")
            } else if !opens_with_entry {
                Evidence::missing("no NOTES header or note entry near range start")
            } else if density < MIN_NOTE_ENTRY_DENSITY {
                Evidence::missing(format!(
                    "only {} of {} lines are note entries",
                    entries,
                    text.len()
                ))
            } else {
                Evidence::found(
                    vec!["note_entry"],
                    None,
                    format!("{} numbered note entries", entries),
                )
            }
        }
    }
}
