//! AI-independent region detectors.
//!
//! Every detector searches only inside the window the [`DefensePolicy`]
//! allows for its region, and every boundary it returns is re-checked with
//! the same position policy and content verification the boundary defense
//! applies to service boundaries.

use super::chapters::{is_chapter_start, stands_alone};
use super::evidence::{
    self, alphabetical_ratio, header_text, is_aux_list_entry, is_header, is_index_entry,
    is_toc_entry, RE_AUX_LIST_HEADER, RE_BACK_MATTER_HEADER, RE_CONTENTS_HEADER,
    RE_FRONT_MATTER_MARKER, RE_INDEX_HEADER, RE_NOTES_HEADER,
};
use super::Detection;
use crate::config::DefensePolicy;
use crate::model::{AuxiliaryList, BoundaryInfo, LineRange, RegionKind};

/// Blank lines tolerated inside a listing before it is considered finished.
const MAX_LISTING_GAP: usize = 2;

/// Minimum run of entries for an index without a header.
const MIN_HEADERLESS_INDEX_ENTRIES: usize = 5;

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Markdown heading level of a line, if it is a heading.
pub(crate) fn heading_level(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&level).then_some(level)
}

/// A header line that looks like a section title rather than a word in prose.
fn is_prominent(lines: &[&str], i: usize) -> bool {
    let line = lines[i];
    let text = header_text(line);
    heading_level(line).is_some()
        || line.trim().starts_with("**")
        || (text.chars().any(char::is_alphabetic)
            && !text.chars().any(char::is_lowercase))
        || stands_alone(lines, i)
}

/// Validates a candidate range and turns it into a detection.
fn accept(
    kind: RegionKind,
    lines: &[&str],
    policy: &DefensePolicy,
    range: LineRange,
    confidence: f64,
    matched: &[&str],
) -> Detection {
    if let Err(rejection) = policy.check_position(kind, range, lines.len()) {
        return Detection::none(kind, format!("heuristic range {} {}", range, rejection));
    }
    let evidence = evidence::verify(kind, &lines[range.as_indices()]);
    if !evidence.found {
        return Detection::none(kind, format!("heuristic range {}: {}", range, evidence.explanation));
    }
    Detection::found(
        kind,
        BoundaryInfo::new(Some(range.start), Some(range.end), confidence),
        matched.iter().map(|s| s.to_string()).collect(),
        evidence.explanation,
    )
}

/// Last entry index and entry count of a listing that follows `header`.
///
/// Non-entry lines directly under the header (a `Page` column label, say)
/// are skipped; afterwards the listing ends at the first non-entry line or
/// after more than [`MAX_LISTING_GAP`] blank lines.
fn listing_extent(lines: &[&str], header: usize, is_entry: fn(&str) -> bool) -> Option<(usize, usize)> {
    let mut last = None;
    let mut count = 0;
    let mut gap = 0;

    for (i, line) in lines.iter().enumerate().skip(header + 1) {
        if is_blank(line) {
            gap += 1;
            if gap > MAX_LISTING_GAP && count > 0 {
                break;
            }
            continue;
        }
        gap = 0;
        if heading_level(line).is_none() && is_entry(line) {
            last = Some(i);
            count += 1;
        } else if count == 0 && i - header <= 2 {
            continue;
        } else {
            break;
        }
    }

    last.filter(|_| count >= 2).map(|l| (l, count))
}

// ============================================================================
// Front matter
// ============================================================================

/// Front matter runs from line 1 to the line before the body starts.
///
/// The body starts at the first chapter heading after the table of contents.
/// Without a chapter heading, the front matter ends at the paragraph that
/// holds the last copyright/ISBN/dedication marker.
pub fn detect_front_matter(lines: &[&str], policy: &DefensePolicy) -> Detection {
    let kind = RegionKind::FrontMatter;
    let limit = policy.max_end_line(kind, lines.len()).unwrap_or(0).min(lines.len());
    if limit == 0 {
        return Detection::none(kind, "document too short");
    }

    let search_from = (0..limit)
        .find(|&i| is_header(lines[i], &RE_CONTENTS_HEADER))
        .and_then(|h| listing_extent(lines, h, is_toc_entry))
        .map_or(0, |(last, _)| last + 1);

    // The heading itself may sit one line past the window.
    let body_start = (search_from..=limit.min(lines.len() - 1)).find(|&i| is_chapter_start(lines, i));

    match body_start {
        Some(start) => {
            let has_marker = (0..start).any(|i| RE_FRONT_MATTER_MARKER.is_match(lines[i]));
            if start == 0 || !has_marker {
                return Detection::none(kind, "no front-matter markers before the first chapter");
            }
            accept(
                kind,
                lines,
                policy,
                LineRange::new(1, start),
                0.75,
                &["front_matter_marker", "chapter_heading"],
            )
        }
        None => {
            let Some(marker) = (0..limit).rev().find(|&i| RE_FRONT_MATTER_MARKER.is_match(lines[i]))
            else {
                return Detection::none(kind, "no front-matter markers in the opening window");
            };
            let mut end = marker;
            while end + 1 < limit && !is_blank(lines[end + 1]) {
                end += 1;
            }
            accept(
                kind,
                lines,
                policy,
                LineRange::new(1, end + 1),
                0.55,
                &["front_matter_marker"],
            )
        }
    }
}

// ============================================================================
// Table of contents
// ============================================================================

/// A CONTENTS header followed by at least two listing lines.
pub fn detect_table_of_contents(lines: &[&str], policy: &DefensePolicy) -> Detection {
    let kind = RegionKind::TableOfContents;
    let limit = policy.max_end_line(kind, lines.len()).unwrap_or(0).min(lines.len());

    let Some(header) = (0..limit).find(|&i| is_header(lines[i], &RE_CONTENTS_HEADER)) else {
        return Detection::none(kind, "no CONTENTS header in the opening window");
    };
    let Some((last, entries)) = listing_extent(lines, header, is_toc_entry) else {
        return Detection::none(kind, "CONTENTS header without a chapter listing");
    };

    let confidence = if entries >= 5 { 0.85 } else { 0.7 };
    accept(
        kind,
        lines,
        policy,
        LineRange::new(header + 1, last + 1),
        confidence,
        &["contents_header", "toc_entry"],
    )
}

// ============================================================================
// Auxiliary lists
// ============================================================================

/// Every list-of-figures/tables/abbreviations block in the opening window.
pub fn detect_auxiliary_lists(lines: &[&str], policy: &DefensePolicy) -> Vec<AuxiliaryList> {
    let kind = RegionKind::AuxiliaryLists;
    let limit = policy.max_end_line(kind, lines.len()).unwrap_or(0).min(lines.len());
    let mut lists = Vec::new();
    let mut i = 0;

    while i < limit {
        if !is_header(lines[i], &RE_AUX_LIST_HEADER) {
            i += 1;
            continue;
        }
        let Some((last, entries)) = listing_extent(lines, i, is_aux_list_entry) else {
            i += 1;
            continue;
        };

        let title = header_text(lines[i]).to_string();
        let confidence = if entries >= 4 { 0.75 } else { 0.6 };
        let detection = accept(
            kind,
            lines,
            policy,
            LineRange::new(i + 1, last + 1),
            confidence,
            &["aux_list_header", "aux_list_entry"],
        );
        if let Some(boundary) = detection.boundary {
            lists.push(AuxiliaryList {
                kind: aux_list_kind(&title),
                start_line: boundary.start_line.unwrap_or(i + 1),
                end_line: boundary.end_line.unwrap_or(last + 1),
                confidence,
                title: Some(title),
            });
        }
        i = last + 1;
    }

    lists
}

fn aux_list_kind(title: &str) -> String {
    let lower = title.to_lowercase();
    ["figures", "tables", "illustrations", "maps", "plates", "abbreviations", "charts"]
        .iter()
        .find(|k| lower.contains(*k))
        .map_or_else(|| "other".to_string(), |k| k.to_string())
}

// ============================================================================
// Index
// ============================================================================

/// An INDEX header in the closing window, or a headerless run of
/// alphabetized `Term, page` entries.
pub fn detect_index(lines: &[&str], policy: &DefensePolicy) -> Detection {
    let kind = RegionKind::Index;
    let total = lines.len();
    let from = policy.min_start_line(kind, total).unwrap_or(1).saturating_sub(1);

    if let Some(header) = (from..total).find(|&i| is_header(lines[i], &RE_INDEX_HEADER) && is_prominent(lines, i)) {
        let level = heading_level(lines[header]);
        let mut end = header;
        for (i, line) in lines.iter().enumerate().skip(header + 1) {
            if is_blank(line) {
                continue;
            }
            if ends_section(line, level, &RE_INDEX_HEADER) {
                break;
            }
            end = i;
        }
        return accept(
            kind,
            lines,
            policy,
            LineRange::new(header + 1, end + 1),
            0.8,
            &["index_header"],
        );
    }

    match headerless_index_run(lines, from) {
        Some((start, end)) => accept(
            kind,
            lines,
            policy,
            LineRange::new(start + 1, end + 1),
            0.6,
            &["index_entry"],
        ),
        None => Detection::none(kind, "no INDEX header or alphabetized entries in the closing window"),
    }
}

/// First run of index entries, interrupted only by blank lines or
/// single-letter group headers, that is long and alphabetized enough.
fn headerless_index_run(lines: &[&str], from: usize) -> Option<(usize, usize)> {
    let mut run: Vec<usize> = Vec::new();

    let flush = |run: &mut Vec<usize>| -> Option<(usize, usize)> {
        let found = (run.len() >= MIN_HEADERLESS_INDEX_ENTRIES).then(|| {
            let entries: Vec<&str> = run.iter().map(|&i| lines[i]).collect();
            (alphabetical_ratio(&entries) >= 0.8).then(|| (run[0], run[run.len() - 1]))
        });
        run.clear();
        found.flatten()
    };

    for (i, line) in lines.iter().enumerate().skip(from) {
        if is_blank(line) || is_letter_group(line) {
            continue;
        }
        if is_index_entry(line) {
            run.push(i);
        } else if let Some(found) = flush(&mut run) {
            return Some(found);
        }
    }
    flush(&mut run)
}

/// `A`, `## B`, `**C**`: letter headings inside an index.
fn is_letter_group(line: &str) -> bool {
    let text = header_text(line);
    let mut chars = text.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_alphabetic())
}

/// Returns true if `line` opens a section that ends the one being scanned.
fn ends_section(line: &str, level: Option<usize>, own_header: &regex::Regex) -> bool {
    if is_header(line, &RE_BACK_MATTER_HEADER) && !is_header(line, own_header) {
        return true;
    }
    match (heading_level(line), level) {
        (Some(found), Some(own)) => found <= own && !is_letter_group(line),
        _ => false,
    }
}

// ============================================================================
// Back matter
// ============================================================================

/// The first back-matter header at or after the policy's start line,
/// through the end of the document.
pub fn detect_back_matter(lines: &[&str], policy: &DefensePolicy) -> Detection {
    let kind = RegionKind::BackMatter;
    let total = lines.len();
    let from = policy.min_start_line(kind, total).unwrap_or(1).saturating_sub(1);

    let Some(header) = (from..total)
        .find(|&i| is_header(lines[i], &RE_BACK_MATTER_HEADER) && is_prominent(lines, i))
    else {
        return Detection::none(kind, "no back-matter header in the closing window");
    };

    let confidence = if heading_level(lines[header]).is_some() { 0.8 } else { 0.65 };
    accept(
        kind,
        lines,
        policy,
        LineRange::new(header + 1, total),
        confidence,
        &["back_matter_header"],
    )
}

// ============================================================================
// Notes sections
// ============================================================================

/// NOTES/ENDNOTES sections anywhere in the document.
///
/// A section runs from its header to the line before the next back-matter
/// header or Markdown heading of the same or higher level, trailing blank
/// lines excluded. Sections wider than the notes span limit are skipped.
pub fn detect_notes_sections(lines: &[&str], policy: &DefensePolicy) -> Vec<BoundaryInfo> {
    let kind = RegionKind::Notes;
    let total = lines.len();
    let mut sections = Vec::new();
    let mut i = 0;

    while i < total {
        if !(is_header(lines[i], &RE_NOTES_HEADER) && is_prominent(lines, i)) {
            i += 1;
            continue;
        }

        let level = heading_level(lines[i]);
        let mut end = (i + 1..total)
            .find(|&j| ends_section(lines[j], level, &RE_NOTES_HEADER))
            .map_or(total - 1, |j| j - 1);
        while end > i && is_blank(lines[end]) {
            end -= 1;
        }

        let detection = accept(
            kind,
            lines,
            policy,
            LineRange::new(i + 1, end + 1),
            0.75,
            &["notes_header"],
        );
        if let Some(boundary) = detection.boundary {
            sections.push(boundary.with_notes(header_text(lines[i]).to_string()));
        }
        i = end + 1;
    }

    sections
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(count: usize) -> Vec<String> {
        (0..count)
            .map(|i| format!("Body sentence number {} goes on for a while.", i))
            .collect()
    }

    fn as_refs(lines: &[String]) -> Vec<&str> {
        lines.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_front_matter_ends_before_first_chapter() {
        let mut lines: Vec<String> = [
            "THE LONG ROAD",
            "",
            "Copyright © 2004 A. Writer",
            "All rights reserved.",
            "",
            "Contents",
            "Chapter 1: Leaving",
            "Chapter 2: Arriving",
            "",
            "# Chapter 1",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        lines.extend(filler(40));
        let refs = as_refs(&lines);

        let detection = detect_front_matter(&refs, &DefensePolicy::default());
        assert!(detection.detected, "{}", detection.explanation);
        let boundary = detection.boundary.unwrap();
        assert_eq!(boundary.start_line, Some(1));
        assert_eq!(boundary.end_line, Some(9));
    }

    #[test]
    fn test_front_matter_needs_markers() {
        let mut lines = vec!["# Chapter 1".to_string(), String::new()];
        lines.extend(filler(30));
        let detection = detect_front_matter(&as_refs(&lines), &DefensePolicy::default());
        assert!(!detection.detected);
        assert!(detection.boundary.is_none());
    }

    #[test]
    fn test_table_of_contents() {
        let mut lines: Vec<String> = ["Title", "", "## Contents", "", "1. Start ..... 1", "2. Middle ..... 20", "3. End ..... 40", "", "Some prose here that begins the book."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        lines.extend(filler(40));
        let detection = detect_table_of_contents(&as_refs(&lines), &DefensePolicy::default());
        assert!(detection.detected, "{}", detection.explanation);
        let boundary = detection.boundary.unwrap();
        assert_eq!((boundary.start_line, boundary.end_line), (Some(3), Some(7)));
    }

    #[test]
    fn test_auxiliary_lists() {
        let mut lines: Vec<String> = [
            "List of Figures",
            "Figure 1.1 The valley ..... 3",
            "Figure 1.2 The river ..... 9",
            "",
            "List of Tables",
            "Table 1 Rainfall ..... 12",
            "Table 2 Harvest ..... 15",
            "",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        lines.extend(filler(40));
        let lists = detect_auxiliary_lists(&as_refs(&lines), &DefensePolicy::default());
        assert_eq!(lists.len(), 2);
        assert_eq!(lists[0].kind, "figures");
        assert_eq!((lists[0].start_line, lists[0].end_line), (1, 3));
        assert_eq!(lists[1].kind, "tables");
        assert_eq!(lists[1].start_line, 5);
    }

    #[test]
    fn test_back_matter_not_found_early() {
        let mut lines = vec!["# Notes".to_string(), "1. Early note.".to_string()];
        lines.extend(filler(100));
        let detection = detect_back_matter(&as_refs(&lines), &DefensePolicy::default());
        assert!(!detection.detected);
    }

    #[test]
    fn test_back_matter_in_closing_window() {
        let mut lines = filler(80);
        lines.push(String::new());
        lines.push("# Appendix A: Tables".to_string());
        lines.push(String::new());
        lines.extend(filler(10));
        let detection = detect_back_matter(&as_refs(&lines), &DefensePolicy::default());
        assert!(detection.detected, "{}", detection.explanation);
        let boundary = detection.boundary.unwrap();
        assert_eq!(boundary.start_line, Some(82));
        assert_eq!(boundary.end_line, Some(lines.len()));
    }

    #[test]
    fn test_index_with_header() {
        let mut lines = filler(90);
        lines.extend(
            ["", "# Index", "", "A", "Adams, John, 12", "Alps, 40-42", "B", "Bern, 7", ""]
                .iter()
                .map(|s| s.to_string()),
        );
        let detection = detect_index(&as_refs(&lines), &DefensePolicy::default());
        assert!(detection.detected, "{}", detection.explanation);
        let boundary = detection.boundary.unwrap();
        assert_eq!(boundary.start_line, Some(92));
        assert_eq!(boundary.end_line, Some(98));
    }

    #[test]
    fn test_headerless_index() {
        let mut lines = filler(90);
        lines.extend(
            ["", "Adams, John, 12", "Alps, 40", "Bern, 7, 9", "Cairo, 101", "Delhi, see India", "Egypt, 3"]
                .iter()
                .map(|s| s.to_string()),
        );
        let detection = detect_index(&as_refs(&lines), &DefensePolicy::default());
        assert!(detection.detected, "{}", detection.explanation);
        assert_eq!(detection.boundary.unwrap().start_line, Some(92));
    }

    #[test]
    fn test_notes_section_stops_at_next_heading() {
        let mut lines = filler(50);
        lines.extend(
            ["", "## Notes", "", "1. Smith, p. 4.", "2. Ibid.", "", "## Chapter 2", "", "More text."]
                .iter()
                .map(|s| s.to_string()),
        );
        let sections = detect_notes_sections(&as_refs(&lines), &DefensePolicy::default());
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].start_line, Some(52));
        assert_eq!(sections[0].end_line, Some(55));
        assert_eq!(sections[0].notes, "Notes");
    }

    #[test]
    fn test_notes_word_in_prose_is_ignored() {
        let mut lines = filler(20);
        lines.push("notes".to_string());
        lines.push("she said, and left.".to_string());
        let sections = detect_notes_sections(&as_refs(&lines), &DefensePolicy::default());
        assert!(sections.is_empty());
    }
}
