//! Line-range removal with exclusion zones.
//!
//! Protected sub-components (a dedication the user wants kept inside front
//! matter, an appendix inside back matter) are located by their headers
//! inside the accepted range and survive the removal verbatim.

use crate::config::{BackMatterComponent, FrontMatterComponent};
use crate::detect::evidence::{
    header_text, is_header, RE_BACK_MATTER_HEADER, RE_CONTENTS_HEADER, RE_INDEX_HEADER,
    RE_NOTES_HEADER,
};
use crate::detect::heading_level;
use crate::model::{ExclusionZone, LineRange, RegionKind};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static RE_DEDICATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^dedication$").unwrap());

static RE_EPIGRAPH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^epigraphs?$").unwrap());

static RE_PREFACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:preface|author'?s note)$").unwrap());

static RE_FOREWORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^forew[oa]rd$").unwrap());

static RE_ACKNOWLEDGMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^acknowledge?ments$").unwrap());

static RE_APPENDIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:appendix(?:\s+[a-z0-9]{1,4})?(?:\s*[.:—–-]\s*.*)?|appendices)$").unwrap()
});

static RE_GLOSSARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^glossary(?: of terms)?$").unwrap());

static RE_BIBLIOGRAPHY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:select(?:ed)? )?(?:bibliography|references|works cited|sources|further reading)$")
        .unwrap()
});

static RE_ABOUT_AUTHOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^about the authors?$").unwrap());

fn front_header(component: FrontMatterComponent) -> &'static Regex {
    match component {
        FrontMatterComponent::TableOfContents => &RE_CONTENTS_HEADER,
        FrontMatterComponent::Dedication => &RE_DEDICATION,
        FrontMatterComponent::Epigraph => &RE_EPIGRAPH,
        FrontMatterComponent::Preface => &RE_PREFACE,
        FrontMatterComponent::Foreword => &RE_FOREWORD,
        FrontMatterComponent::Acknowledgments => &RE_ACKNOWLEDGMENTS,
    }
}

fn back_header(component: BackMatterComponent) -> &'static Regex {
    match component {
        BackMatterComponent::Notes => &RE_NOTES_HEADER,
        BackMatterComponent::Appendix => &RE_APPENDIX,
        BackMatterComponent::Glossary => &RE_GLOSSARY,
        BackMatterComponent::Bibliography => &RE_BIBLIOGRAPHY,
        BackMatterComponent::Index => &RE_INDEX_HEADER,
        BackMatterComponent::Acknowledgments => &RE_ACKNOWLEDGMENTS,
        BackMatterComponent::AboutTheAuthor => &RE_ABOUT_AUTHOR,
    }
}

/// Returns true if the line opens any front- or back-matter section.
fn is_section_header(line: &str) -> bool {
    is_header(line, &RE_BACK_MATTER_HEADER)
        || [
            &*RE_CONTENTS_HEADER,
            &*RE_DEDICATION,
            &*RE_EPIGRAPH,
            &*RE_PREFACE,
            &*RE_FOREWORD,
            &*RE_ABOUT_AUTHOR,
        ]
        .iter()
        .any(|re| is_header(line, re))
}

/// Zero-based end index of the section whose header sits at `header`,
/// clipped to `limit` (exclusive).
fn section_end(lines: &[&str], header: usize, limit: usize) -> usize {
    let level = heading_level(lines[header]);
    let mut end = limit;
    for (i, line) in lines.iter().enumerate().take(limit).skip(header + 1) {
        let closes = match (heading_level(line), level) {
            (Some(found), Some(own)) => found <= own,
            (Some(_), None) => true,
            (None, _) => is_section_header(line),
        };
        if closes {
            end = i;
            break;
        }
    }
    end
}

fn zones_for(
    lines: &[&str],
    range: LineRange,
    headers: &[(&'static Regex, String)],
) -> Vec<ExclusionZone> {
    let indices = range.as_indices();
    let limit = indices.end.min(lines.len());
    let mut zones = Vec::new();

    let mut i = indices.start;
    while i < limit {
        let matched = headers.iter().find(|(re, _)| is_header(lines[i], re));
        let Some((_, reason)) = matched else {
            i += 1;
            continue;
        };
        let end = section_end(lines, i, limit);
        zones.push(ExclusionZone {
            range: LineRange::new(i + 1, end),
            reason: format!("{} kept ({})", reason, header_text(lines[i])),
        });
        i = end;
    }

    zones
}

/// Locates protected components inside a removal range.
pub fn exclusion_zones(
    lines: &[&str],
    kind: RegionKind,
    range: LineRange,
    protected_front: &BTreeSet<FrontMatterComponent>,
    protected_back: &BTreeSet<BackMatterComponent>,
) -> Vec<ExclusionZone> {
    let headers: Vec<(&'static Regex, String)> = match kind {
        RegionKind::FrontMatter => protected_front
            .iter()
            .map(|&c| (front_header(c), format!("{:?}", c)))
            .collect(),
        RegionKind::BackMatter => protected_back
            .iter()
            .map(|&c| (back_header(c), format!("{:?}", c)))
            .collect(),
        _ => Vec::new(),
    };
    if headers.is_empty() {
        return Vec::new();
    }
    zones_for(lines, range, &headers)
}

/// Result of a removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRemoval {
    pub content: String,
    pub lines_removed: usize,
    pub lines_kept: usize,
}

/// Removes the given 1-based ranges, keeping lines inside exclusion zones.
///
/// Ranges may come in any order and may overlap.
pub fn remove_ranges(content: &str, ranges: &[LineRange], zones: &[ExclusionZone]) -> SectionRemoval {
    let lines: Vec<&str> = content.split('\n').collect();
    let mut kept = Vec::with_capacity(lines.len());
    let mut lines_removed = 0;
    let mut lines_kept = 0;

    for (i, line) in lines.iter().enumerate() {
        let number = i + 1;
        let targeted = ranges.iter().any(|r| r.contains(number));
        let protected = zones.iter().any(|z| z.range.contains(number));
        if targeted && !protected {
            lines_removed += 1;
        } else {
            if targeted {
                lines_kept += 1;
            }
            kept.push(*line);
        }
    }

    SectionRemoval {
        content: kept.join("\n"),
        lines_removed,
        lines_kept,
    }
}

/// Removes a single range.
pub fn remove_range(content: &str, range: LineRange, zones: &[ExclusionZone]) -> SectionRemoval {
    remove_ranges(content, std::slice::from_ref(&range), zones)
}
