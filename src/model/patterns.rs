//! Detected structure: boundaries, reference styles, chapters, content flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A structural region the pipeline may remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    FrontMatter,
    TableOfContents,
    AuxiliaryLists,
    Index,
    BackMatter,
    Notes,
}

impl RegionKind {
    pub fn label(self) -> &'static str {
        match self {
            RegionKind::FrontMatter => "front matter",
            RegionKind::TableOfContents => "table of contents",
            RegionKind::AuxiliaryLists => "auxiliary lists",
            RegionKind::Index => "index",
            RegionKind::BackMatter => "back matter",
            RegionKind::Notes => "notes",
        }
    }

    /// Name used in service prompts.
    pub fn service_name(self) -> &'static str {
        match self {
            RegionKind::FrontMatter => "front_matter",
            RegionKind::TableOfContents => "table_of_contents",
            RegionKind::AuxiliaryLists => "auxiliary_lists",
            RegionKind::Index => "index",
            RegionKind::BackMatter => "back_matter",
            RegionKind::Notes => "notes",
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inclusive, 1-based line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Creates a range; `start` and `end` are swapped if reversed.
    pub fn new(start: usize, end: usize) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Number of lines covered. Never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.start..=self.end).contains(&line)
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Zero-based half-open index range for slicing a line vector.
    pub fn as_indices(&self) -> std::ops::Range<usize> {
        self.start.saturating_sub(1)..self.end
    }
}

impl fmt::Display for LineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// A single detected region: the unit the boundary defense validates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundaryInfo {
    #[serde(alias = "startLine")]
    pub start_line: Option<usize>,
    #[serde(alias = "endLine")]
    pub end_line: Option<usize>,
    pub confidence: f64,
    pub notes: String,
}

impl BoundaryInfo {
    pub fn new(start_line: Option<usize>, end_line: Option<usize>, confidence: f64) -> Self {
        Self {
            start_line,
            end_line,
            confidence: confidence.clamp(0.0, 1.0),
            notes: String::new(),
        }
    }

    /// Attaches free-text notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Returns true if the boundary names no position at all.
    pub fn is_empty(&self) -> bool {
        self.start_line.is_none() && self.end_line.is_none()
    }

    /// Resolves open ends into a concrete range for a document of `total_lines`.
    ///
    /// Front matter implicitly starts at line 1; regions that run to the end
    /// of the book (index, back matter, notes) implicitly end at the last line.
    /// Returns `None` when a required end is missing or out of bounds.
    pub fn resolve(&self, kind: RegionKind, total_lines: usize) -> Option<LineRange> {
        if total_lines == 0 {
            return None;
        }
        let start = match (self.start_line, kind) {
            (Some(s), _) => s,
            (None, RegionKind::FrontMatter) => 1,
            (None, _) => return None,
        };
        let end = match (self.end_line, kind) {
            (Some(e), _) => e,
            (None, RegionKind::Index | RegionKind::BackMatter | RegionKind::Notes) => total_lines,
            (None, _) => return None,
        };
        if start == 0 || end == 0 || start > total_lines || end > total_lines || start > end {
            return None;
        }
        Some(LineRange::new(start, end))
    }
}

/// Where a boundary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// Shared pattern-detection pass, still valid for the current content.
    Cache,
    /// Fresh analysis-service detection on current content.
    Service,
    /// AI-independent heuristic detector.
    Heuristic,
}

/// An auxiliary list (figures, tables, abbreviations, ...).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliaryList {
    pub kind: String,
    #[serde(alias = "startLine")]
    pub start_line: usize,
    #[serde(alias = "endLine")]
    pub end_line: usize,
    pub confidence: f64,
    pub title: Option<String>,
}

impl AuxiliaryList {
    pub fn boundary(&self) -> BoundaryInfo {
        BoundaryInfo::new(Some(self.start_line), Some(self.end_line), self.confidence)
            .with_notes(self.title.clone().unwrap_or_else(|| self.kind.clone()))
    }
}

/// In-text citation convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationStyle {
    /// `(Smith, 2001)`, `(Smith et al. 2001, p. 4)`.
    AuthorYear,
    /// `[12]`, `[3, 5-7]`.
    Numeric,
    /// `word¹²`.
    Superscript,
    #[serde(other)]
    Unknown,
}

/// Citation detection result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CitationDetection {
    pub detected: bool,
    pub style: Option<CitationStyle>,
    pub patterns: Vec<String>,
    pub samples: Vec<String>,
    pub confidence: f64,
}

/// Footnote marker convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FootnoteMarkerStyle {
    /// Markdown `[^1]`.
    Caret,
    /// Unicode superscript digits or `<sup>1</sup>`.
    Superscript,
    /// `[1]` after a word.
    Bracketed,
    /// `*`, `†`, `‡`.
    Symbol,
    #[serde(other)]
    Unknown,
}

/// Footnote detection result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FootnoteDetection {
    pub detected: bool,
    #[serde(alias = "markerStyle")]
    pub marker_style: Option<FootnoteMarkerStyle>,
    #[serde(alias = "markerPattern")]
    pub marker_pattern: Option<String>,
    pub sections: Vec<BoundaryInfo>,
    pub confidence: f64,
}

/// A detected chapter heading.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterInfo {
    pub number: Option<String>,
    pub title: String,
    #[serde(alias = "startLine")]
    pub start_line: usize,
}

/// Chapter detection result. Parts reuse [`ChapterInfo`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChapterDetection {
    pub detected: bool,
    pub chapters: Vec<ChapterInfo>,
    pub parts: Vec<ChapterInfo>,
    pub confidence: f64,
}

/// Content-type flags used to tune later steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentTypeFlags {
    pub fiction: bool,
    pub academic: bool,
    pub technical: bool,
    pub has_code: bool,
    pub has_math: bool,
    pub has_tables: bool,
    pub poetry: bool,
}

impl ContentTypeFlags {
    /// Union of two flag sets.
    pub fn merge(self, other: ContentTypeFlags) -> ContentTypeFlags {
        ContentTypeFlags {
            fiction: self.fiction || other.fiction,
            academic: self.academic || other.academic,
            technical: self.technical || other.technical,
            has_code: self.has_code || other.has_code,
            has_math: self.has_math || other.has_math,
            has_tables: self.has_tables || other.has_tables,
            poetry: self.poetry || other.poetry,
        }
    }
}

/// Bibliographic metadata extracted from front matter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    pub isbn: Option<String>,
    pub language: Option<String>,
    /// Anything else the service reported.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl DocumentMetadata {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.subtitle.is_none()
            && self.author.is_none()
            && self.publisher.is_none()
            && self.year.is_none()
            && self.isbn.is_none()
            && self.language.is_none()
    }
}

/// A region boundary recorded by the pattern-detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionHint {
    pub boundary: BoundaryInfo,
    pub source: DetectionSource,
}

/// Everything pattern and service detection found for one document.
///
/// Line numbers are only meaningful against the content revision recorded
/// in `revision`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectedPatterns {
    /// Content revision the line numbers below refer to.
    pub revision: u64,
    pub page_number_patterns: Vec<String>,
    pub header_patterns: Vec<String>,
    pub footer_patterns: Vec<String>,
    pub regions: BTreeMap<RegionKind, RegionHint>,
    pub auxiliary_lists: Vec<AuxiliaryList>,
    pub citations: CitationDetection,
    pub footnotes: FootnoteDetection,
    pub chapters: ChapterDetection,
    pub content_flags: ContentTypeFlags,
}

impl DetectedPatterns {
    /// Returns true if any detection found evidence of the region.
    pub fn has_evidence(&self, kind: RegionKind) -> bool {
        match kind {
            RegionKind::AuxiliaryLists => !self.auxiliary_lists.is_empty(),
            RegionKind::Notes => {
                !self.footnotes.sections.is_empty() || self.regions.contains_key(&kind)
            }
            _ => self.regions.contains_key(&kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_front_matter_defaults_start() {
        let b = BoundaryInfo::new(None, Some(40), 0.9);
        assert_eq!(
            b.resolve(RegionKind::FrontMatter, 1000),
            Some(LineRange::new(1, 40))
        );
        assert_eq!(b.resolve(RegionKind::TableOfContents, 1000), None);
    }

    #[test]
    fn test_resolve_back_matter_defaults_end() {
        let b = BoundaryInfo::new(Some(800), None, 0.9);
        assert_eq!(
            b.resolve(RegionKind::BackMatter, 1000),
            Some(LineRange::new(800, 1000))
        );
    }

    #[test]
    fn test_resolve_rejects_out_of_bounds() {
        assert_eq!(
            BoundaryInfo::new(Some(10), Some(2000), 0.9).resolve(RegionKind::Index, 1000),
            None
        );
        assert_eq!(
            BoundaryInfo::new(Some(0), Some(5), 0.9).resolve(RegionKind::TableOfContents, 100),
            None
        );
        assert_eq!(
            BoundaryInfo::new(Some(50), Some(10), 0.9).resolve(RegionKind::TableOfContents, 100),
            None
        );
    }

    #[test]
    fn test_line_range_indices() {
        let r = LineRange::new(3, 5);
        assert_eq!(r.len(), 3);
        assert_eq!(r.as_indices(), 2..5);
        assert!(r.overlaps(&LineRange::new(5, 9)));
        assert!(!r.overlaps(&LineRange::new(6, 9)));
    }

    #[test]
    fn test_boundary_accepts_camel_case_fields() {
        let b: BoundaryInfo =
            serde_json::from_str(r#"{"startLine": 12, "endLine": 30, "confidence": 0.7}"#)
                .unwrap();
        assert_eq!(b.start_line, Some(12));
        assert_eq!(b.end_line, Some(30));
        assert!(b.notes.is_empty());
    }

    #[test]
    fn test_unknown_citation_style_is_tolerated() {
        let c: CitationDetection =
            serde_json::from_str(r#"{"detected": true, "style": "chicago_notes"}"#).unwrap();
        assert_eq!(c.style, Some(CitationStyle::Unknown));
    }
}
