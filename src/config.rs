//! Cleaning configuration: the step table, run options, and defense policy.

use crate::model::RegionKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// One step of the cleaning pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStep {
    Reconnaissance,
    ExtractMetadata,
    RemoveFrontMatter,
    RemoveTableOfContents,
    RemoveAuxiliaryLists,
    RemoveIndex,
    RemoveBackMatter,
    RemoveCitations,
    RemoveFootnotes,
    RemovePageArtifacts,
    NormalizeCharacters,
    FinalCleanup,
    ReflowParagraphs,
    OptimizeParagraphLength,
    AddStructure,
    FinalReview,
}

impl CleaningStep {
    /// All steps in pipeline order.
    pub const ALL: [CleaningStep; 16] = [
        CleaningStep::Reconnaissance,
        CleaningStep::ExtractMetadata,
        CleaningStep::RemoveFrontMatter,
        CleaningStep::RemoveTableOfContents,
        CleaningStep::RemoveAuxiliaryLists,
        CleaningStep::RemoveIndex,
        CleaningStep::RemoveBackMatter,
        CleaningStep::RemoveCitations,
        CleaningStep::RemoveFootnotes,
        CleaningStep::RemovePageArtifacts,
        CleaningStep::NormalizeCharacters,
        CleaningStep::FinalCleanup,
        CleaningStep::ReflowParagraphs,
        CleaningStep::OptimizeParagraphLength,
        CleaningStep::AddStructure,
        CleaningStep::FinalReview,
    ];

    /// 1-based position in the pipeline.
    pub fn number(self) -> usize {
        self as usize + 1
    }

    /// Human-readable step name.
    pub fn label(self) -> &'static str {
        match self {
            CleaningStep::Reconnaissance => "reconnaissance",
            CleaningStep::ExtractMetadata => "extract metadata",
            CleaningStep::RemoveFrontMatter => "remove front matter",
            CleaningStep::RemoveTableOfContents => "remove table of contents",
            CleaningStep::RemoveAuxiliaryLists => "remove auxiliary lists",
            CleaningStep::RemoveIndex => "remove index",
            CleaningStep::RemoveBackMatter => "remove back matter",
            CleaningStep::RemoveCitations => "remove citations",
            CleaningStep::RemoveFootnotes => "remove footnotes",
            CleaningStep::RemovePageArtifacts => "remove page artifacts",
            CleaningStep::NormalizeCharacters => "normalize characters",
            CleaningStep::FinalCleanup => "final cleanup",
            CleaningStep::ReflowParagraphs => "reflow paragraphs",
            CleaningStep::OptimizeParagraphLength => "optimize paragraph length",
            CleaningStep::AddStructure => "add structure",
            CleaningStep::FinalReview => "final review",
        }
    }

    /// Pipeline phase the step belongs to.
    pub fn phase(self) -> PipelinePhase {
        use CleaningStep::*;
        match self {
            Reconnaissance => PipelinePhase::Reconnaissance,
            ExtractMetadata => PipelinePhase::Metadata,
            RemoveFrontMatter | RemoveTableOfContents | RemoveAuxiliaryLists | RemoveIndex
            | RemoveBackMatter => PipelinePhase::StructuralRemoval,
            RemoveCitations | RemoveFootnotes => PipelinePhase::ReferenceCleaning,
            RemovePageArtifacts | NormalizeCharacters | FinalCleanup => PipelinePhase::Finishing,
            ReflowParagraphs | OptimizeParagraphLength => PipelinePhase::Optimization,
            AddStructure => PipelinePhase::Assembly,
            FinalReview => PipelinePhase::FinalReview,
        }
    }

    /// Declared processing method.
    pub fn method(self) -> ProcessingMethod {
        use CleaningStep::*;
        match self {
            Reconnaissance | ExtractMetadata | ReflowParagraphs | OptimizeParagraphLength
            | FinalReview => ProcessingMethod::AiOnly,
            RemovePageArtifacts | NormalizeCharacters | FinalCleanup => {
                ProcessingMethod::HeuristicOnly
            }
            RemoveFrontMatter | RemoveTableOfContents | RemoveAuxiliaryLists | RemoveIndex
            | RemoveBackMatter | RemoveCitations | RemoveFootnotes | AddStructure => {
                ProcessingMethod::Hybrid
            }
        }
    }

    /// Removal steps must never produce more lines than they receive.
    pub fn is_removal(self) -> bool {
        use CleaningStep::*;
        matches!(
            self,
            RemoveFrontMatter
                | RemoveTableOfContents
                | RemoveAuxiliaryLists
                | RemoveIndex
                | RemoveBackMatter
                | RemoveCitations
                | RemoveFootnotes
                | RemovePageArtifacts
                | FinalCleanup
        )
    }

    /// Structural region targeted by a structural-removal step.
    pub fn region(self) -> Option<RegionKind> {
        match self {
            CleaningStep::RemoveFrontMatter => Some(RegionKind::FrontMatter),
            CleaningStep::RemoveTableOfContents => Some(RegionKind::TableOfContents),
            CleaningStep::RemoveAuxiliaryLists => Some(RegionKind::AuxiliaryLists),
            CleaningStep::RemoveIndex => Some(RegionKind::Index),
            CleaningStep::RemoveBackMatter => Some(RegionKind::BackMatter),
            CleaningStep::RemoveFootnotes => Some(RegionKind::Notes),
            _ => None,
        }
    }
}

impl fmt::Display for CleaningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step {} ({})", self.number(), self.label())
    }
}

/// Pipeline phases. Also used as the reporting buckets for confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Reconnaissance,
    Metadata,
    StructuralRemoval,
    ReferenceCleaning,
    Finishing,
    Optimization,
    Assembly,
    FinalReview,
}

/// How a step does its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMethod {
    /// Regex/position rules only.
    HeuristicOnly,
    /// Analysis service only.
    AiOnly,
    /// Analysis service assisted by the shared pattern-detection pass.
    Hybrid,
}

/// Per-document content type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentTypeHint {
    #[default]
    Auto,
    Fiction,
    NonFiction,
    Academic,
    Technical,
    Poetry,
}

/// How chapter boundaries are marked by the assembly step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterMarkerStyle {
    /// `<!-- CHAPTER 3: Title -->` above the chapter heading.
    #[default]
    HtmlComment,
    /// Rewrites the chapter heading as `# Chapter 3: Title`.
    Heading,
    /// `[CHAPTER 3: Title]` on its own line.
    Token,
}

/// How the end of the document is marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndMarkerStyle {
    None,
    #[default]
    HtmlComment,
    Token,
    Rule,
}

/// Front-matter sub-components that can be kept while front matter is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontMatterComponent {
    TableOfContents,
    Dedication,
    Epigraph,
    Preface,
    Foreword,
    Acknowledgments,
}

/// Back-matter sub-components that can be kept while back matter is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackMatterComponent {
    Notes,
    Appendix,
    Glossary,
    Bibliography,
    Index,
    Acknowledgments,
    AboutTheAuthor,
}

/// Position and size thresholds for Phase A of the boundary defense.
///
/// All values are fractions of the document's line count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefensePolicy {
    /// Front matter must end at or before this fraction.
    pub front_matter_max_end: f64,
    /// Table of contents must end at or before this fraction.
    pub toc_max_end: f64,
    /// Auxiliary lists must end at or before this fraction.
    pub aux_lists_max_end: f64,
    /// A single auxiliary list may span at most this fraction.
    pub aux_lists_max_span: f64,
    /// Index must start at or after this fraction.
    pub index_min_start: f64,
    /// Back matter must start at or after this fraction.
    pub back_matter_min_start: f64,
    /// A NOTES section may span at most this fraction.
    pub notes_max_span: f64,
    /// Service boundaries below this confidence are rejected.
    pub min_confidence: f64,
}

impl Default for DefensePolicy {
    fn default() -> Self {
        Self {
            front_matter_max_end: 0.30,
            toc_max_end: 0.20,
            aux_lists_max_end: 0.40,
            aux_lists_max_span: 0.15,
            index_min_start: 0.70,
            back_matter_min_start: 0.50,
            notes_max_span: 0.25,
            min_confidence: 0.5,
        }
    }
}

/// Immutable configuration for one cleaning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfiguration {
    /// Steps to execute. Order is always pipeline order.
    pub enabled_steps: BTreeSet<CleaningStep>,
    /// Content type hint, or `Auto` to use detection.
    pub content_type: ContentTypeHint,
    /// Insert chapter markers during assembly.
    pub chapter_segmentation: bool,
    pub chapter_marker_style: ChapterMarkerStyle,
    pub end_marker_style: EndMarkerStyle,
    /// Prepend YAML frontmatter built from extracted metadata.
    pub include_metadata_header: bool,
    /// Paragraphs above this many words are split by the optimization step.
    pub max_paragraph_words: usize,
    /// Shield fenced and inline code from destructive rewrites.
    pub preserve_code: bool,
    /// Shield math-like expressions from destructive rewrites.
    pub preserve_math: bool,
    /// Front-matter parts kept even when front matter is removed.
    pub disabled_front_matter: BTreeSet<FrontMatterComponent>,
    /// Back-matter parts kept even when back matter is removed.
    pub disabled_back_matter: BTreeSet<BackMatterComponent>,
    /// Target words per chunk for service submission.
    pub chunk_target_words: usize,
    /// Words of trailing context carried from the previous chunk.
    pub chunk_overlap_words: usize,
    pub defense: DefensePolicy,
    /// Line-frequency threshold for running header/footer detection (0.0-1.0).
    pub header_footer_threshold: f64,
    /// Maximum line length considered for header/footer detection.
    pub max_header_footer_length: usize,
    /// Estimated service price per thousand tokens, for reporting.
    pub cost_per_1k_tokens: f64,
}

impl Default for CleaningConfiguration {
    fn default() -> Self {
        Self {
            enabled_steps: CleaningStep::ALL.into_iter().collect(),
            content_type: ContentTypeHint::Auto,
            chapter_segmentation: true,
            chapter_marker_style: ChapterMarkerStyle::default(),
            end_marker_style: EndMarkerStyle::default(),
            include_metadata_header: false,
            max_paragraph_words: 250,
            preserve_code: true,
            preserve_math: true,
            disabled_front_matter: BTreeSet::new(),
            disabled_back_matter: BTreeSet::new(),
            chunk_target_words: 2500,
            chunk_overlap_words: 200,
            defense: DefensePolicy::default(),
            header_footer_threshold: 0.5,
            max_header_footer_length: 100,
            cost_per_1k_tokens: 0.0,
        }
    }
}

impl CleaningConfiguration {
    /// Creates a configuration with every step enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration with only the given steps enabled.
    pub fn with_steps(steps: impl IntoIterator<Item = CleaningStep>) -> Self {
        Self {
            enabled_steps: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Character-level repair and page artifact removal only.
    pub fn minimal() -> Self {
        Self::with_steps([
            CleaningStep::RemovePageArtifacts,
            CleaningStep::NormalizeCharacters,
            CleaningStep::FinalCleanup,
        ])
    }

    /// Every step that works without a live analysis service.
    ///
    /// Hybrid steps fall back to their heuristic detectors.
    pub fn heuristic_only() -> Self {
        Self {
            enabled_steps: CleaningStep::ALL
                .into_iter()
                .filter(|s| s.method() != ProcessingMethod::AiOnly)
                .collect(),
            ..Self::default()
        }
    }

    /// Every step, with the metadata header on.
    pub fn full() -> Self {
        Self {
            include_metadata_header: true,
            ..Self::default()
        }
    }

    /// Enables a step.
    pub fn enable(mut self, step: CleaningStep) -> Self {
        self.enabled_steps.insert(step);
        self
    }

    /// Disables a step.
    pub fn disable(mut self, step: CleaningStep) -> Self {
        self.enabled_steps.remove(&step);
        self
    }

    /// Sets chapter segmentation on or off.
    pub fn with_chapter_segmentation(mut self, enabled: bool) -> Self {
        self.chapter_segmentation = enabled;
        self
    }

    /// Sets the chapter marker style.
    pub fn with_chapter_markers(mut self, style: ChapterMarkerStyle) -> Self {
        self.chapter_marker_style = style;
        self
    }

    /// Sets the end-of-document marker style.
    pub fn with_end_marker(mut self, style: EndMarkerStyle) -> Self {
        self.end_marker_style = style;
        self
    }

    /// Sets the paragraph word target for the optimization step.
    pub fn with_max_paragraph_words(mut self, words: usize) -> Self {
        self.max_paragraph_words = words.max(20);
        self
    }

    /// Sets the content type hint.
    pub fn with_content_type(mut self, hint: ContentTypeHint) -> Self {
        self.content_type = hint;
        self
    }

    /// Keeps a front-matter component when front matter is removed.
    pub fn keep_front_matter(mut self, component: FrontMatterComponent) -> Self {
        self.disabled_front_matter.insert(component);
        self
    }

    /// Keeps a back-matter component when back matter is removed.
    pub fn keep_back_matter(mut self, component: BackMatterComponent) -> Self {
        self.disabled_back_matter.insert(component);
        self
    }

    /// Replaces the defense policy.
    pub fn with_defense_policy(mut self, policy: DefensePolicy) -> Self {
        self.defense = policy;
        self
    }

    /// Sets chunk sizes for service submission.
    pub fn with_chunking(mut self, target_words: usize, overlap_words: usize) -> Self {
        self.chunk_target_words = target_words.max(1);
        self.chunk_overlap_words = overlap_words;
        self
    }

    /// Returns true if the step will run.
    pub fn is_enabled(&self, step: CleaningStep) -> bool {
        self.enabled_steps.contains(&step)
    }

    /// Enabled steps in pipeline order.
    pub fn steps(&self) -> impl Iterator<Item = CleaningStep> + '_ {
        self.enabled_steps.iter().copied()
    }

    /// Returns true if any enabled step needs the shared pattern-detection pass.
    pub fn needs_pattern_detection(&self) -> bool {
        self.steps().any(|s| s.method() == ProcessingMethod::Hybrid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_numbering_follows_order() {
        for (i, step) in CleaningStep::ALL.iter().enumerate() {
            assert_eq!(step.number(), i + 1);
        }
        let mut sorted = CleaningStep::ALL;
        sorted.sort();
        assert_eq!(sorted, CleaningStep::ALL);
    }

    #[test]
    fn test_structural_steps_are_removal_steps() {
        for step in CleaningStep::ALL {
            if step.phase() == PipelinePhase::StructuralRemoval {
                assert!(step.is_removal(), "{step} should be a removal step");
                assert!(step.region().is_some());
            }
        }
        assert!(!CleaningStep::AddStructure.is_removal());
    }

    #[test]
    fn test_full_preset_adds_metadata_header() {
        let config = CleaningConfiguration::full();
        assert!(config.include_metadata_header);
        assert_eq!(config.steps().count(), CleaningStep::ALL.len());
    }

    #[test]
    fn test_heuristic_only_preset_has_no_ai_steps() {
        let config = CleaningConfiguration::heuristic_only();
        assert!(config.steps().all(|s| s.method() != ProcessingMethod::AiOnly));
        assert!(config.is_enabled(CleaningStep::RemoveBackMatter));
        assert!(config.needs_pattern_detection());
    }

    #[test]
    fn test_minimal_preset_skips_pattern_detection() {
        let config = CleaningConfiguration::minimal();
        assert_eq!(config.enabled_steps.len(), 3);
        assert!(!config.needs_pattern_detection());
    }

    #[test]
    fn test_default_policy_thresholds() {
        let policy = DefensePolicy::default();
        assert_eq!(policy.front_matter_max_end, 0.30);
        assert_eq!(policy.toc_max_end, 0.20);
        assert_eq!(policy.aux_lists_max_end, 0.40);
        assert_eq!(policy.aux_lists_max_span, 0.15);
        assert_eq!(policy.index_min_start, 0.70);
        assert_eq!(policy.back_matter_min_start, 0.50);
    }

    #[test]
    fn test_configuration_deserializes_with_defaults() {
        let json = r#"{"enabled_steps": ["remove_back_matter", "final_cleanup"], "max_paragraph_words": 120}"#;
        let config: CleaningConfiguration = serde_json::from_str(json).unwrap();
        assert_eq!(config.enabled_steps.len(), 2);
        assert_eq!(config.max_paragraph_words, 120);
        assert!(config.preserve_code);
        assert_eq!(config.defense, DefensePolicy::default());
    }
}
