//! Run-scoped mutable state threaded through every step.

use crate::config::{
    BackMatterComponent, CleaningConfiguration, CleaningStep, ContentTypeHint,
    FrontMatterComponent,
};
use crate::model::{
    Anomaly, BoundaryInfo, DetectedPatterns, DetectionSource, DocumentMetadata, LineRange,
    RegionKind, ReviewReport,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Presence-only hints from reconnaissance. Never used as positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuralHints {
    pub front_matter: bool,
    pub table_of_contents: bool,
    pub auxiliary_lists: bool,
    pub index: bool,
    pub back_matter: bool,
    pub footnotes: bool,
    pub citations: bool,
    pub content_type: Option<ContentTypeHint>,
}

impl StructuralHints {
    /// Returns true if reconnaissance reported the region as present.
    pub fn expects(&self, kind: RegionKind) -> bool {
        match kind {
            RegionKind::FrontMatter => self.front_matter,
            RegionKind::TableOfContents => self.table_of_contents,
            RegionKind::AuxiliaryLists => self.auxiliary_lists,
            RegionKind::Index => self.index,
            RegionKind::BackMatter => self.back_matter,
            RegionKind::Notes => self.footnotes,
        }
    }
}

/// A sub-range inside a removal range that must be kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionZone {
    pub range: LineRange,
    pub reason: String,
}

/// A removal that actually happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalRecord {
    pub region: RegionKind,
    pub step: CleaningStep,
    pub lines_removed: usize,
    pub source: DetectionSource,
    pub confidence: f64,
}

/// Mutable accumulator owned by exactly one run.
///
/// Created before the first step and dropped when the run ends.
#[derive(Debug, Clone, Default)]
pub struct CleaningContext {
    pub hints: StructuralHints,
    pub patterns: DetectedPatterns,
    pub metadata: DocumentMetadata,
    /// Incremented whenever a step changes the content.
    pub content_revision: u64,
    pub step_confidence: BTreeMap<CleaningStep, f64>,
    pub removals: Vec<RemovalRecord>,
    pub anomalies: Vec<Anomaly>,
    pub review: Option<ReviewReport>,
    /// Front-matter parts the user wants kept.
    pub protected_front: BTreeSet<FrontMatterComponent>,
    /// Back-matter parts the user wants kept.
    pub protected_back: BTreeSet<BackMatterComponent>,
    /// Service requests made outside of step results (pattern detection).
    pub api_calls: u32,
    pub tokens: u64,
}

impl CleaningContext {
    /// Creates the context for a run, deriving exclusion preferences.
    ///
    /// A sub-component is protected when the user disabled it explicitly or
    /// disabled the dedicated step that would otherwise remove it.
    pub fn new(config: &CleaningConfiguration) -> Self {
        let mut protected_front = config.disabled_front_matter.clone();
        if !config.is_enabled(CleaningStep::RemoveTableOfContents) {
            protected_front.insert(FrontMatterComponent::TableOfContents);
        }
        let mut protected_back = config.disabled_back_matter.clone();
        if !config.is_enabled(CleaningStep::RemoveIndex) {
            protected_back.insert(BackMatterComponent::Index);
        }
        if !config.is_enabled(CleaningStep::RemoveFootnotes) {
            protected_back.insert(BackMatterComponent::Notes);
        }
        Self {
            protected_front,
            protected_back,
            ..Self::default()
        }
    }

    /// Records that a step changed the content, invalidating line positions.
    pub fn bump_revision(&mut self) {
        self.content_revision += 1;
    }

    /// Returns true if pattern-detection line numbers still match the content.
    pub fn patterns_are_current(&self) -> bool {
        self.patterns.revision == self.content_revision
    }

    /// Cached boundary for a region, only if it was computed on current content.
    pub fn position_hint(&self, kind: RegionKind) -> Option<&BoundaryInfo> {
        if !self.patterns_are_current() {
            return None;
        }
        self.patterns.regions.get(&kind).map(|hint| &hint.boundary)
    }

    /// Presence signal for a region from any detection, regardless of staleness.
    pub fn has_evidence(&self, kind: RegionKind) -> bool {
        self.hints.expects(kind) || self.patterns.has_evidence(kind)
    }

    /// Returns true if an earlier step already removed this region.
    ///
    /// The TOC and auxiliary lists sit inside the front matter; the index
    /// and notes sit inside the back matter. Removing the outer region
    /// removes its components, and a back-matter detection may have been
    /// nothing but an already removed index or notes section.
    pub fn was_removed(&self, kind: RegionKind) -> bool {
        self.removed(kind)
            || (matches!(kind, RegionKind::TableOfContents | RegionKind::AuxiliaryLists)
                && self.removed(RegionKind::FrontMatter))
            || (matches!(kind, RegionKind::Index | RegionKind::Notes)
                && self.removed(RegionKind::BackMatter))
            || (kind == RegionKind::BackMatter
                && (self.removed(RegionKind::Index) || self.removed(RegionKind::Notes)))
    }

    fn removed(&self, kind: RegionKind) -> bool {
        self.removals.iter().any(|r| r.region == kind)
    }

    pub fn record_removal(&mut self, record: RemovalRecord) {
        self.removals.push(record);
    }

    pub fn record_confidence(&mut self, step: CleaningStep, confidence: f64) {
        self.step_confidence.insert(step, confidence.clamp(0.0, 1.0));
    }

    /// Adds service usage made outside a step result.
    pub fn add_usage(&mut self, api_calls: u32, tokens: u64) {
        self.api_calls += api_calls;
        self.tokens += tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RegionHint;

    #[test]
    fn test_disabled_toc_step_protects_toc_component() {
        let config = CleaningConfiguration::default().disable(CleaningStep::RemoveTableOfContents);
        let context = CleaningContext::new(&config);
        assert!(context
            .protected_front
            .contains(&FrontMatterComponent::TableOfContents));
        assert!(context.protected_back.is_empty());
    }

    #[test]
    fn test_position_hint_goes_stale_after_mutation() {
        let mut context = CleaningContext::new(&CleaningConfiguration::default());
        context.patterns.regions.insert(
            RegionKind::Index,
            RegionHint {
                boundary: BoundaryInfo::new(Some(900), None, 0.8),
                source: DetectionSource::Service,
            },
        );
        assert!(context.position_hint(RegionKind::Index).is_some());

        context.bump_revision();
        assert!(context.position_hint(RegionKind::Index).is_none());
        // Presence survives staleness.
        assert!(context.has_evidence(RegionKind::Index));
    }

    #[test]
    fn test_back_matter_removal_covers_index_and_notes() {
        let mut context = CleaningContext::default();
        context.record_removal(RemovalRecord {
            region: RegionKind::BackMatter,
            step: CleaningStep::RemoveBackMatter,
            lines_removed: 40,
            source: DetectionSource::Heuristic,
            confidence: 0.8,
        });
        assert!(context.was_removed(RegionKind::Notes));
        assert!(context.was_removed(RegionKind::Index));
        assert!(!context.was_removed(RegionKind::FrontMatter));
    }

    #[test]
    fn test_front_matter_removal_covers_toc_and_lists() {
        let mut context = CleaningContext::default();
        context.record_removal(RemovalRecord {
            region: RegionKind::FrontMatter,
            step: CleaningStep::RemoveFrontMatter,
            lines_removed: 10,
            source: DetectionSource::Heuristic,
            confidence: 0.75,
        });
        assert!(context.was_removed(RegionKind::TableOfContents));
        assert!(context.was_removed(RegionKind::AuxiliaryLists));
        assert!(!context.was_removed(RegionKind::Index));
        assert!(!context.was_removed(RegionKind::BackMatter));
    }

    #[test]
    fn test_index_removal_covers_back_matter() {
        let mut context = CleaningContext::default();
        context.record_removal(RemovalRecord {
            region: RegionKind::Index,
            step: CleaningStep::RemoveIndex,
            lines_removed: 7,
            source: DetectionSource::Heuristic,
            confidence: 0.8,
        });
        assert!(context.was_removed(RegionKind::BackMatter));
        assert!(!context.was_removed(RegionKind::Notes));
    }
}
