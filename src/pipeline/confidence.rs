//! Confidence aggregation for reporting.
//!
//! Step confidences are grouped into phase buckets through a fixed table and
//! averaged. Nothing here feeds back into pipeline decisions.

use crate::config::{CleaningStep, PipelinePhase};
use std::collections::BTreeMap;

/// Reporting bucket of each step.
pub const PHASE_BUCKETS: [(CleaningStep, PipelinePhase); 16] = [
    (CleaningStep::Reconnaissance, PipelinePhase::Reconnaissance),
    (CleaningStep::ExtractMetadata, PipelinePhase::Metadata),
    (CleaningStep::RemoveFrontMatter, PipelinePhase::StructuralRemoval),
    (CleaningStep::RemoveTableOfContents, PipelinePhase::StructuralRemoval),
    (CleaningStep::RemoveAuxiliaryLists, PipelinePhase::StructuralRemoval),
    (CleaningStep::RemoveIndex, PipelinePhase::StructuralRemoval),
    (CleaningStep::RemoveBackMatter, PipelinePhase::StructuralRemoval),
    (CleaningStep::RemoveCitations, PipelinePhase::ReferenceCleaning),
    (CleaningStep::RemoveFootnotes, PipelinePhase::ReferenceCleaning),
    (CleaningStep::RemovePageArtifacts, PipelinePhase::Finishing),
    (CleaningStep::NormalizeCharacters, PipelinePhase::Finishing),
    (CleaningStep::FinalCleanup, PipelinePhase::Finishing),
    (CleaningStep::ReflowParagraphs, PipelinePhase::Optimization),
    (CleaningStep::OptimizeParagraphLength, PipelinePhase::Optimization),
    (CleaningStep::AddStructure, PipelinePhase::Assembly),
    (CleaningStep::FinalReview, PipelinePhase::FinalReview),
];

/// Weight of each phase in the overall score.
pub const PHASE_WEIGHTS: [(PipelinePhase, f64); 8] = [
    (PipelinePhase::Reconnaissance, 0.5),
    (PipelinePhase::Metadata, 0.5),
    (PipelinePhase::StructuralRemoval, 3.0),
    (PipelinePhase::ReferenceCleaning, 2.0),
    (PipelinePhase::Finishing, 1.0),
    (PipelinePhase::Optimization, 1.5),
    (PipelinePhase::Assembly, 1.0),
    (PipelinePhase::FinalReview, 1.0),
];

/// Reporting bucket for a step.
pub fn bucket_of(step: CleaningStep) -> PipelinePhase {
    PHASE_BUCKETS
        .iter()
        .find(|(s, _)| *s == step)
        .map_or_else(|| step.phase(), |(_, phase)| *phase)
}

fn weight_of(phase: PipelinePhase) -> f64 {
    PHASE_WEIGHTS
        .iter()
        .find(|(p, _)| *p == phase)
        .map_or(1.0, |(_, w)| *w)
}

/// Mean step confidence per phase. Phases without a scored step are absent.
pub fn phase_confidence(steps: &BTreeMap<CleaningStep, f64>) -> BTreeMap<PipelinePhase, f64> {
    let mut sums: BTreeMap<PipelinePhase, (f64, usize)> = BTreeMap::new();
    for (&step, &confidence) in steps {
        let entry = sums.entry(bucket_of(step)).or_insert((0.0, 0));
        entry.0 += confidence;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(phase, (sum, count))| (phase, sum / count as f64))
        .collect()
}

/// Weighted mean of phase confidences, or `None` when nothing was scored.
pub fn overall_confidence(phases: &BTreeMap<PipelinePhase, f64>) -> Option<f64> {
    let (sum, weight) = phases
        .iter()
        .fold((0.0, 0.0), |(sum, weight), (&phase, &confidence)| {
            let w = weight_of(phase);
            (sum + confidence * w, weight + w)
        });
    (weight > 0.0).then(|| sum / weight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_matches_step_phases() {
        for (step, phase) in PHASE_BUCKETS {
            assert_eq!(step.phase(), phase, "{step}");
        }
        assert_eq!(PHASE_BUCKETS.len(), CleaningStep::ALL.len());
    }

    #[test]
    fn test_phase_means() {
        let steps: BTreeMap<_, _> = [
            (CleaningStep::RemoveIndex, 0.8),
            (CleaningStep::RemoveBackMatter, 0.6),
            (CleaningStep::FinalCleanup, 1.0),
        ]
        .into_iter()
        .collect();
        let phases = phase_confidence(&steps);
        assert!((phases[&PipelinePhase::StructuralRemoval] - 0.7).abs() < 1e-9);
        assert_eq!(phases[&PipelinePhase::Finishing], 1.0);
        assert!(!phases.contains_key(&PipelinePhase::Optimization));
    }

    #[test]
    fn test_overall_is_weighted() {
        let phases: BTreeMap<_, _> = [
            (PipelinePhase::StructuralRemoval, 0.5),
            (PipelinePhase::Finishing, 1.0),
        ]
        .into_iter()
        .collect();
        let overall = overall_confidence(&phases).unwrap();
        assert!((overall - (0.5 * 3.0 + 1.0) / 4.0).abs() < 1e-9);
        assert_eq!(overall_confidence(&BTreeMap::new()), None);
    }
}
