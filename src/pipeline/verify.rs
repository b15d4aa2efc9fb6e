//! Post-step verification.
//!
//! Advisory only: anomalies are recorded and reported, never acted on.

use crate::config::CleaningStep;
use crate::model::{Anomaly, AnomalyKind, Severity};

/// Share of remaining lines above which a single step is flagged.
pub const EXCESSIVE_REMOVAL_RATIO: f64 = 0.5;

/// What the pipeline knew about a step's target before the step ran.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepExpectation {
    /// Some detection reported the target region as present.
    pub had_evidence: bool,
    /// An earlier step already removed the target region.
    pub already_removed: bool,
}

fn line_count(text: &str) -> usize {
    text.lines().count()
}

/// Checks one step's input and output for suspicious effects.
pub fn verify_step(
    step: CleaningStep,
    before: &str,
    after: &str,
    expectation: StepExpectation,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    let lines_before = line_count(before);
    let lines_after = line_count(after);

    if step.region().is_some()
        && expectation.had_evidence
        && !expectation.already_removed
        && before == after
    {
        anomalies.push(Anomaly {
            step,
            kind: AnomalyKind::ZeroEffect,
            severity: Severity::Warning,
            message: format!(
                "{} was detected but nothing was removed",
                step.region().map_or("region", |r| r.label())
            ),
        });
    }

    if lines_before > 0 && lines_after < lines_before {
        let removed = lines_before - lines_after;
        let ratio = removed as f64 / lines_before as f64;
        if ratio > EXCESSIVE_REMOVAL_RATIO {
            anomalies.push(Anomaly {
                step,
                kind: AnomalyKind::ExcessiveRemoval,
                severity: Severity::Critical,
                message: format!(
                    "removed {} of {} lines ({:.0}%)",
                    removed,
                    lines_before,
                    ratio * 100.0
                ),
            });
        }
    }

    if step.is_removal() && lines_after > lines_before {
        anomalies.push(Anomaly {
            step,
            kind: AnomalyKind::ContentGrowth,
            severity: Severity::Critical,
            message: format!(
                "removal step grew content from {} to {} lines",
                lines_before, lines_after
            ),
        });
    }

    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_effect_with_evidence() {
        let anomalies = verify_step(
            CleaningStep::RemoveIndex,
            "a\nb",
            "a\nb",
            StepExpectation {
                had_evidence: true,
                already_removed: false,
            },
        );
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ZeroEffect);
        assert_eq!(anomalies[0].severity, Severity::Warning);
    }

    #[test]
    fn test_zero_effect_suppressed_when_already_removed() {
        let anomalies = verify_step(
            CleaningStep::RemoveFootnotes,
            "a",
            "a",
            StepExpectation {
                had_evidence: true,
                already_removed: true,
            },
        );
        assert!(anomalies.is_empty());
    }

    #[test]
    fn test_excessive_removal_is_critical() {
        let anomalies = verify_step(
            CleaningStep::RemoveBackMatter,
            "1\n2\n3\n4\n5",
            "1\n2",
            StepExpectation::default(),
        );
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::ExcessiveRemoval);
        assert_eq!(anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn test_removal_step_growth() {
        let anomalies = verify_step(
            CleaningStep::FinalCleanup,
            "a",
            "a\nb",
            StepExpectation::default(),
        );
        assert_eq!(anomalies[0].kind, AnomalyKind::ContentGrowth);

        // Assembly may add lines.
        let anomalies = verify_step(
            CleaningStep::AddStructure,
            "a",
            "a\nb",
            StepExpectation::default(),
        );
        assert!(anomalies.is_empty());
    }
}
