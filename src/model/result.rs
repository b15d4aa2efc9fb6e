//! Step results, anomalies, and the final run artifact.

use crate::config::{CleaningStep, PipelinePhase};
use crate::model::{DetectedPatterns, DocumentMetadata, RemovalRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Output of one step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    /// Content after the step.
    pub content: String,
    /// Analysis-service requests made.
    pub api_calls: u32,
    /// Estimated tokens consumed.
    pub tokens: u64,
    /// Lines added, removed, or modified.
    pub lines_changed: usize,
    /// Words in the output content.
    pub word_count: usize,
    pub confidence: Option<f64>,
}

impl StepResult {
    /// Builds a result, computing line changes and word count against `input`.
    pub fn new(input: &str, content: String) -> Self {
        let lines_changed = count_changed_lines(input, &content);
        let word_count = count_words(&content);
        Self {
            content,
            api_calls: 0,
            tokens: 0,
            lines_changed,
            word_count,
            confidence: None,
        }
    }

    /// A result that leaves the content untouched.
    pub fn unchanged(input: &str) -> Self {
        Self::new(input, input.to_string())
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_usage(mut self, api_calls: u32, tokens: u64) -> Self {
        self.api_calls += api_calls;
        self.tokens += tokens;
        self
    }
}

/// Counts whitespace-separated words.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Approximates changed lines as the line-count delta plus positional edits.
///
/// Lines are compared pairwise after skipping the common prefix and suffix,
/// which is exact for a single contiguous removal.
pub fn count_changed_lines(before: &str, after: &str) -> usize {
    let a: Vec<&str> = before.lines().collect();
    let b: Vec<&str> = after.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let a_rest = &a[prefix..];
    let b_rest = &b[prefix..];
    let suffix = a_rest
        .iter()
        .rev()
        .zip(b_rest.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let a_mid = a_rest.len() - suffix;
    let b_mid = b_rest.len() - suffix;
    a_mid.max(b_mid)
}

/// Lifecycle of a single step within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed {
        word_count: usize,
        change_count: usize,
    },
    Failed {
        reason: String,
    },
}

/// Report line for an executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: CleaningStep,
    pub status: StepStatus,
    pub api_calls: u32,
    pub tokens: u64,
    pub lines_before: usize,
    pub lines_after: usize,
    pub confidence: Option<f64>,
    pub duration_ms: u64,
}

/// Advisory anomaly severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

/// Kind of post-step anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Detection evidence existed but nothing was removed.
    ZeroEffect,
    /// More than half of the remaining lines were removed.
    ExcessiveRemoval,
    /// A removal step produced more lines than it received.
    ContentGrowth,
    /// A service-supplied removal pattern matched too much prose and was skipped.
    OverbroadPattern,
}

/// Advisory finding from post-step verification. Never alters the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub step: CleaningStep,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub message: String,
}

/// Outcome of the final review capability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewReport {
    pub confidence: f64,
    pub issues: Vec<String>,
    pub summary: Option<String>,
}

/// Final artifact of a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedContent {
    pub content: String,
    pub metadata: DocumentMetadata,
    pub patterns: DetectedPatterns,
    pub steps: Vec<StepReport>,
    pub phase_confidence: BTreeMap<PipelinePhase, f64>,
    pub overall_confidence: Option<f64>,
    pub removals: Vec<RemovalRecord>,
    pub anomalies: Vec<Anomaly>,
    pub review: Option<ReviewReport>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub total_api_calls: u32,
    pub total_tokens: u64,
    pub estimated_cost: f64,
}

impl CleanedContent {
    /// Words in the cleaned content.
    pub fn word_count(&self) -> usize {
        count_words(&self.content)
    }

    /// Returns true if any anomaly is critical.
    pub fn has_critical_anomalies(&self) -> bool {
        self.anomalies
            .iter()
            .any(|a| a.severity == Severity::Critical)
    }
}

/// Progress of a run that was cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialRun {
    /// Content after the last completed step.
    pub content: String,
    pub completed_steps: Vec<StepReport>,
    /// Step that was about to run or was interrupted.
    pub cancelled_at: Option<CleaningStep>,
    pub total_steps: usize,
}

/// Terminal result of [`crate::Pipeline::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Box<CleanedContent>),
    Cancelled(PartialRun),
}

impl RunOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunOutcome::Cancelled(_))
    }

    /// Returns the cleaned content if the run completed.
    pub fn completed(self) -> Option<CleanedContent> {
        match self {
            RunOutcome::Completed(content) => Some(*content),
            RunOutcome::Cancelled(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_lines_for_removal() {
        let before = "a\nb\nc\nd\ne";
        let after = "a\ne";
        assert_eq!(count_changed_lines(before, after), 3);
    }

    #[test]
    fn test_changed_lines_for_edit() {
        let before = "a\nb\nc";
        let after = "a\nB\nc";
        assert_eq!(count_changed_lines(before, after), 1);
        assert_eq!(count_changed_lines(before, before), 0);
    }

    #[test]
    fn test_step_result_counts_words() {
        let result = StepResult::new("one two\nthree", "one two".to_string());
        assert_eq!(result.word_count, 2);
        assert_eq!(result.lines_changed, 1);
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let result = StepResult::unchanged("x").with_confidence(1.7);
        assert_eq!(result.confidence, Some(1.0));
    }
}
