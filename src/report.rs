//! Markdown audit summary of a run.

use crate::model::{CleanedContent, DetectionSource, PartialRun, Severity, StepStatus};
use std::fmt::Write;

fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}

fn source_label(source: DetectionSource) -> &'static str {
    match source {
        DetectionSource::Cache => "cached detection",
        DetectionSource::Service => "analysis service",
        DetectionSource::Heuristic => "heuristic",
    }
}

/// Renders a human-readable summary of a completed run.
pub fn render_summary(cleaned: &CleanedContent) -> String {
    let mut out = String::new();

    out.push_str("# Cleaning Report\n\n");
    if let Some(title) = &cleaned.metadata.title {
        let _ = writeln!(out, "**Title:** {}  ", title);
    }
    if let Some(author) = &cleaned.metadata.author {
        let _ = writeln!(out, "**Author:** {}  ", author);
    }
    let _ = writeln!(out, "**Started:** {}  ", cleaned.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "**Duration:** {} ms  ", cleaned.duration_ms);
    let _ = writeln!(out, "**Words:** {}  ", cleaned.word_count());
    let _ = writeln!(
        out,
        "**Service:** {} calls, {} tokens, estimated cost {:.4}  ",
        cleaned.total_api_calls, cleaned.total_tokens, cleaned.estimated_cost
    );
    if let Some(overall) = cleaned.overall_confidence {
        let _ = writeln!(out, "**Overall confidence:** {}", percent(overall));
    }
    out.push('\n');

    out.push_str("## Steps\n\n");
    out.push_str("| Step | Lines | Changed | Confidence | Calls | Time |\n");
    out.push_str("|------|-------|---------|------------|-------|------|\n");
    for report in &cleaned.steps {
        let changed = match &report.status {
            StepStatus::Completed { change_count, .. } => change_count.to_string(),
            StepStatus::Failed { reason } => format!("failed: {}", reason),
            StepStatus::Pending | StepStatus::InProgress => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "| {} | {} → {} | {} | {} | {} | {} ms |",
            report.step,
            report.lines_before,
            report.lines_after,
            changed,
            report.confidence.map_or_else(|| "-".to_string(), percent),
            report.api_calls,
            report.duration_ms
        );
    }
    out.push('\n');

    if !cleaned.phase_confidence.is_empty() {
        out.push_str("## Phase Confidence\n\n");
        for (phase, confidence) in &cleaned.phase_confidence {
            let _ = writeln!(out, "- {:?}: {}", phase, percent(*confidence));
        }
        out.push('\n');
    }

    if !cleaned.removals.is_empty() {
        out.push_str("## Removals\n\n");
        for removal in &cleaned.removals {
            let _ = writeln!(
                out,
                "- {}: {} lines ({}, {})",
                removal.region,
                removal.lines_removed,
                source_label(removal.source),
                percent(removal.confidence)
            );
        }
        out.push('\n');
    }

    if !cleaned.anomalies.is_empty() {
        out.push_str("## Anomalies\n\n");
        for anomaly in &cleaned.anomalies {
            let marker = match anomaly.severity {
                Severity::Critical => "**CRITICAL**",
                Severity::Warning => "warning",
            };
            let _ = writeln!(out, "- {} {}: {}", marker, anomaly.step, anomaly.message);
        }
        out.push('\n');
    }

    if let Some(review) = &cleaned.review {
        out.push_str("## Review\n\n");
        let _ = writeln!(out, "Confidence: {}", percent(review.confidence));
        if let Some(summary) = &review.summary {
            let _ = writeln!(out, "\n{}", summary);
        }
        for issue in &review.issues {
            let _ = writeln!(out, "- {}", issue);
        }
        out.push('\n');
    }

    out
}

/// One-paragraph summary of a cancelled run.
pub fn render_partial(partial: &PartialRun) -> String {
    let at = partial
        .cancelled_at
        .map_or_else(|| "before the first step".to_string(), |s| format!("at {}", s));
    format!(
        "# Cleaning Cancelled\n\nStopped {} after {} of {} steps. Content reflects the last completed step.\n",
        at,
        partial.completed_steps.len(),
        partial.total_steps
    )
}
