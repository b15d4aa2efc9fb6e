//! Run progress callbacks.

use crate::config::CleaningStep;
use crate::model::{Anomaly, StepReport};
use tracing::{info, warn};

/// Receives progress events from a running pipeline.
///
/// All methods have empty defaults; implement only what you need.
/// Callbacks run on the pipeline's task and should return quickly.
pub trait PipelineObserver: Send + Sync {
    /// A step is about to run. `position` is 1-based among enabled steps.
    fn step_started(&self, _step: CleaningStep, _position: usize, _total: usize) {}

    fn step_completed(&self, _report: &StepReport) {}

    fn step_failed(&self, _step: CleaningStep, _reason: &str) {}

    /// Progress inside a chunked step, in `[0, 1]`.
    fn progress(&self, _step: CleaningStep, _fraction: f64) {}

    /// Post-step verification raised an advisory anomaly.
    fn anomaly(&self, _anomaly: &Anomaly) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl PipelineObserver for LoggingObserver {
    fn step_started(&self, step: CleaningStep, position: usize, total: usize) {
        info!("[{}/{}] {}", position, total, step);
    }

    fn step_completed(&self, report: &StepReport) {
        info!(
            lines_before = report.lines_before,
            lines_after = report.lines_after,
            api_calls = report.api_calls,
            "{} finished in {} ms",
            report.step,
            report.duration_ms
        );
    }

    fn step_failed(&self, step: CleaningStep, reason: &str) {
        warn!("{} failed: {}", step, reason);
    }

    fn anomaly(&self, anomaly: &Anomaly) {
        warn!(severity = ?anomaly.severity, "{}: {}", anomaly.step, anomaly.message);
    }
}
