//! The cleaning pipeline: ordered steps over one document.
//!
//! A [`Pipeline`] owns its capabilities and can be reused for many
//! documents, one run at a time. Each run gets a fresh
//! [`CleaningContext`]; nothing carries over between runs.
//!
//! # Example
//!
//! ```no_run
//! use unocr::{CleaningConfiguration, Pipeline, RunOutcome};
//!
//! # async fn demo(text: &str) -> unocr::Result<()> {
//! let pipeline = Pipeline::offline();
//! match pipeline.run(text, &CleaningConfiguration::default()).await? {
//!     RunOutcome::Completed(cleaned) => println!("{}", cleaned.content),
//!     RunOutcome::Cancelled(partial) => println!("stopped at {:?}", partial.cancelled_at),
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembly;
pub mod confidence;
mod observer;
mod providers;
pub mod rewrite;
mod steps;
pub mod verify;

pub use observer::{LoggingObserver, NoopObserver, PipelineObserver};
pub use providers::{
    BoundaryPreDetector, FinalReviewer, NoPreDetection, NoReconnaissance, NoReview,
    ReconnaissanceProvider, ServicePreDetector, ServiceReconnaissance, ServiceReviewer, Usage,
};

use crate::config::{CleaningConfiguration, CleaningStep};
use crate::defense::BoundaryDefense;
use crate::detect;
use crate::error::{Error, Result};
use crate::model::{
    CleanedContent, CleaningContext, PartialRun, RunOutcome, StepReport, StepStatus,
};
use crate::service::{AnalysisService, NullService};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use steps::StepRunner;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use verify::StepExpectation;

/// Lifecycle of a pipeline's most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RunState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Failed,
            4 => RunState::Cancelled,
            _ => RunState::Idle,
        }
    }
}

/// Stores the terminal state when a run ends, including when its future is dropped.
struct RunGuard<'a> {
    state: &'a AtomicU8,
    terminal: RunState,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.store(self.terminal as u8, Ordering::SeqCst);
    }
}

/// Rejects configurations that cannot drive a run.
pub fn validate_configuration(config: &CleaningConfiguration) -> Result<()> {
    let invalid = |msg: String| Err(Error::InvalidConfiguration(msg));

    if config.enabled_steps.is_empty() {
        return invalid("no steps enabled".into());
    }
    if config.chunk_target_words == 0 {
        return invalid("chunk_target_words must be positive".into());
    }
    if config.chunk_overlap_words >= config.chunk_target_words {
        return invalid(format!(
            "chunk_overlap_words ({}) must be smaller than chunk_target_words ({})",
            config.chunk_overlap_words, config.chunk_target_words
        ));
    }
    if config.max_paragraph_words == 0 {
        return invalid("max_paragraph_words must be positive".into());
    }
    if !(config.header_footer_threshold > 0.0 && config.header_footer_threshold <= 1.0) {
        return invalid(format!(
            "header_footer_threshold must be in (0, 1], got {}",
            config.header_footer_threshold
        ));
    }
    if !config.cost_per_1k_tokens.is_finite() || config.cost_per_1k_tokens < 0.0 {
        return invalid("cost_per_1k_tokens must be a non-negative number".into());
    }

    let policy = &config.defense;
    for (name, value) in [
        ("front_matter_max_end", policy.front_matter_max_end),
        ("toc_max_end", policy.toc_max_end),
        ("aux_lists_max_end", policy.aux_lists_max_end),
        ("aux_lists_max_span", policy.aux_lists_max_span),
        ("index_min_start", policy.index_min_start),
        ("back_matter_min_start", policy.back_matter_min_start),
        ("notes_max_span", policy.notes_max_span),
        ("min_confidence", policy.min_confidence),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return invalid(format!("defense.{} must be in [0, 1], got {}", name, value));
        }
    }
    Ok(())
}

/// Runs the enabled cleaning steps over a document.
pub struct Pipeline {
    service: Arc<dyn AnalysisService>,
    reconnaissance: Arc<dyn ReconnaissanceProvider>,
    pre_detector: Arc<dyn BoundaryPreDetector>,
    reviewer: Arc<dyn FinalReviewer>,
    observer: Arc<dyn PipelineObserver>,
    defense: BoundaryDefense,
    state: AtomicU8,
    cancel: Mutex<CancellationToken>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("service", &self.service.name())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::offline()
    }
}

impl Pipeline {
    /// A pipeline backed by `service`, with service-backed capabilities.
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self::builder().service(service).build()
    }

    /// A pipeline that relies on heuristics only.
    pub fn offline() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }

    /// Requests cancellation of the active run, if any.
    ///
    /// Observed between steps and between chunks, and while waiting on
    /// the analysis service.
    pub fn cancel(&self) {
        self.cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    fn fresh_token(&self) -> CancellationToken {
        let mut guard = self.cancel.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = CancellationToken::new();
        guard.clone()
    }

    /// Cleans one document.
    ///
    /// Returns [`Error::AlreadyRunning`] if this pipeline is busy and
    /// [`Error::StepFailed`] if a step aborts. Cancellation is not an
    /// error: it yields [`RunOutcome::Cancelled`] with the progress so far.
    pub async fn run(&self, document: &str, config: &CleaningConfiguration) -> Result<RunOutcome> {
        validate_configuration(config)?;

        self.state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |s| {
                (s != RunState::Running as u8).then_some(RunState::Running as u8)
            })
            .map_err(|_| Error::AlreadyRunning)?;
        let mut guard = RunGuard {
            state: &self.state,
            terminal: RunState::Cancelled,
        };

        let token = self.fresh_token();
        let result = self.execute(document, config, &token).await;
        guard.terminal = match &result {
            Ok(RunOutcome::Completed(_)) => RunState::Completed,
            Ok(RunOutcome::Cancelled(_)) => RunState::Cancelled,
            Err(_) => RunState::Failed,
        };
        result
    }

    /// Heuristic pattern detection plus optional service pre-detection,
    /// stamped with the current content revision.
    async fn detect_shared_patterns(
        &self,
        content: &str,
        config: &CleaningConfiguration,
        ctx: &mut CleaningContext,
    ) -> Result<()> {
        let mut patterns = detect::detect_patterns(content, config);
        patterns.content_flags = detect::apply_content_hint(patterns.content_flags, config.content_type);

        if self.service.is_available() {
            match self.pre_detector.pre_detect(content, &mut patterns, config).await {
                Ok(usage) => ctx.add_usage(usage.api_calls, usage.tokens),
                Err(e) if e.is_fatal() => return Err(Error::Service(e)),
                Err(e) => warn!("Boundary pre-detection failed: {}", e),
            }
        }

        patterns.revision = ctx.content_revision;
        ctx.patterns = patterns;
        Ok(())
    }

    async fn execute(
        &self,
        document: &str,
        config: &CleaningConfiguration,
        token: &CancellationToken,
    ) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let steps: Vec<CleaningStep> = config.steps().collect();
        let total = steps.len();

        let mut ctx = CleaningContext::new(config);
        let mut content = document.replace("\r\n", "\n");
        let mut reports: Vec<StepReport> = Vec::with_capacity(total);

        let cancelled = |content: String, reports: Vec<StepReport>, at: Option<CleaningStep>| -> Result<RunOutcome> {
            info!(at = ?at, completed = reports.len(), "Run cancelled");
            Ok(RunOutcome::Cancelled(PartialRun {
                content,
                completed_steps: reports,
                cancelled_at: at,
                total_steps: total,
            }))
        };

        info!(steps = total, words = content.split_whitespace().count(), service = self.service.name(), "Cleaning run started");

        if config.needs_pattern_detection() {
            let detection = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                r = self.detect_shared_patterns(&content, config, &mut ctx) => r,
            };
            match detection {
                Ok(()) => {}
                Err(Error::Cancelled) => return cancelled(content, reports, steps.first().copied()),
                Err(e) => return Err(e),
            }
        }

        let defense = self.defense.clone().with_policy(config.defense);
        let runner = StepRunner {
            service: self.service.as_ref(),
            defense: &defense,
            reconnaissance: self.reconnaissance.as_ref(),
            reviewer: self.reviewer.as_ref(),
            observer: self.observer.as_ref(),
            config,
            cancel: token,
        };

        for (i, &step) in steps.iter().enumerate() {
            if token.is_cancelled() {
                return cancelled(content, reports, Some(step));
            }
            self.observer.step_started(step, i + 1, total);

            let expectation = step
                .region()
                .map(|kind| StepExpectation {
                    had_evidence: ctx.has_evidence(kind),
                    already_removed: ctx.was_removed(kind),
                })
                .unwrap_or_default();

            let step_timer = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(Error::Cancelled),
                r = runner.execute(step, &content, &mut ctx) => r,
            };

            let result = match outcome {
                Ok(result) => result,
                Err(Error::Cancelled) => return cancelled(content, reports, Some(step)),
                Err(e) => {
                    let error = match e {
                        Error::StepFailed { .. } => e,
                        other => Error::StepFailed {
                            step,
                            reason: other.to_string(),
                        },
                    };
                    if let Error::StepFailed { reason, .. } = &error {
                        self.observer.step_failed(step, reason);
                    }
                    return Err(error);
                }
            };

            let anomalies = verify::verify_step(step, &content, &result.content, expectation);
            for anomaly in &anomalies {
                self.observer.anomaly(anomaly);
            }
            ctx.anomalies.extend(anomalies);
            if let Some(confidence) = result.confidence {
                ctx.record_confidence(step, confidence);
            }

            let report = StepReport {
                step,
                status: StepStatus::Completed {
                    word_count: result.word_count,
                    change_count: result.lines_changed,
                },
                api_calls: result.api_calls,
                tokens: result.tokens,
                lines_before: content.lines().count(),
                lines_after: result.content.lines().count(),
                confidence: result.confidence,
                duration_ms: step_timer.elapsed().as_millis() as u64,
            };
            self.observer.step_completed(&report);
            reports.push(report);

            if result.content != content {
                ctx.bump_revision();
                content = result.content;
            }
        }

        let phase_confidence = confidence::phase_confidence(&ctx.step_confidence);
        let overall_confidence = confidence::overall_confidence(&phase_confidence);
        let total_api_calls = ctx.api_calls + reports.iter().map(|r| r.api_calls).sum::<u32>();
        let total_tokens = ctx.tokens + reports.iter().map(|r| r.tokens).sum::<u64>();
        let duration_ms = timer.elapsed().as_millis() as u64;

        info!(
            words = content.split_whitespace().count(),
            api_calls = total_api_calls,
            tokens = total_tokens,
            anomalies = ctx.anomalies.len(),
            "Cleaning run finished in {} ms",
            duration_ms
        );

        Ok(RunOutcome::Completed(Box::new(CleanedContent {
            content,
            metadata: ctx.metadata,
            patterns: ctx.patterns,
            steps: reports,
            phase_confidence,
            overall_confidence,
            removals: ctx.removals,
            anomalies: ctx.anomalies,
            review: ctx.review,
            started_at,
            duration_ms,
            total_api_calls,
            total_tokens,
            estimated_cost: total_tokens as f64 / 1000.0 * config.cost_per_1k_tokens,
        })))
    }
}

/// Builder for [`Pipeline`].
///
/// Capabilities left unset default to service-backed implementations when
/// an available service is configured, and to no-ops otherwise.
#[derive(Default)]
pub struct PipelineBuilder {
    service: Option<Arc<dyn AnalysisService>>,
    reconnaissance: Option<Arc<dyn ReconnaissanceProvider>>,
    pre_detector: Option<Arc<dyn BoundaryPreDetector>>,
    reviewer: Option<Arc<dyn FinalReviewer>>,
    observer: Option<Arc<dyn PipelineObserver>>,
    defense: Option<BoundaryDefense>,
}

impl PipelineBuilder {
    pub fn service(mut self, service: Arc<dyn AnalysisService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn reconnaissance(mut self, provider: Arc<dyn ReconnaissanceProvider>) -> Self {
        self.reconnaissance = Some(provider);
        self
    }

    pub fn pre_detector(mut self, detector: Arc<dyn BoundaryPreDetector>) -> Self {
        self.pre_detector = Some(detector);
        self
    }

    pub fn reviewer(mut self, reviewer: Arc<dyn FinalReviewer>) -> Self {
        self.reviewer = Some(reviewer);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Custom heuristics or verifier. The policy is replaced per run by
    /// the configuration's.
    pub fn defense(mut self, defense: BoundaryDefense) -> Self {
        self.defense = Some(defense);
        self
    }

    pub fn build(self) -> Pipeline {
        let service = self.service.unwrap_or_else(|| Arc::new(NullService));
        let online = service.is_available();

        let reconnaissance = self.reconnaissance.unwrap_or_else(|| {
            if online {
                Arc::new(ServiceReconnaissance::new(service.clone()))
            } else {
                Arc::new(NoReconnaissance)
            }
        });
        let pre_detector = self.pre_detector.unwrap_or_else(|| {
            if online {
                Arc::new(ServicePreDetector::new(service.clone()))
            } else {
                Arc::new(NoPreDetection)
            }
        });
        let reviewer = self.reviewer.unwrap_or_else(|| {
            if online {
                Arc::new(ServiceReviewer::new(service.clone()))
            } else {
                Arc::new(NoReview)
            }
        });

        Pipeline {
            service,
            reconnaissance,
            pre_detector,
            reviewer,
            observer: self.observer.unwrap_or_else(|| Arc::new(NoopObserver)),
            defense: self.defense.unwrap_or_default(),
            state: AtomicU8::new(RunState::Idle as u8),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DefensePolicy;

    #[test]
    fn test_rejects_empty_step_set() {
        let config = CleaningConfiguration::with_steps([]);
        assert!(matches!(
            validate_configuration(&config),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_chunking_and_policy() {
        let config = CleaningConfiguration::default().with_chunking(100, 100);
        assert!(validate_configuration(&config).is_err());

        let policy = DefensePolicy {
            index_min_start: 1.5,
            ..DefensePolicy::default()
        };
        let config = CleaningConfiguration::default().with_defense_policy(policy);
        let err = validate_configuration(&config).unwrap_err();
        assert!(err.to_string().contains("index_min_start"));

        assert!(validate_configuration(&CleaningConfiguration::default()).is_ok());
    }

    #[tokio::test]
    async fn test_offline_run_completes() {
        let pipeline = Pipeline::offline();
        let text = "Some plain text.\n\nAnother paragraph of text.";
        let outcome = pipeline
            .run(text, &CleaningConfiguration::minimal())
            .await
            .unwrap();
        let cleaned = outcome.completed().unwrap();
        assert_eq!(cleaned.steps.len(), 3);
        assert_eq!(cleaned.total_api_calls, 0);
        assert!(cleaned.content.contains("Another paragraph"));
        assert_eq!(pipeline.state(), RunState::Completed);
    }

    #[tokio::test]
    async fn test_cancel_before_steps_is_not_sticky() {
        let pipeline = Pipeline::offline();
        // A cancel with no active run does not affect the next run.
        pipeline.cancel();
        let outcome = pipeline
            .run("text", &CleaningConfiguration::minimal())
            .await
            .unwrap();
        assert!(!outcome.is_cancelled());
    }

    #[test]
    fn test_builder_defaults_offline_capabilities() {
        let pipeline = Pipeline::builder().build();
        assert_eq!(pipeline.service.name(), "offline");
        assert_eq!(pipeline.state(), RunState::Idle);
    }
}
