//! Optional capabilities: reconnaissance, boundary pre-detection, final review.
//!
//! Each capability is a trait with a no-op implementation and one backed by
//! an [`AnalysisService`]. The pipeline treats a no-op exactly like a
//! service that found nothing.

use crate::config::{CleaningConfiguration, CleaningStep};
use crate::error::ServiceError;
use crate::model::{DetectedPatterns, DetectionSource, RegionHint, RegionKind, ReviewReport, StructuralHints};
use crate::service::{complete_json, prompts, AnalysisService, ServiceResponse, ServiceResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Service requests made by a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    pub api_calls: u32,
    pub tokens: u64,
}

impl Usage {
    pub fn add<T>(&mut self, response: &ServiceResponse<T>) {
        self.api_calls += 1;
        self.tokens += response.tokens_used;
    }
}

// ============================================================================
// Reconnaissance
// ============================================================================

/// Presence-only survey of the document before any step runs.
#[async_trait]
pub trait ReconnaissanceProvider: Send + Sync {
    /// `Ok(None)` means the capability is absent.
    async fn survey(&self, content: &str) -> ServiceResult<Option<ServiceResponse<StructuralHints>>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoReconnaissance;

#[async_trait]
impl ReconnaissanceProvider for NoReconnaissance {
    async fn survey(&self, _content: &str) -> ServiceResult<Option<ServiceResponse<StructuralHints>>> {
        Ok(None)
    }
}

pub struct ServiceReconnaissance {
    service: Arc<dyn AnalysisService>,
}

impl ServiceReconnaissance {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ReconnaissanceProvider for ServiceReconnaissance {
    async fn survey(&self, content: &str) -> ServiceResult<Option<ServiceResponse<StructuralHints>>> {
        let prompt = prompts::reconnaissance_prompt(content);
        let response = complete_json(self.service.as_ref(), &prompt, prompts::DETECTION_SYSTEM, 300).await?;
        Ok(Some(response))
    }
}

// ============================================================================
// Boundary pre-detection
// ============================================================================

/// Adds service boundaries to the shared pattern cache.
///
/// Runs once, right after heuristic pattern detection, on the same content
/// revision. Entries it writes are still validated when a step uses them.
#[async_trait]
pub trait BoundaryPreDetector: Send + Sync {
    async fn pre_detect(
        &self,
        content: &str,
        patterns: &mut DetectedPatterns,
        config: &CleaningConfiguration,
    ) -> ServiceResult<Usage>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreDetection;

#[async_trait]
impl BoundaryPreDetector for NoPreDetection {
    async fn pre_detect(
        &self,
        _content: &str,
        _patterns: &mut DetectedPatterns,
        _config: &CleaningConfiguration,
    ) -> ServiceResult<Usage> {
        Ok(Usage::default())
    }
}

pub struct ServicePreDetector {
    service: Arc<dyn AnalysisService>,
}

impl ServicePreDetector {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

const PRE_DETECTED: [(CleaningStep, RegionKind); 4] = [
    (CleaningStep::RemoveFrontMatter, RegionKind::FrontMatter),
    (CleaningStep::RemoveTableOfContents, RegionKind::TableOfContents),
    (CleaningStep::RemoveIndex, RegionKind::Index),
    (CleaningStep::RemoveBackMatter, RegionKind::BackMatter),
];

#[async_trait]
impl BoundaryPreDetector for ServicePreDetector {
    async fn pre_detect(
        &self,
        content: &str,
        patterns: &mut DetectedPatterns,
        config: &CleaningConfiguration,
    ) -> ServiceResult<Usage> {
        let mut usage = Usage::default();

        for (step, kind) in PRE_DETECTED {
            if !config.is_enabled(step) {
                continue;
            }
            match self.service.detect_boundary(content, kind).await {
                Ok(response) => {
                    usage.add(&response);
                    if response.value.is_empty() {
                        continue;
                    }
                    debug!(region = %kind, "Service boundary cached");
                    patterns.regions.insert(
                        kind,
                        RegionHint {
                            boundary: response.value,
                            source: DetectionSource::Service,
                        },
                    );
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!(region = %kind, "Boundary pre-detection failed: {}", e),
            }
        }

        if config.is_enabled(CleaningStep::RemoveAuxiliaryLists) {
            match self.service.detect_auxiliary_lists(content).await {
                Ok(response) => {
                    usage.add(&response);
                    if !response.value.is_empty() {
                        patterns.auxiliary_lists = response.value;
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Auxiliary list pre-detection failed: {}", e),
            }
        }

        Ok(usage)
    }
}

// ============================================================================
// Final review
// ============================================================================

/// Quality review of the finished content.
#[async_trait]
pub trait FinalReviewer: Send + Sync {
    /// `Ok(None)` means the capability is absent.
    async fn review(&self, content: &str) -> ServiceResult<Option<ServiceResponse<ReviewReport>>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoReview;

#[async_trait]
impl FinalReviewer for NoReview {
    async fn review(&self, _content: &str) -> ServiceResult<Option<ServiceResponse<ReviewReport>>> {
        Ok(None)
    }
}

pub struct ServiceReviewer {
    service: Arc<dyn AnalysisService>,
}

impl ServiceReviewer {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl FinalReviewer for ServiceReviewer {
    async fn review(&self, content: &str) -> ServiceResult<Option<ServiceResponse<ReviewReport>>> {
        let prompt = prompts::review_prompt(content);
        let mut response: ServiceResponse<ReviewReport> =
            complete_json(self.service.as_ref(), &prompt, prompts::REVIEW_SYSTEM, 600).await?;
        if !(0.0..=1.0).contains(&response.value.confidence) {
            return Err(ServiceError::MalformedResponse(format!(
                "review confidence {} out of range",
                response.value.confidence
            )));
        }
        response.value.issues.retain(|issue| !issue.trim().is_empty());
        Ok(Some(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::Completion;

    struct Scripted(&'static str);

    #[async_trait]
    impl AnalysisService for Scripted {
        async fn complete(&self, _prompt: &str, _system: Option<&str>, _max: u32) -> ServiceResult<Completion> {
            Ok(Completion {
                text: self.0.to_string(),
                tokens_used: 10,
            })
        }
    }

    #[tokio::test]
    async fn test_reconnaissance_parses_presence() {
        let provider = ServiceReconnaissance::new(Arc::new(Scripted(
            r#"{"index": true, "back_matter": true, "content_type": "academic"}"#,
        )));
        let hints = provider.survey("text").await.unwrap().unwrap();
        assert!(hints.value.index);
        assert!(!hints.value.front_matter);
        assert_eq!(hints.value.content_type, Some(crate::config::ContentTypeHint::Academic));
    }

    #[tokio::test]
    async fn test_pre_detector_caches_service_boundaries() {
        let provider = ServicePreDetector::new(Arc::new(Scripted(
            r#"{"start_line": 10, "end_line": 20, "confidence": 0.9}"#,
        )));
        let config = CleaningConfiguration::with_steps([CleaningStep::RemoveIndex]);
        let mut patterns = DetectedPatterns::default();
        let usage = provider.pre_detect("text", &mut patterns, &config).await.unwrap();
        assert_eq!(usage.api_calls, 1);
        assert_eq!(usage.tokens, 10);
        let hint = &patterns.regions[&RegionKind::Index];
        assert_eq!(hint.source, DetectionSource::Service);
        assert_eq!(hint.boundary.start_line, Some(10));
        assert!(!patterns.regions.contains_key(&RegionKind::BackMatter));
    }

    #[tokio::test]
    async fn test_review_rejects_out_of_range_confidence() {
        let reviewer = ServiceReviewer::new(Arc::new(Scripted(r#"{"confidence": 7}"#)));
        assert!(reviewer.review("text").await.is_err());

        let reviewer = ServiceReviewer::new(Arc::new(Scripted(
            r#"{"confidence": 0.9, "issues": ["", "page number left on line 3"]}"#,
        )));
        let report = reviewer.review("text").await.unwrap().unwrap().value;
        assert_eq!(report.issues, vec!["page number left on line 3".to_string()]);
    }

    #[tokio::test]
    async fn test_noop_capabilities() {
        assert!(NoReconnaissance.survey("x").await.unwrap().is_none());
        assert!(NoReview.review("x").await.unwrap().is_none());
    }
}
