//! End-to-end pipeline behavior with scripted analysis services.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use unocr::model::{
    AnomalyKind, CitationDetection, CitationStyle, DetectionSource, FootnoteDetection, Severity,
};
use unocr::service::{Completion, ServiceResponse, ServiceResult};
use unocr::{
    AnalysisService, BoundaryInfo, CleaningConfiguration, CleaningStep, Error, Pipeline,
    RegionKind, RunOutcome, RunState, ServiceError,
};

// ============================================================================
// Scripted services
// ============================================================================

/// Answers boundary questions from a table and echoes rewrite prompts.
#[derive(Default)]
struct ScriptedService {
    boundaries: BTreeMap<RegionKind, BoundaryInfo>,
    citations: Option<CitationDetection>,
    footnotes: Option<FootnoteDetection>,
    boundary_calls: AtomicUsize,
    completions: AtomicUsize,
}

impl ScriptedService {
    fn with_boundary(mut self, kind: RegionKind, boundary: BoundaryInfo) -> Self {
        self.boundaries.insert(kind, boundary);
        self
    }

    fn with_citations(mut self, detection: CitationDetection) -> Self {
        self.citations = Some(detection);
        self
    }

    fn with_footnotes(mut self, detection: FootnoteDetection) -> Self {
        self.footnotes = Some(detection);
        self
    }
}

#[async_trait]
impl AnalysisService for ScriptedService {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _system: Option<&str>, _max_tokens: u32) -> ServiceResult<Completion> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        let text = prompt
            .rsplit_once("\n\nText:\n")
            .map_or("{}", |(_, text)| text)
            .to_string();
        Ok(Completion { text, tokens_used: 10 })
    }

    async fn detect_boundary(
        &self,
        _content: &str,
        kind: RegionKind,
    ) -> ServiceResult<ServiceResponse<BoundaryInfo>> {
        self.boundary_calls.fetch_add(1, Ordering::SeqCst);
        let boundary = self.boundaries.get(&kind).cloned().unwrap_or_default();
        Ok(ServiceResponse::new(boundary, 25))
    }

    async fn detect_citations(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<CitationDetection>> {
        Ok(ServiceResponse::new(self.citations.clone().unwrap_or_default(), 25))
    }

    async fn detect_footnotes(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<FootnoteDetection>> {
        Ok(ServiceResponse::new(self.footnotes.clone().unwrap_or_default(), 25))
    }
}

/// Blocks every completion until cancelled.
#[derive(Default)]
struct GatedService {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl AnalysisService for GatedService {
    async fn complete(&self, prompt: &str, _system: Option<&str>, _max_tokens: u32) -> ServiceResult<Completion> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Completion {
            text: prompt.to_string(),
            tokens_used: 1,
        })
    }
}

/// Rejects every request as unauthenticated.
struct RevokedService;

#[async_trait]
impl AnalysisService for RevokedService {
    async fn complete(&self, _prompt: &str, _system: Option<&str>, _max_tokens: u32) -> ServiceResult<Completion> {
        Err(ServiceError::Authentication("401 invalid api key".into()))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn narrative(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("Line {} of the story continues here without incident.", i))
        .collect()
}

fn completed(outcome: RunOutcome) -> unocr::CleanedContent {
    match outcome {
        RunOutcome::Completed(cleaned) => *cleaned,
        RunOutcome::Cancelled(partial) => panic!("run cancelled at {:?}", partial.cancelled_at),
    }
}

// ============================================================================
// Boundary defense through the pipeline
// ============================================================================

#[tokio::test]
async fn test_hallucinated_back_matter_leaves_document_unchanged() {
    let document = narrative(1000).join("\n");
    let service = Arc::new(ScriptedService::default().with_boundary(
        RegionKind::BackMatter,
        BoundaryInfo::new(Some(4), None, 0.95),
    ));
    let pipeline = Pipeline::new(service.clone());
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveBackMatter]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content, document);
    assert!(cleaned.removals.is_empty());
    // The rejected pre-detected boundary is not asked for again.
    assert_eq!(service.boundary_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cleaned.steps[0].lines_before, cleaned.steps[0].lines_after);
    // Back matter was reported but nothing came out.
    assert_eq!(cleaned.anomalies.len(), 1);
    assert_eq!(cleaned.anomalies[0].step, CleaningStep::RemoveBackMatter);
    assert_eq!(cleaned.anomalies[0].kind, AnomalyKind::ZeroEffect);
    assert_eq!(cleaned.anomalies[0].severity, Severity::Warning);
    assert!(!cleaned.has_critical_anomalies());
}

#[tokio::test]
async fn test_boundary_without_markers_is_rejected() {
    let document = narrative(1000).join("\n");
    let service = Arc::new(ScriptedService::default().with_boundary(
        RegionKind::BackMatter,
        BoundaryInfo::new(Some(800), Some(1000), 0.9),
    ));
    let pipeline = Pipeline::new(service);
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveBackMatter]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content, document);
    assert_eq!(cleaned.steps[0].confidence, Some(0.5));
}

#[tokio::test]
async fn test_valid_service_boundary_is_applied() {
    let mut lines = narrative(1000);
    lines[899] = "# Appendix A: Tables".to_string();
    let document = lines.join("\n");
    let service = Arc::new(ScriptedService::default().with_boundary(
        RegionKind::BackMatter,
        BoundaryInfo::new(Some(900), None, 0.9),
    ));
    let pipeline = Pipeline::new(service);
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveBackMatter]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content, lines[..899].join("\n"));
    assert_eq!(cleaned.removals.len(), 1);
    assert_eq!(cleaned.removals[0].lines_removed, 101);
    assert_eq!(cleaned.removals[0].source, DetectionSource::Cache);
}

#[tokio::test]
async fn test_notes_section_removed_when_service_finds_nothing() {
    let mut lines: Vec<String> = (0..849)
        .map(|_| "The river ran on past the mill and the old stone bridge.".to_string())
        .collect();
    lines.push("# NOTES".to_string());
    for i in 1..=50 {
        lines.push(format!("{}. See the parish register, vol. {}.", i, i));
    }
    assert_eq!(lines.len(), 900);
    lines.push(String::new());
    let document = lines.join("\n");

    let pipeline = Pipeline::new(Arc::new(ScriptedService::default()));
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveFootnotes]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert!(!cleaned.content.contains("NOTES"));
    assert!(!cleaned.content.contains("parish register"));
    assert!(cleaned.content.starts_with("The river ran on"));
    assert_eq!(cleaned.removals.len(), 1);
    assert_eq!(cleaned.removals[0].region, RegionKind::Notes);
    assert_eq!(cleaned.removals[0].lines_removed, 51);
    assert!(cleaned.anomalies.is_empty());
}

#[tokio::test]
async fn test_hallucinated_notes_section_is_rejected() {
    let mut lines = narrative(1000);
    lines[299] = "1. The ferry still ran twice a day.".to_string();
    lines[300] = "2. Nobody remembered the old timetable.".to_string();
    let document = lines.join("\n");
    let service = Arc::new(ScriptedService::default().with_footnotes(FootnoteDetection {
        detected: true,
        sections: vec![BoundaryInfo::new(Some(300), Some(540), 0.9)],
        confidence: 0.9,
        ..FootnoteDetection::default()
    }));
    let pipeline = Pipeline::new(service);
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveFootnotes]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content, document);
    assert!(cleaned.removals.is_empty());
    assert_eq!(cleaned.steps[0].lines_after, 1000);
}

// ============================================================================
// Service-supplied patterns
// ============================================================================

#[tokio::test]
async fn test_overbroad_citation_pattern_is_skipped_and_reported() {
    let document = (0..20)
        .map(|i| format!("Day {} we walked to the ford (about 3 miles from town) and back.", i))
        .collect::<Vec<_>>()
        .join("\n\n");
    let service = Arc::new(ScriptedService::default().with_citations(CitationDetection {
        detected: true,
        style: Some(CitationStyle::Unknown),
        patterns: vec![r"\([^)]*\d[^)]*\)".to_string()],
        samples: Vec::new(),
        confidence: 0.8,
    }));
    let pipeline = Pipeline::new(service);
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveCitations]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content, document);
    assert_eq!(cleaned.anomalies.len(), 1);
    assert_eq!(cleaned.anomalies[0].step, CleaningStep::RemoveCitations);
    assert_eq!(cleaned.anomalies[0].kind, AnomalyKind::OverbroadPattern);
    assert_eq!(cleaned.anomalies[0].severity, Severity::Warning);
}

#[tokio::test]
async fn test_service_citation_pattern_spares_code_and_prose() {
    let document = "Growth slowed (Smith, 2001) in the north.\n\nUse `cargo build` Then Rest.\n\nAnother Sentence here.";
    let service = Arc::new(ScriptedService::default().with_citations(CitationDetection {
        detected: true,
        style: Some(CitationStyle::AuthorYear),
        patterns: vec!["[A-Z][a-z]+".to_string()],
        samples: vec!["(Smith, 2001)".to_string()],
        confidence: 0.9,
    }));
    let pipeline = Pipeline::new(service);
    let config = CleaningConfiguration::with_steps([CleaningStep::RemoveCitations]);

    let cleaned = completed(pipeline.run(document, &config).await.unwrap());

    assert_eq!(
        cleaned.content,
        "Growth slowed in the north.\n\nUse `cargo build` Then Rest.\n\nAnother Sentence here."
    );
}

// ============================================================================
// Staleness
// ============================================================================

fn book_with_glossary() -> String {
    let mut lines: Vec<String> = vec![
        "THE LONG ROAD".into(),
        String::new(),
        "Copyright © 2004 A. Writer".into(),
        "All rights reserved.".into(),
        String::new(),
        "# Chapter 1: Leaving".into(),
        String::new(),
    ];
    lines.extend(narrative(200));
    lines.push(String::new());
    lines.push("# Glossary".into());
    lines.push(String::new());
    for _ in 0..20 {
        lines.push("Causeway: a raised road across low or wet ground.".into());
    }
    lines.join("\n")
}

#[tokio::test]
async fn test_stale_hints_are_rederived_after_removal() {
    let document = book_with_glossary();
    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::with_steps([
        CleaningStep::RemoveFrontMatter,
        CleaningStep::RemoveBackMatter,
    ]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert!(cleaned.content.starts_with("# Chapter 1: Leaving"));
    assert!(cleaned.content.contains("Line 199 of the story"));
    assert!(!cleaned.content.contains("Glossary"));
    assert!(!cleaned.content.contains("Causeway"));

    assert_eq!(cleaned.removals.len(), 2);
    assert_eq!(cleaned.removals[0].region, RegionKind::FrontMatter);
    assert_eq!(cleaned.removals[0].source, DetectionSource::Cache);
    assert_eq!(cleaned.removals[0].lines_removed, 5);
    // Cached back-matter lines were computed before front matter was removed.
    assert_eq!(cleaned.removals[1].region, RegionKind::BackMatter);
    assert_eq!(cleaned.removals[1].source, DetectionSource::Heuristic);
}

#[tokio::test]
async fn test_rerun_on_cleaned_output_removes_nothing() {
    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::with_steps([
        CleaningStep::RemoveFrontMatter,
        CleaningStep::RemoveBackMatter,
    ]);

    let first = completed(pipeline.run(&book_with_glossary(), &config).await.unwrap());
    let second = completed(pipeline.run(&first.content, &config).await.unwrap());

    assert_eq!(second.content, first.content);
    assert!(second.removals.is_empty());
}

// ============================================================================
// Chunked rewriting
// ============================================================================

#[tokio::test]
async fn test_chunked_reflow_keeps_every_word_once() {
    let paragraphs: Vec<String> = (0..90)
        .map(|p| {
            (0..100)
                .map(|w| format!("w{:02}x{:03}", p, w))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let document = paragraphs.join("\n\n");
    assert_eq!(document.split_whitespace().count(), 9000);

    let service = Arc::new(ScriptedService::default());
    let pipeline = Pipeline::new(service.clone());
    let config = CleaningConfiguration::with_steps([CleaningStep::ReflowParagraphs])
        .with_chunking(3000, 200);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    let words: Vec<&str> = cleaned.content.split_whitespace().collect();
    let unique: HashSet<&str> = words.iter().copied().collect();
    assert_eq!(words.len(), 9000);
    assert_eq!(unique.len(), 9000);
    assert_eq!(unique, document.split_whitespace().collect::<HashSet<_>>());
    assert_eq!(service.completions.load(Ordering::SeqCst), 3);
    assert_eq!(cleaned.steps[0].api_calls, 3);
}

#[tokio::test]
async fn test_offline_reflow_joins_wrapped_lines() {
    let document = "The lantern swung in the wind and the\nwatch-\nman turned away.\n\n# Next";
    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::with_steps([CleaningStep::ReflowParagraphs]);

    let cleaned = completed(pipeline.run(document, &config).await.unwrap());

    assert!(cleaned
        .content
        .starts_with("The lantern swung in the wind and the watchman turned away."));
    assert!(cleaned.content.contains("# Next"));
    assert_eq!(cleaned.total_api_calls, 0);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_concurrent_run_is_rejected_and_cancel_yields_partial() {
    let service = Arc::new(GatedService::default());
    let pipeline = Arc::new(Pipeline::new(service.clone()));
    let document = "A paragraph that needs\nreflowing.".to_string();
    let config = CleaningConfiguration::with_steps([
        CleaningStep::NormalizeCharacters,
        CleaningStep::ReflowParagraphs,
    ]);

    let first = {
        let pipeline = pipeline.clone();
        let document = document.clone();
        let config = config.clone();
        tokio::spawn(async move { pipeline.run(&document, &config).await })
    };

    service.started.notified().await;
    assert!(pipeline.is_running());
    let second = pipeline.run(&document, &config).await;
    assert!(matches!(second, Err(Error::AlreadyRunning)));

    pipeline.cancel();
    let outcome = first.await.unwrap().unwrap();
    match outcome {
        RunOutcome::Cancelled(partial) => {
            assert_eq!(partial.cancelled_at, Some(CleaningStep::ReflowParagraphs));
            assert_eq!(partial.completed_steps.len(), 1);
            assert_eq!(partial.total_steps, 2);
            assert!(partial.content.contains("reflowing."));
        }
        RunOutcome::Completed(_) => panic!("run should have been cancelled"),
    }
    assert_eq!(pipeline.state(), RunState::Cancelled);
}

#[tokio::test]
async fn test_fatal_service_error_fails_the_step() {
    let pipeline = Pipeline::new(Arc::new(RevokedService));
    let config = CleaningConfiguration::with_steps([CleaningStep::ReflowParagraphs]);

    let err = pipeline.run("Some text.", &config).await.unwrap_err();
    match err {
        Error::StepFailed { step, reason } => {
            assert_eq!(step, CleaningStep::ReflowParagraphs);
            assert!(reason.contains("authentication"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(pipeline.state(), RunState::Failed);
}

#[tokio::test]
async fn test_heuristic_book_run() {
    let mut lines: Vec<String> = vec![
        "THE LONG ROAD".into(),
        String::new(),
        "Copyright © 2004 A. Writer".into(),
        "All rights reserved.".into(),
        String::new(),
        "# Contents".into(),
        String::new(),
        "Chapter 1: Leaving .......... 1".into(),
        "Chapter 2: Arriving .......... 9".into(),
        String::new(),
        "# Chapter 1: Leaving".into(),
        String::new(),
    ];
    for i in 0..100 {
        lines.push(format!("Line {} continues here without incident.", i));
        lines.push(String::new());
    }
    lines.push("# Chapter 2: Arriving".into());
    lines.push(String::new());
    for i in 0..100 {
        lines.push(format!("Later line {} continues here without incident.", i));
        lines.push(String::new());
    }
    lines.push("# Index".into());
    lines.push(String::new());
    for term in ["Abbey, 4", "Bridge, 12", "Causeway, 31", "Docks, 40", "Estuary, 52"] {
        lines.push(term.into());
    }
    let document = lines.join("\n");

    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::heuristic_only();
    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert!(!cleaned.content.contains("Copyright"));
    assert!(!cleaned.content.contains(".........."));
    assert!(!cleaned.content.contains("Estuary"));
    assert!(cleaned.content.contains("continues here without incident"));
    assert!(cleaned.content.contains("<!-- CHAPTER 1"));
    assert!(cleaned.content.ends_with("<!-- END OF DOCUMENT -->\n"));
    assert_eq!(cleaned.steps.len(), config.steps().count());
    assert_eq!(cleaned.total_api_calls, 0);
    assert!(cleaned.overall_confidence.is_some());
    assert!(cleaned.anomalies.is_empty(), "{:?}", cleaned.anomalies);
    assert_eq!(pipeline.state(), RunState::Completed);
}

#[tokio::test]
async fn test_collapsing_blank_runs_is_flagged_as_excessive() {
    let document = (0..10)
        .map(|i| format!("Paragraph {} stands on its own between wide gaps.", i))
        .collect::<Vec<_>>()
        .join("\n\n\n\n\n\n\n");
    assert_eq!(document.lines().count(), 64);
    let pipeline = Pipeline::offline();
    let config = CleaningConfiguration::with_steps([CleaningStep::FinalCleanup]);

    let cleaned = completed(pipeline.run(&document, &config).await.unwrap());

    assert_eq!(cleaned.content.lines().count(), 19);
    assert_eq!(cleaned.anomalies.len(), 1);
    assert_eq!(cleaned.anomalies[0].step, CleaningStep::FinalCleanup);
    assert_eq!(cleaned.anomalies[0].kind, AnomalyKind::ExcessiveRemoval);
    assert!(cleaned.has_critical_anomalies());
}
