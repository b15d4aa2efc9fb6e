//! Step implementations.
//!
//! Every step receives the current content and returns a [`StepResult`].
//! Structural steps route all boundaries through [`BoundaryDefense`].

use super::assembly;
use super::observer::PipelineObserver;
use super::providers::{FinalReviewer, ReconnaissanceProvider, Usage};
use super::rewrite::{self, check_rewrite};
use crate::chunk::{self, Chunker, TokenCounter};
use crate::config::{BackMatterComponent, CleaningConfiguration, CleaningStep};
use crate::defense::{AcceptedBoundary, BoundaryDefense, Candidate};
use crate::detect::{self, split_lines};
use crate::error::{Error, Result, ServiceError};
use crate::model::{
    Anomaly, AnomalyKind, CleaningContext, DetectionSource, ExclusionZone, LineRange, RegionKind,
    RemovalRecord, Severity, StepResult,
};
use crate::normalize::{self, NormalizeOptions};
use crate::references;
use crate::sections;
use crate::service::{prompts, strip_code_fence, AnalysisService, ServiceResponse, ServiceResult};
use crate::shield::{ContentShield, ShieldOptions};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lines of front matter sent for metadata extraction.
const METADATA_FRONT_LINES: usize = 300;
const METADATA_SAMPLE_LINES: usize = 60;

/// Confidence of a structural step that found no trace of its region.
const NOTHING_TO_REMOVE: f64 = 0.9;
/// Confidence of a structural step whose region was reported but not safely located.
const UNRESOLVED_REGION: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewriteMode {
    Reflow,
    Optimize,
}

/// Everything a step may use besides the content and the context.
pub(crate) struct StepRunner<'a> {
    pub service: &'a dyn AnalysisService,
    pub defense: &'a BoundaryDefense,
    pub reconnaissance: &'a dyn ReconnaissanceProvider,
    pub reviewer: &'a dyn FinalReviewer,
    pub observer: &'a dyn PipelineObserver,
    pub config: &'a CleaningConfiguration,
    pub cancel: &'a CancellationToken,
}

/// Records service-supplied patterns a reference pass refused to apply.
fn record_skipped_patterns(step: CleaningStep, skipped: &[String], ctx: &mut CleaningContext) {
    for pattern in skipped {
        ctx.anomalies.push(Anomaly {
            step,
            kind: AnomalyKind::OverbroadPattern,
            severity: Severity::Warning,
            message: format!("pattern `{}` matched too much prose and was not applied", pattern),
        });
    }
}

fn step_failed(step: CleaningStep, error: &ServiceError) -> Error {
    Error::StepFailed {
        step,
        reason: error.to_string(),
    }
}

impl StepRunner<'_> {
    pub async fn execute(
        &self,
        step: CleaningStep,
        content: &str,
        ctx: &mut CleaningContext,
    ) -> Result<StepResult> {
        use CleaningStep::*;
        match step {
            Reconnaissance => self.reconnaissance(content, ctx).await,
            ExtractMetadata => self.extract_metadata(content, ctx).await,
            RemoveFrontMatter => self.remove_region(step, RegionKind::FrontMatter, content, ctx).await,
            RemoveTableOfContents => {
                self.remove_region(step, RegionKind::TableOfContents, content, ctx)
                    .await
            }
            RemoveAuxiliaryLists => self.remove_auxiliary_lists(content, ctx).await,
            RemoveIndex => self.remove_region(step, RegionKind::Index, content, ctx).await,
            RemoveBackMatter => self.remove_region(step, RegionKind::BackMatter, content, ctx).await,
            RemoveCitations => self.remove_citations(content, ctx).await,
            RemoveFootnotes => self.remove_footnotes(content, ctx).await,
            RemovePageArtifacts => Ok(self.remove_page_artifacts(content)),
            NormalizeCharacters => Ok(self.normalize_characters(content)),
            FinalCleanup => {
                Ok(StepResult::new(content, normalize::final_cleanup(content)).with_confidence(0.95))
            }
            ReflowParagraphs => self.rewrite(step, RewriteMode::Reflow, content).await,
            OptimizeParagraphLength => self.rewrite(step, RewriteMode::Optimize, content).await,
            AddStructure => self.add_structure(content, ctx).await,
            FinalReview => self.final_review(content, ctx).await,
        }
    }

    /// Unwraps a service answer. Fatal errors abort the step; anything else
    /// degrades to `None`.
    fn absorb<T>(
        &self,
        step: CleaningStep,
        result: ServiceResult<ServiceResponse<T>>,
        usage: &mut Usage,
    ) -> Result<Option<T>> {
        match result {
            Ok(response) => {
                usage.add(&response);
                Ok(Some(response.value))
            }
            Err(e) if e.is_fatal() => Err(step_failed(step, &e)),
            Err(e) => {
                usage.api_calls += 1;
                warn!("{}: service call failed, continuing without it: {}", step, e);
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Reconnaissance and metadata
    // ========================================================================

    async fn reconnaissance(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::Reconnaissance;
        match self.reconnaissance.survey(content).await {
            Ok(Some(response)) => {
                let hints = response.value;
                if self.config.content_type == crate::config::ContentTypeHint::Auto {
                    if let Some(hint) = hints.content_type {
                        ctx.patterns.content_flags =
                            detect::apply_content_hint(ctx.patterns.content_flags, hint);
                    }
                }
                debug!(?hints, "Reconnaissance hints");
                ctx.hints = hints;
                Ok(StepResult::unchanged(content)
                    .with_confidence(0.8)
                    .with_usage(1, response.tokens_used))
            }
            Ok(None) => Ok(StepResult::unchanged(content)),
            Err(e) if e.is_fatal() => Err(step_failed(step, &e)),
            Err(e) => {
                warn!("{}: {}", step, e);
                Ok(StepResult::unchanged(content).with_usage(1, 0))
            }
        }
    }

    async fn extract_metadata(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::ExtractMetadata;
        if !self.service.is_available() {
            return Ok(StepResult::unchanged(content));
        }

        let lines = split_lines(content);
        let front_end = ctx
            .position_hint(RegionKind::FrontMatter)
            .and_then(|b| b.resolve(RegionKind::FrontMatter, lines.len()))
            .map_or(METADATA_SAMPLE_LINES, |r| r.end.max(METADATA_SAMPLE_LINES))
            .min(METADATA_FRONT_LINES)
            .min(lines.len());
        let front = lines[..front_end].join("\n");
        let middle = lines.len() / 2;
        let sample_end = (middle + METADATA_SAMPLE_LINES).min(lines.len());
        let sample = (middle > front_end).then(|| lines[middle..sample_end].join("\n"));

        let mut usage = Usage::default();
        let extraction = self.absorb(
            step,
            self.service.extract_metadata(&front, sample.as_deref()).await,
            &mut usage,
        )?;

        let mut result = StepResult::unchanged(content).with_usage(usage.api_calls, usage.tokens);
        if let Some(extraction) = extraction {
            if let Some(flags) = extraction.content_type_flags {
                ctx.patterns.content_flags = ctx.patterns.content_flags.merge(flags);
            }
            let found = !extraction.metadata.is_empty();
            info!(title = ?extraction.metadata.title, author = ?extraction.metadata.author, "Metadata extracted");
            ctx.metadata = extraction.metadata;
            result = result.with_confidence(if found { 0.85 } else { 0.5 });
        }
        Ok(result)
    }

    // ========================================================================
    // Structural removal
    // ========================================================================

    fn no_removal(&self, kind: RegionKind, content: &str, ctx: &CleaningContext, usage: Usage) -> StepResult {
        let confidence = if ctx.has_evidence(kind) {
            UNRESOLVED_REGION
        } else {
            NOTHING_TO_REMOVE
        };
        StepResult::unchanged(content)
            .with_confidence(confidence)
            .with_usage(usage.api_calls, usage.tokens)
    }

    /// Removes accepted ranges, keeping protected sub-sections.
    fn apply_removal(
        &self,
        step: CleaningStep,
        kind: RegionKind,
        content: &str,
        accepted: &[AcceptedBoundary],
        ctx: &mut CleaningContext,
        usage: Usage,
    ) -> StepResult {
        let lines = split_lines(content);
        let ranges: Vec<LineRange> = accepted.iter().map(|a| a.range).collect();
        let zones: Vec<ExclusionZone> = ranges
            .iter()
            .flat_map(|&range| {
                sections::exclusion_zones(&lines, kind, range, &ctx.protected_front, &ctx.protected_back)
            })
            .collect();
        for zone in &zones {
            info!(region = %kind, range = %zone.range, "{}", zone.reason);
        }

        let removal = sections::remove_ranges(content, &ranges, &zones);
        let confidence =
            accepted.iter().map(|a| a.confidence).sum::<f64>() / accepted.len().max(1) as f64;

        if removal.lines_removed > 0 {
            let source = accepted
                .first()
                .map_or(DetectionSource::Heuristic, |a| a.source);
            info!(
                region = %kind,
                lines = removal.lines_removed,
                kept = removal.lines_kept,
                source = ?source,
                "Region removed"
            );
            ctx.record_removal(RemovalRecord {
                region: kind,
                step,
                lines_removed: removal.lines_removed,
                source,
                confidence,
            });
        }

        StepResult::new(content, removal.content)
            .with_confidence(confidence)
            .with_usage(usage.api_calls, usage.tokens)
    }

    /// Cache, then service, then the heuristic fallback, for a single-block region.
    async fn remove_region(
        &self,
        step: CleaningStep,
        kind: RegionKind,
        content: &str,
        ctx: &mut CleaningContext,
    ) -> Result<StepResult> {
        let lines = split_lines(content);
        let mut usage = Usage::default();
        let mut rejected = Vec::new();

        let cached = ctx
            .position_hint(kind)
            .filter(|b| !b.is_empty())
            .cloned()
            .zip(ctx.patterns.regions.get(&kind).map(|h| h.source));
        let mut ask_service = self.service.is_available();

        if let Some((boundary, origin)) = cached {
            match self
                .defense
                .check(kind, &Candidate::new(boundary, DetectionSource::Cache), &lines)
            {
                Ok(accepted) => {
                    return Ok(self.apply_removal(step, kind, content, &[accepted], ctx, usage));
                }
                Err(r) => {
                    warn!(region = %kind, "Cached boundary rejected: {}", r.rejection);
                    // Same content, same question: the service would answer the same.
                    if origin == DetectionSource::Service {
                        ask_service = false;
                    }
                    rejected.push(r);
                }
            }
        }

        let mut candidates = Vec::new();
        if ask_service {
            let answer = self.absorb(step, self.service.detect_boundary(content, kind).await, &mut usage)?;
            if let Some(boundary) = answer.filter(|b| !b.is_empty()) {
                candidates.push(Candidate::new(boundary, DetectionSource::Service));
            }
        }

        let mut outcome = self.defense.resolve(kind, &candidates, &lines);
        rejected.append(&mut outcome.rejected);
        outcome.rejected = rejected;

        if outcome.is_noop() {
            return Ok(self.no_removal(kind, content, ctx, usage));
        }
        Ok(self.apply_removal(step, kind, content, &outcome.accepted, ctx, usage))
    }

    async fn remove_auxiliary_lists(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::RemoveAuxiliaryLists;
        let kind = RegionKind::AuxiliaryLists;
        let lines = split_lines(content);
        let mut usage = Usage::default();

        let mut candidates: Vec<Candidate> = if ctx.patterns_are_current() {
            ctx.patterns
                .auxiliary_lists
                .iter()
                .map(|list| Candidate::new(list.boundary(), DetectionSource::Cache))
                .collect()
        } else {
            Vec::new()
        };
        if candidates.is_empty() && self.service.is_available() {
            let lists = self
                .absorb(step, self.service.detect_auxiliary_lists(content).await, &mut usage)?
                .unwrap_or_default();
            candidates = lists
                .iter()
                .map(|list| Candidate::new(list.boundary(), DetectionSource::Service))
                .collect();
        }

        let outcome = self.defense.resolve_all(kind, &candidates, &lines);
        if outcome.is_noop() {
            return Ok(self.no_removal(kind, content, ctx, usage));
        }
        Ok(self.apply_removal(step, kind, content, &outcome.accepted, ctx, usage))
    }

    // ========================================================================
    // References
    // ========================================================================

    async fn remove_citations(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::RemoveCitations;
        let mut usage = Usage::default();

        let mut detection = ctx.patterns.citations.clone();
        if !detection.detected && self.service.is_available() {
            if let Some(found) = self.absorb(step, self.service.detect_citations(content).await, &mut usage)? {
                detection = found;
            }
        }
        if !detection.detected {
            detection = references::detect_citations(content);
        }
        if !detection.detected {
            return Ok(StepResult::unchanged(content)
                .with_confidence(NOTHING_TO_REMOVE)
                .with_usage(usage.api_calls, usage.tokens));
        }

        let removal = references::remove_citations(content, &detection);
        info!(style = ?detection.style, removed = removal.removed, "Citations removed");
        record_skipped_patterns(step, &removal.skipped_patterns, ctx);
        ctx.patterns.citations = detection.clone();
        Ok(StepResult::new(content, removal.content)
            .with_confidence(detection.confidence.max(UNRESOLVED_REGION))
            .with_usage(usage.api_calls, usage.tokens))
    }

    async fn remove_footnotes(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::RemoveFootnotes;
        let kind = RegionKind::Notes;
        let lines = split_lines(content);
        let mut usage = Usage::default();
        let mut service_detection = None;
        let mut text = content.to_string();
        let mut confidences = Vec::new();

        if !ctx.protected_back.contains(&BackMatterComponent::Notes) {
            let mut candidates: Vec<Candidate> = if ctx.patterns_are_current() {
                ctx.patterns
                    .footnotes
                    .sections
                    .iter()
                    .map(|b| Candidate::new(b.clone(), DetectionSource::Cache))
                    .collect()
            } else {
                Vec::new()
            };
            if candidates.is_empty() && self.service.is_available() {
                service_detection =
                    self.absorb(step, self.service.detect_footnotes(content).await, &mut usage)?;
                if let Some(found) = &service_detection {
                    candidates = found
                        .sections
                        .iter()
                        .filter(|b| !b.is_empty())
                        .map(|b| Candidate::new(b.clone(), DetectionSource::Service))
                        .collect();
                }
            }

            let outcome = self.defense.resolve_all(kind, &candidates, &lines);
            if !outcome.is_noop() {
                let removed = self.apply_removal(step, kind, content, &outcome.accepted, ctx, Usage::default());
                confidences.extend(removed.confidence);
                text = removed.content;
            }
        }

        let markers = if ctx.patterns.footnotes.marker_style.is_some() {
            ctx.patterns.footnotes.clone()
        } else {
            service_detection
                .filter(|d| d.detected && d.marker_style.is_some())
                .unwrap_or_else(|| references::detect_footnote_markers(&text))
        };
        let stripped = references::remove_footnote_markers(&text, &markers);
        record_skipped_patterns(step, &stripped.skipped_patterns, ctx);
        let definitions = references::remove_footnote_definitions(&stripped.content);
        debug!(
            markers = stripped.removed,
            definitions = definitions.removed,
            "Footnote references removed"
        );
        if markers.detected {
            confidences.push(markers.confidence.max(UNRESOLVED_REGION));
        }

        let confidence = if confidences.is_empty() {
            NOTHING_TO_REMOVE
        } else {
            confidences.iter().sum::<f64>() / confidences.len() as f64
        };
        Ok(StepResult::new(content, definitions.content)
            .with_confidence(confidence)
            .with_usage(usage.api_calls, usage.tokens))
    }

    // ========================================================================
    // Finishing
    // ========================================================================

    fn remove_page_artifacts(&self, content: &str) -> StepResult {
        let cleaned = normalize::remove_page_artifacts(
            content,
            self.config.header_footer_threshold,
            self.config.max_header_footer_length,
        );
        StepResult::new(content, cleaned).with_confidence(0.9)
    }

    fn normalize_characters(&self, content: &str) -> StepResult {
        let options = NormalizeOptions {
            preserve_code: self.config.preserve_code,
            preserve_math: self.config.preserve_math,
            strip_references: false,
            ..NormalizeOptions::default()
        };
        StepResult::new(content, normalize::normalize(content, &options)).with_confidence(0.95)
    }

    // ========================================================================
    // Optimization
    // ========================================================================

    fn rewrite_heuristically(&self, mode: RewriteMode, text: &str) -> String {
        match mode {
            RewriteMode::Reflow => rewrite::reflow_paragraphs(text),
            RewriteMode::Optimize => {
                rewrite::split_long_paragraphs(text, self.config.max_paragraph_words)
            }
        }
    }

    /// Chunked service rewrite with per-chunk validation and fallback.
    async fn rewrite(&self, step: CleaningStep, mode: RewriteMode, content: &str) -> Result<StepResult> {
        let max_words = self.config.max_paragraph_words;
        if mode == RewriteMode::Optimize && !rewrite::has_long_paragraphs(content, max_words) {
            return Ok(StepResult::unchanged(content).with_confidence(1.0));
        }

        let options = ShieldOptions {
            code: self.config.preserve_code,
            math: self.config.preserve_math,
            tables: true,
        };
        let (shielded, shield) = ContentShield::extract_with(content, options);
        let chunks = Chunker::from_config(self.config).chunk(&shielded);
        if chunks.is_empty() {
            return Ok(StepResult::unchanged(content));
        }

        let mut usage = Usage::default();
        let mut rewritten = 0usize;
        let mut outputs = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let needs_service = self.service.is_available()
                && (mode == RewriteMode::Reflow
                    || rewrite::has_long_paragraphs(&chunk.content, max_words));
            let output = if !needs_service {
                self.rewrite_heuristically(mode, &chunk.content)
            } else {
                let prompt = match mode {
                    RewriteMode::Reflow => prompts::reflow_prompt(&chunk.content, &chunk.context),
                    RewriteMode::Optimize => {
                        prompts::optimize_prompt(&chunk.content, &chunk.context, max_words)
                    }
                };
                let max_tokens = (TokenCounter::estimate(&chunk.content) * 2 + 256).min(16_000) as u32;
                match self
                    .service
                    .complete(&prompt, Some(prompts::REWRITE_SYSTEM), max_tokens)
                    .await
                {
                    Ok(completion) => {
                        usage.api_calls += 1;
                        usage.tokens += completion.tokens_used;
                        let text = strip_code_fence(&completion.text).to_string();
                        match check_rewrite(&chunk.content, &text, &shield) {
                            Ok(()) => {
                                rewritten += 1;
                                text
                            }
                            Err(reason) => {
                                warn!(chunk = chunk.index, ?reason, "{}: rewrite refused, chunk kept", step);
                                chunk.content.clone()
                            }
                        }
                    }
                    Err(e) if e.is_fatal() => return Err(step_failed(step, &e)),
                    Err(e) => {
                        usage.api_calls += 1;
                        warn!(chunk = chunk.index, "{}: service failed, using heuristic: {}", step, e);
                        self.rewrite_heuristically(mode, &chunk.content)
                    }
                }
            };
            outputs.push(output);
            self.observer
                .progress(step, (i + 1) as f64 / chunks.len() as f64);
        }

        let merged = shield.restore(&chunk::merge(&outputs));
        let confidence = if usage.api_calls == 0 {
            0.6
        } else {
            0.6 + 0.35 * rewritten as f64 / chunks.len() as f64
        };
        Ok(StepResult::new(content, merged)
            .with_confidence(confidence)
            .with_usage(usage.api_calls, usage.tokens))
    }

    // ========================================================================
    // Assembly and review
    // ========================================================================

    async fn add_structure(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::AddStructure;
        let mut usage = Usage::default();
        let mut text = content.to_string();
        let mut confidence = NOTHING_TO_REMOVE;

        if self.config.chapter_segmentation {
            let lines = split_lines(content);
            let cached = (ctx.patterns_are_current() && ctx.patterns.chapters.detected)
                .then(|| ctx.patterns.chapters.clone());
            let detection = match cached {
                Some(detection) => detection,
                None => {
                    let from_service = if self.service.is_available() {
                        self.absorb(step, self.service.detect_chapters(content).await, &mut usage)?
                            .map(|d| assembly::validate_chapters(&d, &lines))
                            .filter(|d| d.detected)
                    } else {
                        None
                    };
                    from_service.unwrap_or_else(|| detect::detect_chapters(&lines))
                }
            };

            if detection.detected {
                let (marked, written) =
                    assembly::insert_chapter_markers(content, &detection, self.config.chapter_marker_style);
                info!(chapters = detection.chapters.len(), markers = written, "Chapter markers inserted");
                text = marked;
                confidence = detection.confidence;
            }
        }

        if self.config.include_metadata_header {
            text = assembly::prepend_frontmatter(&text, &ctx.metadata);
        }
        text = assembly::append_end_marker(&text, self.config.end_marker_style);

        Ok(StepResult::new(content, text)
            .with_confidence(confidence)
            .with_usage(usage.api_calls, usage.tokens))
    }

    async fn final_review(&self, content: &str, ctx: &mut CleaningContext) -> Result<StepResult> {
        let step = CleaningStep::FinalReview;
        match self.reviewer.review(content).await {
            Ok(Some(response)) => {
                let confidence = response.value.confidence;
                for issue in &response.value.issues {
                    info!("Review: {}", issue);
                }
                ctx.review = Some(response.value);
                Ok(StepResult::unchanged(content)
                    .with_confidence(confidence)
                    .with_usage(1, response.tokens_used))
            }
            Ok(None) => Ok(StepResult::unchanged(content)),
            Err(e) if e.is_fatal() => Err(step_failed(step, &e)),
            Err(e) => {
                warn!("{}: {}", step, e);
                Ok(StepResult::unchanged(content).with_usage(1, 0))
            }
        }
    }
}
