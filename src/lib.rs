//! # unocr
//!
//! Safe structural cleaning of OCR-derived Markdown for language-model
//! training and retrieval.
//!
//! An analysis service (any OpenAI-compatible endpoint) suggests where front
//! matter, tables of contents, indexes, back matter, and notes begin and end.
//! Those suggestions are never applied blindly: every boundary passes a
//! position check and a content check, and when both fail an AI-independent
//! heuristic takes over. When nothing is safe, content is left unchanged.
//!
//! ## Quick Start
//!
//! ```no_run
//! use unocr::{CleaningConfiguration, Pipeline};
//!
//! # async fn demo() -> unocr::Result<()> {
//! let raw = std::fs::read_to_string("book.md")?;
//! let outcome = Pipeline::offline()
//!     .run(&raw, &CleaningConfiguration::heuristic_only())
//!     .await?;
//!
//! if let Some(cleaned) = outcome.completed() {
//!     println!("{}", unocr::report::render_summary(&cleaned));
//!     std::fs::write("book.clean.md", cleaned.content)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `http` (default): [`service::OpenAiCompatibleClient`] over `reqwest`

pub mod async_api;
pub mod chunk;
pub mod config;
pub mod defense;
pub mod detect;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod references;
pub mod report;
pub mod sections;
pub mod service;
pub mod shield;

// Re-exports
pub use chunk::{Chunk, Chunker, TokenCounter};
pub use config::{
    BackMatterComponent, ChapterMarkerStyle, CleaningConfiguration, CleaningStep,
    ContentTypeHint, DefensePolicy, EndMarkerStyle, FrontMatterComponent, PipelinePhase,
    ProcessingMethod,
};
pub use defense::BoundaryDefense;
pub use error::{Error, Result, ServiceError};
pub use model::{
    BoundaryInfo, CleanedContent, DetectedPatterns, DocumentMetadata, LineRange, PartialRun,
    RegionKind, RunOutcome,
};
pub use normalize::NormalizeOptions;
pub use pipeline::{Pipeline, PipelineBuilder, PipelineObserver, RunState};
pub use service::{AnalysisService, NullService, ServiceConfig};
pub use shield::ContentShield;

#[cfg(feature = "http")]
pub use service::OpenAiCompatibleClient;

use std::sync::Arc;

/// Cleans a document with heuristics only.
///
/// # Example
///
/// ```no_run
/// # async fn demo() -> unocr::Result<()> {
/// let outcome = unocr::clean("raw OCR text", &unocr::CleaningConfiguration::minimal()).await?;
/// assert!(!outcome.is_cancelled());
/// # Ok(())
/// # }
/// ```
pub async fn clean(text: &str, config: &CleaningConfiguration) -> Result<RunOutcome> {
    Pipeline::offline().run(text, config).await
}

/// Character-level normalization with default options. No structural changes.
pub fn normalize_text(text: &str) -> String {
    normalize::normalize_default(text)
}

/// Runs the heuristic detectors over a document without changing it.
pub fn detect_structure(text: &str, config: &CleaningConfiguration) -> DetectedPatterns {
    let mut patterns = detect::detect_patterns(text, config);
    patterns.content_flags = detect::apply_content_hint(patterns.content_flags, config.content_type);
    patterns
}

/// Builder for one-off cleaning.
///
/// # Example
///
/// ```no_run
/// use unocr::{ChapterMarkerStyle, Unocr};
///
/// # async fn demo(text: &str) -> unocr::Result<()> {
/// let outcome = Unocr::new()
///     .with_chapter_markers(ChapterMarkerStyle::Heading)
///     .with_max_paragraph_words(180)
///     .clean(text)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Unocr {
    config: CleaningConfiguration,
    service: Option<Arc<dyn AnalysisService>>,
    observer: Option<Arc<dyn PipelineObserver>>,
}

impl Unocr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: CleaningConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Uses an analysis service for detection and rewriting.
    pub fn with_service(mut self, service: Arc<dyn AnalysisService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_step(mut self, step: CleaningStep, enabled: bool) -> Self {
        self.config = if enabled {
            self.config.enable(step)
        } else {
            self.config.disable(step)
        };
        self
    }

    pub fn with_chapter_markers(mut self, style: ChapterMarkerStyle) -> Self {
        self.config = self.config.with_chapter_markers(style);
        self
    }

    pub fn with_end_marker(mut self, style: EndMarkerStyle) -> Self {
        self.config = self.config.with_end_marker(style);
        self
    }

    pub fn with_max_paragraph_words(mut self, words: usize) -> Self {
        self.config = self.config.with_max_paragraph_words(words);
        self
    }

    pub fn keep_front_matter(mut self, component: FrontMatterComponent) -> Self {
        self.config = self.config.keep_front_matter(component);
        self
    }

    pub fn keep_back_matter(mut self, component: BackMatterComponent) -> Self {
        self.config = self.config.keep_back_matter(component);
        self
    }

    pub fn config(&self) -> &CleaningConfiguration {
        &self.config
    }

    /// Builds the pipeline this builder describes.
    pub fn pipeline(&self) -> Pipeline {
        let mut builder = Pipeline::builder();
        if let Some(service) = &self.service {
            builder = builder.service(service.clone());
        }
        if let Some(observer) = &self.observer {
            builder = builder.observer(observer.clone());
        }
        builder.build()
    }

    pub async fn clean(&self, text: &str) -> Result<RunOutcome> {
        self.pipeline().run(text, &self.config).await
    }
}
