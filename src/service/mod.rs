//! Analysis-service interface.
//!
//! The pipeline talks to the language model only through
//! [`AnalysisService`]. Every detection method has a default implementation
//! built on [`AnalysisService::complete`], so a client only has to provide
//! the completion call. Failures come back as [`ServiceError`]; the pipeline
//! decides which of them abort the run.

#[cfg(feature = "http")]
mod http;
pub mod prompts;

#[cfg(feature = "http")]
pub use http::OpenAiCompatibleClient;

use crate::error::ServiceError;
use crate::model::{
    AuxiliaryList, BoundaryInfo, ChapterDetection, CitationDetection, ContentTypeFlags,
    DocumentMetadata, FootnoteDetection, RegionKind,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;

/// Service call outcome.
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Text returned by a completion call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub tokens_used: u64,
}

/// A parsed detection plus the tokens it cost.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceResponse<T> {
    pub value: T,
    pub tokens_used: u64,
}

impl<T> ServiceResponse<T> {
    pub fn new(value: T, tokens_used: u64) -> Self {
        Self { value, tokens_used }
    }
}

/// Metadata extraction result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataExtraction {
    pub metadata: DocumentMetadata,
    #[serde(alias = "contentTypeFlags")]
    pub content_type_flags: Option<ContentTypeFlags>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuxiliaryListsEnvelope {
    lists: Vec<AuxiliaryList>,
}

/// Text-analysis service used for detection and rewriting.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str {
        "analysis"
    }

    /// Returns false for services that never answer. The pipeline skips
    /// their calls instead of counting them as requests.
    fn is_available(&self) -> bool {
        true
    }

    /// Generic completion.
    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
    ) -> ServiceResult<Completion>;

    /// Locates one structural region. Line numbers refer to `content`.
    async fn detect_boundary(
        &self,
        content: &str,
        kind: RegionKind,
    ) -> ServiceResult<ServiceResponse<BoundaryInfo>> {
        let prompt = prompts::boundary_prompt(content, kind);
        complete_json(self, &prompt, prompts::DETECTION_SYSTEM, 400).await
    }

    /// Locates list-of-figures style blocks.
    async fn detect_auxiliary_lists(
        &self,
        content: &str,
    ) -> ServiceResult<ServiceResponse<Vec<AuxiliaryList>>> {
        let prompt = prompts::auxiliary_lists_prompt(content);
        let completion = self
            .complete(&prompt, Some(prompts::DETECTION_SYSTEM), 800)
            .await?;
        let lists = parse_json::<Vec<AuxiliaryList>>(&completion.text)
            .or_else(|_| parse_json::<AuxiliaryListsEnvelope>(&completion.text).map(|e| e.lists))?;
        Ok(ServiceResponse::new(lists, completion.tokens_used))
    }

    async fn detect_citations(
        &self,
        content: &str,
    ) -> ServiceResult<ServiceResponse<CitationDetection>> {
        let prompt = prompts::citations_prompt(content);
        complete_json(self, &prompt, prompts::DETECTION_SYSTEM, 600).await
    }

    async fn detect_footnotes(
        &self,
        content: &str,
    ) -> ServiceResult<ServiceResponse<FootnoteDetection>> {
        let prompt = prompts::footnotes_prompt(content);
        complete_json(self, &prompt, prompts::DETECTION_SYSTEM, 600).await
    }

    async fn detect_chapters(
        &self,
        content: &str,
    ) -> ServiceResult<ServiceResponse<ChapterDetection>> {
        let prompt = prompts::chapters_prompt(content);
        complete_json(self, &prompt, prompts::DETECTION_SYSTEM, 1500).await
    }

    async fn extract_metadata(
        &self,
        front_matter: &str,
        sample: Option<&str>,
    ) -> ServiceResult<ServiceResponse<MetadataExtraction>> {
        let prompt = prompts::metadata_prompt(front_matter, sample);
        complete_json(self, &prompt, prompts::DETECTION_SYSTEM, 600).await
    }
}

/// Completes a prompt and parses the reply as JSON.
pub async fn complete_json<T, S>(
    service: &S,
    prompt: &str,
    system: &str,
    max_tokens: u32,
) -> ServiceResult<ServiceResponse<T>>
where
    T: DeserializeOwned + Send,
    S: AnalysisService + ?Sized,
{
    let completion = service.complete(prompt, Some(system), max_tokens).await?;
    let value = parse_json(&completion.text)?;
    Ok(ServiceResponse::new(value, completion.tokens_used))
}

/// Parses a model reply that may wrap its JSON in prose or code fences.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> ServiceResult<T> {
    let body = extract_json(text)
        .ok_or_else(|| ServiceError::MalformedResponse("no JSON value in response".into()))?;
    Ok(serde_json::from_str(body)?)
}

/// The outermost JSON object or array in `text`.
pub fn extract_json(text: &str) -> Option<&str> {
    let text = strip_code_fence(text);
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Removes a surrounding Markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ============================================================================
// Configuration
// ============================================================================

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub timeout_secs: u64,
    /// Base delay for exponential backoff.
    pub backoff_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_retries: 3,
            timeout_secs: 120,
            backoff_ms: 500,
        }
    }
}

impl ServiceConfig {
    /// Reads `UNOCR_API_KEY` (or `OPENAI_API_KEY`), `UNOCR_API_BASE`,
    /// `UNOCR_MODEL`, and `UNOCR_MAX_RETRIES`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: env::var("UNOCR_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty()),
            api_base: env::var("UNOCR_API_BASE").unwrap_or(defaults.api_base),
            model: env::var("UNOCR_MODEL").unwrap_or(defaults.model),
            max_retries: env::var("UNOCR_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            ..defaults
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }
}

// ============================================================================
// Offline service
// ============================================================================

/// A service that detects nothing and cannot complete prompts.
///
/// With it every hybrid step relies on its heuristic detectors. The
/// paragraph steps fall back to heuristic reflow and splitting; the other
/// AI-only steps leave content unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullService;

#[async_trait]
impl AnalysisService for NullService {
    fn name(&self) -> &str {
        "offline"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn complete(
        &self,
        _prompt: &str,
        _system: Option<&str>,
        _max_tokens: u32,
    ) -> ServiceResult<Completion> {
        Err(ServiceError::Unavailable("no analysis service configured".into()))
    }

    async fn detect_boundary(
        &self,
        _content: &str,
        _kind: RegionKind,
    ) -> ServiceResult<ServiceResponse<BoundaryInfo>> {
        Ok(ServiceResponse::default())
    }

    async fn detect_auxiliary_lists(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<Vec<AuxiliaryList>>> {
        Ok(ServiceResponse::default())
    }

    async fn detect_citations(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<CitationDetection>> {
        Ok(ServiceResponse::default())
    }

    async fn detect_footnotes(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<FootnoteDetection>> {
        Ok(ServiceResponse::default())
    }

    async fn detect_chapters(
        &self,
        _content: &str,
    ) -> ServiceResult<ServiceResponse<ChapterDetection>> {
        Ok(ServiceResponse::default())
    }

    async fn extract_metadata(
        &self,
        _front_matter: &str,
        _sample: Option<&str>,
    ) -> ServiceResult<ServiceResponse<MetadataExtraction>> {
        Ok(ServiceResponse::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    #[async_trait]
    impl AnalysisService for Canned {
        async fn complete(
            &self,
            _prompt: &str,
            _system: Option<&str>,
            _max_tokens: u32,
        ) -> ServiceResult<Completion> {
            Ok(Completion {
                text: self.0.to_string(),
                tokens_used: 42,
            })
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_extract_json_from_prose() {
        let text = "Here you go: {\"start_line\": 3} hope it helps";
        assert_eq!(extract_json(text), Some("{\"start_line\": 3}"));
        assert_eq!(extract_json("nothing here"), None);
    }

    #[test]
    fn test_parse_boundary_with_camel_case() {
        let boundary: BoundaryInfo =
            parse_json("```json\n{\"startLine\": 12, \"endLine\": null, \"confidence\": 0.8}\n```")
                .unwrap();
        assert_eq!(boundary.start_line, Some(12));
        assert_eq!(boundary.end_line, None);
    }

    #[test]
    fn test_missing_fields_default() {
        let detection: FootnoteDetection = parse_json("{\"detected\": true}").unwrap();
        assert!(detection.detected);
        assert!(detection.sections.is_empty());
    }

    #[test]
    fn test_malformed_json_is_classified() {
        let err = parse_json::<BoundaryInfo>("{not json}").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedResponse(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_default_detection_uses_complete() {
        let service = Canned("{\"start_line\": 900, \"confidence\": 0.7}");
        let response = service
            .detect_boundary("text", RegionKind::Index)
            .await
            .unwrap();
        assert_eq!(response.value.start_line, Some(900));
        assert_eq!(response.tokens_used, 42);
    }

    #[tokio::test]
    async fn test_auxiliary_lists_accepts_envelope() {
        let service = Canned("{\"lists\": [{\"kind\": \"figures\", \"startLine\": 5, \"endLine\": 9, \"confidence\": 0.8}]}");
        let response = service.detect_auxiliary_lists("text").await.unwrap();
        assert_eq!(response.value.len(), 1);
        assert_eq!(response.value[0].end_line, 9);
    }

    #[tokio::test]
    async fn test_null_service_detects_nothing() {
        let service = NullService;
        let boundary = service
            .detect_boundary("text", RegionKind::BackMatter)
            .await
            .unwrap();
        assert!(boundary.value.is_empty());
        assert!(matches!(
            service.complete("hi", None, 10).await,
            Err(ServiceError::Unavailable(_))
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = ServiceConfig::default()
            .with_api_key("k")
            .with_model("m");
        assert!(config.has_credentials());
        assert_eq!(config.model, "m");
        assert_eq!(config.max_retries, 3);
    }
}
