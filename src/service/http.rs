//! OpenAI-compatible chat-completions client.

use super::{AnalysisService, Completion, ServiceConfig, ServiceResult};
use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest wait between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u64,
}

/// Client for any endpoint that speaks the OpenAI chat-completions API.
///
/// Timeouts, rate limits, and server errors are retried with exponential
/// backoff. Authentication and request errors are returned immediately.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: ServiceConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// Creates a client. Fails when no API key is configured.
    pub fn new(config: ServiceConfig) -> ServiceResult<Self> {
        if !config.has_credentials() {
            return Err(ServiceError::Authentication(
                "no API key; set UNOCR_API_KEY".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    /// Creates a client from `UNOCR_*` environment variables.
    pub fn from_env() -> ServiceResult<Self> {
        Self::new(ServiceConfig::from_env())
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Sends a one-token request to check credentials.
    pub async fn validate_key(&self) -> ServiceResult<()> {
        self.complete("ping", None, 1).await.map(|_| ())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = Duration::from_millis(self.config.backoff_ms.saturating_mul(1 << attempt.min(16)));
        delay.min(MAX_BACKOFF)
    }

    async fn send_once(&self, request: &ChatRequest<'_>) -> ServiceResult<Completion> {
        let url = format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'));
        let response = self
            .http
            .post(url)
            .bearer_auth(self.config.api_key.as_deref().unwrap_or_default())
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ServiceError::Transient(e.to_string())
                } else {
                    ServiceError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::Transient(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ServiceError::MalformedResponse("no content in response".into()))?;
        let tokens_used = parsed.usage.map_or_else(
            || crate::chunk::TokenCounter::estimate(&text),
            |u| u.total_tokens,
        );
        Ok(Completion { text, tokens_used })
    }
}

/// Maps an HTTP error status to a service error.
fn classify_status(status: StatusCode, body: &str) -> ServiceError {
    let message = format!("{}: {}", status, body.chars().take(300).collect::<String>());
    match status.as_u16() {
        401 | 403 => ServiceError::Authentication(message),
        400 | 404 | 422 => ServiceError::InvalidRequest(message),
        408 | 429 | 500..=599 => ServiceError::Transient(message),
        _ => ServiceError::Unavailable(message),
    }
}

#[async_trait]
impl AnalysisService for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn complete(
        &self,
        prompt: &str,
        system: Option<&str>,
        max_tokens: u32,
    ) -> ServiceResult<Completion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(Message {
                role: "system",
                content: system,
            });
        }
        messages.push(Message {
            role: "user",
            content: prompt,
        });
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens,
            temperature: 0.0,
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(completion) => {
                    if attempt > 0 {
                        debug!("Request succeeded after {} retries", attempt);
                    }
                    return Ok(completion);
                }
                Err(ServiceError::Transient(reason)) if attempt < self.config.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "Request failed (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.config.max_retries + 1,
                        delay,
                        reason
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            ServiceError::Authentication(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, ""),
            ServiceError::InvalidRequest(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ServiceError::Transient(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, ""),
            ServiceError::Transient(_)
        ));
    }

    #[test]
    fn test_requires_api_key() {
        let err = OpenAiCompatibleClient::new(ServiceConfig::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let client = OpenAiCompatibleClient::new(ServiceConfig::default().with_api_key("k")).unwrap();
        assert_eq!(client.backoff(0), Duration::from_millis(500));
        assert_eq!(client.backoff(2), Duration::from_millis(2000));
        assert_eq!(client.backoff(10), MAX_BACKOFF);
    }

    #[test]
    fn test_response_parsing() {
        let body = r#"{"choices":[{"message":{"content":"{}"}}],"usage":{"total_tokens":17}}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.usage.unwrap().total_tokens, 17);
    }
}
