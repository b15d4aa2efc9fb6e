//! Error types for unocr library.

use crate::config::CleaningStep;
use std::io;
use thiserror::Error;

/// Result type alias for unocr operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unocr library.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The cleaning configuration cannot drive a run.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A run was started while another run was active on the same pipeline.
    #[error("A cleaning run is already active on this pipeline")]
    AlreadyRunning,

    /// A pipeline step failed and aborted the run.
    #[error("Step {step} failed: {reason}")]
    StepFailed { step: CleaningStep, reason: String },

    /// The analysis service failed in a way the core does not absorb.
    #[error("Analysis service error: {0}")]
    Service(#[from] ServiceError),

    /// JSON serialization or parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cooperative cancellation was observed.
    ///
    /// Used internally to unwind a run; [`crate::Pipeline::run`] turns it
    /// into [`crate::RunOutcome::Cancelled`] instead of returning it.
    #[error("Run cancelled")]
    Cancelled,
}

/// Failures reported by an [`crate::service::AnalysisService`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Timeout or rate limit that persisted through the client's retries.
    #[error("transient failure after retries: {0}")]
    Transient(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The service rejected the request itself.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The response could not be parsed into the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// No service is configured for this capability.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    /// Returns true for failures that must abort the run.
    ///
    /// Everything else degrades to "nothing detected" or "content unchanged".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ServiceError::Authentication(_) | ServiceError::InvalidRequest(_)
        )
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ServiceError::Authentication("401".into()).is_fatal());
        assert!(ServiceError::InvalidRequest("400".into()).is_fatal());
        assert!(!ServiceError::Transient("429".into()).is_fatal());
        assert!(!ServiceError::MalformedResponse("eof".into()).is_fatal());
        assert!(!ServiceError::Unavailable("offline".into()).is_fatal());
    }

    #[test]
    fn test_step_failed_message() {
        let err = Error::StepFailed {
            step: CleaningStep::RemoveBackMatter,
            reason: "authentication failed: bad key".into(),
        };
        assert_eq!(
            err.to_string(),
            "Step 7 (remove back matter) failed: authentication failed: bad key"
        );
    }
}
