//! Error taxonomy of a session capture pass

use recall_ai::AiError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecallError {
    /// Configuration, transport or provider failure of the last backend tried.
    #[error(transparent)]
    Backend(#[from] AiError),

    /// The item needs state the session does not have yet.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// The background task running a pass panicked or was aborted.
    #[error("Session task failed: {0}")]
    Task(String),
}

impl RecallError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RecallError::Cancelled)
    }

    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, RecallError::PreconditionFailed(_))
    }

    /// Ends the pass as a failure. Cancellation is an abort, not a failure.
    pub fn is_fatal(&self) -> bool {
        !self.is_cancelled()
    }

    /// Short class name for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RecallError::Backend(AiError::Configuration { .. }) => "configuration",
            RecallError::Backend(AiError::Provider { .. }) => "provider",
            RecallError::Backend(_) => "transport",
            RecallError::PreconditionFailed(_) => "precondition",
            RecallError::Cancelled => "cancelled",
            RecallError::Storage(_) => "storage",
            RecallError::Task(_) => "task",
        }
    }
}

impl From<serde_json::Error> for RecallError {
    fn from(err: serde_json::Error) -> Self {
        RecallError::Storage(err.into())
    }
}

pub type Result<T> = std::result::Result<T, RecallError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_fatality() {
        let http = RecallError::from(AiError::Http {
            provider: "claude".to_string(),
            status: 500,
            body: String::new(),
        });
        assert_eq!(http.kind(), "transport");
        assert!(http.is_fatal());

        let provider = RecallError::from(AiError::provider("gemini", "BLOCKED", "safety"));
        assert_eq!(provider.kind(), "provider");

        assert!(!RecallError::Cancelled.is_fatal());
        assert!(RecallError::precondition("no handle").is_precondition_failed());
    }
}
