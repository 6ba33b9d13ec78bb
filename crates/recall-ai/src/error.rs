//! Error types for backend calls

use thiserror::Error;

/// Backend error taxonomy
#[derive(Error, Debug)]
pub enum AiError {
    /// Required credential, endpoint or model missing. Raised before any I/O.
    #[error("{provider} is not configured: {message}")]
    Configuration { provider: String, message: String },

    /// Non-2xx response from the backend.
    #[error("{provider} API error ({status}): {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    /// Network failure or timeout.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Application error reported inside a successful response.
    #[error("{provider} provider error ({code}): {message}")]
    Provider {
        provider: String,
        code: String,
        message: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AiError {
    pub fn configuration(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn provider(
        provider: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether the next backend in a chain should be tried.
    ///
    /// Every backend failure qualifies, a missing configuration on one backend
    /// included. Cancellation never reaches this type.
    pub fn is_fallback_eligible(&self) -> bool {
        match self {
            AiError::Configuration { .. }
            | AiError::Http { .. }
            | AiError::Transport(_)
            | AiError::Provider { .. }
            | AiError::Json(_) => true,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, AiError::Configuration { .. })
    }

    /// Whether the failure happened on the wire rather than in the payload.
    pub fn is_transport(&self) -> bool {
        matches!(self, AiError::Http { .. } | AiError::Transport(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AiError::Http { status, .. } => Some(*status),
            AiError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias for backend operations
pub type Result<T> = std::result::Result<T, AiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_backend_failure_falls_back() {
        let errors = vec![
            AiError::configuration("Claude", "missing api key"),
            AiError::Http {
                provider: "Claude".to_string(),
                status: 500,
                body: "boom".to_string(),
            },
            AiError::provider("Gemini", "RESOURCE_EXHAUSTED", "quota"),
            AiError::Json(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
        ];
        assert!(errors.iter().all(AiError::is_fallback_eligible));
    }

    #[test]
    fn test_display_includes_status_and_body() {
        let err = AiError::Http {
            provider: "OpenRouter".to_string(),
            status: 503,
            body: "overloaded".to_string(),
        };
        assert_eq!(err.to_string(), "OpenRouter API error (503): overloaded");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_transport());
    }
}
