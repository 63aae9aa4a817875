//! Error taxonomy and classification
//!
//! Every fault in the generation path maps into one closed set of
//! kinds. Classification is the single switch point: retryability and
//! the user-facing message are decided here and nowhere else.

use serde::{Deserialize, Serialize};

use crate::llm::GenerationError;

/// Closed set of failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    Auth,
    RateLimit,
    MalformedResponse,
    Validation,
    System,
}

impl ErrorKind {
    /// Whether a failure of this kind is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::RateLimit | Self::MalformedResponse
        )
    }

    /// Stable, user-facing message for this kind; never leaks internals
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network => "Could not reach the diagram service. Check your connection and try again.",
            Self::Timeout => "The diagram service took too long to respond. Try again.",
            Self::Auth => "The diagram service rejected the request credentials.",
            Self::RateLimit => "The diagram service is handling too many requests. Try again shortly.",
            Self::MalformedResponse => "The diagram service returned an unusable response.",
            Self::Validation => "The generated diagram failed validation.",
            Self::System => "An internal error occurred while generating the diagram.",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            Self::RateLimit => Severity::Warning,
            Self::Network | Self::Timeout | Self::MalformedResponse | Self::Validation => Severity::Error,
            Self::Auth | Self::System => Severity::Critical,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::Auth => write!(f, "auth"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::MalformedResponse => write!(f, "malformed_response"),
            Self::Validation => write!(f, "validation"),
            Self::System => write!(f, "system"),
        }
    }
}

/// How loudly a failure should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

/// A classified failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub severity: Severity,
    /// User-facing message; internals stay in logs
    pub message: String,
}

impl Classification {
    pub fn of(kind: ErrorKind) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            severity: kind.severity(),
            message: kind.user_message().to_string(),
        }
    }
}

/// Map a raw generation fault into the taxonomy
pub fn classify(error: &GenerationError) -> Classification {
    let kind = match error {
        GenerationError::RateLimited { .. } => ErrorKind::RateLimit,
        GenerationError::Api { status, .. } => match status {
            401 | 403 => ErrorKind::Auth,
            408 => ErrorKind::Timeout,
            s if *s >= 500 => ErrorKind::Network,
            _ => ErrorKind::System,
        },
        GenerationError::Network(e) if e.is_timeout() => ErrorKind::Timeout,
        GenerationError::Network(_) => ErrorKind::Network,
        GenerationError::Timeout(_) => ErrorKind::Timeout,
        GenerationError::EmptyResponse => ErrorKind::MalformedResponse,
        GenerationError::Json(_) => ErrorKind::MalformedResponse,
    };
    Classification::of(kind)
}
