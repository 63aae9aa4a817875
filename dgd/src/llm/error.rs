//! Generation-service error types
//!
//! Raw transport/provider faults as the client observed them. Mapping
//! into the daemon's error taxonomy happens in [`crate::classify`], not
//! here, so retry and user-message decisions have a single switch point.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during a generation call
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider returned an empty response")]
    EmptyResponse,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GenerationError {
    /// Check if this is a rate limit error
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, GenerationError::RateLimited { .. })
    }

    /// Get the retry duration if this is a rate limit error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GenerationError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
