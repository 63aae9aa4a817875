//! Generation request and response types

use serde::{Deserialize, Serialize};

/// A single-turn generation request
///
/// Each request is independent; no conversation state is kept between
/// calls. The pipeline builds a fresh system/user prompt pair per
/// attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// System prompt establishing the diagram-author role
    pub system_prompt: String,

    /// User prompt carrying the requirement text
    pub user_prompt: String,

    /// Per-call overrides of the configured defaults
    pub options: CallOptions,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_prompt: user_prompt.into(),
            options: CallOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CallOptions) -> Self {
        self.options = options;
        self
    }
}

/// Per-call parameter overrides; `None` falls back to config
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A completed generation response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Raw model output text
    pub content: String,

    /// Model that produced the response
    pub model: String,

    /// Token accounting as reported by the provider
    pub usage: TokenUsage,
}

impl GenerationResponse {
    /// Response carrying only text, for tests and fallbacks
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            usage: TokenUsage::default(),
        }
    }
}

/// Token usage accounting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = GenerationRequest::new("system", "user").with_options(CallOptions {
            model: Some("gpt-4o-mini".to_string()),
            temperature: Some(0.1),
            max_tokens: None,
        });

        assert_eq!(request.system_prompt, "system");
        assert_eq!(request.user_prompt, "user");
        assert_eq!(request.options.model.as_deref(), Some("gpt-4o-mini"));
        assert!(request.options.max_tokens.is_none());
    }

    #[test]
    fn test_text_response_defaults() {
        let response = GenerationResponse::text("flowchart TD");
        assert_eq!(response.content, "flowchart TD");
        assert_eq!(response.usage, TokenUsage::default());
    }
}
