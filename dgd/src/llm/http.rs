//! HTTP generation client
//!
//! Talks to an OpenAI-style Chat Completions endpoint. Exactly one
//! attempt per call: transient-failure retries are scheduled by the
//! retry executor, so this client only reports what happened.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{GenerationClient, GenerationError, GenerationRequest, GenerationResponse, TokenUsage};
use crate::config::GenerationConfig;

/// OpenAI-style chat-completions client
pub struct HttpGenerationClient {
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl HttpGenerationClient {
    /// Create a new client from configuration
    pub fn from_config(config: &GenerationConfig) -> eyre::Result<Self> {
        debug!(model = %config.model, base_url = %config.base_url, "from_config: called");
        let api_key = config.api_key()?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.clone(),
            http,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    /// Build the request body for the chat-completions API
    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let model = request.options.model.as_deref().unwrap_or(&self.model);
        let temperature = request.options.temperature.unwrap_or(self.temperature);
        let max_tokens = request.options.max_tokens.unwrap_or(self.max_tokens).min(self.max_tokens);

        let mut body = serde_json::json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": request.user_prompt },
            ],
            "temperature": temperature,
        });

        // GPT-5.x and o1/o3 models use max_completion_tokens instead of max_tokens
        let uses_completion_tokens =
            model.starts_with("gpt-5") || model.starts_with("o1") || model.starts_with("o3");
        if uses_completion_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        body
    }

    fn parse_response(&self, api_response: ChatResponse) -> Result<GenerationResponse, GenerationError> {
        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(GenerationResponse {
            content,
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
            usage: TokenUsage {
                prompt_tokens: api_response.usage.prompt_tokens,
                completion_tokens: api_response.usage.completion_tokens,
            },
        })
    }
}

#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError> {
        debug!(model = %self.model, "complete: called");
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_request_body(&request);

        let response = match self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) if e.is_timeout() => {
                debug!("complete: request timed out");
                return Err(GenerationError::Timeout(self.timeout));
            }
            Err(e) => {
                debug!(error = %e, "complete: network error");
                return Err(GenerationError::Network(e));
            }
        };

        let status = response.status().as_u16();

        if status == 429 {
            debug!("complete: rate limited (429)");
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);

            return Err(GenerationError::RateLimited {
                retry_after: Duration::from_secs(retry_after),
            });
        }

        if !response.status().is_success() {
            debug!(%status, "complete: API error");
            let text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api { status, message: text });
        }

        debug!("complete: success");
        let text = response.text().await?;
        // A body that is not valid JSON is a provider fault, not a
        // transport fault; keep the two distinguishable downstream.
        let api_response: ChatResponse = serde_json::from_str(&text)?;
        self.parse_response(api_response)
    }
}

// Chat-completions API response types

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    model: Option<String>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
