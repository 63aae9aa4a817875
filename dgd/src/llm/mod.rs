//! Generation client module for DiagramDaemon
//!
//! Provides the generation-service abstraction and its HTTP
//! implementation.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod http;
mod types;

pub use client::GenerationClient;
pub use error::GenerationError;
pub use http::HttpGenerationClient;
pub use types::{CallOptions, GenerationRequest, GenerationResponse, TokenUsage};

use crate::config::GenerationConfig;

/// Create a generation client based on the provider specified in config
///
/// Currently supports the "openai" provider.
pub fn create_client(config: &GenerationConfig) -> eyre::Result<Arc<dyn GenerationClient>> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpGenerationClient::from_config(config)?)),
        other => Err(eyre::eyre!(
            "Unknown generation provider: '{}'. Supported: openai",
            other
        )),
    }
}
