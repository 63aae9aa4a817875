//! GenerationClient trait definition

use async_trait::async_trait;

use super::{GenerationError, GenerationRequest, GenerationResponse};

/// Stateless generation client - each call is independent
///
/// This is the core abstraction for talking to the text-generation
/// service. A call either completes or fails once; retry scheduling
/// belongs to the retry executor wrapped around it, never to the
/// client itself.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Send a single generation request (blocking until complete)
    async fn complete(&self, request: GenerationRequest) -> Result<GenerationResponse, GenerationError>;
}
