//! DiagramDaemon - session-orchestrated diagram generation
//!
//! DiagramDaemon turns natural-language requirements into validated
//! diagram sources through short-lived generation sessions. Requests
//! are deduplicated, driven through a staged pipeline with retry and
//! fallback, validated and normalized with DiagramScript, and
//! optionally rendered to cached output artifacts.
//!
//! # Core Concepts
//!
//! - **Sessions carry everything**: each accepted request becomes one
//!   session whose status, progress, result, and error live in the
//!   in-memory store
//! - **Errors never escape the pipeline**: after acceptance, every fault
//!   is recorded on the session instead of propagating to the submitter
//! - **Bounded work**: capacity limits, dedup, deadlines, and periodic
//!   sweeps keep the store from growing without bound
//!
//! # Modules
//!
//! - [`session`] - Session store, lifecycle state machine, and sweeper
//! - [`pipeline`] - Staged generation pipeline
//! - [`retry`] - Retry executor with exponential backoff and fallback
//! - [`llm`] - Generation client trait and HTTP implementation
//! - [`render`] - Render service, layout builder, and artifact cache
//! - [`classify`] - Error taxonomy and classification
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod classify;
pub mod cli;
pub mod config;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod retry;
pub mod session;

// Re-export commonly used types
pub use classify::{Classification, ErrorKind, Severity, classify};
pub use config::{Config, GenerationConfig, RenderConfig, RetryConfig, SessionConfig};
pub use ingest::{DocumentParser, IngestError, PlainTextParser};
pub use llm::{
    CallOptions, GenerationClient, GenerationError, GenerationRequest, GenerationResponse, create_client,
};
pub use pipeline::Pipeline;
pub use render::{
    BatchOutcome, DiagramRenderer, RenderArtifact, RenderCache, RenderError, RenderFormat, RenderOptions,
    RenderService, RenderStats,
};
pub use retry::{RetryError, RetryExecutor, RetryStats, RetrySuccess};
pub use session::{
    Progress, RequestOptions, Session, SessionFailure, SessionOutcome, SessionPatch, SessionRequest,
    SessionStatus, SessionStore, StoreError, StoreStats, SweepOutcome, Sweeper,
};
