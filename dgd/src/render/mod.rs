//! Diagram rendering
//!
//! Turns validated diagram sources into output artifacts. Byte formats
//! go through a pluggable renderer, the json format is a deterministic
//! layout computed in-process. Finished artifacts are cached by source
//! and options.

mod cache;
mod renderer;
mod service;
mod types;

pub use cache::RenderCache;
#[cfg(test)]
pub use renderer::mock::MockRenderer;
pub use renderer::{DiagramRenderer, build_layout};
pub use service::{BatchOutcome, RenderService, RenderStats};
pub use types::{
    DiagramLayout, LayoutEdge, LayoutNode, RenderArtifact, RenderError, RenderFormat,
    RenderOptions, RenderPayload,
};
